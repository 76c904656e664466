//! JSON graph files
//!
//! A computation is described by a list of named instructions whose
//! operands refer to earlier instructions by name:
//!
//! ```json
//! {
//!   "name": "entry",
//!   "instructions": [
//!     { "name": "a", "op": { "kind": "parameter", "number": 0 },
//!       "shape": { "element_type": "f32", "dimensions": [16, 32] } },
//!     { "name": "b", "op": { "kind": "parameter", "number": 1 },
//!       "shape": { "element_type": "f32", "dimensions": [32, 8] } },
//!     { "name": "dot", "op": { "kind": "dot", "lhs_contracting_dimensions": [1],
//!                              "rhs_contracting_dimensions": [0] },
//!       "shape": { "element_type": "f32", "dimensions": [16, 8] },
//!       "operands": ["a", "b"] }
//!   ]
//! }
//! ```

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::instruction::{DotDimensionNumbers, FusionKind, HloComputation, HloInstruction, HloOp};
use super::shape::{PrimitiveType, Shape};
use crate::diagnostics::LoweringError;

/// Serialized computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFile {
    pub name: String,
    pub instructions: Vec<InstructionSpec>,
    /// Root instruction; defaults to the last one
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionSpec {
    pub name: String,
    pub op: OpSpec,
    pub shape: ShapeSpec,
    #[serde(default)]
    pub operands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeSpec {
    pub element_type: PrimitiveType,
    pub dimensions: Vec<i64>,
    #[serde(default)]
    pub minor_to_major: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OpSpec {
    Parameter { number: u32 },
    Constant,
    Add,
    Multiply,
    Subtract,
    Dot(DotDimensionNumbers),
    Fusion { fusion_kind: FusionKind, body: GraphFile },
    CustomCall { target: String },
    Reduce { dimensions: Vec<usize> },
    Convolution,
}

impl ShapeSpec {
    fn to_shape(&self, node: &str) -> Result<Shape, LoweringError> {
        let shape = Shape::new(self.element_type, self.dimensions.clone());
        match &self.minor_to_major {
            None => Ok(shape),
            Some(layout) => {
                let mut sorted = layout.clone();
                sorted.sort_unstable();
                if sorted != (0..self.dimensions.len()).collect::<Vec<_>>() {
                    return Err(LoweringError::MalformedInstruction {
                        node: node.to_string(),
                        reason: format!(
                            "layout {:?} is not a permutation of {} dimensions",
                            layout,
                            self.dimensions.len()
                        ),
                    });
                }
                Ok(shape.with_layout(layout.clone()))
            }
        }
    }
}

/// A dot needs two operands, one in-range contracting dimension per side
/// and matching in-range batch dimensions
fn check_dot(node: &str, dnums: &DotDimensionNumbers, operands: &[&Shape]) -> Result<(), LoweringError> {
    let malformed = |reason: String| LoweringError::MalformedInstruction {
        node: node.to_string(),
        reason,
    };

    let [lhs, rhs] = operands else {
        return Err(malformed(format!(
            "dot needs two operands, got {}",
            operands.len()
        )));
    };
    if dnums.lhs_batch_dimensions.len() != dnums.rhs_batch_dimensions.len() {
        return Err(malformed(format!(
            "batch dimensions {:?} and {:?} differ in length",
            dnums.lhs_batch_dimensions, dnums.rhs_batch_dimensions
        )));
    }

    let sides = [
        ("lhs", lhs, &dnums.lhs_contracting_dimensions, &dnums.lhs_batch_dimensions),
        ("rhs", rhs, &dnums.rhs_contracting_dimensions, &dnums.rhs_batch_dimensions),
    ];
    for (side, shape, contracting, batch) in sides {
        if contracting.len() != 1 {
            return Err(malformed(format!(
                "{} needs exactly one contracting dimension, got {:?}",
                side, contracting
            )));
        }
        if let Some(dim) = contracting.iter().chain(batch.iter()).find(|&&d| d >= shape.rank()) {
            return Err(malformed(format!(
                "{} dimension {} is out of range for rank {}",
                side,
                dim,
                shape.rank()
            )));
        }
    }
    Ok(())
}

impl GraphFile {
    /// Builds the computation, resolving operand names
    pub fn into_computation(self) -> Result<HloComputation, LoweringError> {
        let mut computation = HloComputation::new(self.name.clone());
        let mut ids = FxHashMap::default();

        for spec in self.instructions {
            if ids.contains_key(&spec.name) {
                return Err(LoweringError::DuplicateInstruction { name: spec.name });
            }

            let operands = spec
                .operands
                .iter()
                .map(|operand| {
                    ids.get(operand)
                        .copied()
                        .ok_or_else(|| LoweringError::UnknownOperand {
                            node: spec.name.clone(),
                            operand: operand.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let shape = spec.shape.to_shape(&spec.name)?;
            let op = match spec.op {
                OpSpec::Parameter { number } => HloOp::Parameter(number),
                OpSpec::Constant => HloOp::Constant,
                OpSpec::Add => HloOp::Add,
                OpSpec::Multiply => HloOp::Multiply,
                OpSpec::Subtract => HloOp::Subtract,
                OpSpec::Dot(dnums) => {
                    let shapes: Vec<&Shape> = operands
                        .iter()
                        .map(|&id| &computation.instruction(id).shape)
                        .collect();
                    check_dot(&spec.name, &dnums, &shapes)?;
                    HloOp::Dot(dnums)
                }
                OpSpec::Fusion { fusion_kind, body } => HloOp::Fusion {
                    kind: fusion_kind,
                    body: Box::new(body.into_computation()?),
                },
                OpSpec::CustomCall { target } => HloOp::CustomCall { target },
                OpSpec::Reduce { dimensions } => HloOp::Reduce { dimensions },
                OpSpec::Convolution => HloOp::Convolution,
            };

            let name = spec.name;
            let id = computation.add_instruction(HloInstruction::new(name.clone(), op, shape, operands));
            ids.insert(name, id);
        }

        match self.root {
            Some(root) => {
                let id = ids.get(&root).copied().ok_or(LoweringError::UnknownOperand {
                    node: format!("{}.root", self.name),
                    operand: root,
                })?;
                computation.set_root(id);
            }
            None if computation.is_empty() => {
                return Err(LoweringError::MissingRoot {
                    computation: self.name,
                });
            }
            None => {}
        }

        tracing::debug!(
            "Loaded computation `{}` with {} instructions",
            computation.name,
            computation.len()
        );
        Ok(computation)
    }
}

/// Parses a computation from JSON text
pub fn parse_computation(source: &str) -> Result<HloComputation, LoweringError> {
    let file: GraphFile = serde_json::from_str(source)?;
    file.into_computation()
}

/// Reads and parses a computation from a JSON file
pub fn load_computation(path: &Path) -> Result<HloComputation, LoweringError> {
    let source = std::fs::read_to_string(path).map_err(|source| LoweringError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_computation(&source)
}

//! Graph instructions and computations
//!
//! Instructions live in an arena owned by their computation. Fusion
//! instructions own a nested computation holding the fused expression.

use std::fmt;

use id_arena::{Arena, Id};
use serde::{Deserialize, Serialize};

use super::shape::Shape;

/// Handle to an instruction inside its computation
pub type InstrId = Id<HloInstruction>;

/// Operation kind, without per-kind payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HloOpcode {
    Parameter,
    Constant,
    Add,
    Multiply,
    Subtract,
    Dot,
    Fusion,
    CustomCall,
    Reduce,
    Convolution,
}

impl fmt::Display for HloOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HloOpcode::Parameter => "parameter",
            HloOpcode::Constant => "constant",
            HloOpcode::Add => "add",
            HloOpcode::Multiply => "multiply",
            HloOpcode::Subtract => "subtract",
            HloOpcode::Dot => "dot",
            HloOpcode::Fusion => "fusion",
            HloOpcode::CustomCall => "custom-call",
            HloOpcode::Reduce => "reduce",
            HloOpcode::Convolution => "convolution",
        };
        f.write_str(name)
    }
}

/// How a fusion's fused expression relates to its consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionKind {
    Loop,
    Input,
    Output,
    Custom,
}

/// Batch and contracting axes of a dot product
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DotDimensionNumbers {
    #[serde(default)]
    pub lhs_batch_dimensions: Vec<usize>,
    #[serde(default)]
    pub rhs_batch_dimensions: Vec<usize>,
    pub lhs_contracting_dimensions: Vec<usize>,
    pub rhs_contracting_dimensions: Vec<usize>,
}

impl DotDimensionNumbers {
    /// Plain matrix multiply: `[m, k] x [k, n]`
    pub fn matmul() -> Self {
        Self {
            lhs_batch_dimensions: Vec::new(),
            rhs_batch_dimensions: Vec::new(),
            lhs_contracting_dimensions: vec![1],
            rhs_contracting_dimensions: vec![0],
        }
    }

    /// Batched matrix multiply with `batch` leading batch dimensions
    pub fn batch_matmul(batch: usize) -> Self {
        Self {
            lhs_batch_dimensions: (0..batch).collect(),
            rhs_batch_dimensions: (0..batch).collect(),
            lhs_contracting_dimensions: vec![batch + 1],
            rhs_contracting_dimensions: vec![batch],
        }
    }

    pub fn batch_dimensions_size(&self) -> usize {
        self.lhs_batch_dimensions.len()
    }
}

/// Operation with its kind-specific payload
#[derive(Debug, Clone)]
pub enum HloOp {
    Parameter(u32),
    Constant,
    Add,
    Multiply,
    Subtract,
    Dot(DotDimensionNumbers),
    Fusion {
        kind: FusionKind,
        body: Box<HloComputation>,
    },
    CustomCall {
        target: String,
    },
    Reduce {
        dimensions: Vec<usize>,
    },
    Convolution,
}

impl HloOp {
    pub fn opcode(&self) -> HloOpcode {
        match self {
            HloOp::Parameter(_) => HloOpcode::Parameter,
            HloOp::Constant => HloOpcode::Constant,
            HloOp::Add => HloOpcode::Add,
            HloOp::Multiply => HloOpcode::Multiply,
            HloOp::Subtract => HloOpcode::Subtract,
            HloOp::Dot(_) => HloOpcode::Dot,
            HloOp::Fusion { .. } => HloOpcode::Fusion,
            HloOp::CustomCall { .. } => HloOpcode::CustomCall,
            HloOp::Reduce { .. } => HloOpcode::Reduce,
            HloOp::Convolution => HloOpcode::Convolution,
        }
    }
}

/// One graph node
#[derive(Debug, Clone)]
pub struct HloInstruction {
    pub name: String,
    pub op: HloOp,
    pub shape: Shape,
    pub operands: Vec<InstrId>,
}

impl HloInstruction {
    pub fn new(name: impl Into<String>, op: HloOp, shape: Shape, operands: Vec<InstrId>) -> Self {
        Self {
            name: name.into(),
            op,
            shape,
            operands,
        }
    }

    pub fn opcode(&self) -> HloOpcode {
        self.op.opcode()
    }
}

/// A computation: an arena of instructions with a designated root
#[derive(Debug, Clone)]
pub struct HloComputation {
    pub name: String,
    instructions: Arena<HloInstruction>,
    root: Option<InstrId>,
}

impl HloComputation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Arena::new(),
            root: None,
        }
    }

    /// Adds an instruction; the most recently added one becomes the root
    /// unless `set_root` says otherwise
    pub fn add_instruction(&mut self, instr: HloInstruction) -> InstrId {
        let id = self.instructions.alloc(instr);
        self.root = Some(id);
        id
    }

    pub fn set_root(&mut self, id: InstrId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<HloRef<'_>> {
        self.root.map(|id| self.get(id))
    }

    pub fn root_id(&self) -> Option<InstrId> {
        self.root
    }

    /// Borrowed view of an instruction
    pub fn get(&self, id: InstrId) -> HloRef<'_> {
        HloRef {
            computation: self,
            id,
        }
    }

    pub fn instruction(&self, id: InstrId) -> &HloInstruction {
        &self.instructions[id]
    }

    pub fn find(&self, name: &str) -> Option<HloRef<'_>> {
        self.instructions
            .iter()
            .find(|(_, instr)| instr.name == name)
            .map(|(id, _)| self.get(id))
    }

    /// Instructions in insertion order
    pub fn instructions(&self) -> impl Iterator<Item = HloRef<'_>> {
        self.instructions.iter().map(move |(id, _)| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.len() == 0
    }
}

/// An instruction together with the computation that owns it
#[derive(Clone, Copy)]
pub struct HloRef<'a> {
    computation: &'a HloComputation,
    id: InstrId,
}

impl<'a> HloRef<'a> {
    pub fn id(&self) -> InstrId {
        self.id
    }

    pub fn instruction(&self) -> &'a HloInstruction {
        self.computation.instruction(self.id)
    }

    pub fn name(&self) -> &'a str {
        &self.instruction().name
    }

    pub fn op(&self) -> &'a HloOp {
        &self.instruction().op
    }

    pub fn opcode(&self) -> HloOpcode {
        self.instruction().opcode()
    }

    pub fn shape(&self) -> &'a Shape {
        &self.instruction().shape
    }

    pub fn operand_count(&self) -> usize {
        self.instruction().operands.len()
    }

    pub fn operand(&self, index: usize) -> Option<HloRef<'a>> {
        self.instruction()
            .operands
            .get(index)
            .map(|&id| self.computation.get(id))
    }

    pub fn operands(&self) -> impl Iterator<Item = HloRef<'a>> + 'a {
        let computation = self.computation;
        self.instruction()
            .operands
            .iter()
            .map(move |&id| computation.get(id))
    }

    pub fn dot_dimension_numbers(&self) -> Option<&'a DotDimensionNumbers> {
        match self.op() {
            HloOp::Dot(dnums) => Some(dnums),
            _ => None,
        }
    }

    pub fn custom_call_target(&self) -> Option<&'a str> {
        match self.op() {
            HloOp::CustomCall { target } => Some(target),
            _ => None,
        }
    }

    pub fn fusion_kind(&self) -> Option<FusionKind> {
        match self.op() {
            HloOp::Fusion { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Root of the fused expression, for fusion instructions
    pub fn fused_expression_root(&self) -> Option<HloRef<'a>> {
        match self.op() {
            HloOp::Fusion { body, .. } => body.root(),
            _ => None,
        }
    }

    /// Reduced dimensions, for reduce instructions
    pub fn reduce_dimensions(&self) -> Option<&'a [usize]> {
        match self.op() {
            HloOp::Reduce { dimensions } => Some(dimensions),
            _ => None,
        }
    }
}

impl fmt::Debug for HloRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{} = {} {}", self.name(), self.shape(), self.opcode())
    }
}

impl fmt::Display for HloRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

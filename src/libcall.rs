//! Library-call eligibility
//!
//! Decides whether a graph instruction is lowered to a call into a
//! vendor math library (gemm, DNN batch normalization, DNN convolution)
//! instead of a generated kernel, and whether a reduction can run as a
//! contiguous vector reduction.
//!
//! Every predicate here is total and side-effect free. The single
//! exception is the contracting-dimension check on a dot that already has
//! gemm-compatible shapes: a mismatch there means an earlier pass built an
//! invalid graph, and the predicate aborts instead of guessing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::diagnostics::LoweringError;
use crate::hlo::{FusionKind, HloOpcode, HloRef, PrimitiveType, Shape};

/// Custom-call targets that name a DNN library entry point
///
/// The strings are a contract between the pass that builds the custom
/// call and the pass that lowers it; they are matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomCallTarget {
    #[serde(rename = "__cudnn$batchNormalizationForwardInference")]
    BatchNormForwardInference,
    #[serde(rename = "__cudnn$batchNormalizationForwardTraining")]
    BatchNormForwardTraining,
    #[serde(rename = "__cudnn$batchNormalizationBackward")]
    BatchNormBackward,
    #[serde(rename = "__cudnn$convForward")]
    ConvForward,
    #[serde(rename = "__cudnn$convBackwardInput")]
    ConvBackwardInput,
    #[serde(rename = "__cudnn$convBackwardFilter")]
    ConvBackwardFilter,
    #[serde(rename = "__cudnn$convBiasActivationForward")]
    ConvBiasActivationForward,
}

impl CustomCallTarget {
    pub const ALL: [CustomCallTarget; 7] = [
        CustomCallTarget::BatchNormForwardInference,
        CustomCallTarget::BatchNormForwardTraining,
        CustomCallTarget::BatchNormBackward,
        CustomCallTarget::ConvForward,
        CustomCallTarget::ConvBackwardInput,
        CustomCallTarget::ConvBackwardFilter,
        CustomCallTarget::ConvBiasActivationForward,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CustomCallTarget::BatchNormForwardInference => {
                "__cudnn$batchNormalizationForwardInference"
            }
            CustomCallTarget::BatchNormForwardTraining => "__cudnn$batchNormalizationForwardTraining",
            CustomCallTarget::BatchNormBackward => "__cudnn$batchNormalizationBackward",
            CustomCallTarget::ConvForward => "__cudnn$convForward",
            CustomCallTarget::ConvBackwardInput => "__cudnn$convBackwardInput",
            CustomCallTarget::ConvBackwardFilter => "__cudnn$convBackwardFilter",
            CustomCallTarget::ConvBiasActivationForward => "__cudnn$convBiasActivationForward",
        }
    }

    pub fn is_batch_norm(self) -> bool {
        self.batch_norm_kind().is_some()
    }

    pub fn is_convolution(self) -> bool {
        self.conv_kind().is_some()
    }

    pub fn batch_norm_kind(self) -> Option<BatchNormKind> {
        match self {
            CustomCallTarget::BatchNormForwardInference => Some(BatchNormKind::ForwardInference),
            CustomCallTarget::BatchNormForwardTraining => Some(BatchNormKind::ForwardTraining),
            CustomCallTarget::BatchNormBackward => Some(BatchNormKind::Backward),
            _ => None,
        }
    }

    pub fn conv_kind(self) -> Option<DnnConvKind> {
        match self {
            CustomCallTarget::ConvForward => Some(DnnConvKind::Forward),
            CustomCallTarget::ConvBackwardInput => Some(DnnConvKind::BackwardInput),
            CustomCallTarget::ConvBackwardFilter => Some(DnnConvKind::BackwardFilter),
            CustomCallTarget::ConvBiasActivationForward => Some(DnnConvKind::ForwardActivation),
            _ => None,
        }
    }
}

impl FromStr for CustomCallTarget {
    type Err = LoweringError;

    fn from_str(target: &str) -> Result<Self, Self::Err> {
        CustomCallTarget::ALL
            .into_iter()
            .find(|known| known.as_str() == target)
            .ok_or_else(|| LoweringError::UnexpectedCallTarget {
                target: target.to_string(),
            })
    }
}

impl fmt::Display for CustomCallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch normalization entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchNormKind {
    ForwardInference,
    ForwardTraining,
    Backward,
}

impl fmt::Display for BatchNormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchNormKind::ForwardInference => write!(f, "forward_inference"),
            BatchNormKind::ForwardTraining => write!(f, "forward_training"),
            BatchNormKind::Backward => write!(f, "backward"),
        }
    }
}

/// Convolution entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnnConvKind {
    Forward,
    BackwardInput,
    BackwardFilter,
    /// Fused convolution, bias add and activation
    ForwardActivation,
}

impl DnnConvKind {
    pub fn from_call_target(target: &str) -> Result<Self, LoweringError> {
        CustomCallTarget::from_str(target)?
            .conv_kind()
            .ok_or_else(|| LoweringError::UnexpectedCallTarget {
                target: target.to_string(),
            })
    }

    pub fn call_target(self) -> CustomCallTarget {
        match self {
            DnnConvKind::Forward => CustomCallTarget::ConvForward,
            DnnConvKind::BackwardInput => CustomCallTarget::ConvBackwardInput,
            DnnConvKind::BackwardFilter => CustomCallTarget::ConvBackwardFilter,
            DnnConvKind::ForwardActivation => CustomCallTarget::ConvBiasActivationForward,
        }
    }
}

impl fmt::Display for DnnConvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnnConvKind::Forward => write!(f, "forward"),
            DnnConvKind::BackwardInput => write!(f, "backward_input"),
            DnnConvKind::BackwardFilter => write!(f, "backward_filter"),
            DnnConvKind::ForwardActivation => write!(f, "forward with activation"),
        }
    }
}

/// Which library routine an instruction lowers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryCallKind {
    Gemm,
    BatchNorm(BatchNormKind),
    Convolution(DnnConvKind),
}

impl fmt::Display for LibraryCallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryCallKind::Gemm => write!(f, "gemm"),
            LibraryCallKind::BatchNorm(kind) => write!(f, "batch-norm ({})", kind),
            LibraryCallKind::Convolution(kind) => write!(f, "convolution ({})", kind),
        }
    }
}

/// Output element types the gemm library accepts
const GEMM_ELEMENT_TYPES: [PrimitiveType; 5] = [
    PrimitiveType::F16,
    PrimitiveType::F32,
    PrimitiveType::F64,
    PrimitiveType::C64,
    PrimitiveType::C128,
];

/// Whether `lhs * rhs = output` can be handed to gemm: all three are
/// matrices beyond the batch dimensions, the operands are not empty and
/// the output type is one gemm supports
fn are_valid_gemm_shapes(lhs: &Shape, rhs: &Shape, output: &Shape, batch_dims: usize) -> bool {
    GEMM_ELEMENT_TYPES.contains(&output.element_type)
        && lhs.is_rank2_beyond_batch(batch_dims)
        && rhs.is_rank2_beyond_batch(batch_dims)
        && output.is_rank2_beyond_batch(batch_dims)
        && !lhs.is_zero_element_array()
        && !rhs.is_zero_element_array()
}

/// Checks that the two contracted dimensions of a dot have equal sizes
pub fn check_contracting_dimensions(dot: HloRef<'_>) -> Result<(), LoweringError> {
    let malformed = |reason: &str| LoweringError::MalformedInstruction {
        node: dot.name().to_string(),
        reason: reason.to_string(),
    };

    let dnums = dot
        .dot_dimension_numbers()
        .ok_or_else(|| malformed("not a dot"))?;
    let (lhs, rhs) = match (dot.operand(0), dot.operand(1)) {
        (Some(lhs), Some(rhs)) => (lhs, rhs),
        _ => return Err(malformed("dot needs two operands")),
    };

    let lhs_size = dnums
        .lhs_contracting_dimensions
        .first()
        .and_then(|&d| lhs.shape().dimension(d))
        .ok_or_else(|| malformed("lhs contracting dimension is out of range"))?;
    let rhs_size = dnums
        .rhs_contracting_dimensions
        .first()
        .and_then(|&d| rhs.shape().dimension(d))
        .ok_or_else(|| malformed("rhs contracting dimension is out of range"))?;

    if lhs_size != rhs_size {
        return Err(LoweringError::ContractingDimensionMismatch {
            node: dot.name().to_string(),
            lhs: lhs_size,
            rhs: rhs_size,
        });
    }
    Ok(())
}

/// Whether a dot instruction can be implemented as a gemm call
///
/// Returns false for anything that is not a two-operand dot.
///
/// # Panics
///
/// When the shapes are gemm-compatible but the contracting dimensions
/// disagree in size. Shape inference rules this out, so reaching it is a
/// bug in an earlier pass. Dimension numbers that name no dimension make
/// the dot ineligible instead.
pub fn is_matmul_library_eligible(dot: HloRef<'_>) -> bool {
    let Some(dnums) = dot.dot_dimension_numbers() else {
        return false;
    };
    let (Some(lhs), Some(rhs)) = (dot.operand(0), dot.operand(1)) else {
        return false;
    };

    if !are_valid_gemm_shapes(
        lhs.shape(),
        rhs.shape(),
        dot.shape(),
        dnums.batch_dimensions_size(),
    ) {
        return false;
    }

    match check_contracting_dimensions(dot) {
        Ok(()) => true,
        Err(fault @ LoweringError::ContractingDimensionMismatch { .. }) => panic!("{}", fault),
        Err(fault) => {
            tracing::debug!("{} is not a gemm: {}", dot, fault);
            false
        }
    }
}

/// Whether an instruction lowers to a gemm call
///
/// Accepts a gemm-eligible dot, or an output fusion whose root multiplies
/// or adds a gemm-eligible dot with another operand (the other operand is
/// folded into the gemm as its scale or bias).
pub fn is_library_call_eligible(hlo: HloRef<'_>) -> bool {
    match hlo.opcode() {
        HloOpcode::Dot => is_matmul_library_eligible(hlo),
        HloOpcode::Fusion if hlo.fusion_kind() == Some(FusionKind::Output) => {
            let Some(root) = hlo.fused_expression_root() else {
                return false;
            };
            if !matches!(root.opcode(), HloOpcode::Multiply | HloOpcode::Add) {
                return false;
            }

            let dot = root
                .operand(0)
                .filter(|op| op.opcode() == HloOpcode::Dot)
                .or_else(|| root.operand(1).filter(|op| op.opcode() == HloOpcode::Dot));
            match dot {
                Some(dot) => {
                    tracing::trace!("Output fusion {} wraps dot {}", hlo, dot);
                    is_matmul_library_eligible(dot)
                }
                None => false,
            }
        }
        _ => false,
    }
}

fn recognized_call_target(hlo: HloRef<'_>) -> Option<CustomCallTarget> {
    hlo.custom_call_target()
        .and_then(|target| CustomCallTarget::from_str(target).ok())
}

/// Whether an instruction is a custom call to a DNN batch normalization
pub fn is_recognized_normalization_call(hlo: HloRef<'_>) -> bool {
    recognized_call_target(hlo).is_some_and(CustomCallTarget::is_batch_norm)
}

/// Whether an instruction is a custom call to a DNN convolution
pub fn is_recognized_convolution_call(hlo: HloRef<'_>) -> bool {
    recognized_call_target(hlo).is_some_and(CustomCallTarget::is_convolution)
}

/// The library routine an instruction lowers to, if any
pub fn library_call_kind(hlo: HloRef<'_>) -> Option<LibraryCallKind> {
    if is_library_call_eligible(hlo) {
        return Some(LibraryCallKind::Gemm);
    }
    let target = recognized_call_target(hlo)?;
    target
        .batch_norm_kind()
        .map(LibraryCallKind::BatchNorm)
        .or_else(|| target.conv_kind().map(LibraryCallKind::Convolution))
}

/// Whether an instruction is implemented by any library call
pub fn implemented_as_library_call(hlo: HloRef<'_>) -> bool {
    let kind = library_call_kind(hlo);
    tracing::debug!(
        "{} ({}) {}",
        hlo,
        hlo.opcode(),
        match kind {
            Some(kind) => format!("lowers to {}", kind),
            None => "needs a generated kernel".to_string(),
        }
    );
    kind.is_some()
}

/// Whether a reduce can be emitted as a contiguous vector reduction
///
/// The kept (non-reduced) input dimensions must be adjacent in the
/// input's physical layout, and the declared result must equal the input
/// shape with the reduced dimensions removed.
pub fn is_vector_reduction(reduce: HloRef<'_>) -> bool {
    let Some(reduced) = reduce.reduce_dimensions() else {
        return false;
    };
    let Some(input) = reduce.operand(0) else {
        return false;
    };

    let input_shape = input.shape();
    let dims_to_keep: Vec<usize> = (0..input_shape.rank())
        .filter(|dim| !reduced.contains(dim))
        .collect();

    input_shape.layout.are_dimensions_consecutive(&dims_to_keep)
        && *reduce.shape() == input_shape.filter_dimensions(|dim| dims_to_keep.contains(&dim))
}

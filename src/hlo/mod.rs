//! Computation graph consumed by the lowering decisions
//!
//! Only the slice of the graph representation the GPU backend reads is
//! modelled here: opcodes, operands, shapes with layouts, dot dimension
//! numbers, custom-call targets and fused expressions.

pub mod instruction;
pub mod json;
pub mod shape;

pub use instruction::{
    DotDimensionNumbers, FusionKind, HloComputation, HloInstruction, HloOp, HloOpcode, HloRef,
    InstrId,
};
pub use json::{GraphFile, load_computation, parse_computation};
pub use shape::{Layout, PrimitiveType, Shape};

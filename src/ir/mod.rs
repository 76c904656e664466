//! Device instruction layer
//!
//! A small typed SSA representation with LLVM-like semantics: modules own
//! an idempotent declaration table, global strings and function bodies,
//! and [`IrBuilder`] is the only way to append instructions. The
//! [`Evaluator`] runs one lane of a function so that emitted sequences can
//! be checked on the host.

pub mod builder;
pub mod eval;
pub mod module;
pub mod printer;
pub mod types;

pub use builder::IrBuilder;
pub use eval::{Allocation, EvalValue, Evaluator, ExternalCalls, Memory, Pointer};
pub use module::{
    Block, BlockId, CastOp, Constant, DeclId, FnAttribute, Function, FunctionDecl, FunctionId,
    GlobalId, GlobalString, InstrKind, Instruction, Module, Signature, ValueData, ValueId,
    ValueKind,
};
pub use types::IrType;

//! Diagnostics for classification and device code emission
//!
//! Errors carry enough context (instruction name, requested intrinsic,
//! callee) for a compiler diagnostic to name the failing construct.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while constructing device code
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("Target `{target}` cannot resolve intrinsic `{name}`")]
    #[diagnostic(
        code(target::unresolved_intrinsic),
        help("this GPU family has no lowering for the requested portable intrinsic")
    )]
    UnresolvedIntrinsic { name: String, target: String },

    #[error("Function `{name}` redeclared as `{found}`, previously declared as `{expected}`")]
    #[diagnostic(code(ir::conflicting_declaration))]
    ConflictingDeclaration {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Call to `{callee}` has {found} operands, expected {expected}")]
    #[diagnostic(code(ir::operand_count))]
    OperandCountMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("Operand {index} of `{callee}` has type `{found}`, expected `{expected}`")]
    #[diagnostic(code(ir::operand_type))]
    OperandTypeMismatch {
        callee: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Cannot {op} `{from}` to `{to}`")]
    #[diagnostic(code(ir::invalid_cast))]
    InvalidCast {
        op: &'static str,
        from: String,
        to: String,
    },

    #[error("Expected {expected}, found `{found}`")]
    #[diagnostic(code(ir::type_mismatch))]
    TypeMismatch { expected: String, found: String },

    #[error("Value of type `{ty}` has no fixed bit width")]
    #[diagnostic(code(ir::unsized_value))]
    UnsizedValue { ty: String },

    #[error("Index {index} out of range for `{ty}`")]
    #[diagnostic(code(ir::index_out_of_range))]
    IndexOutOfRange { index: u32, ty: String },

    #[error("Unknown {kind} `{name}`")]
    #[diagnostic(code(ir::unknown_entity))]
    UnknownEntity { kind: &'static str, name: String },

    #[error("Evaluation failed: {0}")]
    #[diagnostic(code(ir::eval))]
    Evaluation(String),
}

/// Errors raised while classifying graphs or loading backend inputs
#[derive(Error, Debug, Diagnostic)]
pub enum LoweringError {
    #[error("Unexpected call target: {target}")]
    #[diagnostic(code(libcall::unexpected_target))]
    UnexpectedCallTarget { target: String },

    #[error(
        "Internal consistency fault: dot `{node}` contracts lhs dimension of size {lhs} \
         with rhs dimension of size {rhs}"
    )]
    #[diagnostic(
        code(libcall::contracting_mismatch),
        help("shape inference guarantees matching contracting dimensions; an earlier pass produced an invalid graph")
    )]
    ContractingDimensionMismatch { node: String, lhs: i64, rhs: i64 },

    #[error("Instruction `{node}` is malformed: {reason}")]
    #[diagnostic(code(hlo::malformed))]
    MalformedInstruction { node: String, reason: String },

    #[error("Instruction `{node}` refers to unknown operand `{operand}`")]
    #[diagnostic(code(hlo::unknown_operand))]
    UnknownOperand { node: String, operand: String },

    #[error("Instruction `{name}` is defined twice")]
    #[diagnostic(code(hlo::duplicate_instruction))]
    DuplicateInstruction { name: String },

    #[error("Computation `{computation}` has no root instruction")]
    #[diagnostic(code(hlo::missing_root))]
    MissingRoot { computation: String },

    #[error("Failed to parse graph")]
    #[diagnostic(code(hlo::parse))]
    GraphParse(#[from] serde_json::Error),

    #[error("Failed to read `{}`", path.display())]
    #[diagnostic(code(io::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse backend configuration")]
    #[diagnostic(code(config::parse))]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid backend configuration: {0}")]
    #[diagnostic(code(config::invalid))]
    InvalidConfig(String),
}

//! Calls to device functions and target intrinsics

use crate::diagnostics::EmitError;
use crate::hlo::PrimitiveType;
use crate::ir::{FnAttribute, IrBuilder, IrType, Signature, ValueId};
use crate::target::{CallForm, SimtIntrinsic, TargetMachineFeatures};

/// Declares `callee` with the given element types (once per module) and
/// calls it with `operands`
///
/// Operands are checked against `input_types` before anything is declared.
///
/// Attributes are added to the declaration, so calling the same function
/// again with more attributes widens the set rather than redeclaring it.
pub fn emit_device_function_call(
    callee: &str,
    operands: &[ValueId],
    input_types: &[PrimitiveType],
    output_type: PrimitiveType,
    attributes: &[FnAttribute],
    b: &mut IrBuilder<'_>,
) -> Result<ValueId, EmitError> {
    if operands.len() != input_types.len() {
        return Err(EmitError::OperandCountMismatch {
            callee: callee.to_string(),
            expected: input_types.len(),
            found: operands.len(),
        });
    }
    let signature = Signature::new(
        input_types
            .iter()
            .map(|ty| IrType::from_primitive(*ty))
            .collect(),
        IrType::from_primitive(output_type),
    );
    for (index, (operand, expected)) in operands.iter().zip(&signature.params).enumerate() {
        let found = b.value_type(*operand)?;
        if &found != expected {
            return Err(EmitError::OperandTypeMismatch {
                callee: callee.to_string(),
                index,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    let decl = b.declare_function(callee, signature, attributes)?;
    b.create_call(decl, operands)
}

/// Calls `callee`, declaring it with the operand types of `args`
pub fn emit_call(
    b: &mut IrBuilder<'_>,
    callee: &str,
    args: &[ValueId],
    ret: IrType,
    attributes: &[FnAttribute],
) -> Result<ValueId, EmitError> {
    let params = args
        .iter()
        .map(|arg| b.value_type(*arg))
        .collect::<Result<Vec<_>, _>>()?;
    let decl = b.declare_function(callee, Signature::new(params, ret), attributes)?;
    b.create_call(decl, args)
}

/// Calls the vendor symbol behind a portable intrinsic
pub fn emit_call_to_target_intrinsic(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
    intrinsic: SimtIntrinsic,
    operands: &[ValueId],
    ret: IrType,
    attributes: &[FnAttribute],
) -> Result<ValueId, EmitError> {
    let symbol = features.resolve(intrinsic)?;
    tracing::trace!("{} -> {} on {}", intrinsic, symbol, features.target_name());
    match symbol.form {
        CallForm::Plain => emit_call(b, symbol.name, operands, ret, attributes),
        CallForm::Synchronized { member_mask, clamp } => {
            let mut args = Vec::with_capacity(operands.len() + 2);
            args.push(b.const_i32(member_mask as i32));
            args.extend_from_slice(operands);
            args.push(b.const_i32(clamp as i32));
            emit_call(b, symbol.name, &args, ret, attributes)
        }
    }
}

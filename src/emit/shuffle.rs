//! Full-warp shuffle-down

use super::call::emit_call_to_target_intrinsic;
use super::words::{WORD_BITS, word_count};
use crate::diagnostics::EmitError;
use crate::ir::{FnAttribute, IrBuilder, IrType, ValueId};
use crate::target::{SimtIntrinsic, TargetMachineFeatures};

const SHUFFLE_ATTRIBUTES: [FnAttribute; 2] = [FnAttribute::Convergent, FnAttribute::NoUnwind];

fn shuffle_word(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
    word: ValueId,
    offset: ValueId,
) -> Result<ValueId, EmitError> {
    emit_call_to_target_intrinsic(
        b,
        features,
        SimtIntrinsic::ShuffleDownI32,
        &[word, offset],
        IrType::I32,
        &SHUFFLE_ATTRIBUTES,
    )
}

/// Reads `value` from the lane `offset` positions further down the warp
///
/// Any scalar or vector of fixed width is accepted. A `float` takes one
/// cross-lane read; anything else is zero-extended to whole 32-bit words,
/// read word by word (low word first) and truncated back to its type.
pub fn emit_full_warp_shuffle_down(
    value: ValueId,
    offset: ValueId,
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
) -> Result<ValueId, EmitError> {
    let value_ty = b.value_type(value)?;
    let offset_ty = b.value_type(offset)?;
    if offset_ty != IrType::I32 {
        return Err(EmitError::TypeMismatch {
            expected: "an i32 lane offset".to_string(),
            found: offset_ty.to_string(),
        });
    }
    let bit_width = match value_ty.primitive_size_in_bits() {
        Some(bits) if bits > 0 => bits,
        _ => {
            return Err(EmitError::UnsizedValue {
                ty: value_ty.to_string(),
            });
        }
    };

    if value_ty == IrType::Float {
        let as_int = b.create_bitcast(value, IrType::I32)?;
        let result = shuffle_word(b, features, as_int, offset)?;
        return b.create_bitcast(result, value_ty);
    }

    let segments = word_count(bit_width) as u32;
    let padded = IrType::Int(WORD_BITS * segments);
    tracing::debug!(
        "Shuffling {} as {} word(s) on {}",
        value_ty,
        segments,
        features.target_name()
    );

    let as_int = b.create_bitcast(value, IrType::Int(bit_width))?;
    let extended = b.create_zext(as_int, padded.clone())?;
    let mut words = b.create_bitcast(extended, IrType::vector(IrType::I32, segments))?;
    for i in 0..segments {
        let word = b.create_extract_element(words, i)?;
        let shuffled = shuffle_word(b, features, word, offset)?;
        words = b.create_insert_element(words, shuffled, i)?;
    }
    let joined = b.create_bitcast(words, padded)?;
    let truncated = b.create_trunc(joined, IrType::Int(bit_width))?;
    b.create_bitcast(truncated, value_ty)
}

//! Device-side `printf`

use super::call::emit_call;
use crate::diagnostics::EmitError;
use crate::ir::{IrBuilder, IrType, ValueId};

/// Device print entry point: `i32 vprintf(ptr format, ptr arguments)`
pub const VPRINTF: &str = "vprintf";

/// Packs `arguments` into one stack record and calls `vprintf`
///
/// The record has one field per argument, in order. The format string
/// becomes a private global constant.
pub fn emit_printf(
    format: &str,
    arguments: &[ValueId],
    b: &mut IrBuilder<'_>,
) -> Result<ValueId, EmitError> {
    let field_types = arguments
        .iter()
        .map(|arg| b.value_type(*arg))
        .collect::<Result<Vec<_>, _>>()?;
    let record_ty = IrType::Struct(field_types);

    let record = b.create_alloca(record_ty.clone());
    for (index, argument) in arguments.iter().enumerate() {
        let field = b.create_struct_field_ptr(record, &record_ty, index as u32)?;
        b.create_store(*argument, field)?;
    }

    let format_ptr = b.create_global_string_ptr(format);
    emit_call(b, VPRINTF, &[format_ptr, record], IrType::I32, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstrKind, Module, Signature};

    #[test]
    fn test_one_store_per_argument() {
        let mut module = Module::new("m");
        let f = module.add_function(
            "k",
            Signature::new(vec![IrType::I32, IrType::Double], IrType::Void),
        );
        let mut b = IrBuilder::new(&mut module, f).unwrap();
        let x = b.param(0).unwrap();
        let y = b.param(1).unwrap();
        emit_printf("%d %f\n", &[x, y], &mut b).unwrap();
        emit_printf("again %d\n", &[x], &mut b).unwrap();

        let stores = module.functions()[0]
            .instructions()
            .filter(|instr| matches!(instr.kind, InstrKind::Store { .. }))
            .count();
        assert_eq!(stores, 3);
        assert_eq!(module.declaration_count(), 1);
        assert_eq!(module.globals().len(), 2);
        assert_eq!(module.globals()[0].value, "%d %f\n");
    }

    #[test]
    fn test_no_arguments() {
        let mut module = Module::new("m");
        let f = module.add_function("k", Signature::new(vec![], IrType::Void));
        let mut b = IrBuilder::new(&mut module, f).unwrap();
        let call = emit_printf("hello\n", &[], &mut b).unwrap();
        assert_eq!(b.value_type(call).unwrap(), IrType::I32);
    }
}

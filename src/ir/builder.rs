//! Instruction builder
//!
//! The builder borrows the module mutably and appends instructions at the
//! end of the current block of one function. Every `create_*` method
//! checks operand types before inserting anything.

use super::module::{
    BlockId, CastOp, Constant, DeclId, FnAttribute, Function, FunctionId, InstrKind, Instruction,
    Module, Signature, ValueId, ValueKind,
};
use super::types::IrType;
use crate::diagnostics::EmitError;

pub struct IrBuilder<'m> {
    module: &'m mut Module,
    function: FunctionId,
    block: BlockId,
}

fn type_mismatch(expected: impl Into<String>, found: &IrType) -> EmitError {
    EmitError::TypeMismatch {
        expected: expected.into(),
        found: found.to_string(),
    }
}

impl<'m> IrBuilder<'m> {
    /// Positions the builder at the end of the function's entry block
    pub fn new(module: &'m mut Module, function: FunctionId) -> Result<Self, EmitError> {
        if module.function(function).is_none() {
            return Err(EmitError::UnknownEntity {
                kind: "function",
                name: format!("#{}", function.0),
            });
        }
        Ok(Self {
            module,
            function,
            block: BlockId(0),
        })
    }

    pub fn module(&self) -> &Module {
        &*self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut *self.module
    }

    pub fn function_id(&self) -> FunctionId {
        self.function
    }

    pub fn function(&self) -> &Function {
        // The id was checked in `new` and functions are never removed.
        &self.module.functions()[self.function.0 as usize]
    }

    fn function_mut(&mut self) -> &mut Function {
        let id = self.function;
        match self.module.function_mut(id) {
            Some(function) => function,
            None => unreachable!("builder function #{} vanished", id.0),
        }
    }

    pub fn insert_block(&self) -> BlockId {
        self.block
    }

    pub fn value_type(&self, value: ValueId) -> Result<IrType, EmitError> {
        self.function().value_type(value).cloned()
    }

    pub fn param(&self, index: usize) -> Result<ValueId, EmitError> {
        self.function()
            .param(index)
            .ok_or_else(|| EmitError::UnknownEntity {
                kind: "parameter",
                name: index.to_string(),
            })
    }

    /// Appends a new empty block to the function
    pub fn append_block(&mut self, label: impl Into<String>) -> BlockId {
        let function = self.function_mut();
        let id = BlockId(function.blocks.len() as u32);
        function.blocks.push(super::module::Block {
            label: label.into(),
            instructions: Vec::new(),
        });
        id
    }

    pub fn position_at_end(&mut self, block: BlockId) -> Result<(), EmitError> {
        if self.function().block(block).is_none() {
            return Err(EmitError::UnknownEntity {
                kind: "block",
                name: block.0.to_string(),
            });
        }
        self.block = block;
        Ok(())
    }

    fn insert(&mut self, kind: InstrKind, result_ty: Option<IrType>) -> Option<ValueId> {
        let block = self.block;
        let function = self.function_mut();
        let index = function
            .block(block)
            .map(|b| b.instructions.len() as u32)
            .unwrap_or_default();
        let result = result_ty.map(|ty| function.add_value(ty, ValueKind::Instr { block, index }));
        if let Some(b) = function.block_mut(block) {
            b.instructions.push(Instruction { result, kind });
        }
        result
    }

    fn insert_value(&mut self, kind: InstrKind, result_ty: IrType) -> ValueId {
        match self.insert(kind, Some(result_ty)) {
            Some(value) => value,
            None => unreachable!("instruction with a result type produced no value"),
        }
    }

    // === Constants ===

    pub fn const_int(&mut self, ty: IrType, value: u128) -> Result<ValueId, EmitError> {
        let IrType::Int(bits) = ty else {
            return Err(type_mismatch("an integer type", &ty));
        };
        let masked = if bits >= 128 {
            value
        } else {
            value & ((1u128 << bits) - 1)
        };
        Ok(self
            .function_mut()
            .add_value(ty, ValueKind::Const(Constant::Int(masked))))
    }

    pub fn const_i32(&mut self, value: i32) -> ValueId {
        self.function_mut().add_value(
            IrType::I32,
            ValueKind::Const(Constant::Int(u128::from(value as u32))),
        )
    }

    pub fn const_float(&mut self, ty: IrType, value: f64) -> Result<ValueId, EmitError> {
        if !ty.is_float() {
            return Err(type_mismatch("a floating-point type", &ty));
        }
        Ok(self
            .function_mut()
            .add_value(ty, ValueKind::Const(Constant::Float(value))))
    }

    /// Pointer to a private copy of `value` with a trailing NUL
    pub fn create_global_string_ptr(&mut self, value: &str) -> ValueId {
        let global = self.module.add_global_string(value);
        self.function_mut()
            .add_value(IrType::Ptr, ValueKind::Global(global))
    }

    // === Calls ===

    pub fn declare_function(
        &mut self,
        name: &str,
        signature: Signature,
        attributes: &[FnAttribute],
    ) -> Result<DeclId, EmitError> {
        let id = self.module.get_or_insert_function(name, signature)?;
        if let Some(decl) = self.module.declaration_mut(id) {
            decl.attributes.extend(attributes.iter().copied());
        }
        Ok(id)
    }

    pub fn create_call(&mut self, callee: DeclId, args: &[ValueId]) -> Result<ValueId, EmitError> {
        let decl = self
            .module
            .declaration(callee)
            .ok_or_else(|| EmitError::UnknownEntity {
                kind: "declaration",
                name: format!("#{}", callee.0),
            })?;
        let name = decl.name.clone();
        let signature = decl.signature.clone();

        if signature.params.len() != args.len() {
            return Err(EmitError::OperandCountMismatch {
                callee: name,
                expected: signature.params.len(),
                found: args.len(),
            });
        }
        for (index, (arg, expected)) in args.iter().zip(&signature.params).enumerate() {
            let found = self.value_type(*arg)?;
            if &found != expected {
                return Err(EmitError::OperandTypeMismatch {
                    callee: name,
                    index,
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }

        Ok(self.insert_value(
            InstrKind::Call {
                callee,
                args: args.to_vec(),
            },
            signature.ret,
        ))
    }

    // === Casts ===

    /// Reinterprets bits; both types must have the same primitive width
    pub fn create_bitcast(&mut self, value: ValueId, to: IrType) -> Result<ValueId, EmitError> {
        let from = self.value_type(value)?;
        if from == to {
            return Ok(value);
        }
        match (from.primitive_size_in_bits(), to.primitive_size_in_bits()) {
            (Some(a), Some(b)) if a == b => {}
            _ => {
                return Err(EmitError::InvalidCast {
                    op: "bitcast",
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        Ok(self.insert_value(
            InstrKind::Cast {
                op: CastOp::BitCast,
                value,
            },
            to,
        ))
    }

    fn int_resize(
        &mut self,
        op: CastOp,
        value: ValueId,
        to: IrType,
        valid: impl Fn(u32, u32) -> bool,
    ) -> Result<ValueId, EmitError> {
        let from = self.value_type(value)?;
        if from == to {
            return Ok(value);
        }
        match (&from, &to) {
            (IrType::Int(a), IrType::Int(b)) if valid(*a, *b) => {}
            _ => {
                return Err(EmitError::InvalidCast {
                    op: if op == CastOp::ZExt { "zext" } else { "trunc" },
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        Ok(self.insert_value(InstrKind::Cast { op, value }, to))
    }

    /// Zero-extends an integer to a wider integer type
    pub fn create_zext(&mut self, value: ValueId, to: IrType) -> Result<ValueId, EmitError> {
        self.int_resize(CastOp::ZExt, value, to, |from, to| from < to)
    }

    /// Truncates an integer to a narrower integer type
    pub fn create_trunc(&mut self, value: ValueId, to: IrType) -> Result<ValueId, EmitError> {
        self.int_resize(CastOp::Trunc, value, to, |from, to| from > to)
    }

    // === Vectors ===

    fn vector_lane(&self, vector: ValueId, index: u32) -> Result<IrType, EmitError> {
        match self.value_type(vector)? {
            IrType::Vector(elem, len) if index < len => Ok(*elem),
            ty @ IrType::Vector(..) => Err(EmitError::IndexOutOfRange {
                index,
                ty: ty.to_string(),
            }),
            ty => Err(type_mismatch("a vector", &ty)),
        }
    }

    pub fn create_extract_element(
        &mut self,
        vector: ValueId,
        index: u32,
    ) -> Result<ValueId, EmitError> {
        let elem = self.vector_lane(vector, index)?;
        Ok(self.insert_value(InstrKind::ExtractElement { vector, index }, elem))
    }

    pub fn create_insert_element(
        &mut self,
        vector: ValueId,
        element: ValueId,
        index: u32,
    ) -> Result<ValueId, EmitError> {
        let elem = self.vector_lane(vector, index)?;
        let found = self.value_type(element)?;
        if found != elem {
            return Err(type_mismatch(elem.to_string(), &found));
        }
        let vector_ty = self.value_type(vector)?;
        Ok(self.insert_value(
            InstrKind::InsertElement {
                vector,
                element,
                index,
            },
            vector_ty,
        ))
    }

    // === Memory ===

    pub fn create_alloca(&mut self, ty: IrType) -> ValueId {
        self.insert_value(InstrKind::Alloca { ty }, IrType::Ptr)
    }

    /// Address of field `field` of a `ty` struct stored at `base`
    pub fn create_struct_field_ptr(
        &mut self,
        base: ValueId,
        ty: &IrType,
        field: u32,
    ) -> Result<ValueId, EmitError> {
        let base_ty = self.value_type(base)?;
        if !base_ty.is_pointer() {
            return Err(type_mismatch("ptr", &base_ty));
        }
        match ty {
            IrType::Struct(fields) if (field as usize) < fields.len() => {}
            IrType::Struct(_) => {
                return Err(EmitError::IndexOutOfRange {
                    index: field,
                    ty: ty.to_string(),
                });
            }
            other => return Err(type_mismatch("a struct type", other)),
        }
        Ok(self.insert_value(
            InstrKind::StructFieldPtr {
                base,
                ty: ty.clone(),
                field,
            },
            IrType::Ptr,
        ))
    }

    pub fn create_store(&mut self, value: ValueId, ptr: ValueId) -> Result<(), EmitError> {
        let ptr_ty = self.value_type(ptr)?;
        if !ptr_ty.is_pointer() {
            return Err(type_mismatch("ptr", &ptr_ty));
        }
        let value_ty = self.value_type(value)?;
        if !value_ty.is_first_class() {
            return Err(type_mismatch("a storable value", &value_ty));
        }
        self.insert(InstrKind::Store { value, ptr }, None);
        Ok(())
    }

    // === Integer logic ===

    fn same_int_types(&self, lhs: ValueId, rhs: ValueId) -> Result<IrType, EmitError> {
        let lhs_ty = self.value_type(lhs)?;
        let rhs_ty = self.value_type(rhs)?;
        if !lhs_ty.is_int() {
            return Err(type_mismatch("an integer", &lhs_ty));
        }
        if lhs_ty != rhs_ty {
            return Err(type_mismatch(lhs_ty.to_string(), &rhs_ty));
        }
        Ok(lhs_ty)
    }

    pub fn create_icmp_eq(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId, EmitError> {
        self.same_int_types(lhs, rhs)?;
        Ok(self.insert_value(InstrKind::ICmpEq { lhs, rhs }, IrType::I1))
    }

    pub fn create_and(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId, EmitError> {
        let ty = self.same_int_types(lhs, rhs)?;
        Ok(self.insert_value(InstrKind::And { lhs, rhs }, ty))
    }

    // === Control flow ===

    pub fn create_br(&mut self, target: BlockId) -> Result<(), EmitError> {
        self.position_check(target)?;
        self.insert(InstrKind::Br { target }, None);
        Ok(())
    }

    pub fn create_cond_br(
        &mut self,
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    ) -> Result<(), EmitError> {
        let cond_ty = self.value_type(cond)?;
        if cond_ty != IrType::I1 {
            return Err(type_mismatch("i1", &cond_ty));
        }
        self.position_check(then_block)?;
        self.position_check(else_block)?;
        self.insert(
            InstrKind::CondBr {
                cond,
                then_block,
                else_block,
            },
            None,
        );
        Ok(())
    }

    pub fn create_ret(&mut self, value: Option<ValueId>) -> Result<(), EmitError> {
        let expected = self.function().signature.ret.clone();
        let found = match value {
            Some(value) => self.value_type(value)?,
            None => IrType::Void,
        };
        if found != expected {
            return Err(type_mismatch(expected.to_string(), &found));
        }
        self.insert(InstrKind::Ret { value }, None);
        Ok(())
    }

    fn position_check(&self, block: BlockId) -> Result<(), EmitError> {
        match self.function().block(block) {
            Some(_) => Ok(()),
            None => Err(EmitError::UnknownEntity {
                kind: "block",
                name: block.0.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel_module(params: Vec<IrType>) -> (Module, FunctionId) {
        let mut module = Module::new("test");
        let id = module.add_function("kernel", Signature::new(params, IrType::Void));
        (module, id)
    }

    #[test]
    fn test_bitcast_requires_equal_width() {
        let (mut module, id) = kernel_module(vec![IrType::Float]);
        let mut b = IrBuilder::new(&mut module, id).unwrap();
        let x = b.param(0).unwrap();
        assert!(b.create_bitcast(x, IrType::I32).is_ok());
        assert!(matches!(
            b.create_bitcast(x, IrType::I64),
            Err(EmitError::InvalidCast { .. })
        ));
    }

    #[test]
    fn test_zext_and_trunc_direction() {
        let (mut module, id) = kernel_module(vec![IrType::Int(16)]);
        let mut b = IrBuilder::new(&mut module, id).unwrap();
        let x = b.param(0).unwrap();
        let wide = b.create_zext(x, IrType::I32).unwrap();
        assert_eq!(b.value_type(wide).unwrap(), IrType::I32);
        assert!(b.create_zext(wide, IrType::Int(8)).is_err());
        assert!(b.create_trunc(wide, IrType::Int(8)).is_ok());
        assert!(b.create_trunc(x, IrType::I64).is_err());
    }

    #[test]
    fn test_call_checks_operands() {
        let (mut module, id) = kernel_module(vec![IrType::I32]);
        let mut b = IrBuilder::new(&mut module, id).unwrap();
        let x = b.param(0).unwrap();
        let f = b
            .declare_function(
                "f",
                Signature::new(vec![IrType::I32, IrType::I32], IrType::I32),
                &[FnAttribute::NoUnwind],
            )
            .unwrap();
        assert!(matches!(
            b.create_call(f, &[x]),
            Err(EmitError::OperandCountMismatch { expected: 2, found: 1, .. })
        ));
        let wide = b.create_zext(x, IrType::I64).unwrap();
        assert!(matches!(
            b.create_call(f, &[x, wide]),
            Err(EmitError::OperandTypeMismatch { index: 1, .. })
        ));
        let call = b.create_call(f, &[x, x]).unwrap();
        assert_eq!(b.value_type(call).unwrap(), IrType::I32);
    }

    #[test]
    fn test_vector_lane_bounds() {
        let (mut module, id) = kernel_module(vec![IrType::vector(IrType::I32, 2)]);
        let mut b = IrBuilder::new(&mut module, id).unwrap();
        let v = b.param(0).unwrap();
        let lane = b.create_extract_element(v, 1).unwrap();
        assert!(b.create_insert_element(v, lane, 0).is_ok());
        assert!(matches!(
            b.create_extract_element(v, 2),
            Err(EmitError::IndexOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn test_const_int_is_masked() {
        let (mut module, id) = kernel_module(vec![]);
        let mut b = IrBuilder::new(&mut module, id).unwrap();
        let c = b.const_int(IrType::Int(8), 0x1ff).unwrap();
        assert_eq!(
            b.function().value(c).map(|v| v.kind.clone()),
            Some(ValueKind::Const(Constant::Int(0xff)))
        );
        let minus_one = b.const_i32(-1);
        assert_eq!(
            b.function().value(minus_one).map(|v| v.kind.clone()),
            Some(ValueKind::Const(Constant::Int(0xffff_ffff)))
        );
    }

    #[test]
    fn test_ret_type_checked() {
        let (mut module, id) = kernel_module(vec![IrType::I32]);
        let mut b = IrBuilder::new(&mut module, id).unwrap();
        let x = b.param(0).unwrap();
        assert!(b.create_ret(Some(x)).is_err());
        assert!(b.create_ret(None).is_ok());
    }
}

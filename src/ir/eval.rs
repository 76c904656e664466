//! Reference evaluator for device IR
//!
//! Runs one function of a module for a single lane, over raw bit patterns
//! of at most 128 bits. Calls to declared functions go to a caller-supplied
//! handler, which can inspect memory and global strings through
//! [`Memory`]. Used to check emitted sequences without a GPU.

use super::module::{
    CastOp, Constant, FunctionDecl, FunctionId, GlobalId, InstrKind, Module, ValueId, ValueKind,
};
use super::types::IrType;
use crate::diagnostics::EmitError;

const MAX_STEPS: usize = 1_000_000;

/// A runtime value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalValue {
    /// Scalar of `width` bits (integers and floats alike)
    Bits { width: u32, bits: u128 },
    Vector { elem_width: u32, lanes: Vec<u128> },
    Pointer(Pointer),
    Void,
}

/// Address of a global string or of an allocation (or one of its fields)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Global(GlobalId),
    Alloca { slot: usize, field: Option<u32> },
}

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn fault(message: impl Into<String>) -> EmitError {
    EmitError::Evaluation(message.into())
}

impl EvalValue {
    pub fn bits(width: u32, bits: u128) -> Self {
        EvalValue::Bits {
            width,
            bits: bits & mask(width),
        }
    }

    pub fn from_f32(value: f32) -> Self {
        EvalValue::bits(32, u128::from(value.to_bits()))
    }

    pub fn from_f64(value: f64) -> Self {
        EvalValue::bits(64, u128::from(value.to_bits()))
    }

    pub fn as_bits(&self) -> Option<u128> {
        match self {
            EvalValue::Bits { bits, .. } => Some(*bits),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            EvalValue::Bits { width: 32, bits } => Some(f32::from_bits(*bits as u32)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EvalValue::Bits { width: 64, bits } => Some(f64::from_bits(*bits as u64)),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Pointer> {
        match self {
            EvalValue::Pointer(ptr) => Some(*ptr),
            _ => None,
        }
    }

    /// Flattens a scalar or vector into one bit pattern, lane 0 lowest
    fn flatten(&self) -> Result<(u32, u128), EmitError> {
        match self {
            EvalValue::Bits { width, bits } => Ok((*width, *bits)),
            EvalValue::Vector { elem_width, lanes } => {
                let width = elem_width * lanes.len() as u32;
                if width > 128 {
                    return Err(fault(format!("vector of {} bits is too wide", width)));
                }
                let bits = lanes
                    .iter()
                    .enumerate()
                    .fold(0u128, |acc, (i, lane)| {
                        acc | ((lane & mask(*elem_width)) << (i as u32 * elem_width))
                    });
                Ok((width, bits))
            }
            other => Err(fault(format!("cannot reinterpret {:?}", other))),
        }
    }

    /// Rebuilds a value of type `ty` from a flat bit pattern
    fn unflatten(ty: &IrType, bits: u128) -> Result<Self, EmitError> {
        if let Some(width) = ty.primitive_size_in_bits().filter(|&w| w > 128) {
            return Err(fault(format!("{} of {} bits is too wide", ty, width)));
        }
        match ty {
            IrType::Vector(elem, len) => {
                let elem_width = elem
                    .primitive_size_in_bits()
                    .ok_or_else(|| fault(format!("unsized vector element {}", elem)))?;
                let lanes = (0..*len)
                    .map(|i| (bits >> (i * elem_width)) & mask(elem_width))
                    .collect();
                Ok(EvalValue::Vector { elem_width, lanes })
            }
            _ => {
                let width = ty
                    .primitive_size_in_bits()
                    .ok_or_else(|| fault(format!("cannot hold {} in registers", ty)))?;
                Ok(EvalValue::bits(width, bits))
            }
        }
    }
}

/// One `alloca`'d object: a slot per struct field, or one slot
#[derive(Debug, Clone)]
pub struct Allocation {
    pub ty: IrType,
    pub fields: Vec<Option<EvalValue>>,
}

/// Memory visible to external call handlers
pub struct Memory<'a> {
    module: &'a Module,
    allocations: Vec<Allocation>,
}

impl<'a> Memory<'a> {
    /// Contents of a global string
    pub fn string(&self, ptr: Pointer) -> Option<&'a str> {
        match ptr {
            Pointer::Global(id) => self.module.global(id).map(|g| g.value.as_str()),
            Pointer::Alloca { .. } => None,
        }
    }

    pub fn allocation(&self, ptr: Pointer) -> Option<&Allocation> {
        match ptr {
            Pointer::Alloca { slot, .. } => self.allocations.get(slot),
            Pointer::Global(_) => None,
        }
    }

    /// Value last stored at `ptr`
    pub fn load(&self, ptr: Pointer) -> Option<&EvalValue> {
        match ptr {
            Pointer::Alloca { slot, field } => self
                .allocations
                .get(slot)?
                .fields
                .get(field.unwrap_or(0) as usize)?
                .as_ref(),
            Pointer::Global(_) => None,
        }
    }

    fn store(&mut self, ptr: Pointer, value: EvalValue) -> Result<(), EmitError> {
        let Pointer::Alloca { slot, field } = ptr else {
            return Err(fault("store to a constant global"));
        };
        let target = self
            .allocations
            .get_mut(slot)
            .and_then(|a| a.fields.get_mut(field.unwrap_or(0) as usize))
            .ok_or_else(|| fault(format!("store out of bounds of slot {}", slot)))?;
        *target = Some(value);
        Ok(())
    }
}

/// Handles calls to declared (external) functions
pub trait ExternalCalls {
    fn call(
        &mut self,
        callee: &FunctionDecl,
        args: &[EvalValue],
        memory: &Memory<'_>,
    ) -> Result<EvalValue, EmitError>;
}

impl<F> ExternalCalls for F
where
    F: FnMut(&FunctionDecl, &[EvalValue], &Memory<'_>) -> Result<EvalValue, EmitError>,
{
    fn call(
        &mut self,
        callee: &FunctionDecl,
        args: &[EvalValue],
        memory: &Memory<'_>,
    ) -> Result<EvalValue, EmitError> {
        self(callee, args, memory)
    }
}

/// Single-lane interpreter over one module
pub struct Evaluator<'a, H> {
    module: &'a Module,
    handler: H,
    memory: Memory<'a>,
}

impl<'a, H: ExternalCalls> Evaluator<'a, H> {
    pub fn new(module: &'a Module, handler: H) -> Self {
        Self {
            module,
            handler,
            memory: Memory {
                module,
                allocations: Vec::new(),
            },
        }
    }

    pub fn memory(&self) -> &Memory<'a> {
        &self.memory
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Runs a function to its `ret` and returns the returned value
    pub fn run(&mut self, function: FunctionId, args: &[EvalValue]) -> Result<EvalValue, EmitError> {
        let module = self.module;
        let func = module
            .function(function)
            .ok_or_else(|| fault(format!("no function #{}", function.0)))?;
        if args.len() != func.params.len() {
            return Err(EmitError::OperandCountMismatch {
                callee: func.name.clone(),
                expected: func.params.len(),
                found: args.len(),
            });
        }

        let mut values: Vec<Option<EvalValue>> = vec![None; func.value_count()];
        for (param, arg) in func.params.iter().zip(args) {
            values[param.0 as usize] = Some(arg.clone());
        }

        let mut block = func.entry();
        let mut steps = 0usize;
        loop {
            let current = func
                .block(block)
                .ok_or_else(|| fault(format!("branch to missing block {}", block.0)))?;
            let mut next = None;

            for instr in &current.instructions {
                steps += 1;
                if steps > MAX_STEPS {
                    return Err(fault(format!("`{}` did not terminate", func.name)));
                }

                let get = |values: &Vec<Option<EvalValue>>, id: ValueId| {
                    Self::read(module, function, values, id)
                };

                let result = match &instr.kind {
                    InstrKind::Call { callee, args } => {
                        let decl = module
                            .declaration(*callee)
                            .ok_or_else(|| fault(format!("unknown callee #{}", callee.0)))?;
                        let args = args
                            .iter()
                            .map(|a| get(&values, *a))
                            .collect::<Result<Vec<_>, _>>()?;
                        tracing::trace!("eval call @{}({:?})", decl.name, args);
                        Some(self.handler.call(decl, &args, &self.memory)?)
                    }
                    InstrKind::Cast { op, value } => {
                        let input = get(&values, *value)?;
                        let to = Self::result_type(module, function, instr.result)?;
                        Some(Self::cast(*op, &input, &to)?)
                    }
                    InstrKind::ExtractElement { vector, index } => match get(&values, *vector)? {
                        EvalValue::Vector { elem_width, lanes } => {
                            let lane = lanes
                                .get(*index as usize)
                                .copied()
                                .ok_or_else(|| fault("extractelement out of range"))?;
                            Some(EvalValue::bits(elem_width, lane))
                        }
                        other => return Err(fault(format!("extractelement from {:?}", other))),
                    },
                    InstrKind::InsertElement {
                        vector,
                        element,
                        index,
                    } => match (get(&values, *vector)?, get(&values, *element)?) {
                        (EvalValue::Vector { elem_width, mut lanes }, EvalValue::Bits { bits, .. }) => {
                            let slot = lanes
                                .get_mut(*index as usize)
                                .ok_or_else(|| fault("insertelement out of range"))?;
                            *slot = bits & mask(elem_width);
                            Some(EvalValue::Vector { elem_width, lanes })
                        }
                        other => return Err(fault(format!("insertelement into {:?}", other))),
                    },
                    InstrKind::Alloca { ty } => {
                        let slots = match ty {
                            IrType::Struct(fields) => fields.len(),
                            _ => 1,
                        };
                        self.memory.allocations.push(Allocation {
                            ty: ty.clone(),
                            fields: vec![None; slots],
                        });
                        Some(EvalValue::Pointer(Pointer::Alloca {
                            slot: self.memory.allocations.len() - 1,
                            field: None,
                        }))
                    }
                    InstrKind::StructFieldPtr { base, field, .. } => {
                        match get(&values, *base)?.as_pointer() {
                            Some(Pointer::Alloca { slot, field: None }) => {
                                Some(EvalValue::Pointer(Pointer::Alloca {
                                    slot,
                                    field: Some(*field),
                                }))
                            }
                            other => return Err(fault(format!("field address of {:?}", other))),
                        }
                    }
                    InstrKind::Store { value, ptr } => {
                        let value = get(&values, *value)?;
                        let ptr = get(&values, *ptr)?
                            .as_pointer()
                            .ok_or_else(|| fault("store through a non-pointer"))?;
                        self.memory.store(ptr, value)?;
                        None
                    }
                    InstrKind::ICmpEq { lhs, rhs } => {
                        let equal = get(&values, *lhs)? == get(&values, *rhs)?;
                        Some(EvalValue::bits(1, u128::from(equal)))
                    }
                    InstrKind::And { lhs, rhs } => match (get(&values, *lhs)?, get(&values, *rhs)?) {
                        (EvalValue::Bits { width, bits: a }, EvalValue::Bits { bits: b, .. }) => {
                            Some(EvalValue::bits(width, a & b))
                        }
                        other => return Err(fault(format!("and of {:?}", other))),
                    },
                    InstrKind::Br { target } => {
                        next = Some(*target);
                        None
                    }
                    InstrKind::CondBr {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        let taken = get(&values, *cond)?.as_bits() == Some(1);
                        next = Some(if taken { *then_block } else { *else_block });
                        None
                    }
                    InstrKind::Ret { value } => {
                        return match value {
                            Some(v) => get(&values, *v),
                            None => Ok(EvalValue::Void),
                        };
                    }
                };

                if let (Some(id), Some(value)) = (instr.result, result) {
                    values[id.0 as usize] = Some(value);
                }
                if next.is_some() {
                    break;
                }
            }

            block = next.ok_or_else(|| {
                fault(format!("block `{}` has no terminator", current.label))
            })?;
        }
    }

    fn result_type(
        module: &Module,
        function: FunctionId,
        result: Option<ValueId>,
    ) -> Result<IrType, EmitError> {
        let func = module
            .function(function)
            .ok_or_else(|| fault("function vanished"))?;
        let id = result.ok_or_else(|| fault("cast without result"))?;
        func.value_type(id).cloned()
    }

    fn read(
        module: &Module,
        function: FunctionId,
        values: &[Option<EvalValue>],
        id: ValueId,
    ) -> Result<EvalValue, EmitError> {
        if let Some(Some(value)) = values.get(id.0 as usize) {
            return Ok(value.clone());
        }
        let func = module
            .function(function)
            .ok_or_else(|| fault("function vanished"))?;
        let data = func
            .value(id)
            .ok_or_else(|| fault(format!("unknown value {}", id)))?;
        match (&data.kind, &data.ty) {
            (ValueKind::Const(Constant::Int(bits)), IrType::Int(width)) => {
                Ok(EvalValue::bits(*width, *bits))
            }
            (ValueKind::Const(Constant::Float(v)), IrType::Float) => {
                Ok(EvalValue::from_f32(*v as f32))
            }
            (ValueKind::Const(Constant::Float(v)), IrType::Double) => Ok(EvalValue::from_f64(*v)),
            (ValueKind::Global(global), _) => Ok(EvalValue::Pointer(Pointer::Global(*global))),
            (kind, ty) => Err(fault(format!("{} ({:?}: {}) read before definition", id, kind, ty))),
        }
    }

    fn cast(op: CastOp, input: &EvalValue, to: &IrType) -> Result<EvalValue, EmitError> {
        match op {
            CastOp::BitCast => {
                let (_, bits) = input.flatten()?;
                EvalValue::unflatten(to, bits)
            }
            CastOp::ZExt | CastOp::Trunc => {
                let bits = input
                    .as_bits()
                    .ok_or_else(|| fault(format!("{} of {:?}", op, input)))?;
                EvalValue::unflatten(to, bits)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBuilder, Signature};

    fn no_calls(
        decl: &FunctionDecl,
        _: &[EvalValue],
        _: &Memory<'_>,
    ) -> Result<EvalValue, EmitError> {
        Err(fault(format!("unexpected call to {}", decl.name)))
    }

    #[test]
    fn test_vector_bitcast_is_little_endian() {
        let mut module = Module::new("m");
        let id = module.add_function(
            "f",
            Signature::new(vec![IrType::I64], IrType::I32),
        );
        {
            let mut b = IrBuilder::new(&mut module, id).unwrap();
            let x = b.param(0).unwrap();
            let v = b.create_bitcast(x, IrType::vector(IrType::I32, 2)).unwrap();
            let hi = b.create_extract_element(v, 1).unwrap();
            b.create_ret(Some(hi)).unwrap();
        }
        let mut eval = Evaluator::new(&module, no_calls);
        let out = eval
            .run(id, &[EvalValue::bits(64, 0x1122_3344_5566_7788)])
            .unwrap();
        assert_eq!(out, EvalValue::bits(32, 0x1122_3344));
    }

    #[test]
    fn test_trunc_masks_high_bits() {
        let mut module = Module::new("m");
        let id = module.add_function("f", Signature::new(vec![IrType::I32], IrType::Int(8)));
        {
            let mut b = IrBuilder::new(&mut module, id).unwrap();
            let x = b.param(0).unwrap();
            let t = b.create_trunc(x, IrType::Int(8)).unwrap();
            b.create_ret(Some(t)).unwrap();
        }
        let mut eval = Evaluator::new(&module, no_calls);
        assert_eq!(
            eval.run(id, &[EvalValue::bits(32, 0x1234)]).unwrap(),
            EvalValue::bits(8, 0x34)
        );
    }

    #[test]
    fn test_missing_terminator_is_reported() {
        let mut module = Module::new("m");
        let id = module.add_function("f", Signature::new(vec![], IrType::Void));
        let mut eval = Evaluator::new(&module, no_calls);
        assert!(matches!(eval.run(id, &[]), Err(EmitError::Evaluation(_))));
    }
}

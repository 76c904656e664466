//! Thread and block identity
//!
//! Identity registers are read through side-effect-free intrinsic calls,
//! so their declarations carry `readnone nounwind`.

use super::call::emit_call_to_target_intrinsic;
use crate::diagnostics::EmitError;
use crate::ir::{FnAttribute, IrBuilder, IrType, ValueId};
use crate::target::{SimtIntrinsic, TargetMachineFeatures};

const IDENTITY_ATTRIBUTES: [FnAttribute; 2] = [FnAttribute::ReadNone, FnAttribute::NoUnwind];

/// Grid axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

fn read_identity(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
    intrinsic: SimtIntrinsic,
) -> Result<ValueId, EmitError> {
    emit_call_to_target_intrinsic(b, features, intrinsic, &[], IrType::I32, &IDENTITY_ATTRIBUTES)
}

/// Index of the calling thread within its block
pub fn emit_thread_id(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
    axis: Axis,
) -> Result<ValueId, EmitError> {
    let intrinsic = match axis {
        Axis::X => SimtIntrinsic::ThreadIdX,
        Axis::Y => SimtIntrinsic::ThreadIdY,
        Axis::Z => SimtIntrinsic::ThreadIdZ,
    };
    read_identity(b, features, intrinsic)
}

/// Index of the calling block within the grid
pub fn emit_block_id(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
    axis: Axis,
) -> Result<ValueId, EmitError> {
    let intrinsic = match axis {
        Axis::X => SimtIntrinsic::BlockIdX,
        Axis::Y => SimtIntrinsic::BlockIdY,
        Axis::Z => SimtIntrinsic::BlockIdZ,
    };
    read_identity(b, features, intrinsic)
}

pub fn emit_lane_id(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
) -> Result<ValueId, EmitError> {
    read_identity(b, features, SimtIntrinsic::LaneId)
}

/// Block-wide barrier
pub fn emit_barrier(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
) -> Result<(), EmitError> {
    emit_call_to_target_intrinsic(
        b,
        features,
        SimtIntrinsic::Barrier,
        &[],
        IrType::Void,
        &[FnAttribute::Convergent, FnAttribute::NoUnwind],
    )?;
    Ok(())
}

/// `i1` that is true only for thread 0 (x) of block 0 (x)
pub fn is_block0_thread0(
    b: &mut IrBuilder<'_>,
    features: &dyn TargetMachineFeatures,
) -> Result<ValueId, EmitError> {
    let zero = b.const_i32(0);
    let thread_id = emit_thread_id(b, features, Axis::X)?;
    let is_thread0 = b.create_icmp_eq(zero, thread_id)?;
    let block_id = emit_block_id(b, features, Axis::X)?;
    let is_block0 = b.create_icmp_eq(zero, block_id)?;
    b.create_and(is_thread0, is_block0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Module, Signature};
    use crate::target::{AmdGpuMachineFeatures, NvptxMachineFeatures};

    #[test]
    fn test_block0_thread0_declares_two_intrinsics() {
        let mut module = Module::new("m");
        let f = module.add_function("k", Signature::new(vec![], IrType::Void));
        let mut b = IrBuilder::new(&mut module, f).unwrap();
        let cond = is_block0_thread0(&mut b, &NvptxMachineFeatures::default()).unwrap();
        assert_eq!(b.value_type(cond).unwrap(), IrType::I1);

        let names: Vec<&str> = module.declarations().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["llvm.nvvm.read.ptx.sreg.tid.x", "llvm.nvvm.read.ptx.sreg.ctaid.x"]
        );
    }

    #[test]
    fn test_lane_id_unavailable_on_amdgpu() {
        let mut module = Module::new("m");
        let f = module.add_function("k", Signature::new(vec![], IrType::Void));
        let mut b = IrBuilder::new(&mut module, f).unwrap();
        let err = emit_lane_id(&mut b, &AmdGpuMachineFeatures::default()).unwrap_err();
        assert!(matches!(err, EmitError::UnresolvedIntrinsic { .. }));
        assert_eq!(b.module().declaration_count(), 0);
    }

    #[test]
    fn test_barrier_returns_nothing() {
        let mut module = Module::new("m");
        let f = module.add_function("k", Signature::new(vec![], IrType::Void));
        let mut b = IrBuilder::new(&mut module, f).unwrap();
        emit_barrier(&mut b, &AmdGpuMachineFeatures::default()).unwrap();
        let decl = module.find_declaration("llvm.amdgcn.s.barrier").unwrap();
        assert_eq!(decl.signature.ret, IrType::Void);
    }
}

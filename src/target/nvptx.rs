//! NVIDIA GPUs (nvptx64)

use super::{CallForm, SimtIntrinsic, SimtSymbol, TargetMachineFeatures};

pub const NVPTX_TRIPLE: &str = "nvptx64-nvidia-cuda";

/// Every lane of the warp takes part
const FULL_WARP_MASK: u32 = 0xffff_ffff;

/// Highest lane index of a 32-wide warp; reads past it return the caller's
/// own value
const WARP_CLAMP: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvptxMachineFeatures {
    pub compute_capability: (u32, u32),
}

impl NvptxMachineFeatures {
    pub fn new(compute_capability: (u32, u32)) -> Self {
        Self { compute_capability }
    }
}

impl Default for NvptxMachineFeatures {
    fn default() -> Self {
        Self::new((7, 0))
    }
}

impl TargetMachineFeatures for NvptxMachineFeatures {
    fn target_name(&self) -> &'static str {
        "nvptx"
    }

    fn lookup(&self, intrinsic: SimtIntrinsic) -> Option<SimtSymbol> {
        let name = match intrinsic {
            SimtIntrinsic::ThreadIdX => "llvm.nvvm.read.ptx.sreg.tid.x",
            SimtIntrinsic::ThreadIdY => "llvm.nvvm.read.ptx.sreg.tid.y",
            SimtIntrinsic::ThreadIdZ => "llvm.nvvm.read.ptx.sreg.tid.z",
            SimtIntrinsic::BlockIdX => "llvm.nvvm.read.ptx.sreg.ctaid.x",
            SimtIntrinsic::BlockIdY => "llvm.nvvm.read.ptx.sreg.ctaid.y",
            SimtIntrinsic::BlockIdZ => "llvm.nvvm.read.ptx.sreg.ctaid.z",
            SimtIntrinsic::LaneId => "llvm.nvvm.read.ptx.sreg.laneid",
            SimtIntrinsic::Barrier => "llvm.nvvm.barrier0",
            SimtIntrinsic::ShuffleDownI32 => {
                return Some(SimtSymbol {
                    name: "llvm.nvvm.shfl.sync.down.i32",
                    form: CallForm::Synchronized {
                        member_mask: FULL_WARP_MASK,
                        clamp: WARP_CLAMP,
                    },
                });
            }
        };
        Some(SimtSymbol::plain(name))
    }

    fn target_triple(&self) -> &'static str {
        NVPTX_TRIPLE
    }

    fn cpu_name(&self) -> String {
        let (major, minor) = self.compute_capability;
        format!("sm_{}{}", major, minor)
    }
}

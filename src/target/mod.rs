//! Target machine features
//!
//! A [`TargetMachineFeatures`] value describes one GPU family: its target
//! triple, processor name, allocation alignment and, most importantly,
//! how each portable SIMT intrinsic maps onto a vendor symbol. Exactly one
//! descriptor is active per compilation; the emitter only ever sees it
//! through `&dyn TargetMachineFeatures`.

pub mod amdgpu;
pub mod nvptx;

use std::fmt;
use std::str::FromStr;

use crate::diagnostics::EmitError;
use crate::ir::Module;

pub use amdgpu::AmdGpuMachineFeatures;
pub use nvptx::NvptxMachineFeatures;

/// Largest alignment ever required for a buffer allocation
pub const MAX_BUFFER_ALIGNMENT: u64 = 256;

/// Portable SIMT intrinsics the emitter asks for by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimtIntrinsic {
    ThreadIdX,
    ThreadIdY,
    ThreadIdZ,
    BlockIdX,
    BlockIdY,
    BlockIdZ,
    /// Read a 32-bit value from the lane `offset` positions above
    ShuffleDownI32,
    LaneId,
    Barrier,
}

impl SimtIntrinsic {
    pub const ALL: [SimtIntrinsic; 9] = [
        SimtIntrinsic::ThreadIdX,
        SimtIntrinsic::ThreadIdY,
        SimtIntrinsic::ThreadIdZ,
        SimtIntrinsic::BlockIdX,
        SimtIntrinsic::BlockIdY,
        SimtIntrinsic::BlockIdZ,
        SimtIntrinsic::ShuffleDownI32,
        SimtIntrinsic::LaneId,
        SimtIntrinsic::Barrier,
    ];

    pub fn portable_name(self) -> &'static str {
        match self {
            SimtIntrinsic::ThreadIdX => "thread_id_x",
            SimtIntrinsic::ThreadIdY => "thread_id_y",
            SimtIntrinsic::ThreadIdZ => "thread_id_z",
            SimtIntrinsic::BlockIdX => "block_id_x",
            SimtIntrinsic::BlockIdY => "block_id_y",
            SimtIntrinsic::BlockIdZ => "block_id_z",
            SimtIntrinsic::ShuffleDownI32 => "shfl_down_i32",
            SimtIntrinsic::LaneId => "lane_id",
            SimtIntrinsic::Barrier => "barrier",
        }
    }

    /// Whether the intrinsic reads a per-invocation identity register
    pub fn is_identity(self) -> bool {
        matches!(
            self,
            SimtIntrinsic::ThreadIdX
                | SimtIntrinsic::ThreadIdY
                | SimtIntrinsic::ThreadIdZ
                | SimtIntrinsic::BlockIdX
                | SimtIntrinsic::BlockIdY
                | SimtIntrinsic::BlockIdZ
                | SimtIntrinsic::LaneId
        )
    }
}

impl FromStr for SimtIntrinsic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SimtIntrinsic::ALL
            .into_iter()
            .find(|intrinsic| intrinsic.portable_name() == s)
            .ok_or(())
    }
}

impl fmt::Display for SimtIntrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.portable_name())
    }
}

/// Operand convention of a vendor symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallForm {
    /// Operands are passed through unchanged
    Plain,
    /// Warp-synchronous form: `(member_mask, operands..., clamp)`
    Synchronized { member_mask: u32, clamp: u32 },
}

/// Vendor symbol a portable intrinsic resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimtSymbol {
    pub name: &'static str,
    pub form: CallForm,
}

impl SimtSymbol {
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            form: CallForm::Plain,
        }
    }
}

impl fmt::Display for SimtSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.form {
            CallForm::Plain => write!(f, "{}", self.name),
            CallForm::Synchronized { member_mask, clamp } => {
                write!(f, "{} (mask {:#x}, clamp {})", self.name, member_mask, clamp)
            }
        }
    }
}

/// Capabilities of the GPU family being compiled for
///
/// Implementations are immutable and every query is a pure function of the
/// descriptor and its arguments.
pub trait TargetMachineFeatures: fmt::Debug {
    /// Short family name used in diagnostics
    fn target_name(&self) -> &'static str;

    /// Vendor symbol for `intrinsic`, if the family has one
    fn lookup(&self, intrinsic: SimtIntrinsic) -> Option<SimtSymbol>;

    fn target_triple(&self) -> &'static str;

    /// Processor name handed to the code generator
    fn cpu_name(&self) -> String;

    /// Subtarget feature string
    fn features(&self) -> &'static str {
        ""
    }

    /// Minimum alignment in bytes for a buffer of `size_bytes`
    fn minimum_alignment_for_allocation(&self, size_bytes: u64) -> u64 {
        if size_bytes == 0 {
            return 1;
        }
        size_bytes
            .checked_next_power_of_two()
            .map_or(MAX_BUFFER_ALIGNMENT, |align| align.min(MAX_BUFFER_ALIGNMENT))
    }

    /// Device library bitcode files linked into every module that may need
    /// them
    fn device_library_bitcodes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether linking device libraries could resolve anything in `module`
    fn could_need_device_library(&self, module: &Module) -> bool {
        !self.device_library_bitcodes().is_empty()
            && module.declarations().any(|decl| !decl.is_intrinsic())
    }

    /// Resolves a portable intrinsic, failing if the family lacks it
    fn resolve(&self, intrinsic: SimtIntrinsic) -> Result<SimtSymbol, EmitError> {
        self.lookup(intrinsic)
            .ok_or_else(|| EmitError::UnresolvedIntrinsic {
                name: intrinsic.portable_name().to_string(),
                target: self.target_name().to_string(),
            })
    }

    /// Resolves a portable intrinsic given by name
    fn simt_intrinsic(&self, name: &str) -> Result<SimtSymbol, EmitError> {
        let unresolved = || EmitError::UnresolvedIntrinsic {
            name: name.to_string(),
            target: self.target_name().to_string(),
        };
        let intrinsic = name.parse::<SimtIntrinsic>().map_err(|()| unresolved())?;
        self.lookup(intrinsic).ok_or_else(unresolved)
    }
}

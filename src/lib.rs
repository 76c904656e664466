//! GPU backend lowering decisions and portable device emission
//!
//! Two questions come up for every instruction of a computation lowered to
//! GPU code:
//! - can it be handed to a vendor library (gemm, DNN convolution, batch
//!   normalization) instead of getting a generated kernel ([`libcall`]), and
//! - if a kernel is generated, how to emit warp shuffles, device `printf`
//!   and thread identity tests without naming vendor intrinsics ([`emit`]).
//!
//! # Architecture
//!
//! ```text
//! hlo graph ──► libcall (library call or kernel?)
//!                   │ kernel
//!                   ▼
//!   emit ──► ir::IrBuilder ──► ir::Module
//!     │
//!     └── target::TargetMachineFeatures (amdgpu | nvptx)
//! ```
//!
//! # Example
//!
//! ```
//! use gpu_emission::emit::{emit_full_warp_shuffle_down, emit_printf, is_block0_thread0};
//! use gpu_emission::ir::{IrBuilder, IrType, Module, Signature};
//! use gpu_emission::target::NvptxMachineFeatures;
//!
//! let features = NvptxMachineFeatures::default();
//! let mut module = Module::new("reduce");
//! let kernel = module.add_function("kernel", Signature::new(vec![IrType::Double], IrType::Void));
//! let mut b = IrBuilder::new(&mut module, kernel)?;
//! let x = b.param(0)?;
//! let offset = b.const_i32(16);
//! let partner = emit_full_warp_shuffle_down(x, offset, &mut b, &features)?;
//! let first = is_block0_thread0(&mut b, &features)?;
//! emit_printf("partner = %f\n", &[partner], &mut b)?;
//! # let _ = first;
//! # Ok::<(), gpu_emission::EmitError>(())
//! ```

pub mod config;
pub mod diagnostics;
pub mod emit;
pub mod hlo;
pub mod ir;
pub mod libcall;
pub mod target;

pub use config::BackendConfig;
pub use diagnostics::{EmitError, LoweringError};
pub use libcall::{
    implemented_as_library_call, is_library_call_eligible, is_matmul_library_eligible,
    is_recognized_convolution_call, is_recognized_normalization_call, is_vector_reduction,
};
pub use target::TargetMachineFeatures;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

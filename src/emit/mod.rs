//! Portable device intrinsic emission
//!
//! Everything here appends to an [`IrBuilder`](crate::ir::IrBuilder) and
//! resolves vendor symbols through a
//! [`TargetMachineFeatures`](crate::target::TargetMachineFeatures), so
//! kernel emitters never spell out intrinsic names themselves.

pub mod call;
pub mod identity;
pub mod printf;
pub mod shuffle;
pub mod words;

pub use call::{emit_call, emit_call_to_target_intrinsic, emit_device_function_call};
pub use identity::{Axis, emit_barrier, emit_block_id, emit_lane_id, emit_thread_id, is_block0_thread0};
pub use printf::{VPRINTF, emit_printf};
pub use shuffle::emit_full_warp_shuffle_down;
pub use words::{join_words, split_into_words, word_count};

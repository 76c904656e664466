//! AMD GPUs (amdgcn)

use super::{SimtIntrinsic, SimtSymbol, TargetMachineFeatures};

pub const AMDGPU_TRIPLE: &str = "amdgcn--amdhsa-amdgiz";

/// Version-neutral ROCm device library bitcodes
const ROCDL_BITCODES: [&str; 8] = [
    "hc.amdgcn.bc",
    "opencl.amdgcn.bc",
    "ocml.amdgcn.bc",
    "ockl.amdgcn.bc",
    "oclc_finite_only_off.amdgcn.bc",
    "oclc_daz_opt_off.amdgcn.bc",
    "oclc_correctly_rounded_sqrt_on.amdgcn.bc",
    "oclc_unsafe_math_off.amdgcn.bc",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmdGpuMachineFeatures {
    /// ISA version, e.g. 906 for gfx906
    pub amdgpu_version: u32,
}

impl AmdGpuMachineFeatures {
    pub fn new(amdgpu_version: u32) -> Self {
        Self { amdgpu_version }
    }
}

impl Default for AmdGpuMachineFeatures {
    fn default() -> Self {
        Self::new(900)
    }
}

impl TargetMachineFeatures for AmdGpuMachineFeatures {
    fn target_name(&self) -> &'static str {
        "amdgpu"
    }

    fn lookup(&self, intrinsic: SimtIntrinsic) -> Option<SimtSymbol> {
        let name = match intrinsic {
            SimtIntrinsic::ThreadIdX => "llvm.amdgcn.workitem.id.x",
            SimtIntrinsic::ThreadIdY => "llvm.amdgcn.workitem.id.y",
            SimtIntrinsic::ThreadIdZ => "llvm.amdgcn.workitem.id.z",
            SimtIntrinsic::BlockIdX => "llvm.amdgcn.workgroup.id.x",
            SimtIntrinsic::BlockIdY => "llvm.amdgcn.workgroup.id.y",
            SimtIntrinsic::BlockIdZ => "llvm.amdgcn.workgroup.id.z",
            // Device library routine, resolved when ockl is linked in
            SimtIntrinsic::ShuffleDownI32 => "__ockl_readuplane_i32",
            SimtIntrinsic::Barrier => "llvm.amdgcn.s.barrier",
            SimtIntrinsic::LaneId => return None,
        };
        Some(SimtSymbol::plain(name))
    }

    fn target_triple(&self) -> &'static str {
        AMDGPU_TRIPLE
    }

    fn cpu_name(&self) -> String {
        format!("gfx{}", self.amdgpu_version)
    }

    fn features(&self) -> &'static str {
        "-code-object-v3"
    }

    fn device_library_bitcodes(&self) -> Vec<String> {
        ROCDL_BITCODES
            .iter()
            .map(|name| name.to_string())
            .chain(std::iter::once(format!(
                "oclc_isa_version_{}.amdgcn.bc",
                self.amdgpu_version
            )))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrType, Module, Signature};

    #[test]
    fn test_cpu_name() {
        assert_eq!(AmdGpuMachineFeatures::new(906).cpu_name(), "gfx906");
    }

    #[test]
    fn test_device_libraries_end_with_isa_version() {
        let libs = AmdGpuMachineFeatures::new(908).device_library_bitcodes();
        assert_eq!(libs.len(), 9);
        assert_eq!(libs[0], "hc.amdgcn.bc");
        assert_eq!(libs[8], "oclc_isa_version_908.amdgcn.bc");
    }

    #[test]
    fn test_only_non_intrinsic_declarations_need_device_libs() {
        let features = AmdGpuMachineFeatures::default();
        let mut module = Module::new("m");
        module
            .get_or_insert_function("llvm.amdgcn.workitem.id.x", Signature::new(vec![], IrType::I32))
            .unwrap();
        assert!(!features.could_need_device_library(&module));

        module
            .get_or_insert_function(
                "__ockl_readuplane_i32",
                Signature::new(vec![IrType::I32, IrType::I32], IrType::I32),
            )
            .unwrap();
        assert!(features.could_need_device_library(&module));
    }

    #[test]
    fn test_no_lane_id() {
        assert!(AmdGpuMachineFeatures::default()
            .resolve(SimtIntrinsic::LaneId)
            .is_err());
    }
}

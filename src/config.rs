//! Backend configuration
//!
//! Read from a TOML file; every field has a default so an empty file is a
//! valid configuration.
//!
//! ```toml
//! opt_level = 3
//! device_lib_dir = "/opt/rocm/amdgcn/bitcode"
//!
//! [target]
//! vendor = "nvptx"
//! compute_capability = [8, 0]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostics::LoweringError;
use crate::target::{AmdGpuMachineFeatures, NvptxMachineFeatures, TargetMachineFeatures};

/// The GPU backend does not support unoptimised code generation
pub const MIN_OPT_LEVEL: u32 = 2;
pub const MAX_OPT_LEVEL: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    #[default]
    Amdgpu,
    Nvptx,
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuVendor::Amdgpu => write!(f, "amdgpu"),
            GpuVendor::Nvptx => write!(f, "nvptx"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    pub vendor: GpuVendor,
    /// gfx ISA version, used for amdgpu
    pub amdgpu_version: u32,
    /// (major, minor), used for nvptx
    pub compute_capability: (u32, u32),
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            vendor: GpuVendor::default(),
            amdgpu_version: 900,
            compute_capability: (7, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub opt_level: u32,
    /// Directory holding device library bitcode files
    pub device_lib_dir: Option<PathBuf>,
    pub target: TargetConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            opt_level: MAX_OPT_LEVEL,
            device_lib_dir: None,
            target: TargetConfig::default(),
        }
    }
}

impl BackendConfig {
    /// Parses and validates a configuration
    pub fn parse(source: &str) -> Result<Self, LoweringError> {
        let config: BackendConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, LoweringError> {
        let source = std::fs::read_to_string(path).map_err(|source| LoweringError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded backend config from {}", path.display());
        Self::parse(&source)
    }

    pub fn validate(&self) -> Result<(), LoweringError> {
        if !(MIN_OPT_LEVEL..=MAX_OPT_LEVEL).contains(&self.opt_level) {
            return Err(LoweringError::InvalidConfig(format!(
                "opt_level must be between {} and {}, got {}",
                MIN_OPT_LEVEL, MAX_OPT_LEVEL, self.opt_level
            )));
        }
        match self.target.vendor {
            GpuVendor::Amdgpu if self.target.amdgpu_version == 0 => Err(
                LoweringError::InvalidConfig("amdgpu_version must be non-zero".to_string()),
            ),
            GpuVendor::Nvptx if self.target.compute_capability.0 == 0 => Err(
                LoweringError::InvalidConfig("compute_capability major must be non-zero".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// The descriptor for the configured GPU family
    pub fn target_features(&self) -> Box<dyn TargetMachineFeatures> {
        match self.target.vendor {
            GpuVendor::Amdgpu => Box::new(AmdGpuMachineFeatures::new(self.target.amdgpu_version)),
            GpuVendor::Nvptx => Box::new(NvptxMachineFeatures::new(self.target.compute_capability)),
        }
    }

    /// Full paths of the device library bitcodes, if a directory is set
    pub fn device_library_paths(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.device_lib_dir else {
            return Vec::new();
        };
        self.target_features()
            .device_library_bitcodes()
            .into_iter()
            .map(|name| dir.join(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BackendConfig::parse("").unwrap();
        assert_eq!(config, BackendConfig::default());
        assert_eq!(config.target_features().cpu_name(), "gfx900");
    }

    #[test]
    fn test_nvptx_config() {
        let config = BackendConfig::parse(
            r#"
            opt_level = 2

            [target]
            vendor = "nvptx"
            compute_capability = [8, 0]
            "#,
        )
        .unwrap();
        let features = config.target_features();
        assert_eq!(features.target_name(), "nvptx");
        assert_eq!(features.cpu_name(), "sm_80");
    }

    #[test]
    fn test_low_opt_level_rejected() {
        let err = BackendConfig::parse("opt_level = 1").unwrap_err();
        assert!(matches!(err, LoweringError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = BackendConfig::parse("optimisation = 3").unwrap_err();
        assert!(matches!(err, LoweringError::ConfigParse(_)));
    }

    #[test]
    fn test_device_library_paths() {
        let config = BackendConfig::parse(
            r#"
            device_lib_dir = "/opt/rocm/bitcode"
            [target]
            amdgpu_version = 906
            "#,
        )
        .unwrap();
        let paths = config.device_library_paths();
        assert_eq!(paths.len(), 9);
        assert_eq!(
            paths.last(),
            Some(&PathBuf::from("/opt/rocm/bitcode/oclc_isa_version_906.amdgcn.bc"))
        );
    }
}

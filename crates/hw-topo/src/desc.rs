// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The declarative hardware description.
//!
//! A [`HardwareDesc`] is the planner's entire view of a server: no
//! hardware probing, no driver interaction. It can be constructed
//! programmatically or loaded from TOML:
//!
//! ```toml
//! name = "dgx-h100"
//! numa_mapping = [0, 0, 0, 0, 1, 1, 1, 1]
//!
//! [gpu]
//! count = 8
//! family = "nvidia"
//! generation_code = 90
//! nvlinks_per_pair = 0
//! gdr_support = true
//!
//! [cpu]
//! count = 2
//! arch = "x86"
//! vendor = "intel"
//! model = 143
//!
//! [nic]
//! count = 8
//! speed_gbs = 50.0
//! gdr_support = true
//! coll_support = false
//!
//! [pcie]
//! gen = 5
//! width = 16
//! switches_per_cpu = 2
//!
//! [nvswitch]
//! count = 4
//! ```

use crate::BuildError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use topo_core::{CpuArch, CpuVendor, GpuFamily};

/// GPU section of the hardware description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDesc {
    pub count: usize,
    pub family: GpuFamily,
    /// Compute-capability-style generation code (`90` = SM90) for
    /// NVIDIA parts, gfx-style (`942` = MI300) for AMD parts.
    pub generation_code: u32,
    /// Direct GPU-pair NVLink count when no NVSwitch is present.
    pub nvlinks_per_pair: u32,
    pub gdr_support: bool,
}

/// CPU section: one entry describes every socket/NUMA domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuDesc {
    pub count: usize,
    pub arch: CpuArch,
    pub vendor: CpuVendor,
    /// cpuid model number (see `topo_core::bandwidth`).
    pub model: i32,
}

/// NIC section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicDesc {
    pub count: usize,
    /// Line rate per NIC in GB/s.
    pub speed_gbs: f64,
    pub gdr_support: bool,
    pub coll_support: bool,
}

/// PCIe section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcieDesc {
    pub gen: u32,
    pub width: u32,
    pub switches_per_cpu: usize,
}

/// NVSwitch section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvSwitchDesc {
    pub count: usize,
}

/// The complete single-server hardware description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareDesc {
    pub name: String,
    pub gpu: GpuDesc,
    pub cpu: CpuDesc,
    pub nic: NicDesc,
    pub pcie: PcieDesc,
    pub nvswitch: NvSwitchDesc,
    /// NUMA domain per GPU; `numa_mapping[i] < cpu.count`.
    pub numa_mapping: Vec<usize>,
}

impl HardwareDesc {
    /// Loads a description from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, BuildError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::InvalidConfig(format!(
                "cannot read description '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses a description from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, BuildError> {
        toml::from_str(toml_str)
            .map_err(|e| BuildError::InvalidConfig(format!("TOML parse error: {e}")))
    }

    /// Serialises the description to TOML.
    pub fn to_toml(&self) -> Result<String, BuildError> {
        toml::to_string_pretty(self)
            .map_err(|e| BuildError::InvalidConfig(format!("TOML serialise error: {e}")))
    }

    /// Validates structural feasibility before building.
    ///
    /// # Checks
    /// - At least one GPU and one CPU.
    /// - The NUMA mapping covers every GPU and names existing CPUs.
    /// - PCIe generation/width are values the bandwidth model covers.
    /// - Every configured bandwidth is positive.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.gpu.count == 0 {
            return Err(BuildError::InvalidConfig("gpu count is 0".into()));
        }
        if self.cpu.count == 0 {
            if self.pcie.switches_per_cpu > 0 {
                return Err(BuildError::NoSwitchCapacity);
            }
            return Err(BuildError::InvalidConfig("cpu count is 0".into()));
        }
        if self.numa_mapping.len() != self.gpu.count {
            return Err(BuildError::InvalidConfig(format!(
                "numa mapping covers {} gpus, expected {}",
                self.numa_mapping.len(),
                self.gpu.count
            )));
        }
        for (i, &numa) in self.numa_mapping.iter().enumerate() {
            if numa >= self.cpu.count {
                return Err(BuildError::NumaOutOfRange {
                    what: "gpu",
                    index: i,
                    numa,
                    cpus: self.cpu.count,
                });
            }
        }
        if !matches!(self.pcie.gen, 3..=5) || !matches!(self.pcie.width, 8 | 16) {
            return Err(BuildError::InvalidConfig(format!(
                "unsupported pcie gen{} x{}",
                self.pcie.gen, self.pcie.width
            )));
        }
        if self.nic.count > 0 && self.nic.speed_gbs <= 0.0 {
            return Err(BuildError::NonPositiveBandwidth("nic line rate".into()));
        }
        Ok(())
    }
}

/// The network layer tying scale-unit servers together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkType {
    /// One switch per NIC rail; NIC `i` joins rail `i mod railCount`.
    RailOptimized,
    /// A single switch every NIC connects to.
    FatTree,
}

/// A multi-server tile: the single-server description replicated
/// `server_count` times and joined by rail or fat-tree switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleUnit {
    pub server_count: usize,
    pub rail_count: usize,
    pub network_type: NetworkType,
}

impl ScaleUnit {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.server_count == 0 {
            return Err(BuildError::InvalidConfig("server count is 0".into()));
        }
        if self.rail_count == 0 {
            return Err(BuildError::InvalidConfig("rail count is 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dgx_like() -> HardwareDesc {
        HardwareDesc {
            name: "dgx-h100".into(),
            gpu: GpuDesc {
                count: 8,
                family: GpuFamily::Nvidia,
                generation_code: 90,
                nvlinks_per_pair: 0,
                gdr_support: true,
            },
            cpu: CpuDesc {
                count: 2,
                arch: CpuArch::X86,
                vendor: CpuVendor::Intel,
                model: topo_core::bandwidth::CPU_MODEL_INTEL_SRP,
            },
            nic: NicDesc {
                count: 8,
                speed_gbs: 50.0,
                gdr_support: true,
                coll_support: false,
            },
            pcie: PcieDesc {
                gen: 5,
                width: 16,
                switches_per_cpu: 2,
            },
            nvswitch: NvSwitchDesc { count: 4 },
            numa_mapping: vec![0, 0, 0, 0, 1, 1, 1, 1],
        }
    }

    #[test]
    fn test_validate_ok() {
        dgx_like().validate().unwrap();
    }

    #[test]
    fn test_validate_numa_out_of_range() {
        let mut desc = dgx_like();
        desc.numa_mapping[3] = 7;
        assert!(matches!(
            desc.validate(),
            Err(BuildError::NumaOutOfRange { index: 3, numa: 7, .. })
        ));
    }

    #[test]
    fn test_validate_numa_length_mismatch() {
        let mut desc = dgx_like();
        desc.numa_mapping.pop();
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_validate_zero_nic_speed() {
        let mut desc = dgx_like();
        desc.nic.speed_gbs = 0.0;
        assert!(matches!(
            desc.validate(),
            Err(BuildError::NonPositiveBandwidth(_))
        ));
    }

    #[test]
    fn test_validate_bad_pcie() {
        let mut desc = dgx_like();
        desc.pcie.gen = 7;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let desc = dgx_like();
        let toml = desc.to_toml().unwrap();
        let back = HardwareDesc::from_toml(&toml).unwrap();
        assert_eq!(back.name, desc.name);
        assert_eq!(back.gpu.count, 8);
        assert_eq!(back.numa_mapping, desc.numa_mapping);
    }

    #[test]
    fn test_scale_unit_validate() {
        let su = ScaleUnit {
            server_count: 4,
            rail_count: 8,
            network_type: NetworkType::RailOptimized,
        };
        su.validate().unwrap();

        let bad = ScaleUnit {
            server_count: 0,
            rail_count: 8,
            network_type: NetworkType::FatTree,
        };
        assert!(bad.validate().is_err());
    }
}

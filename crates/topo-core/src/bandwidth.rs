// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bandwidth tables keyed by GPU generation and CPU family.
//!
//! All figures are GB/s per link. The tables model shipped hardware:
//! the GPU rows are keyed by compute-capability-style generation codes
//! (`90` = SM90/Hopper, `100` = SM100/Blackwell, AMD parts use gfx-style
//! codes such as `942` for MI300), the CPU rows by architecture, vendor,
//! and cpuid model number.

use serde::{Deserialize, Serialize};

/// Self-loop bandwidth used to seed path-search sources.
pub const LOC_BW: f64 = 5000.0;

/// Bandwidth penalty applied when search accounting crosses a CPU
/// bridge (any hop classified worse than `PXB`).
pub const CROSS_CPU_TLP_FACTOR: f64 = 6.0 / 5.0;

/// Minimum per-channel speed at which the search may try doubling the
/// channel count mid-phase.
pub const CHANNEL_DOUBLING_MIN_SPEED: f64 = 25.0;

// cpuid model numbers for the Intel and Zhaoxin parts the cross-socket
// table distinguishes.
pub const CPU_MODEL_INTEL_BDW: i32 = 79;
pub const CPU_MODEL_INTEL_SKL: i32 = 85;
pub const CPU_MODEL_INTEL_SRP: i32 = 143;
pub const CPU_MODEL_INTEL_ERP: i32 = 207;
pub const CPU_MODEL_ZHAOXIN_YONGFENG: i32 = 91;

/// GPU vendor family: decides whether the GPU fabric is NVLink/NVSwitch
/// or an xGMI mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuFamily {
    Nvidia,
    Amd,
}

/// CPU instruction-set architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuArch {
    X86,
    Power,
    Arm,
}

/// CPU vendor (meaningful for `X86` only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuVendor {
    Intel,
    Amd,
    Zhaoxin,
}

/// Per-link NVLink bandwidth for an NVIDIA generation code.
pub fn nvlink_bw(generation_code: u32) -> f64 {
    const SM100_NVLINK_BW: f64 = 40.1;
    const SM90_NVLINK_BW: f64 = 20.6;
    const SM86_NVLINK_BW: f64 = 12.0;
    const SM80_NVLINK_BW: f64 = 20.0;
    const SM70_NVLINK_BW: f64 = 20.0;
    const SM60_NVLINK_BW: f64 = 18.0;

    if generation_code >= 100 {
        SM100_NVLINK_BW
    } else if generation_code >= 90 {
        SM90_NVLINK_BW
    } else if generation_code == 86 {
        SM86_NVLINK_BW
    } else if generation_code >= 80 {
        SM80_NVLINK_BW
    } else if generation_code >= 70 {
        SM70_NVLINK_BW
    } else if generation_code >= 60 {
        SM60_NVLINK_BW
    } else {
        SM80_NVLINK_BW
    }
}

/// Full-mesh xGMI bandwidth for an AMD generation code (gfx-style:
/// `942` = MI300 class, `90x` = MI200 class).
pub fn xgmi_bw(generation_code: u32) -> f64 {
    if generation_code >= 940 {
        48.0
    } else if generation_code >= 900 {
        32.0
    } else {
        23.0
    }
}

/// Cross-socket interconnect bandwidth for a CPU family.
///
/// Intel is distinguished by cpuid model (QPI vs UPI generations);
/// everything else is per-vendor or per-architecture flat.
pub fn cross_socket_bw(arch: CpuArch, vendor: CpuVendor, model: i32) -> f64 {
    const QPI_BW: f64 = 6.0;
    const SKL_QPI_BW: f64 = 10.0;
    const SRP_QPI_BW: f64 = 22.0;
    const ERP_QPI_BW: f64 = 40.0;
    const AMD_BW: f64 = 16.0;
    const P9_BW: f64 = 32.0;
    const ARM_BW: f64 = 6.0;
    const YONGFENG_ZPI_BW: f64 = 9.0;
    const ZPI_BW: f64 = 6.0;

    match arch {
        CpuArch::Power => P9_BW,
        CpuArch::Arm => ARM_BW,
        CpuArch::X86 => match vendor {
            CpuVendor::Intel => match model {
                CPU_MODEL_INTEL_ERP => ERP_QPI_BW,
                CPU_MODEL_INTEL_SRP => SRP_QPI_BW,
                CPU_MODEL_INTEL_SKL => SKL_QPI_BW,
                _ => QPI_BW,
            },
            CpuVendor::Amd => AMD_BW,
            CpuVendor::Zhaoxin => {
                if model == CPU_MODEL_ZHAOXIN_YONGFENG {
                    YONGFENG_ZPI_BW
                } else {
                    ZPI_BW
                }
            }
        },
    }
}

/// PCIe link bandwidth for a generation and lane width.
///
/// Gen3 x16 is the 12 GB/s baseline; the figure scales linearly in
/// both generation and width.
pub fn pcie_bw(gen: u32, width: u32) -> f64 {
    12.0 * (gen as f64 / 3.0) * (width as f64 / 16.0)
}

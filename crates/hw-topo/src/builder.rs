// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Materializes a [`System`] from a hardware description.
//!
//! Wiring rules, applied in order:
//!
//! 1. **GPU fabric** — NVSwitch star, AMD xGMI mesh, or direct NVLink
//!    pairs, whichever the description calls for.
//! 2. **Host hierarchy** — GPUs onto their NUMA domain's PCIe switches
//!    (round-robin) or directly onto the CPU.
//! 3. **NIC hierarchy** — NICs wired like GPUs; NIC `i` reuses GPU
//!    `i`'s NUMA domain when it has one.
//! 4. **Cross-socket** — every CPU pair joined by a SYS link.
//!
//! A scale unit replicates the single-server build under `s<k>-`
//! prefixes and joins the NICs through rail or fat-tree switches. For
//! scale units the planner deliberately stops after building: paths and
//! channel search run on filtered single-server views.

use crate::{HardwareDesc, NetworkType, NodeAttr, ScaleUnit, System};
use decision_log::{payload, DecisionLog, PayloadValue, Phase};
use std::collections::HashSet;
use topo_core::bandwidth::{cross_socket_bw, nvlink_bw, pcie_bw, xgmi_bw};
use topo_core::{GpuFamily, LinkType};

use crate::BuildError;

/// Most channels a NIC is modeled to serve.
const NIC_MAX_CHANNELS: usize = 32;

/// Builds the topology graph for a description, replicated across a
/// scale unit when one is given.
pub fn build(
    desc: &HardwareDesc,
    scale: Option<&ScaleUnit>,
    log: &mut DecisionLog,
) -> Result<System, BuildError> {
    desc.validate()?;
    let mut system = System::new(&desc.name);

    match scale {
        None => {
            build_server(&mut system, desc, "", 0, log)?;
        }
        Some(unit) => {
            unit.validate()?;
            for server in 0..unit.server_count {
                let prefix = format!("s{server}-");
                build_server(&mut system, desc, &prefix, server, log)?;
            }
            build_network(&mut system, desc, unit, log)?;
            system.inter_node = true;
        }
    }

    system.recompute_stats();
    tracing::info!("{}", system.summary());
    log.append(
        Phase::TopoBuild,
        "system-built",
        "all nodes and links materialized from the description",
        Vec::new(),
        "hardware description",
        Some(payload([
            ("nodes", PayloadValue::Int(system.nodes().len() as i64)),
            ("links", PayloadValue::Int(system.links().len() as i64)),
            ("inter_node", PayloadValue::Flag(system.inter_node)),
        ])),
    );
    Ok(system)
}

/// Builds one server's nodes and links under an identity prefix.
fn build_server(
    system: &mut System,
    desc: &HardwareDesc,
    prefix: &str,
    server: usize,
    log: &mut DecisionLog,
) -> Result<(), BuildError> {
    let gpu_id = |i: usize| format!("{prefix}gpu-{i}");
    let cpu_id = |i: usize| format!("{prefix}cpu-{i}");
    let nic_id = |i: usize| format!("{prefix}nic-{i}");
    let nvs_id = |i: usize| format!("{prefix}nvs-{i}");
    let pci_id = |i: usize| format!("{prefix}pci-{i}");

    // Nodes, in the fixed creation order GPU, CPU, NIC, NVSwitch, PCIe switch.
    for i in 0..desc.gpu.count {
        system.add_node(
            gpu_id(i),
            Some(format!("GPU{i}")),
            NodeAttr::Gpu {
                dev: i,
                rank: server * desc.gpu.count + i,
                generation: desc.gpu.generation_code,
                family: desc.gpu.family,
                gdr: desc.gpu.gdr_support,
            },
        )?;
    }
    for i in 0..desc.cpu.count {
        system.add_node(
            cpu_id(i),
            None,
            NodeAttr::Cpu {
                arch: desc.cpu.arch,
                vendor: desc.cpu.vendor,
                model: desc.cpu.model,
                numa_id: i,
            },
        )?;
    }
    for i in 0..desc.nic.count {
        system.add_node(
            nic_id(i),
            Some(format!("NIC{i}")),
            NodeAttr::Nic {
                dev: i,
                speed: desc.nic.speed_gbs,
                gdr: desc.nic.gdr_support,
                coll: desc.nic.coll_support,
                max_channels: NIC_MAX_CHANNELS,
            },
        )?;
    }
    for i in 0..desc.nvswitch.count {
        system.add_node(nvs_id(i), None, NodeAttr::NvSwitch)?;
    }
    let switches_per_cpu = desc.pcie.switches_per_cpu;
    for i in 0..switches_per_cpu * desc.cpu.count {
        system.add_node(
            pci_id(i),
            None,
            NodeAttr::PciSwitch {
                gen: desc.pcie.gen,
                width: desc.pcie.width,
            },
        )?;
    }

    // Rule 1: GPU fabric.
    if desc.nvswitch.count > 0 {
        let bw = nvlink_bw(desc.gpu.generation_code);
        for g in 0..desc.gpu.count {
            for s in 0..desc.nvswitch.count {
                system.add_link_pair(&gpu_id(g), &nvs_id(s), LinkType::Nvl, bw)?;
            }
        }
        if server == 0 {
            log.append(
                Phase::TopoBuild,
                "gpu-fabric-nvswitch",
                "nvswitches present, so every gpu joins every switch",
                vec!["xgmi mesh".into(), "direct nvlink pairs".into()],
                "gpu fabric rule",
                Some(payload([("link_bw", PayloadValue::Float(bw))])),
            );
        }
    } else if desc.gpu.family == GpuFamily::Amd {
        let bw = xgmi_bw(desc.gpu.generation_code);
        for i in 0..desc.gpu.count {
            for j in (i + 1)..desc.gpu.count {
                system.add_link_pair(&gpu_id(i), &gpu_id(j), LinkType::Nvl, bw)?;
            }
        }
        if server == 0 {
            log.append(
                Phase::TopoBuild,
                "gpu-fabric-xgmi",
                "amd gpu family maps to a full xgmi mesh",
                vec!["nvswitch star".into(), "direct nvlink pairs".into()],
                "gpu fabric rule",
                Some(payload([("link_bw", PayloadValue::Float(bw))])),
            );
        }
    } else if desc.gpu.nvlinks_per_pair > 0 {
        let bw = nvlink_bw(desc.gpu.generation_code) * desc.gpu.nvlinks_per_pair as f64;
        for i in 0..desc.gpu.count {
            for j in (i + 1)..desc.gpu.count {
                system.add_link_pair(&gpu_id(i), &gpu_id(j), LinkType::Nvl, bw)?;
            }
        }
        if server == 0 {
            log.append(
                Phase::TopoBuild,
                "gpu-fabric-nvlink-pairs",
                "no switch fabric; gpu pairs carry direct nvlinks",
                vec!["nvswitch star".into(), "pcie only".into()],
                "gpu fabric rule",
                Some(payload([("pair_bw", PayloadValue::Float(bw))])),
            );
        }
    }

    // Rules 2 and 3: host and NIC hierarchy share the switch→CPU dedup.
    let pcie = pcie_bw(desc.pcie.gen, desc.pcie.width);
    let mut wired_switches: HashSet<usize> = HashSet::new();

    let mut gpu_rr = vec![0usize; desc.cpu.count];
    for g in 0..desc.gpu.count {
        let numa = desc.numa_mapping[g];
        if switches_per_cpu > 0 {
            let local = gpu_rr[numa] % switches_per_cpu;
            gpu_rr[numa] += 1;
            let sw = numa * switches_per_cpu + local;
            system.add_link_pair(&gpu_id(g), &pci_id(sw), LinkType::Pci, pcie)?;
            if wired_switches.insert(sw) {
                system.add_link_pair(&pci_id(sw), &cpu_id(numa), LinkType::Pci, pcie)?;
            }
        } else {
            system.add_link_pair(&gpu_id(g), &cpu_id(numa), LinkType::Pci, pcie)?;
        }
    }

    let mut nic_rr = vec![0usize; desc.cpu.count];
    for i in 0..desc.nic.count {
        let numa = if i < desc.numa_mapping.len() {
            desc.numa_mapping[i]
        } else {
            i % desc.cpu.count
        };
        if switches_per_cpu > 0 {
            let local = nic_rr[numa] % switches_per_cpu;
            nic_rr[numa] += 1;
            let sw = numa * switches_per_cpu + local;
            system.add_link_pair(&nic_id(i), &pci_id(sw), LinkType::Pci, pcie)?;
            if wired_switches.insert(sw) {
                system.add_link_pair(&pci_id(sw), &cpu_id(numa), LinkType::Pci, pcie)?;
            }
        } else {
            system.add_link_pair(&nic_id(i), &cpu_id(numa), LinkType::Pci, pcie)?;
        }
    }

    // Rule 4: cross-socket mesh.
    let sys_bw = cross_socket_bw(desc.cpu.arch, desc.cpu.vendor, desc.cpu.model);
    for i in 0..desc.cpu.count {
        for j in (i + 1)..desc.cpu.count {
            system.add_link_pair(&cpu_id(i), &cpu_id(j), LinkType::Sys, sys_bw)?;
        }
    }

    Ok(())
}

/// Emits the scale-unit network switches and wires every server's NICs
/// onto them.
fn build_network(
    system: &mut System,
    desc: &HardwareDesc,
    unit: &ScaleUnit,
    log: &mut DecisionLog,
) -> Result<(), BuildError> {
    let switch_count = match unit.network_type {
        NetworkType::RailOptimized => unit.rail_count,
        NetworkType::FatTree => 1,
    };
    for s in 0..switch_count {
        system.add_node(format!("net-{s}"), None, NodeAttr::NetSwitch)?;
    }

    for server in 0..unit.server_count {
        for nic in 0..desc.nic.count {
            let switch = match unit.network_type {
                NetworkType::RailOptimized => nic % unit.rail_count,
                NetworkType::FatTree => 0,
            };
            system.add_link_pair(
                &format!("s{server}-nic-{nic}"),
                &format!("net-{switch}"),
                LinkType::Net,
                desc.nic.speed_gbs,
            )?;
        }
    }

    log.append(
        Phase::TopoBuild,
        "scale-unit-network",
        "nics joined to the scale-unit switch layer",
        vec![match unit.network_type {
            NetworkType::RailOptimized => "fat-tree".into(),
            NetworkType::FatTree => "rail-optimized".into(),
        }],
        "scale unit description",
        Some(payload([
            ("servers", PayloadValue::Int(unit.server_count as i64)),
            ("switches", PayloadValue::Int(switch_count as i64)),
        ])),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CpuDesc, GpuDesc, NicDesc, NvSwitchDesc, PcieDesc};
    use topo_core::bandwidth::CPU_MODEL_INTEL_SRP;
    use topo_core::{CpuArch, CpuVendor, NodeType};

    fn dgx_desc() -> HardwareDesc {
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
                model: CPU_MODEL_INTEL_SRP,
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

    fn mi300_desc() -> HardwareDesc {
        let mut desc = dgx_desc();
        desc.name = "mi300x".into();
        desc.gpu.family = GpuFamily::Amd;
        desc.gpu.generation_code = 942;
        desc.nvswitch.count = 0;
        desc.cpu.vendor = CpuVendor::Amd;
        desc.cpu.model = 0x11;
        desc
    }

    #[test]
    fn test_dgx_node_counts() {
        let mut log = DecisionLog::new();
        let sys = build(&dgx_desc(), None, &mut log).unwrap();
        assert_eq!(sys.count_of(NodeType::Gpu), 8);
        assert_eq!(sys.count_of(NodeType::Cpu), 2);
        assert_eq!(sys.count_of(NodeType::Nic), 8);
        assert_eq!(sys.count_of(NodeType::NvSwitch), 4);
        assert_eq!(sys.count_of(NodeType::PciSwitch), 4);
        assert!(!sys.inter_node);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_dgx_fabric_links() {
        let mut log = DecisionLog::new();
        let sys = build(&dgx_desc(), None, &mut log).unwrap();
        // 8 gpus x 4 switches, both directions.
        let nvl_links = sys
            .links()
            .iter()
            .filter(|l| l.kind == LinkType::Nvl)
            .count();
        assert_eq!(nvl_links, 8 * 4 * 2);
        let bw = sys
            .links()
            .iter()
            .find(|l| l.kind == LinkType::Nvl)
            .unwrap()
            .bandwidth;
        assert_eq!(bw, 20.6);
    }

    #[test]
    fn test_dgx_pcie_hierarchy() {
        let mut log = DecisionLog::new();
        let sys = build(&dgx_desc(), None, &mut log).unwrap();
        // 4 gpus per socket round-robin over 2 switches: gpu-0 and gpu-2
        // share pci-0, gpu-1 and gpu-3 share pci-1.
        let has = |a: &str, b: &str| {
            sys.links()
                .iter()
                .any(|l| l.src == a && l.dst == b && l.kind == LinkType::Pci)
        };
        assert!(has("gpu-0", "pci-0"));
        assert!(has("gpu-1", "pci-1"));
        assert!(has("gpu-2", "pci-0"));
        assert!(has("gpu-4", "pci-2"));
        assert!(has("pci-0", "cpu-0"));
        assert!(has("pci-2", "cpu-1"));
        // Switch-to-CPU edges are not duplicated per device.
        let pci0_cpu0 = sys
            .links()
            .iter()
            .filter(|l| l.src == "pci-0" && l.dst == "cpu-0")
            .count();
        assert_eq!(pci0_cpu0, 1);
    }

    #[test]
    fn test_cross_socket_bw() {
        let mut log = DecisionLog::new();
        let sys = build(&dgx_desc(), None, &mut log).unwrap();
        let sys_link = sys
            .links()
            .iter()
            .find(|l| l.kind == LinkType::Sys)
            .unwrap();
        assert_eq!(sys_link.bandwidth, 22.0);
    }

    #[test]
    fn test_amd_mesh() {
        let mut log = DecisionLog::new();
        let sys = build(&mi300_desc(), None, &mut log).unwrap();
        // Full mesh over 8 gpus: 28 pairs, both directions.
        let nvl_links = sys
            .links()
            .iter()
            .filter(|l| l.kind == LinkType::Nvl)
            .count();
        assert_eq!(nvl_links, 28 * 2);
        assert_eq!(
            sys.links()
                .iter()
                .find(|l| l.kind == LinkType::Nvl)
                .unwrap()
                .bandwidth,
            48.0
        );
    }

    #[test]
    fn test_nvlink_pairs_without_switch() {
        let mut desc = dgx_desc();
        desc.nvswitch.count = 0;
        desc.gpu.nvlinks_per_pair = 2;
        desc.gpu.generation_code = 80;
        let mut log = DecisionLog::new();
        let sys = build(&desc, None, &mut log).unwrap();
        let link = sys
            .links()
            .iter()
            .find(|l| l.kind == LinkType::Nvl)
            .unwrap();
        assert_eq!(link.bandwidth, 40.0);
    }

    #[test]
    fn test_direct_cpu_wiring_without_switches() {
        let mut desc = dgx_desc();
        desc.pcie.switches_per_cpu = 0;
        let mut log = DecisionLog::new();
        let sys = build(&desc, None, &mut log).unwrap();
        assert_eq!(sys.count_of(NodeType::PciSwitch), 0);
        assert!(sys
            .links()
            .iter()
            .any(|l| l.src == "gpu-0" && l.dst == "cpu-0" && l.kind == LinkType::Pci));
    }

    #[test]
    fn test_rail_optimized_scale_unit() {
        let unit = ScaleUnit {
            server_count: 4,
            rail_count: 8,
            network_type: NetworkType::RailOptimized,
        };
        let mut log = DecisionLog::new();
        let sys = build(&dgx_desc(), Some(&unit), &mut log).unwrap();

        assert!(sys.inter_node);
        assert_eq!(sys.count_of(NodeType::NetSwitch), 8);
        assert_eq!(sys.count_of(NodeType::Gpu), 32);
        // NIC i joins rail i mod 8 on every server.
        assert!(sys
            .links()
            .iter()
            .any(|l| l.src == "s2-nic-3" && l.dst == "net-3" && l.kind == LinkType::Net));
        assert!(sys.node("s3-gpu-7").is_some());
    }

    #[test]
    fn test_fat_tree_scale_unit() {
        let unit = ScaleUnit {
            server_count: 2,
            rail_count: 8,
            network_type: NetworkType::FatTree,
        };
        let mut log = DecisionLog::new();
        let sys = build(&dgx_desc(), Some(&unit), &mut log).unwrap();
        assert_eq!(sys.count_of(NodeType::NetSwitch), 1);
        assert!(sys
            .links()
            .iter()
            .any(|l| l.src == "s1-nic-7" && l.dst == "net-0"));
    }

    #[test]
    fn test_invalid_numa_fails() {
        let mut desc = dgx_desc();
        desc.numa_mapping[0] = 5;
        let mut log = DecisionLog::new();
        assert!(build(&desc, None, &mut log).is_err());
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Peer-proxy (PXN) upgrade pass.
//!
//! A GPU whose own route to a NIC is poor can instead hand traffic to
//! an NVLink-connected peer that sits close to that NIC. After the
//! all-pairs computation this pass rewrites qualifying GPU→NIC routes
//! as `PXN`: real hops to the proxy GPU, then the proxy's real hops to
//! the NIC.

use decision_log::{payload, DecisionLog, PayloadValue, Phase};
use hw_topo::System;
use topo_core::{OptionId, Options, Path, PathType};

/// Applies the PXN upgrade to every GPU→NIC route that qualifies.
/// Skipped entirely when `pxn-disable` is set.
pub(crate) fn upgrade_paths(system: &mut System, options: &Options, log: &mut DecisionLog) {
    if options.is_set(OptionId::PxnDisable) {
        log.note(
            Phase::ComputePaths,
            "pxn-skipped",
            "pxn-disable is set; gpu→nic routes keep their direct classification",
            "pxn-disable option",
        );
        return;
    }
    let threshold = if options.is_set(OptionId::PxnC2c) {
        PathType::P2c
    } else {
        PathType::Pxb
    };

    let gpu_ids: Vec<String> = system.gpus().map(|n| n.id.clone()).collect();
    let nic_ids: Vec<String> = system.nics().map(|n| n.id.clone()).collect();
    let mut upgrades = 0usize;

    for nic in &nic_ids {
        // The local GPU: best direct route to this NIC, ties broken by
        // higher bandwidth.
        let mut local: Option<(&String, PathType, f64)> = None;
        for gpu in &gpu_ids {
            let Some(path) = system.path(gpu, nic) else { continue };
            if path.kind == PathType::Dis {
                continue;
            }
            let better = match local {
                None => true,
                Some((_, kind, bw)) => {
                    path.kind < kind || (path.kind == kind && path.bandwidth > bw)
                }
            };
            if better {
                local = Some((gpu, path.kind, path.bandwidth));
            }
        }
        let Some((local_gpu, local_kind, _)) = local else { continue };
        if local_kind > threshold {
            continue;
        }
        let local_gpu = local_gpu.clone();
        let local_to_nic = system
            .path(&local_gpu, nic)
            .expect("local gpu was selected from stored paths")
            .clone();

        for gpu in &gpu_ids {
            if gpu == &local_gpu {
                continue;
            }
            // The proxy must sit on the gpu's NVLink fabric.
            let Some(local_to_gpu) = system.path(&local_gpu, gpu) else { continue };
            if local_to_gpu.kind > PathType::Nvl {
                continue;
            }
            let local_to_gpu_bw = local_to_gpu.bandwidth;

            let (current_bw, current_kind) = match system.path(gpu, nic) {
                Some(p) => (p.bandwidth, p.kind),
                None => (0.0, PathType::Dis),
            };
            if !(local_to_nic.bandwidth > current_bw || current_kind > PathType::Pxn) {
                continue;
            }

            let Some(gpu_to_local) = system.path(gpu, &local_gpu) else { continue };
            let mut hops = gpu_to_local.hops.clone();
            hops.extend(local_to_nic.hops.iter().cloned());
            system.set_path(Path {
                src: gpu.clone(),
                dst: nic.clone(),
                kind: PathType::Pxn,
                bandwidth: local_to_gpu_bw.min(local_to_nic.bandwidth),
                hops,
            });
            upgrades += 1;
        }
    }

    if upgrades > 0 {
        log.append(
            Phase::ComputePaths,
            "pxn-upgrades",
            "gpu→nic routes rerouted through nvlink-connected proxy gpus",
            vec!["keep direct routes".into()],
            "peer-proxy rule",
            Some(payload([
                ("upgrades", PayloadValue::Int(upgrades as i64)),
                ("threshold", PayloadValue::Text(threshold.as_str().into())),
            ])),
        );
        tracing::debug!("pxn pass upgraded {upgrades} gpu→nic routes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_paths;
    use hw_topo::NodeAttr;
    use topo_core::{CpuArch, CpuVendor, GpuFamily, LinkType, OptionValue};

    /// Two sockets: gpu-0 and nic-0 behind pci-0 on cpu-0, gpu-1 behind
    /// pci-1 on cpu-1. The GPUs share an NVSwitch.
    fn split_socket_system() -> System {
        let mut sys = System::new("split");
        for i in 0..2 {
            sys.add_node(
                format!("gpu-{i}"),
                None,
                NodeAttr::Gpu {
                    dev: i,
                    rank: i,
                    generation: 90,
                    family: GpuFamily::Nvidia,
                    gdr: true,
                },
            )
            .unwrap();
        }
        for i in 0..2 {
            sys.add_node(
                format!("cpu-{i}"),
                None,
                NodeAttr::Cpu {
                    arch: CpuArch::X86,
                    vendor: CpuVendor::Intel,
                    model: 143,
                    numa_id: i,
                },
            )
            .unwrap();
        }
        sys.add_node(
            "nic-0",
            None,
            NodeAttr::Nic {
                dev: 0,
                speed: 50.0,
                gdr: true,
                coll: false,
                max_channels: 32,
            },
        )
        .unwrap();
        sys.add_node("nvs-0", None, NodeAttr::NvSwitch).unwrap();
        for i in 0..2 {
            sys.add_node(
                format!("pci-{i}"),
                None,
                NodeAttr::PciSwitch { gen: 5, width: 16 },
            )
            .unwrap();
        }

        sys.add_link_pair("gpu-0", "nvs-0", LinkType::Nvl, 20.6).unwrap();
        sys.add_link_pair("gpu-1", "nvs-0", LinkType::Nvl, 20.6).unwrap();
        sys.add_link_pair("gpu-0", "pci-0", LinkType::Pci, 20.0).unwrap();
        sys.add_link_pair("nic-0", "pci-0", LinkType::Pci, 20.0).unwrap();
        sys.add_link_pair("pci-0", "cpu-0", LinkType::Pci, 20.0).unwrap();
        sys.add_link_pair("gpu-1", "pci-1", LinkType::Pci, 20.0).unwrap();
        sys.add_link_pair("pci-1", "cpu-1", LinkType::Pci, 20.0).unwrap();
        sys.add_link_pair("cpu-0", "cpu-1", LinkType::Sys, 22.0).unwrap();
        sys.recompute_stats();
        sys
    }

    #[test]
    fn test_cross_socket_route_upgrades_to_pxn() {
        let mut sys = split_socket_system();
        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        let p = sys.path("gpu-1", "nic-0").unwrap();
        assert_eq!(p.kind, PathType::Pxn);
        // min(nvlink route to proxy, proxy's pcie route to nic).
        assert_eq!(p.bandwidth, 20.0);
        // Hops: gpu-1 → nvs-0 → gpu-0, then gpu-0 → pci-0 → nic-0.
        assert_eq!(p.hop_count(), 4);
        assert!(log.has_action("pxn-upgrades"));
    }

    #[test]
    fn test_local_gpu_keeps_direct_route() {
        let mut sys = split_socket_system();
        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        let p = sys.path("gpu-0", "nic-0").unwrap();
        assert_eq!(p.kind, PathType::Pix);
    }

    #[test]
    fn test_pxn_disable_keeps_sys_route() {
        let mut sys = split_socket_system();
        let mut log = DecisionLog::new();
        let mut opts = Options::new();
        opts.set_override(OptionId::PxnDisable, OptionValue::Num(1));
        compute_paths(&mut sys, &opts, &mut log);

        let p = sys.path("gpu-1", "nic-0").unwrap();
        assert_eq!(p.kind, PathType::Sys);
        assert!(log.has_action("pxn-skipped"));
    }

    #[test]
    fn test_nic_to_gpu_routes_untouched() {
        let mut sys = split_socket_system();
        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        // The upgrade only rewrites gpu→nic; the reverse direction
        // keeps its direct classification.
        assert_eq!(sys.path("nic-0", "gpu-1").unwrap().kind, PathType::Sys);
    }
}

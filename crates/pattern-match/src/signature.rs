// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Topology signature extraction.
//!
//! Rebuilds, from a live `System`, exactly the shape data a
//! [`crate::PatternDef`] carries: counts, per-device NUMA domains
//! (recovered by walking the host hierarchy), the GPU connectivity
//! matrix, and the per-CPU signature string.

use hw_topo::System;
use topo_core::{LinkType, NodeType};

/// The extracted shape of a configured topology.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TopoSignature {
    pub n_gpus: usize,
    pub n_cpus: usize,
    pub n_nics: usize,
    /// Outgoing GPU-fabric link count per GPU.
    pub links_per_gpu: Vec<usize>,
    pub gpu_numa: Vec<usize>,
    pub nic_numa: Vec<usize>,
    /// Row-major `n_gpus × n_gpus` adjacency over direct GPU links.
    pub connectivity: Vec<u8>,
    pub signature: String,
}

impl TopoSignature {
    /// `true` when every GPU carries exactly `count` fabric links.
    pub fn uniform_links(&self, count: usize) -> bool {
        !self.links_per_gpu.is_empty()
            && self.links_per_gpu.iter().all(|&c| c == count)
    }
}

/// Extracts the signature, or `None` when some device's NUMA domain
/// cannot be recovered from the host hierarchy.
pub(crate) fn extract(system: &System) -> Option<TopoSignature> {
    let gpu_ids: Vec<&str> = system.gpus().map(|n| n.id.as_str()).collect();
    let nic_ids: Vec<&str> = system.nics().map(|n| n.id.as_str()).collect();
    let n_gpus = gpu_ids.len();
    let n_cpus = system.count_of(NodeType::Cpu);

    let mut gpu_numa = Vec::with_capacity(n_gpus);
    for id in &gpu_ids {
        gpu_numa.push(host_numa(system, id)?);
    }
    let mut nic_numa = Vec::with_capacity(nic_ids.len());
    for id in &nic_ids {
        nic_numa.push(host_numa(system, id)?);
    }

    let mut connectivity = vec![0u8; n_gpus * n_gpus];
    let mut links_per_gpu = vec![0usize; n_gpus];
    for (i, a) in gpu_ids.iter().enumerate() {
        for (j, b) in gpu_ids.iter().enumerate() {
            if i == j {
                continue;
            }
            let linked = system
                .links()
                .iter()
                .any(|l| l.kind == LinkType::Nvl && &l.src == a && &l.dst == b);
            if linked {
                connectivity[i * n_gpus + j] = 1;
                links_per_gpu[i] += 1;
            }
        }
    }

    let mut signature = String::new();
    for cpu in 0..n_cpus {
        let gpus = gpu_numa.iter().filter(|&&n| n == cpu).count();
        let nics = nic_numa.iter().filter(|&&n| n == cpu).count();
        signature.push_str(&format!("{gpus}{nics}"));
    }

    Some(TopoSignature {
        n_gpus,
        n_cpus,
        n_nics: nic_ids.len(),
        links_per_gpu,
        gpu_numa,
        nic_numa,
        connectivity,
        signature,
    })
}

/// Recovers a device's NUMA domain by walking its PCI uplink: either a
/// direct CPU edge, or one PCIe switch away from the CPU.
fn host_numa(system: &System, id: &str) -> Option<usize> {
    for link in system.links() {
        if link.src != id || link.kind != LinkType::Pci {
            continue;
        }
        let neighbor = system.node(&link.dst)?;
        match neighbor.node_type() {
            NodeType::Cpu => return cpu_numa(system, &neighbor.id),
            NodeType::PciSwitch => {
                for uplink in system.links() {
                    if uplink.src != neighbor.id || uplink.kind != LinkType::Pci {
                        continue;
                    }
                    if let Some(cpu) = system.node(&uplink.dst) {
                        if cpu.node_type() == NodeType::Cpu {
                            return cpu_numa(system, &cpu.id);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn cpu_numa(system: &System, id: &str) -> Option<usize> {
    match system.node(id)?.attr {
        hw_topo::NodeAttr::Cpu { numa_id, .. } => Some(numa_id),
        _ => None,
    }
}

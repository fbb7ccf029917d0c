// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! All-pairs best-path computation.
//!
//! Sources are every GPU and every NIC. From a GPU, paths to every GPU
//! and every NIC are stored; from a NIC, paths to every GPU. The
//! traversal is layered breadth-first: all depth-`k` routes settle
//! before depth `k+1` expands, and a route replaces an earlier one only
//! under the domination rule (fewer hops *and* more bandwidth, or the
//! old entry was dead). The ranked path type is folded in after a hop
//! is accepted — it never participates in domination.
//!
//! Crossing *through* a GPU that is not the source is the one guarded
//! expansion: it is what permits NVLink-bounce (`NVB`) routes while
//! forbidding arbitrarily long GPU chains.

use decision_log::{payload, DecisionLog, PayloadValue, Phase};
use hw_topo::{Node, System};
use std::collections::{HashMap, HashSet};
use topo_core::{Hop, LinkType, NodeType, OptionId, Options, Path, PathType};

/// Computes best paths for every (GPU|NIC) source and applies the
/// peer-proxy upgrade pass.
pub fn compute_paths(system: &mut System, options: &Options, log: &mut DecisionLog) {
    system.clear_paths();

    let adjacency = build_adjacency(system);
    let gpu_ids: Vec<String> = system.gpus().map(|n| n.id.clone()).collect();
    let nic_ids: Vec<String> = system.nics().map(|n| n.id.clone()).collect();
    let nvb_disable = options.is_set(OptionId::NvbDisable);

    let mut stored = 0usize;
    let mut missing = 0usize;

    for src in &gpu_ids {
        let settled = relax_from(system, &adjacency, src, nvb_disable);
        for dst in gpu_ids.iter().chain(nic_ids.iter()) {
            match settled.get(dst) {
                Some(path) => system.set_path(path.clone()),
                None => {
                    system.set_path(Path::disconnected(src, dst));
                    missing += 1;
                }
            }
            stored += 1;
        }
    }
    for src in &nic_ids {
        let settled = relax_from(system, &adjacency, src, nvb_disable);
        system.set_path(Path::self_path(src));
        for dst in &gpu_ids {
            match settled.get(dst) {
                Some(path) => system.set_path(path.clone()),
                None => {
                    system.set_path(Path::disconnected(src, dst));
                    missing += 1;
                }
            }
            stored += 1;
        }
    }

    if missing > 0 {
        log.note(
            Phase::ComputePaths,
            "paths-missing",
            format!("{missing} endpoint pairs have no route; stored as DIS"),
            "reachability",
        );
    }
    log.append(
        Phase::ComputePaths,
        "paths-computed",
        "layered breadth-first relaxation from every gpu and nic",
        Vec::new(),
        "path domination rule",
        Some(payload([
            ("pairs", PayloadValue::Int(stored as i64)),
            ("missing", PayloadValue::Int(missing as i64)),
            ("nvb_disabled", PayloadValue::Flag(nvb_disable)),
        ])),
    );
    tracing::debug!("computed {stored} best paths ({missing} disconnected)");

    crate::pxn::upgrade_paths(system, options, log);
}

/// Adjacency as link indices per source identity, in link creation
/// order so expansion order is deterministic.
fn build_adjacency(system: &System) -> HashMap<String, Vec<usize>> {
    let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, link) in system.links().iter().enumerate() {
        adjacency.entry(link.src.clone()).or_default().push(i);
    }
    adjacency
}

/// Layered breadth-first relaxation from one source. Returns the best
/// path found to every reached node.
fn relax_from(
    system: &System,
    adjacency: &HashMap<String, Vec<usize>>,
    src: &str,
    nvb_disable: bool,
) -> HashMap<String, Path> {
    let mut settled: HashMap<String, Path> = HashMap::new();
    settled.insert(src.to_string(), Path::self_path(src));

    let mut frontier: Vec<String> = vec![src.to_string()];
    while !frontier.is_empty() {
        let mut next: Vec<String> = Vec::new();
        let mut queued: HashSet<String> = HashSet::new();

        for from_id in &frontier {
            let from_path = settled
                .get(from_id)
                .expect("frontier nodes are settled")
                .clone();
            let from_node = system
                .node(from_id)
                .expect("settled ids name live nodes");

            let Some(out_links) = adjacency.get(from_id.as_str()) else {
                continue;
            };
            for &link_idx in out_links {
                let link = &system.links()[link_idx];
                let Some(to_node) = system.node(&link.dst) else {
                    continue;
                };

                // GPU passthrough guard: only a single NVLink bounce
                // onto another GPU may cross a non-source GPU.
                if from_node.node_type() == NodeType::Gpu && from_id != src {
                    let bounce_ok = !nvb_disable
                        && link.kind == LinkType::Nvl
                        && to_node.node_type() == NodeType::Gpu
                        && from_path.hop_count() <= 1;
                    if !bounce_ok {
                        continue;
                    }
                }

                let new_bw = from_path.bandwidth.min(link.bandwidth);
                let new_count = from_path.hop_count() + 1;
                let dominated = match settled.get(&link.dst) {
                    None => true,
                    Some(old) => {
                        old.bandwidth == 0.0
                            || (old.hop_count() > new_count && old.bandwidth < new_bw)
                    }
                };
                if !dominated {
                    continue;
                }

                let hop_class =
                    classify_hop(from_node, to_node, link.kind, &from_path, new_count);
                let kind = from_path.kind.max(hop_class);

                let mut hops = from_path.hops.clone();
                hops.push(Hop {
                    dst: link.dst.clone(),
                    link: link.kind,
                    bandwidth: link.bandwidth,
                });
                settled.insert(
                    link.dst.clone(),
                    Path {
                        src: src.to_string(),
                        dst: link.dst.clone(),
                        kind,
                        bandwidth: new_bw,
                        hops,
                    },
                );
                if queued.insert(link.dst.clone()) {
                    next.push(link.dst.clone());
                }
            }
        }
        frontier = next;
    }
    settled
}

/// Classifies the contribution of one accepted hop. The path's overall
/// type is the worst hop contribution seen so far, so classification is
/// monotone: extending a path can never improve its type.
fn classify_hop(
    from: &Node,
    to: &Node,
    link: LinkType,
    path_so_far: &Path,
    hop_count: usize,
) -> PathType {
    if link == LinkType::Net {
        return PathType::Loc;
    }
    if from.node_type() == NodeType::PciSwitch && to.node_type() == NodeType::PciSwitch {
        return PathType::Pxb;
    }
    if link == LinkType::Pci
        && (from.node_type() == NodeType::Cpu || to.node_type() == NodeType::Cpu)
    {
        return PathType::Phb;
    }
    if from.node_type() == NodeType::Gpu
        && path_so_far.kind == PathType::Nvl
        && link == LinkType::Nvl
        && hop_count > 1
    {
        return PathType::Nvb;
    }
    match link {
        LinkType::Loc => PathType::Loc,
        LinkType::Nvl => PathType::Nvl,
        LinkType::Pci => PathType::Pix,
        LinkType::C2c => PathType::C2c,
        LinkType::Sys => PathType::Sys,
        LinkType::Net => PathType::Loc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hw_topo::NodeAttr;
    use topo_core::bandwidth::LOC_BW;
    use topo_core::GpuFamily;

    fn gpu_attr(dev: usize) -> NodeAttr {
        NodeAttr::Gpu {
            dev,
            rank: dev,
            generation: 90,
            family: GpuFamily::Nvidia,
            gdr: true,
        }
    }

    /// gpu-0 — gpu-1 — gpu-2 — gpu-3 NVLink chain, no shortcuts.
    fn nvlink_chain(n: usize) -> System {
        let mut sys = System::new("chain");
        for i in 0..n {
            sys.add_node(format!("gpu-{i}"), None, gpu_attr(i)).unwrap();
        }
        for i in 0..n - 1 {
            sys.add_link_pair(
                &format!("gpu-{i}"),
                &format!("gpu-{}", i + 1),
                LinkType::Nvl,
                20.0,
            )
            .unwrap();
        }
        sys.recompute_stats();
        sys
    }

    #[test]
    fn test_self_paths_are_loc() {
        let mut sys = nvlink_chain(2);
        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        let p = sys.path("gpu-0", "gpu-0").unwrap();
        assert_eq!(p.kind, PathType::Loc);
        assert_eq!(p.bandwidth, LOC_BW);
        assert_eq!(p.hop_count(), 0);
    }

    #[test]
    fn test_direct_nvlink_path() {
        let mut sys = nvlink_chain(2);
        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        let p = sys.path("gpu-0", "gpu-1").unwrap();
        assert_eq!(p.kind, PathType::Nvl);
        assert_eq!(p.bandwidth, 20.0);
        assert_eq!(p.hop_count(), 1);
    }

    #[test]
    fn test_single_bounce_is_nvb() {
        let mut sys = nvlink_chain(3);
        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        let p = sys.path("gpu-0", "gpu-2").unwrap();
        assert_eq!(p.kind, PathType::Nvb);
        assert_eq!(p.hop_count(), 2);
    }

    #[test]
    fn test_double_bounce_is_forbidden() {
        let mut sys = nvlink_chain(4);
        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        // gpu-0 → gpu-3 would need two intermediate GPUs.
        let p = sys.path("gpu-0", "gpu-3").unwrap();
        assert_eq!(p.kind, PathType::Dis);
        assert_eq!(p.bandwidth, 0.0);
        assert!(log.has_action("paths-missing"));
    }

    #[test]
    fn test_nvb_disable_blocks_bounce() {
        let mut sys = nvlink_chain(3);
        let mut log = DecisionLog::new();
        let mut opts = Options::new();
        opts.set_override(OptionId::NvbDisable, topo_core::OptionValue::Num(1));
        compute_paths(&mut sys, &opts, &mut log);

        assert_eq!(sys.path("gpu-0", "gpu-2").unwrap().kind, PathType::Dis);
        // Direct neighbors are unaffected.
        assert_eq!(sys.path("gpu-0", "gpu-1").unwrap().kind, PathType::Nvl);
    }

    #[test]
    fn test_nvswitch_route_is_nvl() {
        let mut sys = System::new("nvswitch");
        for i in 0..2 {
            sys.add_node(format!("gpu-{i}"), None, gpu_attr(i)).unwrap();
        }
        sys.add_node("nvs-0", None, NodeAttr::NvSwitch).unwrap();
        sys.add_link_pair("gpu-0", "nvs-0", LinkType::Nvl, 20.6).unwrap();
        sys.add_link_pair("gpu-1", "nvs-0", LinkType::Nvl, 20.6).unwrap();
        sys.recompute_stats();

        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        let p = sys.path("gpu-0", "gpu-1").unwrap();
        // Two NVLink hops through a switch stay NVL: the bounce rule
        // only fires when the intermediate node is a GPU.
        assert_eq!(p.kind, PathType::Nvl);
        assert_eq!(p.bandwidth, 20.6);
        assert_eq!(p.hop_count(), 2);
    }

    #[test]
    fn test_pcie_host_classification() {
        let mut sys = System::new("host");
        sys.add_node("gpu-0", None, gpu_attr(0)).unwrap();
        sys.add_node(
            "cpu-0",
            None,
            NodeAttr::Cpu {
                arch: topo_core::CpuArch::X86,
                vendor: topo_core::CpuVendor::Intel,
                model: 85,
                numa_id: 0,
            },
        )
        .unwrap();
        sys.add_node(
            "pci-0",
            None,
            NodeAttr::PciSwitch { gen: 4, width: 16 },
        )
        .unwrap();
        sys.add_node(
            "nic-0",
            None,
            NodeAttr::Nic {
                dev: 0,
                speed: 25.0,
                gdr: true,
                coll: false,
                max_channels: 32,
            },
        )
        .unwrap();
        sys.add_link_pair("gpu-0", "pci-0", LinkType::Pci, 16.0).unwrap();
        sys.add_link_pair("pci-0", "cpu-0", LinkType::Pci, 16.0).unwrap();
        sys.add_link_pair("nic-0", "pci-0", LinkType::Pci, 16.0).unwrap();
        sys.recompute_stats();

        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);

        // GPU to NIC over one shared switch: single bridge, PIX.
        let p = sys.path("gpu-0", "nic-0").unwrap();
        assert_eq!(p.kind, PathType::Pix);
        assert_eq!(p.hop_count(), 2);

        // NIC sources get paths to GPUs too.
        assert_eq!(sys.path("nic-0", "gpu-0").unwrap().kind, PathType::Pix);
    }

    #[test]
    fn test_bottleneck_bandwidth() {
        let mut sys = System::new("bottleneck");
        for i in 0..2 {
            sys.add_node(format!("gpu-{i}"), None, gpu_attr(i)).unwrap();
        }
        sys.add_node("nvs-0", None, NodeAttr::NvSwitch).unwrap();
        sys.add_link_pair("gpu-0", "nvs-0", LinkType::Nvl, 20.0).unwrap();
        sys.add_link_pair("gpu-1", "nvs-0", LinkType::Nvl, 10.0).unwrap();
        sys.recompute_stats();

        let mut log = DecisionLog::new();
        compute_paths(&mut sys, &Options::new(), &mut log);
        assert_eq!(sys.path("gpu-0", "gpu-1").unwrap().bandwidth, 10.0);
    }
}

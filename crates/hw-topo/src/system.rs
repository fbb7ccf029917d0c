// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The `System` aggregate: the materialized topology graph.
//!
//! Nodes and links live in insertion-ordered vectors; identity lookups
//! go through a side map. The best-path map is populated by the path
//! engine after building, and pruned by the reachability trim. Hash
//! maps are point-lookup only — nothing iterates them, so output stays
//! deterministic.

use crate::{BuildError, Link, Node, NodeAttr};
use std::collections::{HashMap, HashSet};
use topo_core::{LinkType, NodeType, Path};

/// The immutable aggregate after building: nodes, links, best paths,
/// and bandwidth statistics.
#[derive(Debug, Default)]
pub struct System {
    pub name: String,
    nodes: Vec<Node>,
    index_by_id: HashMap<String, usize>,
    links: Vec<Link>,
    paths: HashMap<(String, String), Path>,
    by_type: HashMap<NodeType, Vec<usize>>,
    /// Maximum configured link bandwidth, GB/s.
    pub max_bandwidth: f64,
    /// Summed undirected link bandwidth, GB/s.
    pub total_bandwidth: f64,
    /// True iff any GPU pair requires a network-level route.
    pub inter_node: bool,
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        System {
            name: name.into(),
            ..Default::default()
        }
    }

    // ── Construction ───────────────────────────────────────────────

    /// Adds a node, assigning its zero-based index within its type.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        label: Option<String>,
        attr: NodeAttr,
    ) -> Result<(), BuildError> {
        let id = id.into();
        if self.index_by_id.contains_key(&id) {
            return Err(BuildError::DuplicateNode(id));
        }
        let ty = attr.node_type();
        let index = self.by_type.get(&ty).map_or(0, Vec::len);
        let slot = self.nodes.len();
        self.nodes.push(Node {
            id: id.clone(),
            index,
            label,
            attr,
        });
        self.index_by_id.insert(id, slot);
        self.by_type.entry(ty).or_default().push(slot);
        Ok(())
    }

    /// Adds a link in both directions with identical bandwidth.
    pub fn add_link_pair(
        &mut self,
        a: &str,
        b: &str,
        kind: LinkType,
        bandwidth: f64,
    ) -> Result<(), BuildError> {
        if bandwidth <= 0.0 {
            return Err(BuildError::NonPositiveBandwidth(format!(
                "{kind} link {a} <-> {b}"
            )));
        }
        self.links.push(Link {
            src: a.to_string(),
            dst: b.to_string(),
            kind,
            bandwidth,
        });
        self.links.push(Link {
            src: b.to_string(),
            dst: a.to_string(),
            kind,
            bandwidth,
        });
        Ok(())
    }

    /// Recomputes the bandwidth aggregates from the link list.
    pub fn recompute_stats(&mut self) {
        self.max_bandwidth = 0.0;
        let mut directed_sum = 0.0;
        for link in &self.links {
            if link.bandwidth > self.max_bandwidth {
                self.max_bandwidth = link.bandwidth;
            }
            directed_sum += link.bandwidth;
        }
        // Each configured link is stored in both directions.
        self.total_bandwidth = directed_sum / 2.0;
    }

    // ── Lookup ─────────────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_by_id.get(id).map(|&i| &self.nodes[i])
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.index_by_id.contains_key(id)
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All directed links in creation order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Nodes of one type, in creation order.
    pub fn nodes_of(&self, ty: NodeType) -> impl Iterator<Item = &Node> {
        self.by_type
            .get(&ty)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|&i| &self.nodes[i])
    }

    pub fn gpus(&self) -> impl Iterator<Item = &Node> {
        self.nodes_of(NodeType::Gpu)
    }

    pub fn nics(&self) -> impl Iterator<Item = &Node> {
        self.nodes_of(NodeType::Nic)
    }

    pub fn count_of(&self, ty: NodeType) -> usize {
        self.by_type.get(&ty).map_or(0, Vec::len)
    }

    /// Minimum GPU generation code across the system.
    pub fn min_gpu_generation(&self) -> Option<u32> {
        self.gpus().filter_map(Node::gpu_generation).min()
    }

    /// The GPU vendor family (taken from the first GPU).
    pub fn gpu_family(&self) -> Option<topo_core::GpuFamily> {
        self.gpus().next().and_then(Node::gpu_family)
    }

    /// The CPU architecture and vendor (taken from the first CPU).
    pub fn cpu_profile(&self) -> Option<(topo_core::CpuArch, topo_core::CpuVendor)> {
        self.nodes_of(NodeType::Cpu).next().and_then(|n| match n.attr {
            NodeAttr::Cpu { arch, vendor, .. } => Some((arch, vendor)),
            _ => None,
        })
    }

    // ── Paths ──────────────────────────────────────────────────────

    pub fn path(&self, src: &str, dst: &str) -> Option<&Path> {
        self.paths.get(&(src.to_string(), dst.to_string()))
    }

    pub fn set_path(&mut self, path: Path) {
        self.paths
            .insert((path.src.clone(), path.dst.clone()), path);
    }

    pub fn paths(&self) -> &HashMap<(String, String), Path> {
        &self.paths
    }

    pub fn clear_paths(&mut self) {
        self.paths.clear();
    }

    // ── Trim support ───────────────────────────────────────────────

    /// Removes every node not in `keep`, along with incident links and
    /// paths, then rebuilds the identity and by-type indexes. Per-type
    /// indices are reassigned in surviving creation order.
    pub fn retain_reachable(&mut self, keep: &HashSet<String>) {
        self.nodes.retain(|n| keep.contains(&n.id));
        self.links
            .retain(|l| keep.contains(&l.src) && keep.contains(&l.dst));
        self.paths
            .retain(|(src, dst), _| keep.contains(src) && keep.contains(dst));

        self.index_by_id.clear();
        self.by_type.clear();
        let mut per_type_counts: HashMap<NodeType, usize> = HashMap::new();
        for (slot, node) in self.nodes.iter_mut().enumerate() {
            let ty = node.attr.node_type();
            let count = per_type_counts.entry(ty).or_insert(0);
            node.index = *count;
            *count += 1;
            self.index_by_id.insert(node.id.clone(), slot);
            self.by_type.entry(ty).or_default().push(slot);
        }
        self.recompute_stats();
    }

    // ── Reporting ──────────────────────────────────────────────────

    /// Human-readable one-liner for logs.
    pub fn summary(&self) -> String {
        format!(
            "System '{}': {} gpus, {} cpus, {} nics, {} nvswitches, {} pci switches, \
             {} links, max {:.1} GB/s, total {:.1} GB/s{}",
            self.name,
            self.count_of(NodeType::Gpu),
            self.count_of(NodeType::Cpu),
            self.count_of(NodeType::Nic),
            self.count_of(NodeType::NvSwitch),
            self.count_of(NodeType::PciSwitch),
            self.links.len(),
            self.max_bandwidth,
            self.total_bandwidth,
            if self.inter_node { ", inter-node" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn two_gpu_system() -> System {
        let mut sys = System::new("test");
        sys.add_node("gpu-0", None, gpu_attr(0)).unwrap();
        sys.add_node("gpu-1", None, gpu_attr(1)).unwrap();
        sys.add_node("nvs-0", None, NodeAttr::NvSwitch).unwrap();
        sys.add_link_pair("gpu-0", "nvs-0", LinkType::Nvl, 20.6).unwrap();
        sys.add_link_pair("gpu-1", "nvs-0", LinkType::Nvl, 20.6).unwrap();
        sys.recompute_stats();
        sys
    }

    #[test]
    fn test_indices_are_per_type() {
        let sys = two_gpu_system();
        assert_eq!(sys.node("gpu-0").unwrap().index, 0);
        assert_eq!(sys.node("gpu-1").unwrap().index, 1);
        assert_eq!(sys.node("nvs-0").unwrap().index, 0);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut sys = two_gpu_system();
        assert!(matches!(
            sys.add_node("gpu-0", None, gpu_attr(0)),
            Err(BuildError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_links_are_bidirectional() {
        let sys = two_gpu_system();
        assert_eq!(sys.links().len(), 4);
        let fwd = sys
            .links()
            .iter()
            .find(|l| l.src == "gpu-0" && l.dst == "nvs-0")
            .unwrap();
        let rev = sys
            .links()
            .iter()
            .find(|l| l.src == "nvs-0" && l.dst == "gpu-0")
            .unwrap();
        assert_eq!(fwd.bandwidth, rev.bandwidth);
        assert_eq!(fwd.kind, rev.kind);
    }

    #[test]
    fn test_zero_bandwidth_link_rejected() {
        let mut sys = two_gpu_system();
        assert!(sys
            .add_link_pair("gpu-0", "gpu-1", LinkType::Nvl, 0.0)
            .is_err());
    }

    #[test]
    fn test_stats() {
        let sys = two_gpu_system();
        assert_eq!(sys.max_bandwidth, 20.6);
        assert_eq!(sys.total_bandwidth, 2.0 * 20.6);
    }

    #[test]
    fn test_retain_reachable_rebuilds_indexes() {
        let mut sys = two_gpu_system();
        sys.set_path(Path::self_path("gpu-0"));
        sys.set_path(Path::disconnected("gpu-0", "gpu-1"));

        let keep: HashSet<String> =
            ["gpu-0", "nvs-0"].iter().map(|s| s.to_string()).collect();
        sys.retain_reachable(&keep);

        assert!(sys.node("gpu-1").is_none());
        assert_eq!(sys.count_of(NodeType::Gpu), 1);
        assert_eq!(sys.links().len(), 2);
        assert!(sys.path("gpu-0", "gpu-1").is_none());
        assert!(sys.path("gpu-0", "gpu-0").is_some());
    }

    #[test]
    fn test_min_gpu_generation() {
        let mut sys = System::new("gen");
        sys.add_node(
            "gpu-0",
            None,
            NodeAttr::Gpu { dev: 0, rank: 0, generation: 100, family: GpuFamily::Nvidia, gdr: true },
        )
        .unwrap();
        sys.add_node(
            "gpu-1",
            None,
            NodeAttr::Gpu { dev: 1, rank: 1, generation: 80, family: GpuFamily::Nvidia, gdr: true },
        )
        .unwrap();
        assert_eq!(sys.min_gpu_generation(), Some(80));
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph elements: nodes with per-type attribute bundles, and links.

use serde::Serialize;
use topo_core::{CpuArch, CpuVendor, GpuFamily, LinkType, NodeType};

/// Per-type node attributes as a tagged variant.
///
/// A node can only ever carry the attribute bundle matching its type;
/// there is no "optional fields" escape hatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAttr {
    Gpu {
        /// Device index on its server.
        dev: usize,
        /// Global rank across the whole system.
        rank: usize,
        /// Generation code (see `topo_core::bandwidth`).
        generation: u32,
        /// Vendor family; decides the fabric and speed-tier rules.
        family: GpuFamily,
        /// GPU-direct-RDMA capable.
        gdr: bool,
    },
    Cpu {
        arch: CpuArch,
        vendor: CpuVendor,
        model: i32,
        /// The NUMA domain this socket anchors.
        numa_id: usize,
    },
    Nic {
        dev: usize,
        /// Line rate in GB/s.
        speed: f64,
        gdr: bool,
        /// Collective-offload capable.
        coll: bool,
        /// Most channels this NIC can serve.
        max_channels: usize,
    },
    NvSwitch,
    PciSwitch {
        gen: u32,
        width: u32,
    },
    NetSwitch,
}

impl NodeAttr {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Gpu { .. } => NodeType::Gpu,
            Self::Cpu { .. } => NodeType::Cpu,
            Self::Nic { .. } => NodeType::Nic,
            Self::NvSwitch => NodeType::NvSwitch,
            Self::PciSwitch { .. } => NodeType::PciSwitch,
            Self::NetSwitch => NodeType::NetSwitch,
        }
    }
}

/// One hardware element in the topology graph.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Stable identity, unique across the system (`gpu-0`, `s1-nic-3`, ...).
    pub id: String,
    /// Zero-based index within this node's type.
    pub index: usize,
    /// Optional display label.
    pub label: Option<String>,
    pub attr: NodeAttr,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        self.attr.node_type()
    }

    /// GPU generation code, if this is a GPU.
    pub fn gpu_generation(&self) -> Option<u32> {
        match self.attr {
            NodeAttr::Gpu { generation, .. } => Some(generation),
            _ => None,
        }
    }

    /// GPU vendor family, if this is a GPU.
    pub fn gpu_family(&self) -> Option<GpuFamily> {
        match self.attr {
            NodeAttr::Gpu { family, .. } => Some(family),
            _ => None,
        }
    }
}

/// A directed edge. Every configured link appears in both directions
/// with identical bandwidth; undirected reads visit both.
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub src: String,
    pub dst: String,
    pub kind: LinkType,
    /// Bandwidth in GB/s.
    pub bandwidth: f64,
}

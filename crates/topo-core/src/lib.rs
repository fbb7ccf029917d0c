// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # topo-core
//!
//! The shared type model and hardware constants for the topology planner.
//!
//! This is the leaf crate every other planner crate depends on. It defines:
//!
//! - [`NodeType`], [`LinkType`], [`PathType`] — the node/link/path taxonomies.
//! - [`Hop`] and [`Path`] — a best route between two endpoints.
//! - [`Channel`], [`TopoGraph`], [`Pattern`] — the planner's output model.
//! - Bandwidth tables keyed by GPU generation and CPU family
//!   ([`bandwidth`]), speed arrays and iteration budgets ([`speed`]).
//! - The tunable option set ([`Options`]).
//!
//! Everything here is plain data: no I/O, no global state, no clocks.

pub mod bandwidth;
mod channel;
mod link;
mod options;
mod path;
pub mod speed;

pub use bandwidth::{CpuArch, CpuVendor, GpuFamily};
pub use channel::{Channel, Pattern, TopoGraph};
pub use link::LinkType;
pub use options::{OptionCategory, OptionDesc, OptionId, OptionKind, OptionValue, Options};
pub use path::{Hop, Path, PathType};

/// The kind of hardware a node models.
///
/// One `CPU` node is created per NUMA domain, so "CPU" here means
/// "socket/NUMA domain", not "core".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Gpu,
    Cpu,
    Nic,
    NvSwitch,
    PciSwitch,
    NetSwitch,
}

impl NodeType {
    /// Returns the identity prefix used when minting node ids
    /// (`gpu-<i>`, `cpu-<i>`, `nic-<i>`, `nvs-<i>`, `pci-<i>`, `net-<i>`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
            Self::Nic => "nic",
            Self::NvSwitch => "nvs",
            Self::PciSwitch => "pci",
            Self::NetSwitch => "net",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id_prefix())
    }
}

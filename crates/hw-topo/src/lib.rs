// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # hw-topo
//!
//! The declarative hardware description and the topology graph built
//! from it.
//!
//! - [`HardwareDesc`] / [`ScaleUnit`] — the immutable input: GPU, CPU,
//!   NIC, PCIe, and NVSwitch counts plus interconnect parameters,
//!   loadable from TOML.
//! - [`Node`] / [`NodeAttr`] / [`Link`] — the materialized graph
//!   elements. Per-type attributes live in a tagged variant, so a node
//!   can never carry the wrong attribute bundle.
//! - [`System`] — the aggregate: insertion-ordered nodes and links, the
//!   best-path map, bandwidth statistics, and the inter-node flag.
//! - [`build`] — materializes a `System` from a description, wiring the
//!   GPU fabric, host hierarchy, NIC hierarchy, and cross-socket links,
//!   or replicating per-server systems into a scale unit.
//!
//! Structurally impossible input fails with [`BuildError`]
//! (the `invalid-config` taxonomy); everything else is in-band.

mod builder;
mod desc;
mod error;
mod node;
mod system;

pub use builder::build;
pub use desc::{
    CpuDesc, GpuDesc, HardwareDesc, NetworkType, NicDesc, NvSwitchDesc,
    PcieDesc, ScaleUnit,
};
pub use error::BuildError;
pub use node::{Link, Node, NodeAttr};
pub use system::System;

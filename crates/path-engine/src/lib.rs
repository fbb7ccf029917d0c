// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # path-engine
//!
//! All-pairs best paths over the topology graph, and the reachability
//! trim.
//!
//! [`compute_paths`] runs a layered breadth-first relaxation from every
//! GPU and NIC, classifies each route's worst hop into a ranked
//! [`topo_core::PathType`], then applies the peer-proxy (PXN) upgrade
//! pass for GPU→NIC routes. [`trim_system`] removes everything no GPU
//! can reach and reclassifies the system's inter-node flag.
//!
//! Missing routes are never errors: they are stored as `DIS` entries
//! and noted in the decision log.

mod compute;
mod pxn;
mod trim;

pub use compute::compute_paths;
pub use trim::{all_reach_a_gpu, trim_system};

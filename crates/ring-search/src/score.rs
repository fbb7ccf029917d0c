// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Candidate scoring for ring extension.
//!
//! When a partial ring sits at GPU `c`, every unvisited candidate `g`
//! is ranked by how well placed it is for the *next* leg out of the
//! ring: first its standing toward the NICs (bandwidth, PCI bottleneck,
//! hop count of its best NIC route), then the quality of the `c → g`
//! leg itself, with the GPU's insertion index as the final tiebreaker.
//! Every comparison is numeric or insertion-ordered, so sorting is
//! deterministic.

use hw_topo::System;
use std::cmp::Ordering;
use topo_core::{LinkType, Path, PathType};

/// Score tuple for one candidate GPU.
#[derive(Debug, Clone)]
pub(crate) struct CandidateScore {
    /// Bottleneck bandwidth of the candidate's best NIC route.
    inter_bw: f64,
    /// Bottleneck over the PCI hops of that route.
    inter_pci_bw: f64,
    /// Hop count of that route.
    inter_hops: usize,
    /// Bandwidth of the `current → candidate` path.
    intra_bw: f64,
    /// Hop count of the `current → candidate` path.
    intra_hops: usize,
    /// Insertion index of the candidate GPU.
    start_index: usize,
}

impl CandidateScore {
    /// Scores candidate `g` for extension from `c`.
    pub fn new(system: &System, c: &str, g: &str, g_index: usize) -> Self {
        let (intra_bw, intra_hops) = match system.path(c, g) {
            Some(p) => (p.bandwidth, p.hop_count()),
            None => (0.0, usize::MAX),
        };
        let (inter_bw, inter_pci_bw, inter_hops) = match best_nic_path(system, g) {
            Some(p) => (p.bandwidth, pci_bottleneck(p), p.hop_count()),
            None => (0.0, 0.0, usize::MAX),
        };
        CandidateScore {
            inter_bw,
            inter_pci_bw,
            inter_hops,
            intra_bw,
            intra_hops,
            start_index: g_index,
        }
    }

    /// Higher-bandwidth, fewer-hop candidates sort first.
    pub fn compare(&self, other: &CandidateScore) -> Ordering {
        other
            .inter_bw
            .total_cmp(&self.inter_bw)
            .then(other.inter_pci_bw.total_cmp(&self.inter_pci_bw))
            .then(self.inter_hops.cmp(&other.inter_hops))
            .then(other.intra_bw.total_cmp(&self.intra_bw))
            .then(self.intra_hops.cmp(&other.intra_hops))
            .then(self.start_index.cmp(&other.start_index))
    }
}

/// The candidate's best stored route to any NIC: smallest path class,
/// ties broken by higher bandwidth.
fn best_nic_path<'a>(system: &'a System, gpu: &str) -> Option<&'a Path> {
    let mut best: Option<&Path> = None;
    for nic in system.nics() {
        let Some(path) = system.path(gpu, &nic.id) else { continue };
        if path.kind == PathType::Dis {
            continue;
        }
        let better = match best {
            None => true,
            Some(b) => {
                path.kind < b.kind
                    || (path.kind == b.kind && path.bandwidth > b.bandwidth)
            }
        };
        if better {
            best = Some(path);
        }
    }
    best
}

/// Minimum bandwidth over the route's PCI hops; the route bottleneck
/// when it has none.
fn pci_bottleneck(path: &Path) -> f64 {
    path.hops
        .iter()
        .filter(|h| h.link == LinkType::Pci)
        .map(|h| h.bandwidth)
        .fold(f64::INFINITY, f64::min)
        .min(path.bandwidth)
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reachability trim.
//!
//! Breadth-first from every GPU over the undirected link graph; any
//! node not reached is removed together with its incident links and
//! paths, and the by-type index is rebuilt. The inter-node flag is then
//! reclassified from what survived: it is set iff some GPU pair has no
//! stored route, a `DIS` route, or a route at `NET` or worse.

use decision_log::{payload, DecisionLog, PayloadValue, Phase};
use hw_topo::System;
use std::collections::{HashMap, HashSet, VecDeque};
use topo_core::{NodeType, PathType};

/// Trims everything no GPU can reach, then reclassifies `inter_node`.
pub fn trim_system(system: &mut System, log: &mut DecisionLog) {
    let mut undirected: HashMap<&str, Vec<&str>> = HashMap::new();
    for link in system.links() {
        undirected
            .entry(link.src.as_str())
            .or_default()
            .push(link.dst.as_str());
    }

    let mut reached: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for gpu in system.gpus() {
        reached.insert(gpu.id.clone());
        queue.push_back(gpu.id.as_str());
    }
    while let Some(id) = queue.pop_front() {
        let Some(neighbors) = undirected.get(id) else { continue };
        for &n in neighbors {
            if !reached.contains(n) {
                reached.insert(n.to_string());
                queue.push_back(n);
            }
        }
    }

    let removed: Vec<String> = system
        .nodes()
        .iter()
        .filter(|n| !reached.contains(&n.id))
        .map(|n| n.id.clone())
        .collect();

    if !removed.is_empty() {
        tracing::debug!("trimming {} unreachable nodes", removed.len());
        system.retain_reachable(&reached);
    }

    system.inter_node = gpu_pairs_need_network(system);

    log.append(
        Phase::TrimSystem,
        "system-trimmed",
        "nodes unreachable from every gpu removed; inter-node flag reclassified",
        Vec::new(),
        "undirected reachability sweep",
        Some(payload([
            ("removed", PayloadValue::Int(removed.len() as i64)),
            ("inter_node", PayloadValue::Flag(system.inter_node)),
        ])),
    );
}

/// True iff some GPU pair is missing a route, or routes at `NET` or
/// worse.
fn gpu_pairs_need_network(system: &System) -> bool {
    let gpu_ids: Vec<&str> = system.gpus().map(|n| n.id.as_str()).collect();
    for &a in &gpu_ids {
        for &b in &gpu_ids {
            if a == b {
                continue;
            }
            match system.path(a, b) {
                None => return true,
                Some(p) if p.kind >= PathType::Net => return true,
                Some(_) => {}
            }
        }
    }
    false
}

/// Post-trim sanity: every surviving non-GPU node should be reachable
/// from some GPU. Exposed for tests and the driver's debug assertions.
pub fn all_reach_a_gpu(system: &System) -> bool {
    let mut undirected: HashMap<&str, Vec<&str>> = HashMap::new();
    for link in system.links() {
        undirected
            .entry(link.src.as_str())
            .or_default()
            .push(link.dst.as_str());
    }
    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for gpu in system.gpus() {
        reached.insert(gpu.id.as_str());
        queue.push_back(gpu.id.as_str());
    }
    while let Some(id) = queue.pop_front() {
        for &n in undirected.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            if reached.insert(n) {
                queue.push_back(n);
            }
        }
    }
    system
        .nodes()
        .iter()
        .all(|n| n.node_type() == NodeType::Gpu || reached.contains(n.id.as_str()))
}

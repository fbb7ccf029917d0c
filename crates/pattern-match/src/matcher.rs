// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pattern matching against the registry, plus the chordal-ring and
//! all-to-all detectors.
//!
//! A registry hit requires identical counts and NUMA signature, then a
//! GPU permutation satisfying NUMA equality and connectivity-matrix
//! equality, then a NIC permutation satisfying NUMA equality. Both
//! permutation hunts are exhaustive backtracking bounded by
//! [`PERMUTATION_BUDGET`] recursive steps; running out of budget is
//! treated exactly like a mismatch.

use crate::registry::{registry, PatternDef};
use crate::signature::{self, TopoSignature};
use decision_log::{payload, DecisionLog, PayloadValue, Phase};
use hw_topo::System;
use topo_core::{Channel, OptionId, Options, Pattern, PathType, TopoGraph};

/// Recursive-step bound for each permutation hunt.
pub const PERMUTATION_BUDGET: u64 = 100_000;

/// Ring set used for 8-GPU meshes: strides that avoid the missing
/// chordal link (offset 4), forward and reverse.
const RINGS_8: [&str; 6] = [
    "0 1 2 3 4 5 6 7",
    "0 7 6 5 4 3 2 1",
    "0 2 4 6 1 3 5 7",
    "0 7 5 3 1 6 4 2",
    "0 3 6 1 4 7 2 5",
    "0 5 2 7 4 1 6 3",
];

/// Tries to shortcut the search with a known pattern. Returns the ring
/// graph and the pattern identifier on a hit.
pub fn match_pattern(
    system: &System,
    options: &Options,
    log: &mut DecisionLog,
) -> Option<(TopoGraph, String)> {
    if options.is_set(OptionId::ModelMatchDisable) {
        log.note(
            Phase::PatternMatch,
            "pattern-match-disabled",
            "model-match-disable is set; going straight to search",
            "model-match-disable option",
        );
        return None;
    }

    let Some(sig) = signature::extract(system) else {
        log.note(
            Phase::PatternMatch,
            "signature-unavailable",
            "device numa domains could not be recovered from the host hierarchy",
            "signature extraction",
        );
        return None;
    };
    let gpu_ids: Vec<String> = system.gpus().map(|n| n.id.clone()).collect();

    for pattern in registry() {
        if pattern.n_gpus != sig.n_gpus
            || pattern.n_cpus != sig.n_cpus
            || pattern.n_nics != sig.n_nics
            || !sig.uniform_links(pattern.links_per_gpu)
            || pattern.numa_signature != sig.signature
        {
            continue;
        }
        let Some(gpu_perm) = find_gpu_permutation(pattern, &sig) else {
            log.note(
                Phase::PatternMatch,
                "pattern-permutation-miss",
                format!("'{}' shape matched but no gpu permutation fit", pattern.id),
                "permutation budget",
            );
            continue;
        };
        if find_nic_permutation(pattern, &sig).is_none() {
            log.note(
                Phase::PatternMatch,
                "pattern-permutation-miss",
                format!("'{}' gpu permutation fit but nics did not", pattern.id),
                "permutation budget",
            );
            continue;
        }

        let orders = parse_rings(pattern.rings, &gpu_perm, &gpu_ids);
        let graph = graph_from_orders(system, orders);
        log.append(
            Phase::PatternMatch,
            "pattern-matched",
            format!("topology matches '{}'; search bypassed", pattern.id),
            vec!["two-phase ring search".into()],
            "pattern registry",
            Some(payload([
                ("pattern", PayloadValue::Text(pattern.id.into())),
                ("channels", PayloadValue::Int(graph.num_channels() as i64)),
            ])),
        );
        tracing::info!("pattern '{}' matched: {}", pattern.id, graph.summary());
        return Some((graph, pattern.id.to_string()));
    }

    // Chordal ring: 8 GPUs, 6 fabric links each (the opposite link is
    // the missing one).
    if sig.n_gpus == 8 && sig.uniform_links(6) {
        let orders = parse_rings(&RINGS_8.join("|"), &identity(8), &gpu_ids);
        let graph = graph_from_orders(system, orders);
        log.note(
            Phase::PatternMatch,
            "chordal-ring-detected",
            "8 gpus with 6 fabric links each; emitting the chordal ring set",
            "chordal-ring detector",
        );
        return Some((graph, "chordal-ring-8".to_string()));
    }

    // All-to-all mesh: every GPU links every other.
    if sig.n_gpus > 1 && sig.uniform_links(sig.n_gpus - 1) {
        let orders = if sig.n_gpus == 8 {
            parse_rings(&RINGS_8.join("|"), &identity(8), &gpu_ids)
        } else {
            let forward: Vec<String> = gpu_ids.clone();
            let reverse: Vec<String> = gpu_ids.iter().rev().cloned().collect();
            vec![forward, reverse]
        };
        let graph = graph_from_orders(system, orders);
        log.note(
            Phase::PatternMatch,
            "all-to-all-detected",
            "full gpu mesh; emitting the predefined ring set",
            "all-to-all detector",
        );
        return Some((graph, "all-to-all".to_string()));
    }

    log.note(
        Phase::PatternMatch,
        "pattern-mismatch",
        "no registry pattern or detector applies",
        "pattern registry",
    );
    None
}

fn identity(n: usize) -> Vec<usize> {
    (0..n).collect()
}

/// Hunts for `perm` with `pattern.gpu_numa[i] == sig.gpu_numa[perm[i]]`
/// and connectivity equality under the permutation.
fn find_gpu_permutation(pattern: &PatternDef, sig: &TopoSignature) -> Option<Vec<usize>> {
    let n = pattern.n_gpus;
    let mut perm = vec![usize::MAX; n];
    let mut used = vec![false; n];
    let mut budget = PERMUTATION_BUDGET;

    fn assign(
        i: usize,
        pattern: &PatternDef,
        sig: &TopoSignature,
        perm: &mut Vec<usize>,
        used: &mut Vec<bool>,
        budget: &mut u64,
    ) -> bool {
        if *budget == 0 {
            return false;
        }
        *budget -= 1;
        let n = pattern.n_gpus;
        if i == n {
            return true;
        }
        for cand in 0..n {
            if used[cand] || pattern.gpu_numa[i] != sig.gpu_numa[cand] {
                continue;
            }
            let consistent = (0..i).all(|j| {
                pattern.connectivity[i * n + j] == sig.connectivity[cand * n + perm[j]]
                    && pattern.connectivity[j * n + i]
                        == sig.connectivity[perm[j] * n + cand]
            });
            if !consistent {
                continue;
            }
            perm[i] = cand;
            used[cand] = true;
            if assign(i + 1, pattern, sig, perm, used, budget) {
                return true;
            }
            used[cand] = false;
            perm[i] = usize::MAX;
            if *budget == 0 {
                return false;
            }
        }
        false
    }

    assign(0, pattern, sig, &mut perm, &mut used, &mut budget).then_some(perm)
}

/// Hunts for a NIC permutation under NUMA equality only.
fn find_nic_permutation(pattern: &PatternDef, sig: &TopoSignature) -> Option<Vec<usize>> {
    let n = pattern.n_nics;
    let mut perm = vec![usize::MAX; n];
    let mut used = vec![false; n];
    let mut budget = PERMUTATION_BUDGET;

    fn assign(
        i: usize,
        pattern: &PatternDef,
        sig: &TopoSignature,
        perm: &mut Vec<usize>,
        used: &mut Vec<bool>,
        budget: &mut u64,
    ) -> bool {
        if *budget == 0 {
            return false;
        }
        *budget -= 1;
        let n = pattern.n_nics;
        if i == n {
            return true;
        }
        for cand in 0..n {
            if used[cand] || pattern.nic_numa[i] != sig.nic_numa[cand] {
                continue;
            }
            perm[i] = cand;
            used[cand] = true;
            if assign(i + 1, pattern, sig, perm, used, budget) {
                return true;
            }
            used[cand] = false;
            perm[i] = usize::MAX;
            if *budget == 0 {
                return false;
            }
        }
        false
    }

    assign(0, pattern, sig, &mut perm, &mut used, &mut budget).then_some(perm)
}

/// Parses a pipe-separated ring string: `N`-prefixed tokens are NICs
/// and are skipped; integers are model GPU indices translated through
/// the permutation to system identities.
fn parse_rings(rings: &str, gpu_perm: &[usize], gpu_ids: &[String]) -> Vec<Vec<String>> {
    let mut orders = Vec::new();
    for segment in rings.split('|') {
        let mut order = Vec::new();
        for token in segment.split_whitespace() {
            if token.starts_with('N') {
                continue;
            }
            if let Ok(model_idx) = token.parse::<usize>() {
                order.push(gpu_ids[gpu_perm[model_idx]].clone());
            }
        }
        if !order.is_empty() {
            orders.push(order);
        }
    }
    orders
}

/// Builds the ring graph, probing the first edge of the first ring for
/// the channel bandwidth and falling back to the system maximum.
fn graph_from_orders(system: &System, orders: Vec<Vec<String>>) -> TopoGraph {
    let bandwidth = orders
        .first()
        .filter(|o| o.len() > 1)
        .and_then(|o| system.path(&o[0], &o[1]))
        .map(|p| p.bandwidth)
        .filter(|&bw| bw > 0.0)
        .unwrap_or(system.max_bandwidth);

    let channels = orders
        .into_iter()
        .enumerate()
        .map(|(i, order)| Channel::new(i, bandwidth, order))
        .collect::<Vec<_>>();

    TopoGraph {
        pattern: Pattern::Ring,
        channels,
        type_intra: PathType::Nvl,
        type_inter: PathType::Net,
        speed_intra: bandwidth,
        speed_inter: bandwidth,
    }
}

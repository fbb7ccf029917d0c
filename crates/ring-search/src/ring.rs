// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! One channel attempt: recursive backtracking over GPU orderings.
//!
//! An attempt runs at a fixed per-channel speed and path-class
//! constraint. Each starting GPU is tried in insertion order; from a
//! partial ring the unvisited candidates are enumerated, scored, and
//! recursed in score order. Recursion consumes bandwidth on the edge
//! taken and restores it on backtrack, so a failed attempt leaves the
//! remaining-bandwidth map exactly as it found it.

use crate::score::CandidateScore;
use crate::state::{edge_cost, SearchState};
use hw_topo::System;
use std::collections::HashSet;
use topo_core::speed::{DEFAULT_TIMEOUT, SAME_CHANNELS_TIMEOUT, TREE_TIMEOUT};
use topo_core::{Channel, Pattern, PathType};

/// The knobs one attempt runs under.
#[derive(Debug, Clone)]
pub(crate) struct AttemptParams {
    /// Per-channel speed, GB/s.
    pub speed: f64,
    /// All channels must share the first channel's ordering.
    pub same_channels: bool,
    /// Worst accepted intra-node path class.
    pub type_intra: PathType,
    /// Worst accepted inter-node path class.
    pub type_inter: PathType,
    /// Cross-NIC closure tier (0/1; kept for the relaxation cascade).
    pub cross_nic: i64,
    pub pattern: Pattern,
    /// Channel target for this attempt.
    pub max_channels: usize,
}

impl AttemptParams {
    /// Per-attempt iteration budget.
    pub fn budget(&self) -> u64 {
        if self.pattern == Pattern::BalancedTree {
            TREE_TIMEOUT
        } else if self.same_channels {
            SAME_CHANNELS_TIMEOUT
        } else {
            DEFAULT_TIMEOUT
        }
    }
}

/// Runs one multi-channel attempt: repeatedly search for a ring,
/// consuming bandwidth after each success, until the channel target is
/// met, a search fails, or a budget runs out. Results land in
/// `state.channels`.
pub(crate) fn run_attempt(
    system: &System,
    state: &mut SearchState,
    params: &AttemptParams,
    gpu_ids: &[String],
) {
    state.reset_attempt(system);

    if gpu_ids.len() == 1 {
        for i in 0..params.max_channels {
            state
                .channels
                .push(Channel::new(i, params.speed, vec![gpu_ids[0].clone()]));
        }
        return;
    }

    while state.channels.len() < params.max_channels
        && !state.timed_out
        && !state.global_exhausted
    {
        let order = if params.same_channels && !state.channels.is_empty() {
            // Replay channel 0's ordering; reuse_order settles every
            // edge, the closing one included.
            let first = state.channels[0].ring_order.clone();
            if !reuse_order(system, state, params, &first) {
                break;
            }
            Some(first)
        } else {
            find_ring(system, state, params, gpu_ids).map(|order| {
                // Recursion left the chain edges consumed; the closing
                // edge settles when the channel is registered.
                if params.pattern == Pattern::Ring {
                    let (last, first) = (&order[order.len() - 1], &order[0]);
                    let kind = system
                        .path(last, first)
                        .expect("closing edge was verified")
                        .kind;
                    state.consume(last, first, edge_cost(kind, params.speed));
                }
                order
            })
        };
        match order {
            Some(order) => {
                let index = state.channels.len();
                state
                    .channels
                    .push(Channel::new(index, params.speed, order));
            }
            None => break,
        }
    }
}

/// Verifies the shared ordering still has headroom on every edge and
/// consumes it. Used when `same_channels` replays channel 0's ring.
fn reuse_order(
    system: &System,
    state: &mut SearchState,
    params: &AttemptParams,
    order: &[String],
) -> bool {
    let n = order.len();
    let closing = if params.pattern == Pattern::Ring { n } else { n - 1 };
    let mut costs: Vec<(usize, usize, f64)> = Vec::with_capacity(closing);
    for i in 0..closing {
        let (src, dst) = (&order[i], &order[(i + 1) % n]);
        let Some(path) = system.path(src, dst) else { return false };
        let cost = edge_cost(path.kind, params.speed);
        if state.remaining(src, dst) < cost {
            return false;
        }
        costs.push((i, (i + 1) % n, cost));
    }
    for (i, j, cost) in costs {
        state.consume(&order[i], &order[j], cost);
    }
    true
}

/// Searches for one ring (or open chain, for tree attempts) from each
/// starting GPU in insertion order. Returns the first ordering found.
fn find_ring(
    system: &System,
    state: &mut SearchState,
    params: &AttemptParams,
    gpu_ids: &[String],
) -> Option<Vec<String>> {
    for start in gpu_ids {
        if state.timed_out || state.global_exhausted {
            return None;
        }
        let mut order = vec![start.clone()];
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.clone());
        if extend(system, state, params, gpu_ids, &mut order, &mut visited) {
            return Some(order);
        }
    }
    None
}

/// Recursive extension of a partial ordering. On success the consumed
/// edge bandwidths are left in place; on failure everything is
/// restored.
fn extend(
    system: &System,
    state: &mut SearchState,
    params: &AttemptParams,
    gpu_ids: &[String],
    order: &mut Vec<String>,
    visited: &mut HashSet<String>,
) -> bool {
    if !state.step(params.budget()) {
        return false;
    }
    let n = gpu_ids.len();
    if order.len() == n {
        return params.pattern != Pattern::Ring
            || closing_edge_ok(system, state, params, order);
    }

    let current = order[order.len() - 1].clone();
    let last_step = order.len() == n - 1;

    let mut candidates: Vec<(usize, CandidateScore)> = Vec::new();
    for (idx, g) in gpu_ids.iter().enumerate() {
        if visited.contains(g) {
            continue;
        }
        let Some(path) = system.path(&current, g) else { continue };
        if path.kind == PathType::Dis || path.kind > params.type_intra {
            continue;
        }
        if state.remaining(&current, g) < edge_cost(path.kind, params.speed) {
            continue;
        }
        if last_step && params.pattern == Pattern::Ring {
            // The closing edge must also carry this channel.
            let start = &order[0];
            let closes = match system.path(g, start) {
                Some(p) => {
                    p.kind != PathType::Dis
                        && p.kind <= params.type_intra
                        && state.remaining(g, start) >= edge_cost(p.kind, params.speed)
                }
                None => false,
            };
            if !closes {
                continue;
            }
        }
        candidates.push((idx, CandidateScore::new(system, &current, g, idx)));
    }
    candidates.sort_by(|a, b| a.1.compare(&b.1));

    for (idx, _) in candidates {
        let g = gpu_ids[idx].clone();
        let kind = system
            .path(&current, &g)
            .expect("candidate paths exist")
            .kind;
        let cost = edge_cost(kind, params.speed);

        state.consume(&current, &g, cost);
        order.push(g.clone());
        visited.insert(g.clone());

        if extend(system, state, params, gpu_ids, order, visited) {
            return true;
        }

        visited.remove(&g);
        order.pop();
        state.restore(&current, &g, cost);

        if state.timed_out || state.global_exhausted {
            return false;
        }
    }
    false
}

/// Final check that the cycle can close at this speed.
fn closing_edge_ok(
    system: &System,
    state: &SearchState,
    params: &AttemptParams,
    order: &[String],
) -> bool {
    let (last, first) = (&order[order.len() - 1], &order[0]);
    match system.path(last, first) {
        Some(p) => {
            p.kind != PathType::Dis
                && p.kind <= params.type_intra
                && state.remaining(last, first) >= edge_cost(p.kind, params.speed)
        }
        None => false,
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Mutable search state: remaining bandwidth, discovered channels, and
//! iteration budgets.
//!
//! The remaining-bandwidth map is rebuilt from the system's paths at
//! every attempt; the global iteration counter survives across attempts
//! so one search invocation can never run unbounded.

use hw_topo::System;
use std::collections::HashMap;
use topo_core::bandwidth::CROSS_CPU_TLP_FACTOR;
use topo_core::speed::GLOBAL_TIMEOUT;
use topo_core::{Channel, PathType};

/// Per-search mutable state, threaded by reference through the
/// recursive ring attempts.
#[derive(Debug, Default)]
pub(crate) struct SearchState {
    /// Remaining bandwidth per (src, dst) endpoint pair, GB/s.
    remaining: HashMap<(String, String), f64>,
    /// Channels discovered in the current attempt, in discovery order.
    pub channels: Vec<Channel>,
    /// Iterations consumed by the current attempt.
    attempt_steps: u64,
    /// Iterations consumed across all attempts of this search.
    global_steps: u64,
    /// Set when the current attempt ran out of budget.
    pub timed_out: bool,
    /// Set once the global budget is gone; no further attempts run.
    pub global_exhausted: bool,
}

impl SearchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the remaining map from the current paths and clears the
    /// per-attempt fields. The global counter is left running.
    pub fn reset_attempt(&mut self, system: &System) {
        self.remaining.clear();
        for (key, path) in system.paths() {
            self.remaining.insert(key.clone(), path.bandwidth);
        }
        self.channels.clear();
        self.attempt_steps = 0;
        self.timed_out = false;
    }

    /// Counts one search iteration against both budgets. Returns
    /// `false` — and flags the state — when a budget is exhausted.
    pub fn step(&mut self, attempt_budget: u64) -> bool {
        self.attempt_steps += 1;
        self.global_steps += 1;
        if self.global_steps > GLOBAL_TIMEOUT {
            self.timed_out = true;
            self.global_exhausted = true;
            return false;
        }
        if self.attempt_steps > attempt_budget {
            self.timed_out = true;
            return false;
        }
        true
    }

    pub fn remaining(&self, src: &str, dst: &str) -> f64 {
        self.remaining
            .get(&(src.to_string(), dst.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn consume(&mut self, src: &str, dst: &str, amount: f64) {
        if let Some(bw) = self
            .remaining
            .get_mut(&(src.to_string(), dst.to_string()))
        {
            *bw -= amount;
        }
    }

    pub fn restore(&mut self, src: &str, dst: &str, amount: f64) {
        if let Some(bw) = self
            .remaining
            .get_mut(&(src.to_string(), dst.to_string()))
        {
            *bw += amount;
        }
    }
}

/// The bandwidth actually consumed on an edge of the given path class:
/// crossing a CPU bridge costs the TLP overhead factor.
pub(crate) fn edge_cost(kind: PathType, speed: f64) -> f64 {
    if kind > PathType::Pxb {
        speed * CROSS_CPU_TLP_FACTOR
    } else {
        speed
    }
}

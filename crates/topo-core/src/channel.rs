// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Channels and topology graphs: the planner's output model.
//!
//! A [`Channel`] is one replicated collective pipeline. It always owns
//! a ring order (a Hamiltonian cycle of GPU identities) and may carry
//! tree wiring derived from that order. A [`TopoGraph`] bundles the
//! channels found for one pattern together with the link classes and
//! speeds the search settled on.
//!
//! Channels never share mutable state and never reference the `System`
//! they were planned against.

use crate::PathType;
use serde::Serialize;
use std::collections::HashMap;

/// The collective pattern a graph was planned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Ring,
    BalancedTree,
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ring => "ring",
            Self::BalancedTree => "balanced_tree",
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One collective channel.
///
/// The ring-navigation (`ring_prev`/`ring_next`) and tree lookups are
/// always present as fields but stay empty until channel setup
/// populates them.
#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    /// Index of this channel in discovery order.
    pub index: usize,
    /// Per-link bandwidth chosen by the search, in GB/s.
    pub bandwidth: f64,
    /// GPU identities visited exactly once, closing back to the head.
    pub ring_order: Vec<String>,
    /// Parent→child edges of the tree wiring, in chain order.
    pub tree_links: Vec<(String, String)>,
    #[serde(skip)]
    ring_prev: HashMap<String, String>,
    #[serde(skip)]
    ring_next: HashMap<String, String>,
    #[serde(skip)]
    tree_up: HashMap<String, String>,
    #[serde(skip)]
    tree_down: HashMap<String, Vec<String>>,
}

impl Channel {
    pub fn new(index: usize, bandwidth: f64, ring_order: Vec<String>) -> Self {
        Channel {
            index,
            bandwidth,
            ring_order,
            tree_links: Vec::new(),
            ring_prev: HashMap::new(),
            ring_next: HashMap::new(),
            tree_up: HashMap::new(),
            tree_down: HashMap::new(),
        }
    }

    /// Populates the prev/next lookups, treating the ring order as a
    /// closed loop. A single-GPU ring points at itself.
    pub fn attach_ring_lookups(&mut self) {
        self.ring_prev.clear();
        self.ring_next.clear();
        let n = self.ring_order.len();
        for i in 0..n {
            let cur = self.ring_order[i].clone();
            let next = self.ring_order[(i + 1) % n].clone();
            self.ring_next.insert(cur.clone(), next.clone());
            self.ring_prev.insert(next, cur);
        }
    }

    /// Replaces the tree wiring with a linear chain over `order`:
    /// `order[0]` is the root, each GPU's child is its successor.
    pub fn set_tree_chain(&mut self, order: &[String]) {
        self.tree_links.clear();
        self.tree_up.clear();
        self.tree_down.clear();
        for pair in order.windows(2) {
            let (parent, child) = (pair[0].clone(), pair[1].clone());
            self.tree_links.push((parent.clone(), child.clone()));
            self.tree_up.insert(child.clone(), parent.clone());
            self.tree_down.entry(parent).or_default().push(child);
        }
    }

    /// The GPU before `id` in the closed ring, if lookups are attached.
    pub fn ring_prev(&self, id: &str) -> Option<&str> {
        self.ring_prev.get(id).map(String::as_str)
    }

    /// The GPU after `id` in the closed ring, if lookups are attached.
    pub fn ring_next(&self, id: &str) -> Option<&str> {
        self.ring_next.get(id).map(String::as_str)
    }

    /// The tree parent of `id` (`None` for the root).
    pub fn tree_up(&self, id: &str) -> Option<&str> {
        self.tree_up.get(id).map(String::as_str)
    }

    /// The tree children of `id` (empty for leaves).
    pub fn tree_down(&self, id: &str) -> &[String] {
        self.tree_down.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of GPUs on the ring.
    pub fn len(&self) -> usize {
        self.ring_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring_order.is_empty()
    }
}

/// The channels found for one pattern, plus the link classes and speeds
/// the search settled on. Immutable once returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TopoGraph {
    pub pattern: Pattern,
    pub channels: Vec<Channel>,
    /// Worst intra-node path class the channels traverse.
    pub type_intra: PathType,
    /// Worst inter-node path class the channels traverse.
    pub type_inter: PathType,
    /// Chosen per-channel speed inside a node, GB/s.
    pub speed_intra: f64,
    /// Chosen per-channel speed across nodes, GB/s.
    pub speed_inter: f64,
}

impl TopoGraph {
    /// A graph with no channels (the `no-feasible-plan` shape).
    pub fn empty(pattern: Pattern) -> Self {
        TopoGraph {
            pattern,
            channels: Vec::new(),
            type_intra: PathType::Loc,
            type_inter: PathType::Loc,
            speed_intra: 0.0,
            speed_inter: 0.0,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Aggregate bandwidth: per-channel speed times channel count.
    pub fn total_bandwidth(&self) -> f64 {
        self.speed_intra * self.channels.len() as f64
    }

    /// Iterates channels in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Human-readable one-liner for logs and reports.
    pub fn summary(&self) -> String {
        format!(
            "{} graph: {} channels, intra {}/{:.1} GB/s, inter {}/{:.1} GB/s",
            self.pattern,
            self.channels.len(),
            self.type_intra,
            self.speed_intra,
            self.type_inter,
            self.speed_inter,
        )
    }
}

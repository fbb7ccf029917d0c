// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tree wiring derived from ring orders.
//!
//! Every ring channel yields one tree channel whose edges form a linear
//! chain along the ring order: the head GPU is the root, each GPU
//! parents its successor, the tail is the leaf. Channel setup then
//! doubles the set: tree channel `2i` follows ring `i` forward, channel
//! `2i+1` follows it reversed.

use topo_core::{Channel, Pattern, TopoGraph};

/// Builds the tree graph from a ring graph's orderings.
///
/// Speeds and link classes inherit from the ring graph unless an
/// independent balanced-tree search produced non-zero speeds, in which
/// case those override.
pub fn derive_tree_graph(ring_graph: &TopoGraph, tree_search: &TopoGraph) -> TopoGraph {
    let (type_intra, type_inter, speed_intra, speed_inter) =
        if tree_search.speed_intra > 0.0 {
            (
                tree_search.type_intra,
                tree_search.type_inter,
                tree_search.speed_intra,
                tree_search.speed_inter,
            )
        } else {
            (
                ring_graph.type_intra,
                ring_graph.type_inter,
                ring_graph.speed_intra,
                ring_graph.speed_inter,
            )
        };

    let channels = ring_graph
        .channels
        .iter()
        .map(|c| {
            let mut tree = Channel::new(c.index, c.bandwidth, c.ring_order.clone());
            tree.set_tree_chain(&c.ring_order);
            tree
        })
        .collect();

    TopoGraph {
        pattern: Pattern::BalancedTree,
        channels,
        type_intra,
        type_inter,
        speed_intra,
        speed_inter,
    }
}

/// Emits twice as many tree channels: `2i` with the forward chain,
/// `2i+1` with the same order reversed.
pub fn double_tree_channels(tree: &TopoGraph) -> TopoGraph {
    let mut channels = Vec::with_capacity(tree.channels.len() * 2);
    for c in &tree.channels {
        let forward = c.ring_order.clone();
        let mut fwd = Channel::new(2 * c.index, c.bandwidth, forward.clone());
        fwd.set_tree_chain(&forward);
        channels.push(fwd);

        let reversed: Vec<String> = c.ring_order.iter().rev().cloned().collect();
        let mut rev = Channel::new(2 * c.index + 1, c.bandwidth, reversed.clone());
        rev.set_tree_chain(&reversed);
        channels.push(rev);
    }
    TopoGraph {
        pattern: Pattern::BalancedTree,
        channels,
        type_intra: tree.type_intra,
        type_inter: tree.type_inter,
        speed_intra: tree.speed_intra,
        speed_inter: tree.speed_inter,
    }
}

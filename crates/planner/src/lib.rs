// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # planner
//!
//! The init driver: one call turns a hardware description plus options
//! into a [`Plan`].
//!
//! ```text
//! build → paths → trim → paths → (pattern match | ring search)
//!       → tree search → ring setup → channel setup → Plan
//! ```
//!
//! The pipeline is strictly sequential and deterministic; every phase
//! appends to the decision log the caller receives back. Scale-unit
//! (multi-server) descriptions take a fast path: the topology is built
//! and returned with empty channel graphs, since per-server analysis is
//! meant to run on filtered single-server views.

mod error;

pub use error::PlanError;

use decision_log::{payload, DecisionLog, PayloadValue, Phase};
use hw_topo::{HardwareDesc, ScaleUnit, System};
use topo_core::speed::MAX_CHANNELS;
use topo_core::{GpuFamily, OptionId, Options, Pattern, TopoGraph};

/// The planner's complete output.
#[derive(Debug)]
pub struct Plan {
    /// The (possibly trimmed) topology with its best-path map.
    pub system: System,
    /// Ring channels with prev/next lookups attached.
    pub ring_graph: TopoGraph,
    /// Doubled tree channels (forward and reverse chains).
    pub tree_graph: TopoGraph,
    /// Every decision made along the way, in order.
    pub log: DecisionLog,
    /// Identifier of the matched pattern, when the search was bypassed.
    pub matched_pattern: Option<String>,
}

impl Plan {
    /// Human-readable one-liner for reports.
    pub fn summary(&self) -> String {
        format!(
            "{}; {}; {}; {} log entries{}",
            self.system.summary(),
            self.ring_graph.summary(),
            self.tree_graph.summary(),
            self.log.len(),
            match &self.matched_pattern {
                Some(id) => format!(", pattern '{id}'"),
                None => String::new(),
            },
        )
    }
}

/// Computes a plan for one hardware description.
///
/// Fails only on structurally impossible input; everything else is
/// in-band (empty graphs, `DIS` paths, log entries).
pub fn plan(
    desc: &HardwareDesc,
    scale: Option<&ScaleUnit>,
    options: &Options,
) -> Result<Plan, PlanError> {
    let mut log = DecisionLog::new();
    log.append(
        Phase::SearchInit,
        "plan-start",
        "planning a channel layout from the declarative description",
        Vec::new(),
        desc.name.clone(),
        Some(payload([
            ("gpus", PayloadValue::Int(desc.gpu.count as i64)),
            ("cpus", PayloadValue::Int(desc.cpu.count as i64)),
            ("nics", PayloadValue::Int(desc.nic.count as i64)),
            (
                "servers",
                PayloadValue::Int(scale.map_or(1, |s| s.server_count) as i64),
            ),
        ])),
    );

    let mut system = hw_topo::build(desc, scale, &mut log)?;

    if scale.is_some() {
        log.note(
            Phase::SearchInit,
            "multi-node-fast-path",
            "per-server analysis runs on a filtered single-server view; \
             paths and channel search deferred",
            "scale-unit contract",
        );
        tracing::info!("multi-node fast path: returning bare topology");
        return Ok(Plan {
            system,
            ring_graph: TopoGraph::empty(Pattern::Ring),
            tree_graph: TopoGraph::empty(Pattern::BalancedTree),
            log,
            matched_pattern: None,
        });
    }

    path_engine::compute_paths(&mut system, options, &mut log);
    path_engine::trim_system(&mut system, &mut log);
    // Trim can change reachability, so paths are recomputed on the
    // surviving graph.
    path_engine::compute_paths(&mut system, options, &mut log);
    debug_assert!(path_engine::all_reach_a_gpu(&system));

    let (min_channels, max_channels) = resolve_channel_bounds(options, &mut log);

    let mut matched_pattern = None;
    let mut ring_graph = None;
    if desc.gpu.family == GpuFamily::Amd {
        if let Some((graph, id)) =
            pattern_match::match_pattern(&system, options, &mut log)
        {
            matched_pattern = Some(id);
            ring_graph = Some(graph);
        }
    }
    let mut ring_graph = match ring_graph {
        Some(graph) => graph,
        None => {
            let ring_max = usize::max(1, max_channels / 2);
            ring_search::search_channels(
                &system,
                options,
                Pattern::Ring,
                min_channels,
                ring_max,
                &mut log,
            )
        }
    };

    // Independent balanced-tree pass; its speeds and link classes
    // override the ring graph's in the derived tree wiring.
    let tree_max = usize::max(1, ring_graph.num_channels());
    let tree_search = ring_search::search_channels(
        &system,
        options,
        Pattern::BalancedTree,
        1,
        tree_max,
        &mut log,
    );
    let tree_base = ring_search::derive_tree_graph(&ring_graph, &tree_search);

    // Ring setup: prev/next lookups, the order treated as a closed loop.
    for channel in ring_graph.channels.iter_mut() {
        channel.attach_ring_lookups();
    }
    log.note(
        Phase::ChannelSetup,
        "ring-setup",
        "prev/next lookups attached to every ring channel",
        "ring setup rule",
    );

    let tree_graph = ring_search::double_tree_channels(&tree_base);
    log.append(
        Phase::ChannelSetup,
        "tree-doubling",
        "forward and reverse tree chains emitted per ring channel",
        Vec::new(),
        "channel doubling rule",
        Some(payload([
            (
                "ring_channels",
                PayloadValue::Int(ring_graph.num_channels() as i64),
            ),
            (
                "tree_channels",
                PayloadValue::Int(tree_graph.num_channels() as i64),
            ),
        ])),
    );

    let plan = Plan {
        system,
        ring_graph,
        tree_graph,
        log,
        matched_pattern,
    };
    tracing::info!("{}", plan.summary());
    Ok(plan)
}

/// Resolves the channel bounds from the options: `auto` means
/// `[1, 64]`, and an inverted pair is repaired to equality at
/// `min(64, minChannels)`.
fn resolve_channel_bounds(options: &Options, log: &mut DecisionLog) -> (usize, usize) {
    let mut min_channels = options
        .num(OptionId::MinChannels)
        .map(|v| v.max(1) as usize)
        .unwrap_or(1);
    let mut max_channels = options
        .num(OptionId::MaxChannels)
        .map(|v| (v.max(1) as usize).min(MAX_CHANNELS))
        .unwrap_or(MAX_CHANNELS);
    if min_channels > max_channels {
        let repaired = min_channels.min(MAX_CHANNELS);
        min_channels = repaired;
        max_channels = repaired;
    }

    log.append(
        Phase::SearchInit,
        "channel-bounds",
        "channel bounds resolved from options",
        Vec::new(),
        "min-channels / max-channels options",
        Some(payload([
            ("min", PayloadValue::Int(min_channels as i64)),
            ("max", PayloadValue::Int(max_channels as i64)),
        ])),
    );
    (min_channels, max_channels)
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The two-phase outer search loop.
//!
//! Phase 1 walks the generation's speed array from fast to slow. At
//! each speed it runs attempts under the current constraint tier and,
//! when an attempt falls short, relaxes exactly one constraint:
//!
//! 1. drop the shared-ring-order requirement (same speed),
//! 2. fall back from balanced-tree to ring on SM90+ parts,
//! 3. widen the accepted intra-node path class,
//! 4. widen the accepted inter-node path class,
//! 5. permit cross-NIC ring closure (auto mode only),
//! 6. step down to the next speed.
//!
//! An attempt that reaches the channel floor becomes the best-so-far
//! when it strictly improves aggregate bandwidth; an attempt that
//! saturates the system's total bandwidth within budget ends the phase
//! early. Phase 2 then retries the winning tier at higher speeds and
//! keeps strict improvements only.

use crate::ring::{run_attempt, AttemptParams};
use crate::state::SearchState;
use decision_log::{payload, DecisionLog, PayloadValue, Phase};
use hw_topo::System;
use topo_core::bandwidth::CHANNEL_DOUBLING_MIN_SPEED;
use topo_core::speed::speed_array;
use topo_core::{
    CpuArch, CpuVendor, GpuFamily, OptionId, Options, Pattern, PathType,
    TopoGraph,
};

/// The best solution captured so far, with the knobs that produced it.
struct Best {
    graph: TopoGraph,
    speed_idx: usize,
    same_channels: bool,
}

/// Searches for a channel graph for `pattern`, honoring the channel
/// bounds. Always returns a graph — zero channels plus a
/// `no-feasible-plan` log entry when nothing fits.
pub fn search_channels(
    system: &System,
    options: &Options,
    pattern: Pattern,
    min_channels: usize,
    max_channels: usize,
    log: &mut DecisionLog,
) -> TopoGraph {
    let phase = match pattern {
        Pattern::Ring => Phase::RingSearch,
        Pattern::BalancedTree => Phase::TreeSearch,
    };
    let gpu_ids: Vec<String> = system.gpus().map(|n| n.id.clone()).collect();
    if gpu_ids.is_empty() {
        log.note(phase, "no-feasible-plan", "no gpus to search over", "gpu inventory");
        return TopoGraph::empty(pattern);
    }

    let (min_intra, max_intra) = intra_type_range(system);
    let (min_inter, max_inter) = inter_type_range(system);

    // AMD parts carry gfx-style generation codes; they always use the
    // default speed tier.
    let effective_gen = match system.gpu_family() {
        Some(GpuFamily::Amd) => 80,
        _ => system.min_gpu_generation().unwrap_or(80),
    };
    let speeds = speed_array(effective_gen, system.inter_node);

    let n = gpu_ids.len() as f64;
    let search_cap = if pattern == Pattern::BalancedTree && gpu_ids.len() > 1 {
        system.total_bandwidth * n / (n - 1.0)
    } else {
        system.total_bandwidth
    };
    let mut speed_idx = speeds
        .iter()
        .position(|&s| s <= system.max_bandwidth && s * min_channels as f64 <= search_cap)
        .unwrap_or(speeds.len() - 1);

    log.append(
        phase,
        "search-start",
        "speed array and path-class ranges established",
        Vec::new(),
        "speed selection rule",
        Some(payload([
            ("start_speed", PayloadValue::Float(speeds[speed_idx])),
            ("min_intra", PayloadValue::Text(min_intra.as_str().into())),
            ("max_intra", PayloadValue::Text(max_intra.as_str().into())),
            ("min_channels", PayloadValue::Int(min_channels as i64)),
            ("max_channels", PayloadValue::Int(max_channels as i64)),
        ])),
    );

    let amd_cpu = matches!(
        system.cpu_profile(),
        Some((CpuArch::X86, CpuVendor::Amd))
    );
    let cross_nic_auto = options.num(OptionId::CrossNic) == Some(2);

    let mut state = SearchState::new();
    let mut same_channels = true;
    let mut type_intra = min_intra;
    let mut type_inter = min_inter;
    let mut cur_pattern = pattern;
    let mut cross_nic: i64 = if cross_nic_auto {
        0
    } else {
        options.num(OptionId::CrossNic).unwrap_or(0)
    };
    let mut best: Option<Best> = None;

    // ── Phase 1: find any saturating solution ──────────────────────
    loop {
        let speed = speeds[speed_idx];
        let params = AttemptParams {
            speed,
            same_channels,
            type_intra,
            type_inter,
            cross_nic,
            pattern: cur_pattern,
            max_channels,
        };
        run_attempt(system, &mut state, &params, &gpu_ids);
        let nch = state.channels.len();
        log.append(
            phase,
            "attempt",
            "channel attempt at the current tier",
            Vec::new(),
            "two-phase search",
            Some(payload([
                ("speed", PayloadValue::Float(speed)),
                ("channels", PayloadValue::Int(nch as i64)),
                ("same_channels", PayloadValue::Flag(params.same_channels)),
                ("type_intra", PayloadValue::Text(params.type_intra.as_str().into())),
                ("type_inter", PayloadValue::Text(params.type_inter.as_str().into())),
                ("cross_nic", PayloadValue::Int(params.cross_nic)),
                ("timed_out", PayloadValue::Flag(state.timed_out)),
            ])),
        );

        if nch >= min_channels {
            let product = speed * nch as f64;
            let best_product = best.as_ref().map_or(0.0, |b| b.graph.total_bandwidth());
            if product > best_product {
                best = Some(Best {
                    graph: graph_from(&state, cur_pattern, type_intra, type_inter, speed),
                    speed_idx,
                    same_channels,
                });

                // Conservative duplication: at high speeds, try doubling
                // the channel count and keep it only on strict gain.
                if speed >= CHANNEL_DOUBLING_MIN_SPEED
                    && nch < max_channels
                    && !state.global_exhausted
                {
                    let target = (nch * 2).min(max_channels);
                    let double_params = AttemptParams {
                        same_channels: false,
                        max_channels: target,
                        ..params.clone()
                    };
                    run_attempt(system, &mut state, &double_params, &gpu_ids);
                    let doubled = speed * state.channels.len() as f64;
                    if doubled > product {
                        best = Some(Best {
                            graph: graph_from(
                                &state, cur_pattern, type_intra, type_inter, speed,
                            ),
                            speed_idx,
                            same_channels: false,
                        });
                        log.note(
                            phase,
                            "channel-doubling",
                            format!(
                                "doubled to {} channels; aggregate strictly improved",
                                state.channels.len()
                            ),
                            "channel doubling rule",
                        );
                    } else {
                        log.note(
                            phase,
                            "channel-doubling-rejected",
                            "doubling did not strictly improve aggregate bandwidth",
                            "channel doubling rule",
                        );
                    }
                }
            }

            if !state.timed_out && product >= system.total_bandwidth {
                log.note(
                    phase,
                    "optimal-accepted",
                    "attempt saturates total bandwidth within budget",
                    "phase-1 acceptance rule",
                );
                break;
            }
        }

        if state.global_exhausted {
            log.note(
                phase,
                "search-budget-exhausted",
                "global iteration budget spent; keeping best so far",
                "global timeout",
            );
            break;
        }

        // Relaxation cascade: exactly one step per failed acceptance.
        if same_channels && !(amd_cpu && type_intra == PathType::Sys) {
            same_channels = false;
        } else if effective_gen >= 90 && cur_pattern == Pattern::BalancedTree {
            cur_pattern = Pattern::Ring;
            same_channels = true;
        } else if type_intra < max_intra {
            type_intra = type_intra.next_worse().unwrap_or(max_intra);
            same_channels = true;
        } else if system.inter_node && type_inter < max_inter {
            type_inter = type_inter.next_worse().unwrap_or(max_inter);
            same_channels = true;
        } else if system.inter_node && cross_nic_auto && cross_nic == 0 {
            cross_nic = 1;
            same_channels = true;
        } else if speed_idx + 1 < speeds.len() {
            speed_idx += 1;
            same_channels = true;
        } else {
            break;
        }
    }

    // ── Phase 2: climb back up the speed array ─────────────────────
    let snapshot = best.as_ref().map(|b| {
        (
            b.speed_idx,
            b.same_channels,
            b.graph.type_intra,
            b.graph.type_inter,
            b.graph.pattern,
            b.graph.num_channels(),
        )
    });
    if let Some((b_idx, b_same, b_ti, b_te, b_pattern, b_channels)) = snapshot {
        let mut idx = b_idx;
        while idx > 0 && !state.global_exhausted {
            idx -= 1;
            let speed = speeds[idx];
            let params = AttemptParams {
                speed,
                same_channels: b_same,
                type_intra: b_ti,
                type_inter: b_te,
                cross_nic,
                pattern: b_pattern,
                max_channels: b_channels,
            };
            run_attempt(system, &mut state, &params, &gpu_ids);
            let product = speed * state.channels.len() as f64;
            let current = best.as_ref().map_or(0.0, |b| b.graph.total_bandwidth());
            if state.channels.len() >= min_channels && product > current {
                best = Some(Best {
                    graph: graph_from(&state, b_pattern, b_ti, b_te, speed),
                    speed_idx: idx,
                    same_channels: b_same,
                });
                log.note(
                    phase,
                    "speed-upgraded",
                    format!("higher speed {speed} strictly improves aggregate"),
                    "phase-2 rule",
                );
            } else {
                break;
            }
        }
    }

    match best {
        Some(b) => {
            log.append(
                phase,
                "search-complete",
                "best channel set selected",
                Vec::new(),
                "two-phase search",
                Some(payload([
                    ("channels", PayloadValue::Int(b.graph.num_channels() as i64)),
                    ("speed", PayloadValue::Float(b.graph.speed_intra)),
                    (
                        "type_intra",
                        PayloadValue::Text(b.graph.type_intra.as_str().into()),
                    ),
                ])),
            );
            tracing::info!("{}", b.graph.summary());
            b.graph
        }
        None => {
            log.note(
                phase,
                "no-feasible-plan",
                "all speeds and relaxations exhausted without reaching the channel floor",
                "two-phase search",
            );
            tracing::warn!("search found no feasible {pattern} plan");
            TopoGraph::empty(pattern)
        }
    }
}

fn graph_from(
    state: &SearchState,
    pattern: Pattern,
    type_intra: PathType,
    type_inter: PathType,
    speed: f64,
) -> TopoGraph {
    TopoGraph {
        pattern,
        channels: state.channels.clone(),
        type_intra,
        type_inter,
        speed_intra: speed,
        speed_inter: speed,
    }
}

/// Min and max path class over stored GPU-GPU routes.
fn intra_type_range(system: &System) -> (PathType, PathType) {
    let gpu_ids: Vec<&str> = system.gpus().map(|n| n.id.as_str()).collect();
    let mut range: Option<(PathType, PathType)> = None;
    for &a in &gpu_ids {
        for &b in &gpu_ids {
            if a == b {
                continue;
            }
            if let Some(p) = system.path(a, b) {
                range = Some(match range {
                    None => (p.kind, p.kind),
                    Some((lo, hi)) => (lo.min(p.kind), hi.max(p.kind)),
                });
            }
        }
    }
    range.unwrap_or((PathType::Pix, PathType::Phb))
}

/// Min and max path class over stored GPU-NIC routes, for inter-node
/// systems.
fn inter_type_range(system: &System) -> (PathType, PathType) {
    if !system.inter_node {
        return (PathType::Sys, PathType::Net);
    }
    let mut range: Option<(PathType, PathType)> = None;
    for gpu in system.gpus() {
        for nic in system.nics() {
            if let Some(p) = system.path(&gpu.id, &nic.id) {
                range = Some(match range {
                    None => (p.kind, p.kind),
                    Some((lo, hi)) => (lo.min(p.kind), hi.max(p.kind)),
                });
            }
        }
    }
    range.unwrap_or((PathType::Net, PathType::Net))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hw_topo::{
        CpuDesc, GpuDesc, HardwareDesc, NicDesc, NvSwitchDesc, PcieDesc,
    };
    use path_engine::{compute_paths, trim_system};
    use std::collections::HashSet;
    use topo_core::speed::SPEEDS_SM90_INTRA;

    fn dgx_desc() -> HardwareDesc {
        HardwareDesc {
            name: "dgx-h100".into(),
            gpu: GpuDesc {
                count: 8,
                family: GpuFamily::Nvidia,
                generation_code: 90,
                nvlinks_per_pair: 0,
                gdr_support: true,
            },
            cpu: CpuDesc {
                count: 2,
                arch: CpuArch::X86,
                vendor: CpuVendor::Intel,
                model: topo_core::bandwidth::CPU_MODEL_INTEL_SRP,
            },
            nic: NicDesc {
                count: 8,
                speed_gbs: 50.0,
                gdr_support: true,
                coll_support: false,
            },
            pcie: PcieDesc {
                gen: 5,
                width: 16,
                switches_per_cpu: 2,
            },
            nvswitch: NvSwitchDesc { count: 4 },
            numa_mapping: vec![0, 0, 0, 0, 1, 1, 1, 1],
        }
    }

    fn planned_system(desc: &HardwareDesc) -> (System, DecisionLog) {
        let mut log = DecisionLog::new();
        let mut sys = hw_topo::build(desc, None, &mut log).unwrap();
        let opts = Options::new();
        compute_paths(&mut sys, &opts, &mut log);
        trim_system(&mut sys, &mut log);
        compute_paths(&mut sys, &opts, &mut log);
        (sys, log)
    }

    #[test]
    fn test_dgx_ring_search_finds_channels() {
        let (sys, mut log) = planned_system(&dgx_desc());
        let graph =
            search_channels(&sys, &Options::new(), Pattern::Ring, 1, 16, &mut log);

        assert!(graph.num_channels() >= 1);
        assert!(SPEEDS_SM90_INTRA.contains(&graph.speed_intra));
        assert_eq!(graph.type_intra, PathType::Nvl);

        for channel in graph.iter() {
            // Hamiltonian: every GPU exactly once.
            assert_eq!(channel.ring_order.len(), 8);
            let unique: HashSet<&String> = channel.ring_order.iter().collect();
            assert_eq!(unique.len(), 8);
            // Every consecutive pair (closing included) has a stored
            // route at least as fast as the channel.
            let n = channel.ring_order.len();
            for i in 0..n {
                let (a, b) = (&channel.ring_order[i], &channel.ring_order[(i + 1) % n]);
                let p = sys.path(a, b).expect("ring edge has a stored route");
                assert!(p.bandwidth >= channel.bandwidth);
            }
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let (sys, _) = planned_system(&dgx_desc());
        let mut log1 = DecisionLog::new();
        let mut log2 = DecisionLog::new();
        let g1 = search_channels(&sys, &Options::new(), Pattern::Ring, 1, 16, &mut log1);
        let g2 = search_channels(&sys, &Options::new(), Pattern::Ring, 1, 16, &mut log2);

        assert_eq!(g1.num_channels(), g2.num_channels());
        assert_eq!(g1.speed_intra, g2.speed_intra);
        for (a, b) in g1.iter().zip(g2.iter()) {
            assert_eq!(a.ring_order, b.ring_order);
        }
    }

    #[test]
    fn test_single_gpu_emits_trivial_channels() {
        let mut desc = dgx_desc();
        desc.gpu.count = 1;
        desc.nic.count = 1;
        desc.nvswitch.count = 0;
        desc.numa_mapping = vec![0];
        let (sys, mut log) = planned_system(&desc);

        let graph =
            search_channels(&sys, &Options::new(), Pattern::Ring, 1, 4, &mut log);
        assert_eq!(graph.num_channels(), 4);
        for c in graph.iter() {
            assert_eq!(c.ring_order.len(), 1);
        }
    }

    #[test]
    fn test_disconnected_gpus_yield_no_plan() {
        let mut log = DecisionLog::new();
        let mut sys = System::new("disconnected");
        for i in 0..2 {
            sys.add_node(
                format!("gpu-{i}"),
                None,
                hw_topo::NodeAttr::Gpu {
                    dev: i,
                    rank: i,
                    generation: 90,
                    family: GpuFamily::Nvidia,
                    gdr: true,
                },
            )
            .unwrap();
        }
        let opts = Options::new();
        compute_paths(&mut sys, &opts, &mut log);
        trim_system(&mut sys, &mut log);

        let graph = search_channels(&sys, &opts, Pattern::Ring, 1, 4, &mut log);
        assert_eq!(graph.num_channels(), 0);
        assert!(log.has_action("no-feasible-plan"));
    }

    #[test]
    fn test_min_channels_one_max_one() {
        let (sys, mut log) = planned_system(&dgx_desc());
        let graph =
            search_channels(&sys, &Options::new(), Pattern::Ring, 1, 1, &mut log);
        assert_eq!(graph.num_channels(), 1);
    }

    #[test]
    fn test_amd_mesh_uses_default_speed_tier() {
        let mut desc = dgx_desc();
        desc.name = "mi300x".into();
        desc.gpu.family = GpuFamily::Amd;
        desc.gpu.generation_code = 942;
        desc.nvswitch.count = 0;
        desc.cpu.vendor = CpuVendor::Amd;
        desc.cpu.model = 0x11;
        let (sys, mut log) = planned_system(&desc);

        let graph =
            search_channels(&sys, &Options::new(), Pattern::Ring, 1, 16, &mut log);
        assert!(graph.num_channels() >= 1);
        assert!(topo_core::speed::SPEEDS_PRE_SM90_INTRA.contains(&graph.speed_intra));
        // Full xGMI mesh: every route is direct NVL at 48.
        assert_eq!(graph.type_intra, PathType::Nvl);
    }

    #[test]
    fn test_tree_search_produces_chains() {
        let (sys, mut log) = planned_system(&dgx_desc());
        let graph = search_channels(
            &sys,
            &Options::new(),
            Pattern::BalancedTree,
            1,
            4,
            &mut log,
        );
        assert!(graph.num_channels() >= 1);
        for c in graph.iter() {
            assert_eq!(c.ring_order.len(), 8);
        }
    }
}

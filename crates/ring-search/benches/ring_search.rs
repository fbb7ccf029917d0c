// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the two-phase channel search.

use criterion::{criterion_group, criterion_main, Criterion};
use decision_log::DecisionLog;
use hw_topo::{
    CpuDesc, GpuDesc, HardwareDesc, NicDesc, NvSwitchDesc, PcieDesc, System,
};
use path_engine::{compute_paths, trim_system};
use ring_search::search_channels;
use topo_core::{CpuArch, CpuVendor, GpuFamily, Options, Pattern};

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

fn planned_system() -> System {
    let mut log = DecisionLog::new();
    let mut sys = hw_topo::build(&dgx_desc(), None, &mut log).unwrap();
    let opts = Options::new();
    compute_paths(&mut sys, &opts, &mut log);
    trim_system(&mut sys, &mut log);
    compute_paths(&mut sys, &opts, &mut log);
    sys
}

fn bench_ring_search(c: &mut Criterion) {
    let sys = planned_system();
    let opts = Options::new();
    c.bench_function("ring_search_dgx8", |b| {
        b.iter(|| {
            let mut log = DecisionLog::new();
            search_channels(&sys, &opts, Pattern::Ring, 1, 16, &mut log)
        })
    });
}

fn bench_path_computation(c: &mut Criterion) {
    let desc = dgx_desc();
    let opts = Options::new();
    c.bench_function("compute_paths_dgx8", |b| {
        b.iter(|| {
            let mut log = DecisionLog::new();
            let mut sys = hw_topo::build(&desc, None, &mut log).unwrap();
            compute_paths(&mut sys, &opts, &mut log);
            sys
        })
    });
}

criterion_group!(benches, bench_ring_search, bench_path_computation);
criterion_main!(benches);

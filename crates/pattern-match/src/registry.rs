// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The built-in pattern registry.
//!
//! Each pattern is a literal record modeling one shipped machine:
//! counts, NUMA arrays, the GPU connectivity matrix in row-major form,
//! a compact per-CPU `"<gpuCount><nicCount>"` signature, and a
//! pipe-separated string of pre-computed ring orderings. Ring tokens
//! prefixed with `N` name NICs and are skipped during translation.
//!
//! The registry is a build-time constant; iteration order is
//! declaration order.

/// One known hardware shape with its pre-computed rings.
#[derive(Debug, Clone)]
pub struct PatternDef {
    pub id: &'static str,
    pub n_gpus: usize,
    pub n_cpus: usize,
    pub n_nics: usize,
    /// xGMI links per GPU (outgoing, to other GPUs).
    pub links_per_gpu: usize,
    /// NUMA domain per model GPU.
    pub gpu_numa: &'static [usize],
    /// NUMA domain per model NIC.
    pub nic_numa: &'static [usize],
    /// `n_gpus × n_gpus` row-major adjacency; 1 where a direct link exists.
    pub connectivity: &'static [u8],
    /// Optional `n_gpus × n_nics` GPU-direct-RDMA level matrix.
    pub gdr_matrix: Option<&'static [u8]>,
    /// Concatenated per-CPU `"<gpuCount><nicCount>"`.
    pub numa_signature: &'static str,
    /// Pipe-separated ring orderings over model GPU indices.
    pub rings: &'static str,
}

/// 8-GPU full xGMI mesh (every pair directly linked).
#[rustfmt::skip]
const FULL_MESH_8: [u8; 64] = [
    0, 1, 1, 1, 1, 1, 1, 1,
    1, 0, 1, 1, 1, 1, 1, 1,
    1, 1, 0, 1, 1, 1, 1, 1,
    1, 1, 1, 0, 1, 1, 1, 1,
    1, 1, 1, 1, 0, 1, 1, 1,
    1, 1, 1, 1, 1, 0, 1, 1,
    1, 1, 1, 1, 1, 1, 0, 1,
    1, 1, 1, 1, 1, 1, 1, 0,
];

/// 4-GPU full xGMI mesh.
#[rustfmt::skip]
const FULL_MESH_4: [u8; 16] = [
    0, 1, 1, 1,
    1, 0, 1, 1,
    1, 1, 0, 1,
    1, 1, 1, 0,
];

/// The known patterns, in match-priority order.
pub fn registry() -> &'static [PatternDef] {
    static PATTERNS: [PatternDef; 2] = [
        // HGX-class 8-way MI300X: two sockets, four GPUs and four NICs
        // per socket, full 7-link mesh. Rings step the mesh at strides
        // coprime to 8 so the four orderings stay edge-disjoint.
        PatternDef {
            id: "hgx-mi300x-8",
            n_gpus: 8,
            n_cpus: 2,
            n_nics: 8,
            links_per_gpu: 7,
            gpu_numa: &[0, 0, 0, 0, 1, 1, 1, 1],
            nic_numa: &[0, 0, 0, 0, 1, 1, 1, 1],
            connectivity: &FULL_MESH_8,
            gdr_matrix: None,
            numa_signature: "4444",
            rings: "N0 0 1 2 3 4 5 6 7|N1 0 3 6 1 4 7 2 5|N2 0 5 2 7 4 1 6 3|N3 0 7 6 5 4 3 2 1",
        },
        // 4-way MI210 board: one GPU/NIC pair per PCIe root, two
        // sockets, full 3-link mesh.
        PatternDef {
            id: "mi210-4",
            n_gpus: 4,
            n_cpus: 2,
            n_nics: 4,
            links_per_gpu: 3,
            gpu_numa: &[0, 0, 1, 1],
            nic_numa: &[0, 0, 1, 1],
            connectivity: &FULL_MESH_4,
            gdr_matrix: None,
            numa_signature: "2222",
            rings: "N0 0 1 2 3|N2 0 3 2 1",
        },
    ];
    &PATTERNS
}

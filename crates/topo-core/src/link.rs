// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Link taxonomy: the kinds of physical interconnect an edge can model.

/// The kind of interconnect a directed edge traverses.
///
/// `Loc` is the implicit self-loop: it is never stored as a configured
/// link, but hop classification and path seeding use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkType {
    /// Self-loop (implicit; not stored in the link list).
    Loc,
    /// Direct NVLink or equivalent GPU–GPU / GPU–NVSwitch fabric.
    Nvl,
    /// Chip-to-chip coherent link.
    C2c,
    /// Any PCIe hop (GPU↔switch, switch↔CPU, NIC↔switch).
    Pci,
    /// Cross-socket CPU interconnect.
    Sys,
    /// Inter-node network link.
    Net,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loc => "LOC",
            Self::Nvl => "NVL",
            Self::C2c => "C2C",
            Self::Pci => "PCI",
            Self::Sys => "SYS",
            Self::Net => "NET",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

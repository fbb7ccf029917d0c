// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for plan computation.

/// Errors that abort plan computation.
///
/// Only structurally impossible input aborts; every soft condition
/// (missing paths, infeasible searches, exhausted budgets) is expressed
/// in-band through `DIS` paths, empty graphs, and decision-log entries.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The hardware description is structurally impossible.
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] hw_topo::BuildError),
}

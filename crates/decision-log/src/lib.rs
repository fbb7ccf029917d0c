// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # decision-log
//!
//! An append-only, step-numbered record of every planning decision.
//!
//! Each planner phase receives the log and appends entries describing
//! what it chose, why, and what the alternatives were. The log is part
//! of the returned plan, so every channel layout is auditable after the
//! fact. Step indices increase monotonically in the exact order phases
//! executed.
//!
//! The log is process-local and single-threaded like the rest of the
//! planner; snapshots are defensive copies.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// The planning phase an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[serde(rename = "topoBuild")]
    TopoBuild,
    #[serde(rename = "computePaths")]
    ComputePaths,
    #[serde(rename = "trimSystem")]
    TrimSystem,
    #[serde(rename = "searchInit")]
    SearchInit,
    #[serde(rename = "ringSearch")]
    RingSearch,
    #[serde(rename = "treeSearch")]
    TreeSearch,
    #[serde(rename = "channelSetup")]
    ChannelSetup,
    #[serde(rename = "patternMatch")]
    PatternMatch,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopoBuild => "topoBuild",
            Self::ComputePaths => "computePaths",
            Self::TrimSystem => "trimSystem",
            Self::SearchInit => "searchInit",
            Self::RingSearch => "ringSearch",
            Self::TreeSearch => "treeSearch",
            Self::ChannelSetup => "channelSetup",
            Self::PatternMatch => "patternMatch",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed payload value attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Flag(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for PayloadValue {
    fn from(v: bool) -> Self {
        PayloadValue::Flag(v)
    }
}
impl From<i64> for PayloadValue {
    fn from(v: i64) -> Self {
        PayloadValue::Int(v)
    }
}
impl From<usize> for PayloadValue {
    fn from(v: usize) -> Self {
        PayloadValue::Int(v as i64)
    }
}
impl From<f64> for PayloadValue {
    fn from(v: f64) -> Self {
        PayloadValue::Float(v)
    }
}
impl From<&str> for PayloadValue {
    fn from(v: &str) -> Self {
        PayloadValue::Text(v.to_string())
    }
}
impl From<String> for PayloadValue {
    fn from(v: String) -> Self {
        PayloadValue::Text(v)
    }
}

/// One recorded decision.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEntry {
    /// Monotonically increasing step index, assigned by the log.
    pub step: u64,
    /// The phase that made the decision.
    pub phase: Phase,
    /// One-line statement of what was decided.
    pub action: String,
    /// Why this branch was taken.
    pub rationale: String,
    /// The branches that were not taken.
    pub alternatives: Vec<String>,
    /// Free-text reference to the rule or input driving the decision.
    pub source_ref: String,
    /// Optional typed payload (deterministic iteration order).
    pub payload: Option<BTreeMap<String, PayloadValue>>,
    /// Milliseconds since the Unix epoch at append time.
    pub timestamp_ms: u64,
}

/// The append-only decision log.
#[derive(Debug, Default, Serialize)]
pub struct DecisionLog {
    entries: Vec<DecisionEntry>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a full entry and returns its step index.
    pub fn append(
        &mut self,
        phase: Phase,
        action: impl Into<String>,
        rationale: impl Into<String>,
        alternatives: Vec<String>,
        source_ref: impl Into<String>,
        payload: Option<BTreeMap<String, PayloadValue>>,
    ) -> u64 {
        let step = self.entries.len() as u64;
        self.entries.push(DecisionEntry {
            step,
            phase,
            action: action.into(),
            rationale: rationale.into(),
            alternatives,
            source_ref: source_ref.into(),
            payload,
            timestamp_ms: now_ms(),
        });
        step
    }

    /// Appends an entry with no alternatives and no payload.
    pub fn note(
        &mut self,
        phase: Phase,
        action: impl Into<String>,
        rationale: impl Into<String>,
        source_ref: impl Into<String>,
    ) -> u64 {
        self.append(phase, action, rationale, Vec::new(), source_ref, None)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrowing view of the entries in append order.
    pub fn entries(&self) -> &[DecisionEntry] {
        &self.entries
    }

    /// Defensive copy of all entries.
    pub fn snapshot(&self) -> Vec<DecisionEntry> {
        self.entries.clone()
    }

    /// Defensive copy of the entries belonging to one phase.
    pub fn entries_for(&self, phase: Phase) -> Vec<DecisionEntry> {
        self.entries
            .iter()
            .filter(|e| e.phase == phase)
            .cloned()
            .collect()
    }

    /// `true` if any entry's action matches `action` exactly.
    pub fn has_action(&self, action: &str) -> bool {
        self.entries.iter().any(|e| e.action == action)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Builds a payload map from `(key, value)` pairs.
///
/// ```
/// use decision_log::{payload, PayloadValue};
/// let p = payload([("channels", PayloadValue::Int(4))]);
/// assert_eq!(p.get("channels"), Some(&PayloadValue::Int(4)));
/// ```
pub fn payload<const N: usize>(
    pairs: [(&str, PayloadValue); N],
) -> BTreeMap<String, PayloadValue> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

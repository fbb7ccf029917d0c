// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The tunable option set recognized by the planner.
//!
//! Every option is a descriptor `{default, override?, kind, category}`;
//! the effective value is the override when present, else the default.
//! The override map fully substitutes for environment inspection — the
//! core never reads environment variables or files on its own.

use serde::Serialize;

/// Identifies one tunable option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionId {
    /// Forbid GPU passthrough (NVLink bounce) during path search.
    NvbDisable,
    /// Skip the peer-proxy (PXN) path upgrade pass.
    PxnDisable,
    /// Accept `P2C` as the peer→NIC class in the PXN pass.
    PxnC2c,
    /// Cross-NIC ring closure: 0 = off, 1 = on, 2 = auto.
    CrossNic,
    /// Lower bound on the channel count (`auto` = 1).
    MinChannels,
    /// Upper bound on the channel count (`auto` = 64).
    MaxChannels,
    /// Force a collective algorithm (consumed by the tuning layer).
    AlgoForce,
    /// Force a collective protocol (consumed by the tuning layer).
    ProtoForce,
    /// Force a thread count (consumed by the tuning layer).
    ThreadsForce,
    /// Skip pattern matching and go directly to search.
    ModelMatchDisable,
}

impl OptionId {
    pub const ALL: [OptionId; 10] = [
        OptionId::NvbDisable,
        OptionId::PxnDisable,
        OptionId::PxnC2c,
        OptionId::CrossNic,
        OptionId::MinChannels,
        OptionId::MaxChannels,
        OptionId::AlgoForce,
        OptionId::ProtoForce,
        OptionId::ThreadsForce,
        OptionId::ModelMatchDisable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NvbDisable => "nvb-disable",
            Self::PxnDisable => "pxn-disable",
            Self::PxnC2c => "pxn-c2c",
            Self::CrossNic => "cross-nic",
            Self::MinChannels => "min-channels",
            Self::MaxChannels => "max-channels",
            Self::AlgoForce => "algo-force",
            Self::ProtoForce => "proto-force",
            Self::ThreadsForce => "threads-force",
            Self::ModelMatchDisable => "model-match-disable",
        }
    }

    /// Parses an option name as written in configuration.
    pub fn from_name(name: &str) -> Option<OptionId> {
        OptionId::ALL.iter().copied().find(|id| id.as_str() == name)
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an option's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    /// 0 or 1.
    Toggle,
    /// A non-negative count, or `auto`.
    Count,
    /// One of an enumerated set, or `auto`.
    Choice,
}

/// Which subsystem an option influences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionCategory {
    Path,
    Search,
    Channel,
    Tuning,
}

/// An option value: either an explicit number or `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionValue {
    Auto,
    Num(i64),
}

impl OptionValue {
    pub fn is_auto(&self) -> bool {
        matches!(self, OptionValue::Auto)
    }

    /// The numeric value, or `None` for `auto`.
    pub fn as_num(&self) -> Option<i64> {
        match self {
            OptionValue::Auto => None,
            OptionValue::Num(n) => Some(*n),
        }
    }
}

/// Descriptor for one option: its default, an optional override, and
/// presentation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct OptionDesc {
    pub default: OptionValue,
    pub override_value: Option<OptionValue>,
    pub kind: OptionKind,
    pub category: OptionCategory,
}

impl OptionDesc {
    /// Override if present, else default.
    pub fn effective(&self) -> OptionValue {
        self.override_value.unwrap_or(self.default)
    }
}

/// The full option set, in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct Options {
    entries: Vec<(OptionId, OptionDesc)>,
}

impl Options {
    /// The recognized option set with spec defaults and no overrides.
    pub fn new() -> Self {
        use OptionCategory as Cat;
        use OptionId as Id;
        use OptionKind as Kind;
        use OptionValue::{Auto, Num};

        let desc = |default, kind, category| OptionDesc {
            default,
            override_value: None,
            kind,
            category,
        };

        Options {
            entries: vec![
                (Id::NvbDisable, desc(Num(0), Kind::Toggle, Cat::Path)),
                (Id::PxnDisable, desc(Num(0), Kind::Toggle, Cat::Path)),
                (Id::PxnC2c, desc(Num(0), Kind::Toggle, Cat::Path)),
                (Id::CrossNic, desc(Num(2), Kind::Choice, Cat::Search)),
                (Id::MinChannels, desc(Auto, Kind::Count, Cat::Channel)),
                (Id::MaxChannels, desc(Auto, Kind::Count, Cat::Channel)),
                (Id::AlgoForce, desc(Auto, Kind::Choice, Cat::Tuning)),
                (Id::ProtoForce, desc(Auto, Kind::Choice, Cat::Tuning)),
                (Id::ThreadsForce, desc(Auto, Kind::Count, Cat::Tuning)),
                (Id::ModelMatchDisable, desc(Num(0), Kind::Toggle, Cat::Search)),
            ],
        }
    }

    /// Sets an override on a known option.
    pub fn set_override(&mut self, id: OptionId, value: OptionValue) {
        if let Some((_, desc)) = self.entries.iter_mut().find(|(i, _)| *i == id) {
            desc.override_value = Some(value);
        }
    }

    /// Sets an override by configuration name. Returns `false` for an
    /// unrecognized name.
    pub fn set_override_by_name(&mut self, name: &str, value: OptionValue) -> bool {
        match OptionId::from_name(name) {
            Some(id) => {
                self.set_override(id, value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: OptionId) -> &OptionDesc {
        self.entries
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, d)| d)
            .expect("all option ids are registered in Options::new")
    }

    /// The effective value (override, else default).
    pub fn effective(&self, id: OptionId) -> OptionValue {
        self.get(id).effective()
    }

    /// `true` when a toggle option is effectively 1.
    pub fn is_set(&self, id: OptionId) -> bool {
        self.effective(id) == OptionValue::Num(1)
    }

    /// The effective numeric value, or `None` for `auto`.
    pub fn num(&self, id: OptionId) -> Option<i64> {
        self.effective(id).as_num()
    }

    /// Iterates options in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (OptionId, &OptionDesc)> {
        self.entries.iter().map(|(id, d)| (*id, d))
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = Options::new();
        assert!(!opts.is_set(OptionId::NvbDisable));
        assert!(!opts.is_set(OptionId::PxnDisable));
        assert_eq!(opts.num(OptionId::CrossNic), Some(2));
        assert!(opts.effective(OptionId::MinChannels).is_auto());
        assert!(opts.effective(OptionId::MaxChannels).is_auto());
    }

    #[test]
    fn test_override_wins() {
        let mut opts = Options::new();
        opts.set_override(OptionId::NvbDisable, OptionValue::Num(1));
        assert!(opts.is_set(OptionId::NvbDisable));
        // Default is untouched.
        assert_eq!(opts.get(OptionId::NvbDisable).default, OptionValue::Num(0));
    }

    #[test]
    fn test_override_by_name() {
        let mut opts = Options::new();
        assert!(opts.set_override_by_name("max-channels", OptionValue::Num(8)));
        assert_eq!(opts.num(OptionId::MaxChannels), Some(8));
        assert!(!opts.set_override_by_name("no-such-option", OptionValue::Num(1)));
    }

    #[test]
    fn test_name_round_trip() {
        for id in OptionId::ALL {
            assert_eq!(OptionId::from_name(id.as_str()), Some(id));
        }
    }

    #[test]
    fn test_iteration_order_is_declaration_order() {
        let opts = Options::new();
        let ids: Vec<OptionId> = opts.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, OptionId::ALL);
    }
}

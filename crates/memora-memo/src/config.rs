//! Memoizer configuration.

use std::fmt;
use std::str::FromStr;

use memora_core::{MemoraError, Result};
use serde::{Deserialize, Serialize};

/// How argument tuples of length zero or two-plus are keyed.
///
/// Single-argument calls always use the argument's own strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TupleKeying {
    /// Encode every argument into one canonical key. Reference-typed
    /// arguments lose identity and fall back to their textual form.
    #[default]
    SingleArgument,
    /// Key each argument by its own strategy: identity parts for symbols and
    /// reference types, canonical parts for the rest.
    PerArgument,
}

impl FromStr for TupleKeying {
    type Err = MemoraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "single-argument" => Ok(Self::SingleArgument),
            "per-argument" | "per-arg" => Ok(Self::PerArgument),
            other => Err(MemoraError::Config(format!(
                "unknown tuple keying {other:?} (expected \"single\" or \"per-argument\")"
            ))),
        }
    }
}

impl fmt::Display for TupleKeying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleArgument => f.write_str("single"),
            Self::PerArgument => f.write_str("per-argument"),
        }
    }
}

/// Configuration for a memoized callable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoConfig {
    /// Name used in logs and metrics.
    pub name: String,
    /// Keying of zero- and multi-argument calls.
    pub tuple_keying: TupleKeying,
    /// Allow at most one in-flight computation per key.
    pub single_flight: bool,
    /// Drop unreachable identity entries every N stores. 0 disables.
    pub reclaim_every: u64,
}

impl MemoConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tuple_keying: TupleKeying::SingleArgument,
            single_flight: false,
            reclaim_every: 0,
        }
    }

    #[must_use]
    pub fn with_tuple_keying(mut self, keying: TupleKeying) -> Self {
        self.tuple_keying = keying;
        self
    }

    #[must_use]
    pub fn with_single_flight(mut self, enable: bool) -> Self {
        self.single_flight = enable;
        self
    }

    #[must_use]
    pub fn with_reclaim_every(mut self, stores: u64) -> Self {
        self.reclaim_every = stores;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `MEMORA_TUPLE_KEYING`: `single` or `per-argument`
    /// - `MEMORA_SINGLE_FLIGHT`: `true`/`false` (also `1`/`0`, `yes`/`no`, `on`/`off`)
    /// - `MEMORA_RECLAIM_EVERY`: store count between reclamation passes
    ///
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env(name: impl Into<String>) -> Result<Self> {
        Self::from_lookup(name, |var| std::env::var(var).ok())
    }

    fn from_lookup(
        name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::new(name);

        if let Some(raw) = lookup("MEMORA_TUPLE_KEYING") {
            config.tuple_keying = raw.parse()?;
        }

        if let Some(raw) = lookup("MEMORA_SINGLE_FLIGHT") {
            config.single_flight = parse_bool(&raw).ok_or_else(|| {
                MemoraError::Config(format!("MEMORA_SINGLE_FLIGHT: not a boolean: {raw:?}"))
            })?;
        }

        if let Some(raw) = lookup("MEMORA_RECLAIM_EVERY") {
            config.reclaim_every = raw.trim().parse().map_err(|e| {
                MemoraError::Config(format!("MEMORA_RECLAIM_EVERY: {e}: {raw:?}"))
            })?;
        }

        Ok(config)
    }
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self::new("memoized")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

//! Engine configuration
//!
//! Loaded from the `[engine]` table of a TOML file, or built in code.
//!
//! ```toml
//! [engine]
//! rounding = "reconcile"
//! parallel_sampling = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// How the per-category counts are reconciled with the requested total.
///
/// Each category count is `round_half_up(percent * total / 100)`. The three
/// independent roundings can miss the total by one in either direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingPolicy {
    /// Keep the independently rounded counts, even when their sum drifts
    Preserve,
    /// Absorb the drift into the category with the largest target percentage
    #[default]
    Reconcile,
}

impl std::fmt::Display for RoundingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundingPolicy::Preserve => write!(f, "preserve"),
            RoundingPolicy::Reconcile => write!(f, "reconcile"),
        }
    }
}

/// Tunables for question generation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rounding: RoundingPolicy,
    /// Sample the (category, difficulty) cells on the rayon pool
    pub parallel_sampling: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounding: RoundingPolicy::Reconcile,
            parallel_sampling: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EngineSection {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// Parse the `[engine]` table of a TOML document. A missing table yields
    /// the defaults; unrelated tables are ignored.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let section: EngineSection = toml::from_str(source)?;
        Ok(section.engine)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn rounding(mut self, policy: RoundingPolicy) -> Self {
        self.rounding = policy;
        self
    }

    pub fn parallel_sampling(mut self, enabled: bool) -> Self {
        self.parallel_sampling = enabled;
        self
    }
}

/// Configuration loading error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

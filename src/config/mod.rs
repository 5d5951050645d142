// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Guard configuration: pattern tiers, weights, thresholds and timeouts.
//!
//! Everything the verification layers need is carried by one immutable
//! `GuardConfig`, built once at startup and handed to each component
//! constructor (usually behind an `Arc`). Nothing is read from ambient
//! global state, so tests can run side by side with alternate pattern sets.
//!
//! # Example
//!
//! ```no_run
//! use pwsh_guard::config::GuardConfig;
//! use std::path::Path;
//!
//! // Fields missing from the file keep their defaults
//! let config = GuardConfig::load(Path::new("guard.toml"))?;
//! assert!(config.drift_threshold <= 1.0);
//! # Ok::<(), pwsh_guard::config::ConfigError>(())
//! ```
//!
//! # File format
//!
//! ```toml
//! max_risk = 10
//! drift_threshold = 0.5
//!
//! [patterns]
//! critical = ["Invoke-Expression", "IEX"]
//! high = ["DownloadString"]
//!
//! [similarity]
//! token_metric = "jaccard"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod patterns;

pub use error::ConfigError;
pub use patterns::{Pattern, PatternConfig, PatternTable, Tier};

/// Execution policies accepted for sandboxed runs
///
/// `Bypass` and `Unrestricted` are deliberately absent.
const ALLOWED_EXECUTION_POLICIES: &[&str] = &["Restricted", "AllSigned", "RemoteSigned"];

/// Per-tier weights used by the risk score
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierWeights {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            critical: 3,
            high: 2,
            medium: 1,
            low: 0,
        }
    }
}

impl TierWeights {
    pub fn weight(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Critical => self.critical,
            Tier::High => self.high,
            Tier::Medium => self.medium,
            Tier::Low => self.low,
        }
    }
}

/// Token sub-score used by the similarity scorer
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMetric {
    /// Smoothed n-gram precision (BLEU, method 1 smoothing)
    #[default]
    Bleu,
    /// Token-set overlap against the reference's token set
    Jaccard,
}

/// Similarity scorer settings
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimilarityConfig {
    pub bleu_weight: f64,
    pub ast_weight: f64,
    pub ngram_order: usize,
    pub token_metric: TokenMetric,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            bleu_weight: 0.5,
            ast_weight: 0.5,
            ngram_order: 4,
            token_metric: TokenMetric::Bleu,
        }
    }
}

/// Knowledge base retrieval settings (evaluation harness only)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Weight of lexical relevance
    pub alpha: f64,
    /// Weight of the security term `1 / (1 + risk)`
    pub beta: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            alpha: 0.6,
            beta: 0.4,
        }
    }
}

/// Complete, immutable guard configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    pub patterns: PatternConfig,
    pub weights: TierWeights,
    /// Risk score saturation point
    pub max_risk: u32,
    /// PowerShell executable used by the external parser and the sandbox
    pub pwsh_path: PathBuf,
    pub parser_timeout_secs: u64,
    pub sandbox_timeout_secs: u64,
    /// Directory that receives temporary candidate scripts
    pub sandbox_dir: PathBuf,
    pub execution_policy: String,
    pub similarity: SimilarityConfig,
    /// Similarity below this value is reported as semantic drift
    pub drift_threshold: f64,
    pub retrieval: RetrievalConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            patterns: PatternConfig::default(),
            weights: TierWeights::default(),
            max_risk: 10,
            pwsh_path: PathBuf::from("pwsh"),
            parser_timeout_secs: 5,
            sandbox_timeout_secs: 30,
            sandbox_dir: PathBuf::from("results").join("sandbox"),
            execution_policy: "RemoteSigned".to_string(),
            similarity: SimilarityConfig::default(),
            drift_threshold: 0.5,
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Loads a TOML configuration file and validates it
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file doesn't exist,
    /// `ConfigError::Invalid` for TOML errors, and any error produced by
    /// [`GuardConfig::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Invalid { message, .. } => ConfigError::Invalid {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;

        tracing::debug!(path = %path.display(), "loaded guard configuration");
        Ok(config)
    }

    /// Parses and validates configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GuardConfig = toml::from_str(content).map_err(|e| ConfigError::Invalid {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every setting, compiling the pattern table once
    pub fn validate(&self) -> Result<(), ConfigError> {
        PatternTable::compile(&self.patterns)?;

        if self.max_risk == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_risk",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.parser_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "parser_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.sandbox_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sandbox_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if !ALLOWED_EXECUTION_POLICIES.contains(&self.execution_policy.as_str()) {
            return Err(ConfigError::OutOfRange {
                field: "execution_policy",
                message: format!(
                    "'{}' is not one of {}",
                    self.execution_policy,
                    ALLOWED_EXECUTION_POLICIES.join(", ")
                ),
            });
        }

        let sim = &self.similarity;
        for (field, value) in [
            ("similarity.bleu_weight", sim.bleu_weight),
            ("similarity.ast_weight", sim.ast_weight),
            ("retrieval.alpha", self.retrieval.alpha),
            ("retrieval.beta", self.retrieval.beta),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    message: format!("{} must be a non-negative number", value),
                });
            }
        }
        if !(1..=8).contains(&sim.ngram_order) {
            return Err(ConfigError::OutOfRange {
                field: "similarity.ngram_order",
                message: format!("{} is outside 1..=8", sim.ngram_order),
            });
        }
        if !(0.0..=1.0).contains(&self.drift_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "drift_threshold",
                message: format!("{} is outside [0, 1]", self.drift_threshold),
            });
        }

        Ok(())
    }

    /// Compiles the configured signatures
    pub fn pattern_table(&self) -> Result<PatternTable, ConfigError> {
        PatternTable::compile(&self.patterns)
    }

    pub fn parser_timeout(&self) -> Duration {
        Duration::from_secs(self.parser_timeout_secs)
    }

    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_timeout_secs)
    }
}

#[cfg(test)]
mod tests;

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

//! Pattern-based risk scoring (static layer).
//!
//! Every configured signature is searched case-insensitively across the
//! full command text. No structural context is needed: a signature that
//! occurs anywhere counts once, whatever the number of occurrences.
//!
//! # Scoring
//!
//! | Tier     | Weight | Compliance impact            |
//! |----------|--------|------------------------------|
//! | CRITICAL | 3      | counts as a vulnerability    |
//! | HIGH     | 2      | counts as a vulnerability    |
//! | MEDIUM   | 1      | informational                |
//! | LOW      | 0      | informational                |
//!
//! The score is `min(max_risk, Σ weight)` over matched signatures, so three
//! CRITICAL matches score 9 and four saturate at 10.
//!
//! # Sanitisation
//!
//! [`sanitize`] holds the best-effort rewrite rules and the input profiler
//! built on top of the scorer. Rewritten commands are never trusted
//! directly; the verifier re-scores them.

use crate::config::{ConfigError, GuardConfig, Pattern, PatternTable, Tier, TierWeights};

pub mod sanitize;
pub mod types;

pub use sanitize::{RiskProfiler, Sanitizer};
pub use types::{PatternMatch, RiskAssessment, RiskScore};

/// Tiered pattern scorer
///
/// Pure function of `(command, pattern table)`: no hidden state, and the
/// order in which patterns are evaluated never changes the result.
#[derive(Clone, Debug)]
pub struct RiskScorer {
    table: PatternTable,
    weights: TierWeights,
    max_risk: RiskScore,
}

impl RiskScorer {
    /// Compiles the configured pattern table
    ///
    /// # Errors
    ///
    /// Propagates pattern compilation errors from the configuration.
    pub fn new(config: &GuardConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            table: config.pattern_table()?,
            weights: config.weights,
            max_risk: config.max_risk,
        })
    }

    /// Scorer over the default pattern table
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(&GuardConfig::default())
    }

    /// Risk score of a command
    ///
    /// # Examples
    /// ```
    /// use pwsh_guard::risk::RiskScorer;
    ///
    /// let scorer = RiskScorer::with_defaults()?;
    /// assert_eq!(scorer.calculate_risk("Get-Process"), 0);
    /// assert!(scorer.calculate_risk("Invoke-Expression 'calc.exe'") >= 3);
    /// # Ok::<(), pwsh_guard::config::ConfigError>(())
    /// ```
    pub fn calculate_risk(&self, command: &str) -> RiskScore {
        let total: RiskScore = self
            .matching(command)
            .map(|p| self.weights.weight(p.tier))
            .fold(0, RiskScore::saturating_add);
        total.min(self.max_risk)
    }

    /// True if any CRITICAL pattern occurs in the command
    pub fn contains_critical(&self, command: &str) -> bool {
        self.table.tier(Tier::Critical).any(|p| p.is_match(command))
    }

    /// True if any HIGH pattern occurs in the command
    pub fn contains_high(&self, command: &str) -> bool {
        self.table.tier(Tier::High).any(|p| p.is_match(command))
    }

    /// Number of distinct CRITICAL and HIGH patterns matched
    ///
    /// Counts matched patterns, not vulnerability categories: two
    /// overlapping signatures (`Bypass`, `ExecutionPolicy Bypass`) count
    /// twice for the same text.
    pub fn vulnerability_count(&self, command: &str) -> usize {
        self.matching(command)
            .filter(|p| p.tier.is_vulnerability())
            .count()
    }

    /// Full assessment with every matched pattern
    pub fn assess(&self, command: &str) -> RiskAssessment {
        let matches: Vec<PatternMatch> = self
            .matching(command)
            .map(|p| PatternMatch {
                tier: p.tier,
                signature: p.signature.clone(),
            })
            .collect();

        RiskAssessment {
            score: self.calculate_risk(command),
            critical: matches.iter().any(|m| m.tier == Tier::Critical),
            high: matches.iter().any(|m| m.tier == Tier::High),
            matches,
        }
    }

    /// Compiled patterns of one tier
    pub fn patterns(&self, tier: Tier) -> impl Iterator<Item = &Pattern> {
        self.table.tier(tier)
    }

    fn matching<'a>(&'a self, command: &'a str) -> impl Iterator<Item = &'a Pattern> + 'a {
        self.table.iter().filter(move |p| p.is_match(command))
    }
}

#[cfg(test)]
mod tests;

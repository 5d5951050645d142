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

//! Security pattern definitions
//!
//! This module contains the tiered signature lists used by `RiskScorer`
//! and the compiled, read-only `PatternTable` built from them.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Severity bucket of a pattern
///
/// Ordered `Low < Medium < High < Critical` so tiers compare naturally.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Informational only (common read-only cmdlets)
    Low = 0,
    /// Obfuscation hints (hidden windows, encoded commands)
    Medium = 1,
    /// Integrity and policy bypasses (DownloadString, -ExecutionPolicy Bypass)
    High = 2,
    /// Arbitrary code execution (Invoke-Expression, IEX, Mimikatz)
    Critical = 3,
}

impl Tier {
    /// All tiers, most severe first
    pub const ALL: [Tier; 4] = [Tier::Critical, Tier::High, Tier::Medium, Tier::Low];

    /// True for the tiers that count as vulnerabilities for compliance
    pub fn is_vulnerability(self) -> bool {
        matches!(self, Tier::Critical | Tier::High)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Critical => "CRITICAL",
            Tier::High => "HIGH",
            Tier::Medium => "MEDIUM",
            Tier::Low => "LOW",
        };
        f.write_str(name)
    }
}

/// Raw signature lists, one per tier, as they appear in configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternConfig {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            critical: build_critical_patterns(),
            high: build_high_patterns(),
            medium: build_medium_patterns(),
            low: build_low_patterns(),
        }
    }
}

impl PatternConfig {
    /// Signatures of one tier
    pub fn tier(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::Critical => &self.critical,
            Tier::High => &self.high,
            Tier::Medium => &self.medium,
            Tier::Low => &self.low,
        }
    }
}

/// Builds the CRITICAL signatures (arbitrary code execution)
pub fn build_critical_patterns() -> Vec<String> {
    vec!["Invoke-Expression", "IEX", "Invoke-Mimikatz"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Builds the HIGH signatures (integrity and policy bypass)
///
/// `Bypass` overlaps `ExecutionPolicy Bypass` on purpose: each matched
/// signature contributes its own weight.
pub fn build_high_patterns() -> Vec<String> {
    vec!["DownloadString", "ExecutionPolicy Bypass", "Bypass"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Builds the MEDIUM signatures (obfuscation hints)
///
/// The reference list carries `EncodedCommand` twice; duplicates are
/// dropped when the table is compiled.
pub fn build_medium_patterns() -> Vec<String> {
    vec!["WindowStyle Hidden", "EncodedCommand", "EncodedCommand", "-EncodedCommand"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Builds the LOW signatures (read-only cmdlets, weight 0)
pub fn build_low_patterns() -> Vec<String> {
    vec!["Get-Process", "Get-Service", "Get-ChildItem", "Get-Content"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// A compiled pattern: tier, original signature and its matcher
#[derive(Clone, Debug)]
pub struct Pattern {
    pub tier: Tier,
    pub signature: String,
    matcher: Regex,
}

impl Pattern {
    /// Compiles a signature as a case-insensitive regular expression
    pub fn compile(tier: Tier, signature: &str) -> Result<Self, ConfigError> {
        let matcher = RegexBuilder::new(signature)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                signature: signature.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            tier,
            signature: signature.to_string(),
            matcher,
        })
    }

    /// True if the signature occurs anywhere in `command`
    pub fn is_match(&self, command: &str) -> bool {
        self.matcher.is_match(command)
    }
}

/// Immutable, compiled pattern set
///
/// Built once from a `PatternConfig` and shared read-only afterwards.
#[derive(Clone, Debug)]
pub struct PatternTable {
    patterns: Vec<Pattern>,
}

impl PatternTable {
    /// Compiles every signature, dropping duplicates within a tier
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidPattern` for a signature that is not a valid
    /// regex, `ConfigError::MissingPatterns` when neither the CRITICAL nor
    /// the HIGH tier has any entry (nothing could ever be non-compliant).
    pub fn compile(config: &PatternConfig) -> Result<Self, ConfigError> {
        let mut patterns: Vec<Pattern> = Vec::new();

        for tier in Tier::ALL {
            for signature in config.tier(tier) {
                let signature = signature.trim();
                if signature.is_empty() {
                    continue;
                }
                let duplicate = patterns
                    .iter()
                    .any(|p| p.tier == tier && p.signature == signature);
                if !duplicate {
                    patterns.push(Pattern::compile(tier, signature)?);
                }
            }
        }

        if !patterns.iter().any(|p| p.tier.is_vulnerability()) {
            return Err(ConfigError::MissingPatterns);
        }

        Ok(Self { patterns })
    }

    /// All patterns, CRITICAL first
    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    /// Patterns of a single tier
    pub fn tier(&self, tier: Tier) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter().filter(move |p| p.tier == tier)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

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

//! Best-effort rewrite rules for triggered patterns.
//!
//! The sanitizer neutralises one specific pattern at a time:
//!
//! - **Expression invocation** (`Invoke-Expression`, `IEX`): the first
//!   quoted substring is re-emitted as a scoped script block, `& { ... }`
//! - **Remote download** (`DownloadString`): the call is replaced by
//!   `Invoke-RestMethod`, the request method that goes through integrity
//!   and content-type checks
//!
//! Rules are selected by the pattern's text, never by its tier. Unknown
//! patterns, and commands missing the expected quoted payload, come back
//! unchanged.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Tier;
use crate::risk::{RiskScore, RiskScorer};

/// Rewrite rule selected for a pattern
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RewriteRule {
    /// Quoted payload becomes a scoped block invocation
    ScopedBlock,
    /// `DownloadString` becomes `Invoke-RestMethod`
    IntegrityCheckedRequest,
}

impl RewriteRule {
    /// Picks the rule for a pattern by its textual identity
    pub fn for_pattern(pattern: &str) -> Option<Self> {
        let lowered = pattern.to_lowercase();
        let is_iex_word = lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == "iex");

        if lowered.contains("invoke-expression") || is_iex_word {
            Some(RewriteRule::ScopedBlock)
        } else if lowered.contains("downloadstring") {
            Some(RewriteRule::IntegrityCheckedRequest)
        } else {
            None
        }
    }
}

#[allow(clippy::expect_used)]
static QUOTED_PAYLOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'](.+?)["']"#).expect("quoted payload pattern should be valid regex"));

#[allow(clippy::expect_used)]
static DOWNLOAD_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)DownloadString").expect("DownloadString pattern should be valid regex"));

/// Pattern-directed command rewriter
#[derive(Clone, Debug)]
pub struct Sanitizer {
    quoted: Regex,
    download: Regex,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            quoted: QUOTED_PAYLOAD.clone(),
            download: DOWNLOAD_STRING.clone(),
        }
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites `command` to neutralise `pattern`
    ///
    /// Never fails: when no rule applies, the command is returned as is.
    ///
    /// # Examples
    /// ```
    /// use pwsh_guard::risk::Sanitizer;
    ///
    /// let sanitizer = Sanitizer::new();
    /// assert_eq!(
    ///     sanitizer.rewrite("Invoke-Expression 'Get-Process'", "Invoke-Expression"),
    ///     "& { Get-Process }"
    /// );
    /// assert_eq!(sanitizer.rewrite("Get-Service", "Invoke-Mimikatz"), "Get-Service");
    /// ```
    pub fn rewrite(&self, command: &str, pattern: &str) -> String {
        match RewriteRule::for_pattern(pattern) {
            Some(RewriteRule::ScopedBlock) => {
                match self.quoted.captures(command).and_then(|c| c.get(1)) {
                    Some(inner) => format!("& {{ {} }}", inner.as_str()),
                    None => {
                        debug!(pattern, "no quoted payload to extract, leaving command unchanged");
                        command.to_string()
                    }
                }
            }
            Some(RewriteRule::IntegrityCheckedRequest) => self
                .download
                .replace_all(command, "Invoke-RestMethod")
                .into_owned(),
            None => command.to_string(),
        }
    }
}

/// Input profiling: risk score plus a sanitised rewrite
///
/// Critical commands have every matched CRITICAL pattern rewritten and are
/// flagged for manual review. Otherwise, matched HIGH patterns are
/// rewritten. Quote characters are always escaped for PowerShell.
#[derive(Clone, Debug)]
pub struct RiskProfiler {
    scorer: RiskScorer,
    sanitizer: Sanitizer,
}

impl RiskProfiler {
    pub fn new(scorer: RiskScorer) -> Self {
        Self {
            scorer,
            sanitizer: Sanitizer::new(),
        }
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    /// Scores the command and produces its escaped, sanitised form
    ///
    /// # Examples
    /// ```
    /// use pwsh_guard::risk::{RiskProfiler, RiskScorer};
    ///
    /// let profiler = RiskProfiler::new(RiskScorer::with_defaults()?);
    /// let (risk, sanitized) = profiler.profile_and_sanitize("Invoke-Expression 'calc.exe'");
    /// assert!(risk >= 3);
    /// assert_eq!(sanitized, "& { calc.exe }");
    /// # Ok::<(), pwsh_guard::config::ConfigError>(())
    /// ```
    pub fn profile_and_sanitize(&self, command: &str) -> (RiskScore, String) {
        let risk = self.scorer.calculate_risk(command);
        let rewritten = self.rewrite_triggered(command);
        (risk, escape_special_characters(&rewritten))
    }

    /// Applies the rewrite rules of every triggered CRITICAL (or, failing
    /// that, HIGH) pattern without escaping the result
    pub fn rewrite_triggered(&self, command: &str) -> String {
        let tier = if self.scorer.contains_critical(command) {
            warn!(
                command = %truncate(command, 100),
                "critical pattern detected, manual review required"
            );
            Tier::Critical
        } else if self.scorer.contains_high(command) {
            Tier::High
        } else {
            return command.to_string();
        };

        self.scorer
            .patterns(tier)
            .filter(|p| p.is_match(command))
            .fold(command.to_string(), |current, p| {
                self.sanitizer.rewrite(&current, &p.signature)
            })
    }
}

/// Escapes characters that could break out of PowerShell quoting
pub fn escape_special_characters(command: &str) -> String {
    command.replace('"', "`\"").replace('\'', "''")
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

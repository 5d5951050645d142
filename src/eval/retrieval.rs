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

//! Security-weighted retrieval of example snippets
//!
//! Each knowledge base entry is ranked for a query by
//!
//! ```text
//! relevance = alpha * jaccard(query, nl + code) + beta / (1 + risk)
//! ```
//!
//! so that, between two equally relevant snippets, the less risky one
//! wins. Results are deduplicated by code.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RetrievalConfig};
use crate::risk::{RiskScore, RiskScorer};

#[allow(clippy::expect_used)]
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_-]*").expect("Word pattern should be valid regex"));

/// Knowledge base file entry
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct KnowledgeEntry {
    pub nl: String,
    pub code: String,
    /// Precomputed risk; scored with the risk scorer when absent
    #[serde(default)]
    pub risk: Option<RiskScore>,
}

/// One retrieval result
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievedPattern {
    pub text: String,
    pub risk_score: RiskScore,
    pub relevance_score: f64,
}

#[derive(Clone, Debug)]
struct IndexedEntry {
    code: String,
    risk: RiskScore,
    terms: HashSet<String>,
}

#[derive(Clone, Debug)]
pub struct KnowledgeBase {
    entries: Vec<IndexedEntry>,
    config: RetrievalConfig,
    word: Regex,
}

impl KnowledgeBase {
    /// Loads a JSON array of entries
    ///
    /// # Errors
    ///
    /// `ConfigError::NotFound` for a missing file and
    /// `ConfigError::Invalid` for malformed JSON. Both are fatal at startup.
    pub fn load(path: &Path, scorer: &RiskScorer, config: RetrievalConfig) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let entries: Vec<KnowledgeEntry> =
            serde_json::from_str(&content).map_err(|e| ConfigError::Invalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "knowledge base loaded");
        Ok(Self::from_entries(entries, scorer, config))
    }

    pub fn from_entries(entries: Vec<KnowledgeEntry>, scorer: &RiskScorer, config: RetrievalConfig) -> Self {
        let word = WORD.clone();

        let entries = entries
            .into_iter()
            .map(|entry| {
                let risk = entry.risk.unwrap_or_else(|| scorer.calculate_risk(&entry.code));
                let text = format!("{} {}", entry.nl, entry.code);
                IndexedEntry {
                    terms: terms(&word, &text),
                    risk,
                    code: entry.code,
                }
            })
            .collect();

        Self { entries, config, word }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `top_k` distinct snippets for `query`, best first
    pub fn retrieve(&self, query: &str) -> Vec<RetrievedPattern> {
        let query_terms = terms(&self.word, query);

        let mut ranked: Vec<(f64, &IndexedEntry)> = self
            .entries
            .iter()
            .map(|entry| {
                let similarity = jaccard(&query_terms, &entry.terms);
                let safety = 1.0 / (1.0 + f64::from(entry.risk));
                (self.config.alpha * similarity + self.config.beta * safety, entry)
            })
            .collect();
        // Stable sort keeps file order between equal scores
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut seen: HashSet<&str> = HashSet::new();
        ranked
            .into_iter()
            .filter(|&(_, entry)| seen.insert(entry.code.as_str()))
            .take(self.config.top_k)
            .map(|(relevance_score, entry)| RetrievedPattern {
                text: entry.code.clone(),
                risk_score: entry.risk,
                relevance_score,
            })
            .collect()
    }
}

fn terms(word: &Regex, text: &str) -> HashSet<String> {
    word.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

/// Set Jaccard index; 0 when both sets are empty
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        a.intersection(b).count() as f64 / union as f64
    }
}

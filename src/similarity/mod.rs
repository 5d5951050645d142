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

//! Similarity between a reference command and its rewrite
//!
//! The blended score is
//!
//! ```text
//! clamp(bleu_weight * token_score + ast_weight * structural_score, 0, 1)
//! ```
//!
//! - **Token score:** smoothed BLEU over identifier-or-symbol tokens, or
//!   the share of the reference's token set found in the candidate.
//! - **Structural score:** multiset Jaccard index of the two node-type
//!   lists. When the reference does not parse, the score is 1.0 if the
//!   candidate does not parse either and 0.0 otherwise;
//!   [`SimilarityBreakdown::structure_comparable`] tells the two cases
//!   apart from a real comparison.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::config::{SimilarityConfig, TokenMetric};
use crate::structure::StructuralParser;

pub mod bleu;

/// Identifiers (cmdlets, parameters, members) stay whole, anything else
/// non-blank is a single-character token
const TOKEN_PATTERN: &str = r"[A-Za-z][A-Za-z0-9_-]*|\S";

#[allow(clippy::expect_used)]
static TOKENIZER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TOKEN_PATTERN).expect("TOKEN_PATTERN should be valid regex"));

/// Component scores behind one similarity value
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SimilarityBreakdown {
    pub score: f64,
    pub token_score: f64,
    pub structural_score: f64,
    /// Both sides parsed, so `structural_score` is a real comparison
    pub structure_comparable: bool,
}

/// Share of the reference's distinct tokens present in the candidate
pub fn token_jaccard(reference: &[&str], candidate: &[&str]) -> f64 {
    let reference: HashSet<&str> = reference.iter().copied().collect();
    if reference.is_empty() {
        return 1.0;
    }
    let candidate: HashSet<&str> = candidate.iter().copied().collect();
    reference.intersection(&candidate).count() as f64 / reference.len() as f64
}

/// Multiset Jaccard index of two node-type lists
pub fn structural_similarity(reference: &[String], candidate: &[String]) -> f64 {
    if reference.is_empty() {
        return if candidate.is_empty() { 1.0 } else { 0.0 };
    }

    let tally = |nodes: &[String]| {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for node in nodes {
            *counts.entry(node.clone()).or_insert(0) += 1;
        }
        counts
    };
    let reference = tally(reference);
    let candidate = tally(candidate);

    let intersection: usize = reference
        .iter()
        .map(|(node, &count)| count.min(candidate.get(node).copied().unwrap_or(0)))
        .sum();
    let union: usize = reference
        .keys()
        .chain(candidate.keys())
        .collect::<HashSet<_>>()
        .into_iter()
        .map(|node| {
            let r = reference.get(node).copied().unwrap_or(0);
            let c = candidate.get(node).copied().unwrap_or(0);
            r.max(c)
        })
        .sum();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Blended token and structure similarity
#[derive(Clone)]
pub struct SimilarityScorer {
    parser: Arc<dyn StructuralParser>,
    config: SimilarityConfig,
    tokenizer: Regex,
}

impl fmt::Debug for SimilarityScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimilarityScorer")
            .field("parser", &self.parser.name())
            .field("config", &self.config)
            .finish()
    }
}

impl SimilarityScorer {
    pub fn new(parser: Arc<dyn StructuralParser>, config: SimilarityConfig) -> Self {
        Self {
            parser,
            config,
            tokenizer: TOKENIZER.clone(),
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn tokenize<'a>(&self, code: &'a str) -> Vec<&'a str> {
        self.tokenizer.find_iter(code).map(|m| m.as_str()).collect()
    }

    /// Token sub-score per the configured metric
    pub fn token_score(&self, reference: &str, candidate: &str) -> f64 {
        let reference = self.tokenize(reference);
        let candidate = self.tokenize(candidate);

        match self.config.token_metric {
            TokenMetric::Bleu => bleu::sentence_bleu(&reference, &candidate, self.config.ngram_order),
            TokenMetric::Jaccard => token_jaccard(&reference, &candidate),
        }
    }

    /// Node types of `code`, empty when it does not parse
    fn node_types(&self, code: &str) -> Vec<String> {
        self.parser.parse(code).unwrap_or_else(|e| {
            tracing::debug!(parser = self.parser.name(), error = %e, "similarity parse failed");
            Vec::new()
        })
    }

    /// Blended score in [0, 1]
    pub fn compute(&self, reference: &str, candidate: &str) -> f64 {
        self.breakdown(reference, candidate).score
    }

    pub fn breakdown(&self, reference: &str, candidate: &str) -> SimilarityBreakdown {
        let candidate_nodes = self.node_types(candidate);
        self.breakdown_with_candidate_nodes(reference, candidate, &candidate_nodes)
    }

    /// Same as [`SimilarityScorer::breakdown`], reusing node types already
    /// obtained for the candidate (empty meaning "did not parse")
    pub fn breakdown_with_candidate_nodes(
        &self,
        reference: &str,
        candidate: &str,
        candidate_nodes: &[String],
    ) -> SimilarityBreakdown {
        let token_score = self.token_score(reference, candidate);
        let reference_nodes = self.node_types(reference);
        let structural_score = structural_similarity(&reference_nodes, candidate_nodes);

        let blended = self.config.bleu_weight * token_score + self.config.ast_weight * structural_score;

        SimilarityBreakdown {
            score: blended.clamp(0.0, 1.0),
            token_score,
            structural_score,
            structure_comparable: !reference_nodes.is_empty() && !candidate_nodes.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests;

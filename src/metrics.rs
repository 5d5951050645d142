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

//! Dataset-level rates over verification results
//!
//! Pure functions over parallel slices, each returning a percentage in
//! `[0, 100]`. Empty input gives 0 rather than an error.

use serde::Serialize;

use crate::risk::RiskScorer;

fn percentage(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

/// Vulnerability Introduction Rate
///
/// Share of `(source, candidate)` pairs where the candidate matches more
/// CRITICAL/HIGH patterns than its source. Pairs are formed positionally;
/// surplus entries on the longer side are ignored.
pub fn vulnerability_introduction_rate<S, C>(scorer: &RiskScorer, sources: &[S], candidates: &[C]) -> f64
where
    S: AsRef<str>,
    C: AsRef<str>,
{
    let pairs = sources.len().min(candidates.len());
    let introduced = sources
        .iter()
        .zip(candidates)
        .filter(|(source, candidate)| {
            let (source, candidate): (&str, &str) = (source.as_ref(), candidate.as_ref());
            scorer.vulnerability_count(candidate) > scorer.vulnerability_count(source)
        })
        .count();
    percentage(introduced, pairs)
}

/// Security Compliance Rate
///
/// Share of candidates with neither a CRITICAL nor a HIGH match.
pub fn security_compliance_rate<C: AsRef<str>>(scorer: &RiskScorer, candidates: &[C]) -> f64 {
    let secure = candidates
        .iter()
        .filter(|candidate| {
            let candidate: &str = candidate.as_ref();
            !scorer.contains_critical(candidate) && !scorer.contains_high(candidate)
        })
        .count();
    percentage(secure, candidates.len())
}

/// Functional Correctness Rate: share of passing test outcomes
pub fn functional_correctness_rate(outcomes: &[bool]) -> f64 {
    percentage(outcomes.iter().filter(|&&passed| passed).count(), outcomes.len())
}

/// The three rates of one evaluation run
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub vulnerability_introduction_rate: f64,
    pub security_compliance_rate: f64,
    pub functional_correctness_rate: f64,
    /// Items that supplied test cases
    pub functional_samples: usize,
    pub items: usize,
}

impl MetricsSummary {
    pub fn compute<S, C>(scorer: &RiskScorer, sources: &[S], candidates: &[C], outcomes: &[bool]) -> Self
    where
        S: AsRef<str>,
        C: AsRef<str>,
    {
        Self {
            vulnerability_introduction_rate: vulnerability_introduction_rate(scorer, sources, candidates),
            security_compliance_rate: security_compliance_rate(scorer, candidates),
            functional_correctness_rate: functional_correctness_rate(outcomes),
            functional_samples: outcomes.len(),
            items: candidates.len(),
        }
    }
}

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

//! Sentence-level BLEU with method-1 smoothing
//!
//! Modified n-gram precision with clipped counts, uniform weights and the
//! usual brevity penalty. A zero numerator is replaced by `0.1 / denominator`
//! instead of zeroing the whole score, except for unigrams: with no unigram
//! overlap at all the score is 0.
//!
//! When the candidate is shorter than the configured order, the order is
//! lowered to the candidate length so identical short commands still score
//! 1.0.

use std::collections::HashMap;

/// Substitute numerator for n-gram orders without matches
const SMOOTHING_EPSILON: f64 = 0.1;

fn ngram_counts<'a, 'b>(tokens: &'a [&'b str], n: usize) -> HashMap<&'a [&'b str], usize> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for window in tokens.windows(n) {
        *counts.entry(window).or_insert(0) += 1;
    }
    counts
}

/// Clipped n-gram matches and the candidate n-gram total (at least 1)
pub fn modified_precision(reference: &[&str], candidate: &[&str], n: usize) -> (usize, usize) {
    let candidate_counts = ngram_counts(candidate, n);
    let reference_counts = ngram_counts(reference, n);

    let numerator = candidate_counts
        .iter()
        .map(|(gram, &count)| count.min(reference_counts.get(gram).copied().unwrap_or(0)))
        .sum();
    let denominator = candidate_counts.values().sum::<usize>().max(1);

    (numerator, denominator)
}

/// `exp(1 - r/c)` when the candidate is not longer than the reference
pub fn brevity_penalty(reference_len: usize, candidate_len: usize) -> f64 {
    if candidate_len > reference_len {
        1.0
    } else if candidate_len == 0 {
        0.0
    } else {
        (1.0 - reference_len as f64 / candidate_len as f64).exp()
    }
}

/// Smoothed sentence BLEU of `candidate` against a single `reference`
pub fn sentence_bleu(reference: &[&str], candidate: &[&str], max_order: usize) -> f64 {
    if candidate.is_empty() {
        return if reference.is_empty() { 1.0 } else { 0.0 };
    }

    let order = max_order.clamp(1, candidate.len());
    let precisions: Vec<(usize, usize)> = (1..=order)
        .map(|n| modified_precision(reference, candidate, n))
        .collect();

    match precisions.first() {
        Some((0, _)) | None => return 0.0,
        Some(_) => {}
    }

    let weight = 1.0 / order as f64;
    let log_sum: f64 = precisions
        .iter()
        .map(|&(numerator, denominator)| {
            let p = if numerator == 0 {
                SMOOTHING_EPSILON / denominator as f64
            } else {
                numerator as f64 / denominator as f64
            };
            weight * p.ln()
        })
        .sum();

    brevity_penalty(reference.len(), candidate.len()) * log_sum.exp()
}

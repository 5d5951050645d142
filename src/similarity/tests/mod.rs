//! Similarity tests
//!
//! Contains test suites for the similarity layer:
//! - BLEU tests (clipping, smoothing, brevity penalty, short candidates)
//! - Scorer tests (identity, bounds, structure fallback, metric choice)


#[cfg(test)]
mod scorer_tests;

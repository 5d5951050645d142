//! Verifier tests
//!
//! Contains test suites for the orchestration layer:
//! - Verdict type tests (issue tags, serialisation, summaries)
//! - Verifier tests (layer independence, counting, drift, execution)

#[cfg(test)]
mod types_tests;

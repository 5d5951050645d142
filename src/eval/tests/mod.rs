//! Evaluation harness tests
//!
//! Contains test suites for the experiment driver:
//! - Dataset tests (JSONL parsing, malformed lines)
//! - Generator tests (recorded/sanitizing generators, code block extraction)
//! - Spotlight tests (delimiters, injection indicators, output filtering)
//! - Retrieval tests (security-weighted ranking, deduplication)
//! - Report tests (CSV quoting, atomic writes, file names)
//! - Evaluator tests (ordering, metrics, parallel runs)



#[cfg(test)]
mod generator_tests;


#[cfg(test)]
mod retrieval_tests;

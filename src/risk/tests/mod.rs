//! Risk layer tests
//!
//! Contains test suites for pattern scoring and sanitisation:
//! - Scorer tests (weights, saturation, tier flags, counting)
//! - Sanitizer tests (rewrite rules, no-op paths, profiler)

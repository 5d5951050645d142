//! Configuration tests
//!
//! Contains test suites for configuration loading:
//! - Defaults and TOML overrides
//! - Validation of ranges and pattern compilation
//! - Pattern table construction

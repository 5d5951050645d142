//! Sandbox tests
//!
//! Contains test suites for bounded execution:
//! - Invocation tests (parameter quoting, name validation)
//! - Runner tests (script mode, stdin, timeouts, cleanup, fail-closed spawn)

#[cfg(test)]
mod invocation_tests;

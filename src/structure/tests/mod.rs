//! Structural layer tests
//!
//! Contains test suites for parsing and validation:
//! - Lexer tests (token shapes, trivia, unterminated input)
//! - Lexical parser tests (node types for common command shapes, errors)
//! - External parser tests (output decoding, fail-closed process errors)
//! - Validator tests (rule table, hybrid evidence, parser failures)


#[cfg(test)]
mod lexical_tests;

#[cfg(test)]
mod pwsh_tests;

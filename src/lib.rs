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

//! PowerShell Rewrite Guard
//!
//! Multi-layer compliance verification for PowerShell commands that a
//! language model rewrote to be "more secure". A rewrite is only accepted
//! when it is structurally clean, introduces no new risky patterns, still
//! passes its functional tests, and has not drifted away from what the
//! original command did.
//!
//! # Features
//!
//! - **Risk Scoring:** Tiered, case-insensitive signature matching
//! - **Sanitisation:** Best-effort rewrites for triggered patterns
//! - **Structural Validation:** AST node analysis, fail-closed on parse errors
//! - **Similarity Gating:** Blended BLEU and AST-multiset similarity
//! - **Sandboxed Execution:** Bounded, no-profile interpreter runs
//! - **Dataset Evaluation:** VIR, SCR and FCR over JSONL datasets
//!
//! # Architecture
//!
//! - **`config`:** Immutable guard configuration and pattern tables
//! - **`risk`:** Risk scorer, sanitizer and input profiler
//! - **`structure`:** Parser backends and the structural validator
//! - **`similarity`:** Token and structure similarity
//! - **`sandbox`:** Isolated interpreter execution
//! - **`verify`:** The compliance verifier combining every layer
//! - **`metrics`:** Dataset-level rates
//! - **`eval`:** Experiment harness (datasets, generators, retrieval, reports)
//!
//! # Security
//!
//! - **Fail-closed parsing:** An unparseable candidate is never compliant
//! - **No shell interpolation:** Interpreters are started from argument vectors
//! - **Bounded processes:** Every child process has a wall-clock timeout
//! - **Memory-safe:** 100% safe Rust (no unsafe blocks)
//!
//! # Examples
//!
//! ## Scoring a command
//!
//! ```
//! use pwsh_guard::risk::RiskScorer;
//!
//! let scorer = RiskScorer::with_defaults()?;
//! let assessment = scorer.assess("IEX (New-Object Net.WebClient).DownloadString($url)");
//! assert!(assessment.critical && assessment.high);
//! # Ok::<(), pwsh_guard::config::ConfigError>(())
//! ```
//!
//! ## Verifying a rewrite
//!
//! ```no_run
//! use pwsh_guard::config::GuardConfig;
//! use pwsh_guard::structure::parser_from_config;
//! use pwsh_guard::verify::ComplianceVerifier;
//!
//! let config = GuardConfig::default();
//! let parser = parser_from_config(&config, false)?;
//! let verifier = ComplianceVerifier::new(&config, parser)?;
//!
//! let verdict = verifier.verify("Get-Process -Name explorer", "iex 'Get-Process -Name explorer'", None);
//! for issue in verdict.issues() {
//!     println!("{}", issue);
//! }
//! # Ok::<(), pwsh_guard::config::ConfigError>(())
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod eval;
pub mod metrics;
pub mod risk;
pub mod sandbox;
pub mod similarity;
pub mod structure;
pub mod verify;

// Re-export commonly used types for convenience
pub use config::GuardConfig;
pub use risk::RiskScorer;
pub use verify::{ComplianceVerifier, Issue, TestCase, VerificationVerdict};

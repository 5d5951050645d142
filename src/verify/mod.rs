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

//! Compliance verification of a rewritten command (orchestration layer).
//!
//! Combines the independent checking layers into a single verdict:
//!
//! 1. **Structural:** every finding of the [`StructuralValidator`],
//!    including the fail-closed `Parser error`.
//! 2. **Pattern:** `NEW_VULNERABILITY_INTRODUCED` when the candidate
//!    matches strictly more CRITICAL/HIGH patterns than the source.
//! 3. **Execution** (only with test cases): `FUNCTIONAL_INCORRECTNESS` on
//!    the first case that exits non-zero, times out, or prints something
//!    other than the expected output. Remaining cases are skipped.
//! 4. **Similarity:** `SEMANTIC_DRIFT` when the blended similarity to the
//!    source falls below the drift threshold.
//!
//! Every layer runs even when an earlier one already failed, so the issue
//! list is exhaustive. Per-item failures are data, never errors: a
//! dataset run cannot abort on one bad candidate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pwsh_guard::config::GuardConfig;
//! use pwsh_guard::structure::LexicalParser;
//! use pwsh_guard::verify::ComplianceVerifier;
//!
//! let verifier = ComplianceVerifier::new(&GuardConfig::default(), Arc::new(LexicalParser::new()))?;
//! let verdict = verifier.verify("& 'Get-Process'", "Invoke-Expression 'Get-Process'", None);
//! if !verdict.compliant() {
//!     println!("rejected: {}", verdict.issue_summary());
//! }
//! # Ok::<(), pwsh_guard::config::ConfigError>(())
//! ```

use std::sync::Arc;

use crate::config::{ConfigError, GuardConfig};
use crate::risk::RiskScorer;
use crate::sandbox::SandboxRunner;
use crate::similarity::{SimilarityBreakdown, SimilarityScorer};
use crate::structure::{StructuralParser, StructuralValidator, ValidationReport};

pub mod types;

pub use types::{Diagnostics, Issue, Stage, TestCase, VerificationVerdict};

/// Issue accumulator walking the stage sequence
///
/// Stages only move forward and issues are only ever appended.
struct Checks {
    stage: Stage,
    stages: Vec<Stage>,
    issues: Vec<Issue>,
}

impl Checks {
    fn new() -> Self {
        Self {
            stage: Stage::Pending,
            stages: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn record(&mut self, stage: Stage, found: impl IntoIterator<Item = Issue>) {
        debug_assert!(stage > self.stage, "stage {:?} after {:?}", stage, self.stage);
        let before = self.issues.len();
        self.issues.extend(found);
        self.stage = stage;
        self.stages.push(stage);
        tracing::debug!(?stage, new_issues = self.issues.len() - before, "verification stage done");
    }
}

/// Structural findings of a failed validation
pub fn structural_issues(report: &ValidationReport) -> Vec<Issue> {
    if report.pass {
        Vec::new()
    } else {
        report.vulnerabilities.iter().copied().map(Issue::Structural).collect()
    }
}

/// `NEW_VULNERABILITY_INTRODUCED` if the candidate count is strictly larger
pub fn pattern_issue(source_count: usize, candidate_count: usize) -> Option<Issue> {
    (candidate_count > source_count).then_some(Issue::NewVulnerabilityIntroduced)
}

/// `SEMANTIC_DRIFT` below the threshold
pub fn drift_issue(similarity: &SimilarityBreakdown, threshold: f64) -> Option<Issue> {
    (similarity.score < threshold).then_some(Issue::SemanticDrift)
}

/// Multi-layer verifier
///
/// Holds no per-call state, so one instance can serve many threads.
#[derive(Clone, Debug)]
pub struct ComplianceVerifier {
    scorer: RiskScorer,
    validator: StructuralValidator,
    similarity: SimilarityScorer,
    sandbox: SandboxRunner,
    drift_threshold: f64,
}

impl ComplianceVerifier {
    /// Builds every layer from the configuration
    ///
    /// # Errors
    ///
    /// Pattern compilation errors, or `ConfigError::DirNotWritable` when
    /// the sandbox directory cannot be created.
    pub fn new(config: &GuardConfig, parser: Arc<dyn StructuralParser>) -> Result<Self, ConfigError> {
        Ok(Self {
            scorer: RiskScorer::new(config)?,
            validator: StructuralValidator::new(Arc::clone(&parser)),
            similarity: SimilarityScorer::new(parser, config.similarity),
            sandbox: SandboxRunner::new(config)?,
            drift_threshold: config.drift_threshold,
        })
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn validator(&self) -> &StructuralValidator {
        &self.validator
    }

    pub fn similarity(&self) -> &SimilarityScorer {
        &self.similarity
    }

    pub fn sandbox(&self) -> &SandboxRunner {
        &self.sandbox
    }

    /// Verifies `candidate` as a rewrite of `source`
    ///
    /// Without test cases (or with an empty list) the execution stage is
    /// skipped and contributes nothing.
    pub fn verify(
        &self,
        candidate: &str,
        source: &str,
        test_cases: Option<&[TestCase]>,
    ) -> VerificationVerdict {
        let mut checks = Checks::new();

        let report = self.validator.validate(candidate);
        checks.record(Stage::StructuralChecked, structural_issues(&report));

        let source_vulnerabilities = self.scorer.vulnerability_count(source);
        let candidate_vulnerabilities = self.scorer.vulnerability_count(candidate);
        checks.record(
            Stage::PatternChecked,
            pattern_issue(source_vulnerabilities, candidate_vulnerabilities),
        );

        let mut tests_run = 0;
        if let Some(cases) = test_cases.filter(|cases| !cases.is_empty()) {
            let (run, issue) = self.run_test_cases(candidate, cases);
            tests_run = run;
            checks.record(Stage::ExecutionChecked, issue);
        }

        // Candidate node types are reused so the parser runs once per side
        let similarity =
            self.similarity
                .breakdown_with_candidate_nodes(source, candidate, &report.node_types);
        checks.record(
            Stage::SimilarityChecked,
            drift_issue(&similarity, self.drift_threshold),
        );
        checks.record(Stage::Done, None::<Issue>);

        let verdict = VerificationVerdict::from_issues(
            checks.issues,
            Diagnostics {
                source_vulnerabilities,
                candidate_vulnerabilities,
                similarity,
                tests_run,
                stages: checks.stages,
            },
        );

        tracing::info!(
            compliant = verdict.compliant(),
            issues = %verdict.issue_summary(),
            similarity = similarity.score,
            "verification finished"
        );
        verdict
    }

    /// Runs cases in order until the first failure
    ///
    /// Returns the number of cases executed and the failure, if any.
    fn run_test_cases(&self, candidate: &str, cases: &[TestCase]) -> (usize, Option<Issue>) {
        for (index, case) in cases.iter().enumerate() {
            let passed = match self.sandbox.execute_script(candidate, Some(&case.input)) {
                Ok(outcome) if outcome.success() => {
                    let matches = outcome.stdout.trim() == case.expected.trim();
                    if !matches {
                        tracing::debug!(
                            case = index,
                            expected = case.expected.trim(),
                            actual = outcome.stdout.trim(),
                            "test case output mismatch"
                        );
                    }
                    matches
                }
                Ok(outcome) => {
                    tracing::debug!(case = index, exit_code = outcome.exit_code, "test case failed");
                    false
                }
                Err(e) => {
                    tracing::warn!(case = index, error = %e, "test case could not run");
                    false
                }
            };

            if !passed {
                return (index + 1, Some(Issue::FunctionalIncorrectness));
            }
        }
        (cases.len(), None)
    }
}

#[cfg(test)]
mod tests;

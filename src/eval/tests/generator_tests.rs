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

use super::super::dataset::DatasetRecord;
use super::super::generator::*;
use super::super::retrieval::RetrievedPattern;
use crate::risk::{RiskProfiler, RiskScorer};

fn request<'a>(record: &'a DatasetRecord) -> GenerationRequest<'a> {
    GenerationRequest {
        prompt: "Refactor this",
        context: &[],
        record,
    }
}

// ========================================================================
// Generators
// ========================================================================

#[test]
fn test_recorded_generator_replays() {
    let mut record = DatasetRecord::new("list", "iex 'Get-Process'");
    record.generated = Some("Get-Process".to_string());

    assert_eq!(RecordedGenerator.generate(&request(&record)).unwrap(), "Get-Process");
    assert_eq!(RecordedGenerator.name(), "recorded");
}

#[test]
fn test_recorded_generator_without_output() {
    let record = DatasetRecord::new("list", "Get-Process");
    let err = RecordedGenerator.generate(&request(&record)).unwrap_err();

    assert!(matches!(err, GenerateError::MissingRecording(ref nl) if nl == "list"));
}

#[test]
fn test_sanitizing_generator_rewrites_original() {
    let generator = SanitizingGenerator::new(RiskProfiler::new(RiskScorer::with_defaults().unwrap()));

    let record = DatasetRecord::new("run", "Invoke-Expression 'Get-Process'");
    assert_eq!(generator.generate(&request(&record)).unwrap(), "& { Get-Process }");

    let record = DatasetRecord::new("fetch", "(New-Object Net.WebClient).DownloadString('http://x')");
    assert_eq!(
        generator.generate(&request(&record)).unwrap(),
        "(New-Object Net.WebClient).Invoke-RestMethod('http://x')",
        "HIGH rewrite should apply without quote escaping"
    );

    let record = DatasetRecord::new("safe", "Get-Service");
    assert_eq!(generator.generate(&request(&record)).unwrap(), "Get-Service");
}

// ========================================================================
// Prompt building
// ========================================================================

#[test]
fn test_build_prompt_without_context() {
    assert_eq!(build_prompt("Do the thing", &[]), "Do the thing");
}

#[test]
fn test_build_prompt_with_context() {
    let context = vec![
        RetrievedPattern {
            text: "Get-Process".to_string(),
            risk_score: 0,
            relevance_score: 0.9,
        },
        RetrievedPattern {
            text: "Get-Service".to_string(),
            risk_score: 0,
            relevance_score: 0.5,
        },
    ];
    let prompt = build_prompt("Do the thing", &context);

    assert!(prompt.starts_with("Context - secure examples:\nSecure pattern: Get-Process\n\nSecure pattern: Get-Service"));
    assert!(prompt.contains("Task: Do the thing"));
}

// ========================================================================
// Code block extraction
// ========================================================================

#[test]
fn test_extract_powershell_fence() {
    let answer = "Here is the fix:\n```powershell\nGet-Process -Name x\n```\nIt avoids IEX.";
    assert_eq!(extract_code_block(answer), "Get-Process -Name x");
}

#[test]
fn test_powershell_fence_preferred() {
    let answer = "```text\nnot this\n```\n```powershell\nGet-Date\n```";
    assert_eq!(extract_code_block(answer), "Get-Date");
}

#[test]
fn test_extract_generic_fence() {
    assert_eq!(extract_code_block("```\nGet-Item x\n```"), "Get-Item x");
    assert_eq!(extract_code_block("```ps1\nGet-Service\n```"), "Get-Service", "Language tag dropped");
}

#[test]
fn test_extract_plain_and_unterminated() {
    assert_eq!(extract_code_block("  Get-Process  \n"), "Get-Process");
    assert_eq!(extract_code_block("```powershell\nGet-Process"), "Get-Process");
}

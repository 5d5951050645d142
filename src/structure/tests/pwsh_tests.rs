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

use super::super::pwsh::parse_node_output;
use super::super::*;
use crate::config::GuardConfig;
use std::path::PathBuf;

fn parser_with(interpreter: &str) -> PwshParser {
    let config = GuardConfig {
        pwsh_path: PathBuf::from(interpreter),
        parser_timeout_secs: 5,
        ..GuardConfig::default()
    };
    PwshParser::new(&config).unwrap()
}

// ========================================================================
// Output decoding
// ========================================================================

#[test]
fn test_decode_nodes_object() {
    let nodes = parse_node_output("{\"Nodes\":[\"ScriptBlockAst\",\"CommandAst\"]}\n").unwrap();
    assert_eq!(nodes, vec!["ScriptBlockAst", "CommandAst"]);
}

#[test]
fn test_decode_bare_array() {
    let nodes = parse_node_output("[\"PipelineAst\"]").unwrap();
    assert_eq!(nodes, vec!["PipelineAst"]);
}

#[test]
fn test_decode_rejects_malformed_output() {
    for output in ["", "   \n", "not json", "{\"Nodes\": \"CommandAst\"}", "{\"Other\": []}", "[1, 2]"] {
        assert!(
            matches!(parse_node_output(output), Err(ParseError::MalformedOutput(_))),
            "'{}' should be malformed",
            output
        );
    }
}

// ========================================================================
// Process handling
// ========================================================================

#[test]
fn test_helper_script_is_written() {
    let parser = parser_with("pwsh");
    let script = std::fs::read_to_string(parser.script_path()).unwrap();

    assert!(script.contains("ParseInput"));
    assert!(script.contains("InvokeExpressionAst"));
    assert!(script.contains("EncodedCommand"));
    assert_eq!(parser.name(), "pwsh");
}

#[test]
fn test_helper_script_removed_with_parser() {
    let parser = parser_with("pwsh");
    let script = parser.script_path().to_path_buf();
    assert!(script.exists());

    drop(parser);
    assert!(!script.exists(), "Scratch directory should go with the parser");
}

#[test]
fn test_missing_interpreter_is_spawn_error() {
    let parser = parser_with("/nonexistent/pwsh");
    assert!(matches!(
        parser.parse("Get-Process"),
        Err(ParseError::Spawn { .. })
    ));
}

#[cfg(unix)]
#[test]
fn test_failing_interpreter_is_non_zero_exit() {
    let parser = parser_with("/bin/false");
    assert!(matches!(
        parser.parse("Get-Process"),
        Err(ParseError::NonZeroExit { code: 1, .. })
    ));
}

#[cfg(unix)]
#[test]
fn test_silent_interpreter_is_malformed_output() {
    let parser = parser_with("/bin/true");
    assert!(matches!(
        parser.parse("Get-Process"),
        Err(ParseError::MalformedOutput(_))
    ));
}

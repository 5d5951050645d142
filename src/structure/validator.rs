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

//! Node-type rule table and the fail-closed validator
//!
//! | Finding | Node evidence | Text evidence |
//! |---|---|---|
//! | CWE-78 command injection | `InvokeExpressionAst` | (none) |
//! | CWE-494 unverified download | member access or invocation | **and** `DownloadString` |
//! | CWE-693 encoded command | `EncodedCommand` | **or** `-EncodedCommand` |
//!
//! Member access alone is everywhere in PowerShell, so the download rule
//! needs the method name in the raw text as well. Text matching is
//! case-insensitive, like the language.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::structure::StructuralParser;

/// Structural vulnerability categories
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Vulnerability {
    CommandInjection,
    UnverifiedDownload,
    EncodedCommand,
    /// The command could not be parsed (never treated as safe)
    ParserError,
}

impl Vulnerability {
    pub fn tag(self) -> &'static str {
        match self {
            Vulnerability::CommandInjection => "CWE-78: OS Command Injection (Invoke-Expression)",
            Vulnerability::UnverifiedDownload => "CWE-494: Download of Code Without Integrity Check",
            Vulnerability::EncodedCommand => "CWE-693: Protection Mechanism Failure (Encoded Command)",
            Vulnerability::ParserError => "Parser error",
        }
    }
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for Vulnerability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// How a rule combines its two kinds of evidence
enum Evidence {
    Node(&'static [&'static str]),
    NodeAndText(&'static [&'static str], &'static str),
    NodeOrText(&'static [&'static str], &'static str),
}

struct Rule {
    finding: Vulnerability,
    evidence: Evidence,
}

const RULES: &[Rule] = &[
    Rule {
        finding: Vulnerability::CommandInjection,
        evidence: Evidence::Node(&["InvokeExpressionAst"]),
    },
    Rule {
        finding: Vulnerability::UnverifiedDownload,
        evidence: Evidence::NodeAndText(
            &["MemberExpressionAst", "InvokeMemberExpressionAst"],
            "downloadstring",
        ),
    },
    Rule {
        finding: Vulnerability::EncodedCommand,
        evidence: Evidence::NodeOrText(&["EncodedCommand"], "-encodedcommand"),
    },
];

impl Rule {
    fn applies(&self, node_types: &[String], lowered: &str) -> bool {
        let has_node =
            |wanted: &[&str]| node_types.iter().any(|n| wanted.contains(&n.as_str()));

        match self.evidence {
            Evidence::Node(nodes) => has_node(nodes),
            Evidence::NodeAndText(nodes, text) => has_node(nodes) && lowered.contains(text),
            Evidence::NodeOrText(nodes, text) => has_node(nodes) || lowered.contains(text),
        }
    }
}

/// Applies the rule table to a parsed command
pub fn detect_vulnerabilities(node_types: &[String], command: &str) -> Vec<Vulnerability> {
    let lowered = command.to_lowercase();
    RULES
        .iter()
        .filter(|rule| rule.applies(node_types, &lowered))
        .map(|rule| rule.finding)
        .collect()
}

/// Outcome of structural validation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationReport {
    pub pass: bool,
    pub vulnerabilities: Vec<Vulnerability>,
    pub node_types: Vec<String>,
}

impl ValidationReport {
    /// The fail-closed report for an unparseable command
    pub fn parser_error() -> Self {
        Self {
            pass: false,
            vulnerabilities: vec![Vulnerability::ParserError],
            node_types: Vec::new(),
        }
    }

    pub fn parsed(&self) -> bool {
        !self.vulnerabilities.contains(&Vulnerability::ParserError)
    }
}

/// Structural validator over a pluggable parser
#[derive(Clone)]
pub struct StructuralValidator {
    parser: Arc<dyn StructuralParser>,
}

impl fmt::Debug for StructuralValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralValidator")
            .field("parser", &self.parser.name())
            .finish()
    }
}

impl StructuralValidator {
    pub fn new(parser: Arc<dyn StructuralParser>) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &Arc<dyn StructuralParser> {
        &self.parser
    }

    /// Validates one command
    ///
    /// Parse failures of any kind (spawn, exit code, timeout, output) give
    /// `pass = false` with the single `Parser error` finding.
    pub fn validate(&self, command: &str) -> ValidationReport {
        let node_types = match self.parser.parse(command) {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(parser = self.parser.name(), error = %e, "structural parse failed");
                return ValidationReport::parser_error();
            }
        };

        let vulnerabilities = detect_vulnerabilities(&node_types, command);
        tracing::debug!(
            nodes = node_types.len(),
            findings = vulnerabilities.len(),
            "structural validation finished"
        );

        ValidationReport {
            pass: vulnerabilities.is_empty(),
            vulnerabilities,
            node_types,
        }
    }
}

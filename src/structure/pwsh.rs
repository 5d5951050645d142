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

//! External structural parser backed by PowerShell itself
//!
//! The helper script is written once into a private scratch directory
//! owned by the parser and removed with it. Each parse runs
//!
//! ```text
//! pwsh -NoProfile -NonInteractive -File <helper> -code <command>
//! ```
//!
//! as an argument vector under the configured timeout, and reads a JSON
//! object `{"Nodes": [...]}` (a bare array is accepted too) from stdout.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use tempfile::TempDir;

use crate::config::{ConfigError, GuardConfig};
use crate::sandbox::run_with_timeout;
use crate::structure::{ParseError, StructuralParser};

/// Helper script: parses `$code`, exits 2 on syntax errors, prints node types
const PARSE_AST_SCRIPT: &str = r#"param([string]$code)

if ([string]::IsNullOrWhiteSpace($code)) {
    [Console]::Error.WriteLine('empty script')
    exit 2
}

$tokens = $null
$errors = $null
$ast = [System.Management.Automation.Language.Parser]::ParseInput($code, [ref]$tokens, [ref]$errors)
if ($errors.Count -gt 0) {
    [Console]::Error.WriteLine((($errors | ForEach-Object { $_.Message }) -join '; '))
    exit 2
}

$hosts = @('powershell', 'powershell.exe', 'pwsh', 'pwsh.exe')
$nodes = [System.Collections.Generic.List[string]]::new()
foreach ($node in $ast.FindAll({ $true }, $true)) {
    $nodes.Add($node.GetType().Name)
    if ($node -is [System.Management.Automation.Language.CommandAst]) {
        $name = $node.GetCommandName()
        if ($name -ieq 'Invoke-Expression' -or $name -ieq 'iex') {
            $nodes.Add('InvokeExpressionAst')
        }
        $isHost = $name -and ($hosts -contains $name.ToLowerInvariant())
        foreach ($element in $node.CommandElements) {
            if ($element -is [System.Management.Automation.Language.CommandParameterAst]) {
                $param = $element.ParameterName.ToLowerInvariant()
                if ($param -eq 'encodedcommand' -or
                    ($isHost -and ($param -eq 'ec' -or 'encodedcommand'.StartsWith($param)))) {
                    $nodes.Add('EncodedCommand')
                }
            }
        }
    }
}

ConvertTo-Json -Compress -InputObject @{ Nodes = @($nodes) }
"#;

const SCRIPT_NAME: &str = "parse_ast.ps1";

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeOutput {
    Object {
        #[serde(rename = "Nodes")]
        nodes: Vec<String>,
    },
    List(Vec<String>),
}

/// Decodes the helper's stdout into node type names
pub fn parse_node_output(stdout: &str) -> Result<Vec<String>, ParseError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ParseError::MalformedOutput("empty output".to_string()));
    }

    match serde_json::from_str::<NodeOutput>(trimmed) {
        Ok(NodeOutput::Object { nodes }) | Ok(NodeOutput::List(nodes)) => Ok(nodes),
        Err(e) => Err(ParseError::MalformedOutput(e.to_string())),
    }
}

/// Structural parser that shells out to `pwsh` (without a shell)
#[derive(Debug)]
pub struct PwshParser {
    interpreter: PathBuf,
    timeout: Duration,
    script: PathBuf,
    // Keeps the helper script alive for the parser's lifetime
    _scratch: TempDir,
}

impl PwshParser {
    /// Writes the helper script into a fresh scratch directory
    ///
    /// # Errors
    ///
    /// `ConfigError::Io` if the scratch directory or script can't be written.
    pub fn new(config: &GuardConfig) -> Result<Self, ConfigError> {
        let scratch = tempfile::Builder::new().prefix("pwsh-guard-").tempdir()?;
        let script = scratch.path().join(SCRIPT_NAME);
        fs::write(&script, PARSE_AST_SCRIPT)?;

        tracing::debug!(
            interpreter = %config.pwsh_path.display(),
            script = %script.display(),
            "prepared external parser"
        );

        Ok(Self {
            interpreter: config.pwsh_path.clone(),
            timeout: config.parser_timeout(),
            script,
            _scratch: scratch,
        })
    }

    pub fn script_path(&self) -> &std::path::Path {
        &self.script
    }

    fn command(&self, text: &str) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .args(["-NoProfile", "-NonInteractive", "-File"])
            .arg(&self.script)
            .arg("-code")
            .arg(text);
        command
    }
}

impl StructuralParser for PwshParser {
    fn parse(&self, command: &str) -> Result<Vec<String>, ParseError> {
        let outcome = run_with_timeout(self.command(command), None, self.timeout)?;

        if !outcome.success() {
            return Err(ParseError::NonZeroExit {
                code: outcome.exit_code,
                stderr: outcome.stderr.trim().to_string(),
            });
        }

        parse_node_output(&outcome.stdout)
    }

    fn name(&self) -> &'static str {
        "pwsh"
    }
}

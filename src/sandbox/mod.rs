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

//! Sandbox runner for candidate commands
//!
//! Candidates run in a separate `pwsh` process under a non-bypass
//! execution policy with a hard wall-clock limit. Two invocation modes
//! are supported:
//!
//! - **Structured:** an operation name plus named parameters. Values are
//!   rendered as PowerShell literals (strings single-quoted, embedded `'`
//!   doubled) so no value can terminate its literal or start a new
//!   statement. Parameter names must be plain identifiers.
//! - **Script:** the text is written to a uniquely named `.ps1` file in
//!   the sandbox directory, run with `-File`, and removed afterwards on
//!   every exit path.
//!
//! The interpreter is always started from an argument vector, never a
//! shell string.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ConfigError, GuardConfig};

pub mod process;

pub use process::{run_with_timeout, ExecutionOutcome};

/// Errors from a single sandboxed execution
///
/// None of these are fatal for a batch: the verifier turns them into a
/// functional-incorrectness issue for the command at hand.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The interpreter could not be started (missing, not executable)
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Wall-clock limit reached; the process was killed
    #[error("Execution timed out after {after:?}")]
    TimedOut { after: Duration },
    /// Parameter name is not a plain identifier, or its value has no literal form
    #[error("Invalid parameter '{0}'")]
    InvalidParameter(String),
    /// Operation name is not a plain command name
    #[error("Invalid operation name '{0}'")]
    InvalidOperation(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A parameter value for structured invocation
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Switch parameter given without a value
    Switch,
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(&quote_powershell(s)),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Bool(true) => f.write_str("$true"),
            ParamValue::Bool(false) => f.write_str("$false"),
            ParamValue::Switch => Ok(()),
        }
    }
}

/// Wraps `value` in a PowerShell single-quoted literal
///
/// Inside single quotes nothing expands; the only special character is
/// `'` itself, escaped by doubling.
pub fn quote_powershell(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_command_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name.chars().any(|c| c.is_ascii_alphabetic())
}

/// Executes candidate commands in an isolated interpreter process
#[derive(Clone, Debug)]
pub struct SandboxRunner {
    interpreter: PathBuf,
    execution_policy: String,
    sandbox_dir: PathBuf,
    timeout: Duration,
}

impl SandboxRunner {
    /// Creates a runner and makes sure the sandbox directory exists
    ///
    /// # Errors
    ///
    /// `ConfigError::DirNotWritable` if the directory cannot be created.
    pub fn new(config: &GuardConfig) -> Result<Self, ConfigError> {
        let sandbox_dir = PathBuf::from(
            shellexpand::tilde(&config.sandbox_dir.to_string_lossy()).as_ref(),
        );
        fs::create_dir_all(&sandbox_dir)
            .map_err(|_| ConfigError::DirNotWritable(sandbox_dir.clone()))?;
        // Absolute, since children run with the sandbox as working directory
        let sandbox_dir = fs::canonicalize(&sandbox_dir)
            .map_err(|_| ConfigError::DirNotWritable(sandbox_dir.clone()))?;

        Ok(Self {
            interpreter: config.pwsh_path.clone(),
            execution_policy: config.execution_policy.clone(),
            sandbox_dir,
            timeout: config.sandbox_timeout(),
        })
    }

    /// Overrides the wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sandbox_dir(&self) -> &Path {
        &self.sandbox_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Renders a structured invocation as a single PowerShell command line
    ///
    /// Parameters are emitted in name order. The result is passed to the
    /// interpreter as one argument after `-Command`.
    pub fn render_invocation(
        operation: &str,
        parameters: &BTreeMap<String, ParamValue>,
    ) -> Result<String, SandboxError> {
        if !is_command_name(operation) {
            return Err(SandboxError::InvalidOperation(operation.to_string()));
        }

        let mut line = operation.to_string();
        for (name, value) in parameters {
            if !is_identifier(name) {
                return Err(SandboxError::InvalidParameter(name.clone()));
            }
            // NaN and infinities would bind as bare strings
            if matches!(value, ParamValue::Float(x) if !x.is_finite()) {
                return Err(SandboxError::InvalidParameter(name.clone()));
            }
            match value {
                ParamValue::Switch => line.push_str(&format!(" -{}", name)),
                // Colon form binds booleans to switch parameters too
                ParamValue::Bool(_) => line.push_str(&format!(" -{}:{}", name, value)),
                _ => line.push_str(&format!(" -{} {}", name, value)),
            }
        }
        Ok(line)
    }

    /// Runs `operation` with named `parameters`
    pub fn execute(
        &self,
        operation: &str,
        parameters: &BTreeMap<String, ParamValue>,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let line = Self::render_invocation(operation, parameters)?;
        tracing::info!(operation, parameters = parameters.len(), "sandbox structured invocation");

        let mut command = self.base_command();
        command.arg("-Command").arg(&line);
        let outcome = run_with_timeout(command, None, self.timeout)?;
        Self::log_outcome(&outcome);
        Ok(outcome)
    }

    /// Runs free-form script text, optionally feeding `stdin`
    ///
    /// The temporary script file is removed whether the run succeeds,
    /// fails to start, or times out.
    pub fn execute_script(
        &self,
        script: &str,
        stdin: Option<&str>,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let mut file = tempfile::Builder::new()
            .prefix("candidate-")
            .suffix(".ps1")
            .tempfile_in(&self.sandbox_dir)?;
        file.write_all(script.as_bytes())?;
        file.flush()?;
        let path = file.into_temp_path();

        tracing::info!(script = %path.display(), "sandbox script invocation");

        let mut command = self.base_command();
        command.arg("-File").arg(path.as_os_str());
        let result = run_with_timeout(command, stdin, self.timeout);

        if let Err(e) = path.close() {
            tracing::warn!(error = %e, "failed to remove temporary script");
        }

        let outcome = result?;
        Self::log_outcome(&outcome);
        Ok(outcome)
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy"])
            .arg(&self.execution_policy)
            .current_dir(&self.sandbox_dir);
        command
    }

    fn log_outcome(outcome: &ExecutionOutcome) {
        if outcome.success() {
            tracing::debug!(stdout_len = outcome.stdout.len(), "sandbox run finished");
        } else {
            tracing::warn!(
                exit_code = outcome.exit_code,
                stderr = %outcome.stderr.trim(),
                "sandbox run exited with failure"
            );
        }
    }
}

#[cfg(test)]
mod tests;

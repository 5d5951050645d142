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

//! Structural validation of PowerShell commands
//!
//! Parsing is delegated to a [`StructuralParser`], which turns command
//! text into a flat list of syntax-tree node type names
//! (`CommandAst`, `InvokeMemberExpressionAst`, ...). Two implementations
//! exist:
//!
//! - [`PwshParser`]: runs PowerShell's own parser in a child process,
//!   bounded by a timeout.
//! - [`LexicalParser`]: an in-process parser for a practical subset of
//!   the language, used when `pwsh` is unavailable and in tests.
//!
//! [`StructuralValidator`] maps node types (plus raw text where a node type
//! alone is ambiguous) onto a fixed vulnerability taxonomy. Any parser
//! failure is a validation failure.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ConfigError, GuardConfig};
use crate::sandbox::SandboxError;

mod lexer;
pub mod lexical;
pub mod pwsh;
pub mod validator;

pub use lexical::LexicalParser;
pub use pwsh::PwshParser;
pub use validator::{StructuralValidator, ValidationReport, Vulnerability};

/// Why a command could not be turned into node types
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to start parser '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Parser exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Parser timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("Malformed parser output: {0}")]
    MalformedOutput(String),

    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<SandboxError> for ParseError {
    fn from(error: SandboxError) -> Self {
        match error {
            SandboxError::Spawn { program, source } => ParseError::Spawn { program, source },
            SandboxError::TimedOut { after } => ParseError::TimedOut { after },
            SandboxError::Io(e) => ParseError::Io(e),
            other => ParseError::MalformedOutput(other.to_string()),
        }
    }
}

/// Capability interface for anything that can list a command's node types
///
/// Implementations must be usable from several verification threads at
/// once.
pub trait StructuralParser: Send + Sync {
    /// Node type names of `command` in pre-order
    fn parse(&self, command: &str) -> Result<Vec<String>, ParseError>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Picks the parser backend for a run
///
/// `builtin` selects the in-process parser; otherwise the external
/// PowerShell parser is prepared.
pub fn parser_from_config(
    config: &GuardConfig,
    builtin: bool,
) -> Result<Arc<dyn StructuralParser>, ConfigError> {
    if builtin {
        tracing::debug!("using built-in lexical parser");
        Ok(Arc::new(LexicalParser::new()))
    } else {
        Ok(Arc::new(PwshParser::new(config)?))
    }
}

#[cfg(test)]
mod tests;

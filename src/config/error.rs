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

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating the guard configuration.
///
/// All of these are fatal at startup. Per-command problems are never
/// reported through this type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration or knowledge base file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    /// TOML syntax or schema error.
    #[error("Invalid configuration in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    /// A pattern signature is not a valid regular expression.
    #[error("Invalid pattern '{signature}': {message}")]
    InvalidPattern { signature: String, message: String },
    /// No pattern definitions at all.
    #[error("Pattern table is empty: at least one CRITICAL or HIGH pattern is required")]
    MissingPatterns,
    /// A numeric setting is outside its accepted range.
    #[error("Invalid value for '{field}': {message}")]
    OutOfRange { field: &'static str, message: String },
    /// Sandbox or scratch directory cannot be created.
    #[error("Directory not writable: {0}")]
    DirNotWritable(PathBuf),
    /// Generic I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

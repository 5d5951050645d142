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

//! Line-delimited JSON datasets

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::verify::TestCase;

/// Errors raised while loading a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset not found: {0}")]
    NotFound(PathBuf),
    /// A non-blank line is not a valid record (1-based line number)
    #[error("Malformed record on line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One dataset item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Natural-language description of the task
    pub nl: String,
    /// Original (possibly risky) command
    pub code: String,
    /// Pre-recorded model output, replayed by the recorded generator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<Vec<TestCase>>,
}

impl DatasetRecord {
    pub fn new(nl: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            nl: nl.into(),
            code: code.into(),
            generated: None,
            test_cases: None,
        }
    }
}

/// Parses records from a reader, skipping blank lines
pub fn parse_jsonl(reader: impl BufRead) -> Result<Vec<DatasetRecord>, DatasetError> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record = serde_json::from_str::<DatasetRecord>(trimmed).map_err(|e| {
            DatasetError::Malformed {
                line: index + 1,
                message: e.to_string(),
            }
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Loads a `.jsonl` dataset file
pub fn load_jsonl(path: &Path) -> Result<Vec<DatasetRecord>, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }

    let records = parse_jsonl(BufReader::new(File::open(path)?))?;
    tracing::debug!(path = %path.display(), records = records.len(), "dataset loaded");
    Ok(records)
}

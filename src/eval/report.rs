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

//! Tabular result files

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use chrono::{DateTime, Local};

use crate::eval::EvaluationRow;

pub const CSV_HEADER: [&str; 7] = [
    "nl",
    "original",
    "generated",
    "risk_original",
    "risk_generated",
    "compliant",
    "issues",
];

/// `results_<generator>_rag<true|false>_<timestamp>.csv`
pub fn default_file_name(generator: &str, rag: bool, now: DateTime<Local>) -> String {
    format!("results_{}_rag{}_{}.csv", generator, rag, now.format("%Y%m%d_%H%M%S"))
}

/// Resolves the output file inside `dir`
pub fn output_path(dir: &Path, generator: &str, rag: bool) -> PathBuf {
    dir.join(default_file_name(generator, rag, Local::now()))
}

/// Quotes a field when it holds a separator, quote or line break
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// Renders rows as CSV text, header first
pub fn render_csv(rows: &[EvaluationRow]) -> String {
    let mut out = csv_line(&CSV_HEADER);
    for row in rows {
        let risk_original = row.risk_original.to_string();
        let risk_generated = row.risk_generated.to_string();
        let compliant = row.compliant.to_string();
        out.push_str(&csv_line(&[
            row.nl.as_str(),
            row.original.as_str(),
            row.generated.as_str(),
            risk_original.as_str(),
            risk_generated.as_str(),
            compliant.as_str(),
            row.issues.as_str(),
        ]));
    }
    out
}

/// Writes rows to `path` atomically
///
/// Readers see either the previous file or the complete new one.
pub fn write_csv(path: &Path, rows: &[EvaluationRow]) -> io::Result<()> {
    let mut file = AtomicWriteFile::options().open(path)?;
    file.write_all(render_csv(rows).as_bytes())?;
    file.commit()?;

    tracing::info!(path = %path.display(), rows = rows.len(), "results written");
    Ok(())
}

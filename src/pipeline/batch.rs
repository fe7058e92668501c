//! CSV batch source.
//!
//! Opening a batch reads only the header line. Data rows are pulled in a
//! second step so that a schema failure never reads past the header.

use crate::pipeline::types::InputRow;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column holding the observation time.
pub const TIMESTAMP_COLUMN: &str = "timestamp";
/// Column holding the measured stress level.
pub const STRESS_LEVEL_COLUMN: &str = "stress_level";
/// Optional column carrying a durable subject identifier.
pub const SUBJECT_COLUMN: &str = "subject_ref";

/// Failures while opening or reading a batch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("batch source not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read batch source {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, Default)]
struct ColumnIndex {
    timestamp: Option<usize>,
    stress_level: Option<usize>,
    subject_ref: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &[String]) -> Self {
        let find = |name: &str| headers.iter().position(|h| h == name);
        Self {
            timestamp: find(TIMESTAMP_COLUMN),
            stress_level: find(STRESS_LEVEL_COLUMN),
            subject_ref: find(SUBJECT_COLUMN),
        }
    }
}

/// An opened batch whose header has been read.
pub struct BatchSource {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    columns: ColumnIndex,
}

impl BatchSource {
    /// Open a batch file and read its header line.
    ///
    /// A zero-byte file opens successfully with an empty header set.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(path.clone()),
            _ => SourceError::Unreadable {
                path: path.clone(),
                reason: e.to_string(),
            },
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| SourceError::Unreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let columns = ColumnIndex::from_headers(&headers);

        Ok(Self {
            path,
            reader,
            headers,
            columns,
        })
    }

    /// Path this batch was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column names from the header line.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Read every data row, numbering them from zero in file order.
    ///
    /// Only the mapped cells are decoded. A mapped cell that is not valid
    /// UTF-8 reads as absent; bytes in other columns are never inspected.
    pub fn read_rows(mut self) -> Result<Vec<InputRow>, SourceError> {
        let columns = self.columns;
        let mut rows = Vec::new();

        for (position, record) in self.reader.byte_records().enumerate() {
            let record = record.map_err(|e| SourceError::Unreadable {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

            let field = |index: Option<usize>| -> Option<String> {
                index
                    .and_then(|i| record.get(i))
                    .and_then(|v| std::str::from_utf8(v).ok())
                    .map(str::to_string)
            };

            rows.push(InputRow {
                position,
                subject_ref: field(columns.subject_ref),
                stress_level: field(columns.stress_level),
                timestamp: field(columns.timestamp),
            });
        }

        Ok(rows)
    }
}

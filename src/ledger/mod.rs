//! Durable record of failed archive attempts.
//!
//! Append-only during normal runs; entries are removed or their retry count
//! incremented only by the retry protocol. Only the most recent failure per
//! URL/document pair is tracked. Snapshots export and import as JSON or CSV.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("malformed JSON ledger: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed CSV ledger at line {line}: {message}")]
    Csv { line: usize, message: String },
    #[error("CSV ledger is missing the expected header")]
    CsvHeader,
}

/// One failed archive attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedArchive {
    pub url: String,
    pub file_path: String,
    /// Wall-clock time of the most recent failure, RFC 3339.
    pub timestamp: String,
    pub error: String,
    #[serde(default)]
    pub retry_count: u32,
}

/// Snapshot serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerFormat {
    Json,
    Csv,
}

impl LedgerFormat {
    /// Pick a format from a file extension, falling back to sniffing the
    /// content (a JSON snapshot starts with `[`).
    #[must_use]
    pub fn detect(path: &Path, contents: &str) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Self::Csv,
            Some("json") => Self::Json,
            _ if contents.trim_start().starts_with('[') => Self::Json,
            _ => Self::Csv,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl std::str::FromStr for LedgerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown ledger format '{other}'")),
        }
    }
}

const CSV_HEADER: &str = "url,filePath,timestamp,error,retryCount";

/// Serialize entries in the given format.
///
/// # Errors
///
/// Returns an error only for JSON serialization failures.
pub fn encode(entries: &[FailedArchive], format: LedgerFormat) -> Result<String, LedgerError> {
    match format {
        LedgerFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        LedgerFormat::Csv => {
            let mut out = String::from(CSV_HEADER);
            out.push('\n');
            for entry in entries {
                let row = [
                    csv_field(&entry.url),
                    csv_field(&entry.file_path),
                    csv_field(&entry.timestamp),
                    csv_field(&entry.error),
                    entry.retry_count.to_string(),
                ];
                out.push_str(&row.join(","));
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Parse a snapshot in the given format.
///
/// # Errors
///
/// Returns an error describing the first malformed record; nothing is
/// partially applied.
pub fn decode(input: &str, format: LedgerFormat) -> Result<Vec<FailedArchive>, LedgerError> {
    match format {
        LedgerFormat::Json => Ok(serde_json::from_str(input)?),
        LedgerFormat::Csv => decode_csv(input),
    }
}

fn decode_csv(input: &str) -> Result<Vec<FailedArchive>, LedgerError> {
    let rows = parse_csv(input)?;
    let mut rows = rows.into_iter();

    let header = rows.next().ok_or(LedgerError::CsvHeader)?;
    if header.join(",") != CSV_HEADER {
        return Err(LedgerError::CsvHeader);
    }

    let mut entries = Vec::new();
    for (index, row) in rows.enumerate() {
        let line = index + 2;
        if row.len() == 1 && row[0].is_empty() {
            continue; // trailing blank line
        }
        if row.len() != 5 {
            return Err(LedgerError::Csv {
                line,
                message: format!("expected 5 fields, found {}", row.len()),
            });
        }
        let retry_count = if row[4].is_empty() {
            0
        } else {
            row[4].parse().map_err(|_| LedgerError::Csv {
                line,
                message: format!("invalid retry count '{}'", row[4]),
            })?
        };
        entries.push(FailedArchive {
            url: row[0].clone(),
            file_path: row[1].clone(),
            timestamp: row[2].clone(),
            error: row[3].clone(),
            retry_count,
        });
    }
    Ok(entries)
}

/// RFC 4180 field quoting: fields containing comma, quote, or newline are
/// wrapped in double quotes with embedded quotes doubled.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// RFC 4180 record parser. Quoted fields may contain commas, doubled quotes,
/// and line breaks.
fn parse_csv(input: &str) -> Result<Vec<Vec<String>>, LedgerError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                if field.is_empty() {
                    in_quotes = true;
                } else {
                    return Err(LedgerError::Csv {
                        line,
                        message: "quote inside unquoted field".to_string(),
                    });
                }
            }
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                line += 1;
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(LedgerError::Csv {
            line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

/// The durable failure ledger: a JSON file plus its in-memory entries.
///
/// The ledger is the single writer of its file; the orchestrator appends
/// through [`FailureLedger::record`] and the retry protocol removes or
/// updates entries.
pub struct FailureLedger {
    path: PathBuf,
    entries: Vec<FailedArchive>,
}

impl FailureLedger {
    /// Load the ledger, starting empty when the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => decode(&raw, LedgerFormat::Json)
                .with_context(|| format!("Malformed failure ledger: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read failure ledger: {}", path.display())
                })
            }
        };
        Ok(Self { path, entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[FailedArchive] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Record a failure, replacing any previous failure for the same
    /// URL/document pair (only the most recent one is tracked).
    pub fn record(&mut self, entry: FailedArchive) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.url == entry.url && e.file_path == entry.file_path)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Remove the entry for a URL/document pair. Returns whether one existed.
    pub fn remove(&mut self, url: &str, file_path: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.url == url && e.file_path == file_path));
        self.entries.len() != before
    }

    /// Persist the current entries. An empty ledger deletes the file rather
    /// than writing an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or removed.
    pub async fn save(&self) -> Result<()> {
        if self.entries.is_empty() {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => debug!(path = %self.path.display(), "Removed empty failure ledger"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to remove failure ledger: {}", self.path.display())
                    })
                }
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create ledger directory: {}", parent.display())
                })?;
            }
        }
        let raw = encode(&self.entries, LedgerFormat::Json)?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("Failed to write failure ledger: {}", self.path.display()))
    }

    /// Drop all entries and delete the ledger file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    pub async fn clear(&mut self) -> Result<usize> {
        let count = self.entries.len();
        self.entries.clear();
        self.save().await?;
        Ok(count)
    }

    /// Write a snapshot of the current entries in the given format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub async fn export(&self, out: &Path, format: LedgerFormat) -> Result<()> {
        let raw = encode(&self.entries, format)?;
        tokio::fs::write(out, raw)
            .await
            .with_context(|| format!("Failed to write ledger export: {}", out.display()))
    }
}

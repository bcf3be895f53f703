//! ---
//! qis_section: "03-persistence-logging"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Persistence abstractions and storage bindings."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::{PersistenceError, Result};

/// On-disk format version for journal files.
pub const JOURNAL_VERSION: u16 = 1;

/// Journal file header stored as the first line.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalHeader {
    version: u16,
    created_at: DateTime<Utc>,
    hash: String,
}

impl JournalHeader {
    fn new() -> Self {
        let created_at = Utc::now();
        let hash = format!(
            "{:x}",
            sha2::Sha256::digest(created_at.to_rfc3339().as_bytes())
        );
        Self {
            version: JOURNAL_VERSION,
            created_at,
            hash,
        }
    }
}

/// Kind of record mutation captured in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Record inserted.
    Created,
    /// Record replaced in place.
    Updated,
    /// Record removed.
    Deleted,
}

/// One committed record mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Sequential identifier assigned when appending.
    pub sequence: u64,
    /// Timestamp when the mutation was committed.
    pub timestamp: DateTime<Utc>,
    /// Inspection stage the record belongs to (`material`, `fitup`, ...).
    pub stage: String,
    /// What happened to the record.
    pub kind: MutationKind,
    /// The record after the mutation (before it, for deletes).
    pub record: serde_json::Value,
}

impl JournalEntry {
    /// Construct an entry; the sequence is assigned by the writer.
    pub fn new(stage: impl Into<String>, kind: MutationKind, record: serde_json::Value) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            stage: stage.into(),
            kind,
            record,
        }
    }
}

/// Append-only writer for the mutation journal.
pub struct JournalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    next_sequence: u64,
}

impl JournalWriter {
    /// Open a journal for appending, writing a header if the file is new.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let exists = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        if !exists || is_empty(path)? {
            let header = JournalHeader::new();
            let line = serde_json::to_string(&header)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            return Ok(Self {
                path: path.to_path_buf(),
                writer,
                next_sequence: 0,
            });
        }

        let next_sequence = determine_next_sequence(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            next_sequence,
        })
    }

    /// Append an entry, returning the assigned sequence number.
    pub fn append(&mut self, mut entry: JournalEntry) -> Result<u64> {
        self.next_sequence += 1;
        entry.sequence = self.next_sequence;
        let line = serde_json::to_string(&entry)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(entry.sequence)
    }

    /// Path of the underlying journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sequential reader over a journal file.
#[derive(Debug)]
pub struct JournalReader {
    lines: std::io::Lines<BufReader<File>>,
}

impl JournalReader {
    /// Open a journal for replay, validating the header line.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();
        let header_line = lines
            .next()
            .transpose()?
            .ok_or(PersistenceError::MalformedHeader)?;
        let header: JournalHeader =
            serde_json::from_str(&header_line).map_err(|_| PersistenceError::MalformedHeader)?;
        if header.version != JOURNAL_VERSION {
            return Err(PersistenceError::MalformedHeader);
        }
        Ok(Self { lines })
    }
}

impl Iterator for JournalReader {
    type Item = Result<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Err(err) => return Some(Err(err.into())),
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    return Some(serde_json::from_str(&line).map_err(PersistenceError::from))
                }
            }
        }
    }
}

/// Replay every entry of a journal file in order.
pub fn replay(path: &Path) -> Result<Vec<JournalEntry>> {
    JournalReader::open(path)?.collect()
}

fn is_empty(path: &Path) -> Result<bool> {
    Ok(fs::metadata(path)?.len() == 0)
}

fn determine_next_sequence(path: &Path) -> Result<u64> {
    let mut last = 0;
    for entry in JournalReader::open(path)? {
        last = entry?.sequence;
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_replay_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.jsonl");
        let mut writer = JournalWriter::open(&path).unwrap();
        let first = writer
            .append(JournalEntry::new(
                "material",
                MutationKind::Created,
                serde_json::json!({"report_no": "MVR-100"}),
            ))
            .unwrap();
        let second = writer
            .append(JournalEntry::new(
                "fitup",
                MutationKind::Deleted,
                serde_json::json!({"report_no": "FR-001"}),
            ))
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let entries = replay(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, "material");
        assert_eq!(entries[1].kind, MutationKind::Deleted);
    }

    #[test]
    fn reopened_journal_continues_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.jsonl");
        {
            let mut writer = JournalWriter::open(&path).unwrap();
            writer
                .append(JournalEntry::new(
                    "ndt",
                    MutationKind::Created,
                    serde_json::json!({}),
                ))
                .unwrap();
        }
        let mut writer = JournalWriter::open(&path).unwrap();
        let sequence = writer
            .append(JournalEntry::new(
                "ndt",
                MutationKind::Updated,
                serde_json::json!({}),
            ))
            .unwrap();
        assert_eq!(sequence, 2);
    }

    #[test]
    fn missing_header_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        fs::write(&path, "not json\n").unwrap();
        assert!(matches!(
            JournalReader::open(&path).unwrap_err(),
            PersistenceError::MalformedHeader
        ));
    }
}

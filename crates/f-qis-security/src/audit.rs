//! ---
//! qis_section: "06-security-access-control"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Identity, session issuance, and access resolution."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::Display;
use uuid::Uuid;

/// Auditable events in the inspection platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    /// Session token issued.
    TokenIssued,
    /// Project created or updated.
    ProjectMutated,
    /// Assignment granted or changed.
    AssignmentGranted,
    /// Assignment revoked.
    AssignmentRevoked,
    /// Inspection record created.
    RecordCreated,
    /// Inspection record updated.
    RecordUpdated,
    /// Inspection record deleted.
    RecordDeleted,
}

/// Entry recorded in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Acting user.
    pub actor: Uuid,
    /// Event type.
    pub action: AuditAction,
    /// Project the event belongs to, when project-scoped.
    pub project_id: Option<Uuid>,
    /// Additional context serialized as JSON.
    pub metadata: serde_json::Value,
    /// SHA-256 hash of the entry contents and previous hash.
    pub hash: String,
    /// Hash of the previous entry (or zero string for the first entry).
    pub previous_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        timestamp: DateTime<Utc>,
        actor: Uuid,
        action: AuditAction,
        project_id: Option<Uuid>,
        metadata: &serde_json::Value,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(actor.as_bytes());
        hasher.update(action.to_string().as_bytes());
        if let Some(project) = project_id {
            hasher.update(project.as_bytes());
        }
        hasher.update(metadata.to_string().as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Hash-chained audit log backed by a newline-delimited JSON file.
///
/// Shareable across request handlers; appends are serialised through an
/// internal mutex so the chain head never forks.
#[derive(Debug, Clone)]
pub struct AuditLog {
    inner: Arc<Mutex<AuditLogInner>>,
}

#[derive(Debug)]
struct AuditLogInner {
    path: PathBuf,
    last_hash: String,
}

impl AuditLog {
    /// Open an audit log at the given path. Existing entries are loaded to
    /// determine the head hash.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("unable to create audit directory {}", parent.display())
                })?;
            }
        }
        let mut last_hash = "0".repeat(64);
        if path.exists() {
            for line in BufReader::new(fs::File::open(&path)?).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: AuditEntry = serde_json::from_str(&line)?;
                last_hash = entry.hash;
            }
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(AuditLogInner { path, last_hash })),
        })
    }

    /// Append a new audit entry to the log.
    pub fn append(
        &self,
        actor: Uuid,
        action: AuditAction,
        project_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Result<AuditEntry> {
        let mut inner = self.inner.lock();
        let timestamp = Utc::now();
        let hash = AuditEntry::compute_hash(
            timestamp,
            actor,
            action,
            project_id,
            &metadata,
            &inner.last_hash,
        );
        let entry = AuditEntry {
            timestamp,
            actor,
            action,
            project_id,
            metadata,
            hash: hash.clone(),
            previous_hash: inner.last_hash.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.path)
            .with_context(|| format!("unable to open audit log {}", inner.path.display()))?;
        file.write_all(serde_json::to_string(&entry)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        inner.last_hash = hash;
        Ok(entry)
    }

    /// Verify integrity of the log (detect tampering).
    pub fn verify(&self) -> Result<bool> {
        let inner = self.inner.lock();
        let mut previous = "0".repeat(64);
        if !inner.path.exists() {
            return Ok(true);
        }
        for line in BufReader::new(fs::File::open(&inner.path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line)?;
            let expected = AuditEntry::compute_hash(
                entry.timestamp,
                entry.actor,
                entry.action,
                entry.project_id,
                &entry.metadata,
                &previous,
            );
            if expected != entry.hash {
                return Ok(false);
            }
            previous = entry.hash;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};
    use tempfile::tempdir;

    #[test]
    fn append_reload_and_verify() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let actor = Uuid::new_v4();
        let project = Uuid::new_v4();

        let log = AuditLog::new(&path).unwrap();
        log.append(
            actor,
            AuditAction::RecordCreated,
            Some(project),
            serde_json::json!({"stage": "material", "report_no": "MVR-100"}),
        )
        .unwrap();
        log.append(actor, AuditAction::AssignmentRevoked, Some(project), serde_json::json!({}))
            .unwrap();
        assert!(log.verify().unwrap());

        // A reopened log continues the chain instead of restarting it.
        let reopened = AuditLog::new(&path).unwrap();
        reopened
            .append(actor, AuditAction::TokenIssued, None, serde_json::json!({}))
            .unwrap();
        assert!(reopened.verify().unwrap());
    }

    #[test]
    fn audit_log_detects_tampering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::new(&path).unwrap();
        let actor = Uuid::new_v4();
        log.append(
            actor,
            AuditAction::RecordUpdated,
            None,
            serde_json::json!({"result": "pass"}),
        )
        .unwrap();
        log.append(
            actor,
            AuditAction::RecordDeleted,
            None,
            serde_json::json!({"stage": "fitup"}),
        )
        .unwrap();
        assert!(log.verify().unwrap());

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        let mut entries: Vec<serde_json::Value> = contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        entries[0]["metadata"]["result"] = serde_json::json!("fail");
        file.set_len(0).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        for value in entries {
            file.write_all(value.to_string().as_bytes()).unwrap();
            file.write_all(b"\n").unwrap();
        }
        assert!(!AuditLog::new(&path).unwrap().verify().unwrap());
    }
}

//! ---
//! qis_section: "03-persistence-logging"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Persistence abstractions and storage bindings."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Append-only mutation journal for inspection records. The journal is a
//! post-mortem artifact: replaying it reconstructs the mutation history,
//! it is never consulted on the request path.

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Wrapper for IO errors encountered while reading/writing journal files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when a journal file starts with an unreadable header.
    #[error("malformed journal header")]
    MalformedHeader,
}

pub mod journal;

pub use journal::{replay, JournalEntry, JournalReader, JournalWriter, MutationKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_error_display() {
        let err = PersistenceError::MalformedHeader;
        assert_eq!(format!("{err}"), "malformed journal header");
    }
}

//! ---
//! qis_section: "02-inspection-workflow"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Inspection-chain validation and workflow engine."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
//! Workflow engine for the inspection chain
//! material → fit-up → final → NDT.
//!
//! Every mutation is validated in full before any write: referential
//! existence and project ownership of upstream references, enum validity,
//! report-number uniqueness within (project, stage), and state-transition
//! legality. The chain is a strict forward-reference DAG; a stage only
//! ever references strictly earlier stages in the same project.

use thiserror::Error;
use uuid::Uuid;

pub mod engine;
pub mod records;
pub mod store;

pub use engine::WorkflowEngine;
pub use records::{
    FinalDraft, FinalInspection, FinalResult, FinalUpdate, FitUpDraft, FitUpInspection,
    FitUpResult, FitUpUpdate, MaterialDraft, MaterialInspection, MaterialResult, MaterialUpdate,
    NdtDraft, NdtMethod, NdtRequest, NdtResult, NdtStatus, NdtUpdate, Stage,
};
pub use store::{MemoryRecordStore, RecordStore, StoreError};

/// Result alias used throughout the workflow crate.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Malformed payload or illegal state transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A fit-up's two material references name the same record.
    #[error("fit-up references the same material twice")]
    DuplicateMaterialReference,
    /// A result/status/method field carries an unrecognized value.
    #[error("invalid value {value:?} for field {field}")]
    InvalidEnumValue {
        /// Offending field name.
        field: &'static str,
        /// The rejected raw value.
        value: String,
    },
    /// A terminal state would move back to pending.
    #[error("illegal transition of {field} from {from} to {to}")]
    IllegalTransition {
        /// Field the transition applies to.
        field: &'static str,
        /// Current value.
        from: String,
        /// Requested value.
        to: String,
    },
}

/// Dangling or cross-project reference, or a delete blocked downstream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferentialIntegrityError {
    /// A referenced upstream record does not exist.
    #[error("referenced {stage} record {id} does not exist")]
    MissingReference {
        /// Stage of the missing record.
        stage: Stage,
        /// Identifier that failed to resolve.
        id: Uuid,
    },
    /// A referenced record lives in a different project.
    #[error("referenced {stage} record {id} belongs to a different project")]
    CrossProjectReference {
        /// Stage of the referenced record.
        stage: Stage,
        /// Identifier of the out-of-project record.
        id: Uuid,
    },
    /// The record is still referenced by a later stage.
    #[error("{stage} record {id} is still referenced downstream")]
    ReferencedByDownstream {
        /// Stage of the record being deleted.
        stage: Stage,
        /// Identifier of the blocked record.
        id: Uuid,
    },
}

/// Uniqueness violation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConflictError {
    /// Another record in the same project and stage carries this report
    /// number.
    #[error("duplicate report number {report_no:?} for {stage}")]
    DuplicateReportNumber {
        /// Stage the collision occurred in.
        stage: Stage,
        /// The colliding report number.
        report_no: String,
    },
}

/// Errors surfaced by the workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The caller's resolved capability does not cover the operation.
    #[error("operation requires {required} capability")]
    InsufficientCapability {
        /// Minimum project role the operation demands.
        required: f_qis_registry::ProjectRole,
    },
    /// Record lookup failure, including ids outside the caller's project.
    #[error("record not found")]
    NotFound,
    /// Malformed payload or illegal transition.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Chain integrity violation.
    #[error(transparent)]
    ReferentialIntegrity(#[from] ReferentialIntegrityError),
    /// Uniqueness violation.
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    /// Record store failure. Fatal for the request; never partially
    /// committed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => WorkflowError::NotFound,
            StoreError::UniqueViolation { stage, report_no } => {
                WorkflowError::Conflict(ConflictError::DuplicateReportNumber { stage, report_no })
            }
            StoreError::Journal(inner) => WorkflowError::Storage(inner.to_string()),
        }
    }
}

//! ---
//! qis_section: "05-networking-external-interfaces"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "REST API surface for external integrations."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use f_qis_registry::RegistryError;
use f_qis_security::{AuthenticationError, AuthorizationError};
use f_qis_workflow::WorkflowError;

/// Error kind names surfaced in response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Bad or expired credential.
    AuthenticationError,
    /// Authenticated but capability insufficient.
    AuthorizationError,
    /// Malformed payload or illegal state transition.
    ValidationError,
    /// Dangling or cross-project reference, or delete blocked downstream.
    ReferentialIntegrityError,
    /// Uniqueness violation.
    ConflictError,
    /// Unknown id, or an id outside the caller's authorized scope.
    NotFound,
    /// Storage failure. Generic, distinct from the taxonomy kinds.
    StorageError,
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub detail: String,
}

/// API error carrying its HTTP status and wire body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            detail: detail.into(),
        }
    }

    /// 401 for a missing or unparseable Authorization header.
    pub fn missing_token() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ErrorKind::AuthorizationError,
            "missing bearer token",
        )
    }

    /// 404 that deliberately does not distinguish unknown ids from ids
    /// outside the caller's project scope.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorKind::NotFound, "not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            kind: self.kind,
            detail: self.detail,
        });
        (self.status, body).into_response()
    }
}

impl From<AuthenticationError> for ApiError {
    fn from(err: AuthenticationError) -> Self {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            ErrorKind::AuthenticationError,
            err.to_string(),
        )
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::TokenExpired | AuthorizationError::TokenInvalid => ApiError::new(
                StatusCode::UNAUTHORIZED,
                ErrorKind::AuthorizationError,
                err.to_string(),
            ),
            AuthorizationError::InsufficientRole => ApiError::new(
                StatusCode::FORBIDDEN,
                ErrorKind::AuthorizationError,
                err.to_string(),
            ),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match &err {
            WorkflowError::InsufficientCapability { .. } => ApiError::new(
                StatusCode::FORBIDDEN,
                ErrorKind::AuthorizationError,
                err.to_string(),
            ),
            WorkflowError::NotFound => ApiError::not_found(),
            WorkflowError::Validation(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                ErrorKind::ValidationError,
                err.to_string(),
            ),
            WorkflowError::ReferentialIntegrity(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                ErrorKind::ReferentialIntegrityError,
                err.to_string(),
            ),
            WorkflowError::Conflict(_) => ApiError::new(
                StatusCode::CONFLICT,
                ErrorKind::ConflictError,
                err.to_string(),
            ),
            WorkflowError::Storage(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::StorageError,
                "storage failure",
            ),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match &err {
            RegistryError::DuplicateProjectNumber(_) => ApiError::new(
                StatusCode::CONFLICT,
                ErrorKind::ConflictError,
                err.to_string(),
            ),
            RegistryError::ProjectNotFound(_) => ApiError::not_found(),
        }
    }
}

//! ---
//! qis_section: "04-project-registry"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Project registry and per-project role assignments."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
//! Project registry: projects, per-user project-role assignments, and the
//! read-through assignment cache consulted by the access resolver.

use thiserror::Error;
use uuid::Uuid;

pub mod project;
pub mod registry;

pub use project::{NewProject, Project, ProjectAssignment, ProjectRole, ProjectStatus, ProjectUpdate};
pub use registry::ProjectRegistry;

/// Result alias used throughout the registry crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors returned by the project registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Another project already carries the requested project number.
    #[error("duplicate project number: {0}")]
    DuplicateProjectNumber(String),
    /// Project lookup failure.
    #[error("project not found: {0}")]
    ProjectNotFound(Uuid),
}

//! ---
//! qis_section: "04-project-registry"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Project registry and per-project role assignments."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a fabrication project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProjectStatus {
    /// Work in progress.
    #[default]
    Active,
    /// All inspection stages closed out.
    Completed,
    /// Temporarily suspended.
    OnHold,
    /// Abandoned before completion.
    Cancelled,
}

/// Role granted to a user for a specific project.
///
/// The derived ordering is the capability lattice: `Viewer < Editor < Manager`.
/// A required capability is satisfied by any role that compares greater or
/// equal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProjectRole {
    /// Read-only access to the project's inspection records.
    Viewer,
    /// Create and edit inspection records.
    Editor,
    /// Editor capability plus assignment management within the project.
    Manager,
}

/// A fabrication project owning its inspection chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Stable identifier.
    pub id: Uuid,
    /// Unique project number, e.g. `PRJ-001`.
    pub number: String,
    /// Human readable name.
    pub name: String,
    /// Client the work is performed for.
    pub client: String,
    /// Lifecycle status.
    pub status: ProjectStatus,
    /// User id of the responsible manager.
    pub manager: Uuid,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub number: String,
    pub name: String,
    pub client: String,
    #[serde(default)]
    pub status: ProjectStatus,
    pub manager: Uuid,
}

/// Partial update for a project. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub client: Option<String>,
    pub status: Option<ProjectStatus>,
    pub manager: Option<Uuid>,
}

/// Association between a user and a project.
///
/// At most one assignment exists per `(user, project)` pair; re-assigning
/// replaces the role in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectAssignment {
    /// Assigned user.
    pub user_id: Uuid,
    /// Target project.
    pub project_id: Uuid,
    /// Granted role.
    pub role: ProjectRole,
    /// User who granted (or last changed) the assignment.
    pub assigned_by: Uuid,
    /// Timestamp of the original grant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_ordering_matches_capability_lattice() {
        assert!(ProjectRole::Viewer < ProjectRole::Editor);
        assert!(ProjectRole::Editor < ProjectRole::Manager);
        assert!(ProjectRole::Manager >= ProjectRole::Viewer);
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!(ProjectRole::from_str("editor").unwrap(), ProjectRole::Editor);
        assert_eq!(ProjectRole::from_str("Manager").unwrap(), ProjectRole::Manager);
        assert!(ProjectRole::from_str("inspector").is_err());
    }

    #[test]
    fn status_round_trips_through_serde() {
        let json = serde_json::to_string(&ProjectStatus::OnHold).unwrap();
        assert_eq!(json, "\"on_hold\"");
        let back: ProjectStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProjectStatus::OnHold);
    }
}

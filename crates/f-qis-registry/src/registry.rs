//! ---
//! qis_section: "04-project-registry"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Project registry and per-project role assignments."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::project::{
    NewProject, Project, ProjectAssignment, ProjectRole, ProjectUpdate,
};
use crate::{RegistryError, Result};

/// In-memory project registry.
///
/// The assignment map is the system of record; the cache is a derived,
/// read-through structure invalidated synchronously inside every mutating
/// call so authorization never observes a stale grant.
#[derive(Debug, Default, Clone)]
pub struct ProjectRegistry {
    projects: Arc<RwLock<HashMap<Uuid, Project>>>,
    assignments: Arc<RwLock<HashMap<(Uuid, Uuid), ProjectAssignment>>>,
    cache: Arc<RwLock<HashMap<(Uuid, Uuid), Option<ProjectRole>>>>,
}

impl ProjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a project. Project numbers are unique.
    pub fn create_project(&self, new: NewProject) -> Result<Project> {
        let mut projects = self.projects.write();
        if projects.values().any(|p| p.number == new.number) {
            return Err(RegistryError::DuplicateProjectNumber(new.number));
        }
        let project = Project {
            id: Uuid::new_v4(),
            number: new.number,
            name: new.name,
            client: new.client,
            status: new.status,
            manager: new.manager,
            created_at: Utc::now(),
        };
        projects.insert(project.id, project.clone());
        debug!(project = %project.id, number = %project.number, "project created");
        Ok(project)
    }

    /// Retrieve a project by id.
    pub fn get_project(&self, id: Uuid) -> Option<Project> {
        self.projects.read().get(&id).cloned()
    }

    /// Retrieve a project by its unique number.
    pub fn get_by_number(&self, number: &str) -> Option<Project> {
        self.projects
            .read()
            .values()
            .find(|p| p.number == number)
            .cloned()
    }

    /// Enumerate all projects.
    pub fn list_projects(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self.projects.read().values().cloned().collect();
        projects.sort_by(|a, b| a.number.cmp(&b.number));
        projects
    }

    /// Apply a partial update to a project.
    pub fn update_project(&self, id: Uuid, update: ProjectUpdate) -> Result<Project> {
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(&id)
            .ok_or(RegistryError::ProjectNotFound(id))?;
        if let Some(name) = update.name {
            project.name = name;
        }
        if let Some(client) = update.client {
            project.client = client;
        }
        if let Some(status) = update.status {
            project.status = status;
        }
        if let Some(manager) = update.manager {
            project.manager = manager;
        }
        Ok(project.clone())
    }

    /// Grant (or change) a user's role on a project.
    ///
    /// Upserts: a second `assign` for the same pair replaces the role and
    /// `assigned_by`, preserving the original grant timestamp. Never inserts
    /// a duplicate row.
    pub fn assign(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        role: ProjectRole,
        assigned_by: Uuid,
    ) -> Result<ProjectAssignment> {
        if !self.projects.read().contains_key(&project_id) {
            return Err(RegistryError::ProjectNotFound(project_id));
        }
        let mut assignments = self.assignments.write();
        let key = (user_id, project_id);
        let assignment = match assignments.get(&key) {
            Some(existing) => ProjectAssignment {
                role,
                assigned_by,
                ..existing.clone()
            },
            None => ProjectAssignment {
                user_id,
                project_id,
                role,
                assigned_by,
                created_at: Utc::now(),
            },
        };
        assignments.insert(key, assignment.clone());
        // Invalidate before the write lock drops so no reader can observe
        // the old grant after this call returns.
        self.cache.write().remove(&key);
        debug!(user = %user_id, project = %project_id, role = %role, "assignment upserted");
        Ok(assignment)
    }

    /// Remove a user's assignment on a project. Idempotent.
    pub fn revoke(&self, user_id: Uuid, project_id: Uuid) {
        let key = (user_id, project_id);
        let mut assignments = self.assignments.write();
        let removed = assignments.remove(&key).is_some();
        self.cache.write().remove(&key);
        drop(assignments);
        if removed {
            debug!(user = %user_id, project = %project_id, "assignment revoked");
        }
    }

    /// Resolve the user's role on a project, if any, through the cache.
    pub fn resolve_assignment(&self, user_id: Uuid, project_id: Uuid) -> Option<ProjectRole> {
        let key = (user_id, project_id);
        if let Some(cached) = self.cache.read().get(&key) {
            return *cached;
        }
        // Fill the cache while still holding the assignments lock: a
        // concurrent upsert/revoke invalidates under that same lock, so a
        // stale value can never be inserted after its invalidation.
        let assignments = self.assignments.read();
        let role = assignments.get(&key).map(|assignment| assignment.role);
        self.cache.write().insert(key, role);
        drop(assignments);
        role
    }

    /// Enumerate assignments for a project.
    pub fn assignments_for_project(&self, project_id: Uuid) -> Vec<ProjectAssignment> {
        self.assignments
            .read()
            .values()
            .filter(|assignment| assignment.project_id == project_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project(registry: &ProjectRegistry) -> Project {
        registry
            .create_project(NewProject {
                number: "PRJ-001".into(),
                name: "Pipe rack".into(),
                client: "Acme".into(),
                status: Default::default(),
                manager: Uuid::new_v4(),
            })
            .unwrap()
    }

    #[test]
    fn duplicate_project_number_is_rejected() {
        let registry = ProjectRegistry::new();
        sample_project(&registry);
        let err = registry
            .create_project(NewProject {
                number: "PRJ-001".into(),
                name: "Other".into(),
                client: "Acme".into(),
                status: Default::default(),
                manager: Uuid::new_v4(),
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateProjectNumber(_)));
    }

    #[test]
    fn assign_upserts_single_row() {
        let registry = ProjectRegistry::new();
        let project = sample_project(&registry);
        let user = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let first = registry
            .assign(user, project.id, ProjectRole::Viewer, admin)
            .unwrap();
        let second = registry
            .assign(user, project.id, ProjectRole::Editor, admin)
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.role, ProjectRole::Editor);
        assert_eq!(registry.assignments_for_project(project.id).len(), 1);
        assert_eq!(
            registry.resolve_assignment(user, project.id),
            Some(ProjectRole::Editor)
        );
    }

    #[test]
    fn assign_requires_existing_project() {
        let registry = ProjectRegistry::new();
        let err = registry
            .assign(Uuid::new_v4(), Uuid::new_v4(), ProjectRole::Viewer, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, RegistryError::ProjectNotFound(_)));
    }

    #[test]
    fn revoke_is_idempotent_and_invalidates_cache() {
        let registry = ProjectRegistry::new();
        let project = sample_project(&registry);
        let user = Uuid::new_v4();
        registry
            .assign(user, project.id, ProjectRole::Manager, Uuid::new_v4())
            .unwrap();
        // Warm the cache, then revoke twice.
        assert_eq!(
            registry.resolve_assignment(user, project.id),
            Some(ProjectRole::Manager)
        );
        registry.revoke(user, project.id);
        registry.revoke(user, project.id);
        assert_eq!(registry.resolve_assignment(user, project.id), None);
    }

    #[test]
    fn update_project_applies_partial_fields() {
        let registry = ProjectRegistry::new();
        let project = sample_project(&registry);
        let updated = registry
            .update_project(
                project.id,
                ProjectUpdate {
                    status: Some(crate::ProjectStatus::OnHold),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, crate::ProjectStatus::OnHold);
        assert_eq!(updated.name, project.name);
    }
}

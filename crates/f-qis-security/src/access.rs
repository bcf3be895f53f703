//! ---
//! qis_section: "06-security-access-control"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Identity, session issuance, and access resolution."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use f_qis_registry::{ProjectRegistry, ProjectRole};

use crate::identity::{GlobalRole, IdentityDirectory};
use crate::session::SessionIssuer;

/// Errors occurring during access resolution.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// Token expired.
    #[error("token expired")]
    TokenExpired,
    /// Token missing, malformed, forged, or bound to an unusable account.
    #[error("token invalid")]
    TokenInvalid,
    /// Authenticated, but the resolved capability does not satisfy the
    /// requirement.
    #[error("insufficient role")]
    InsufficientRole,
}

/// The resolved outcome of a successful authorization.
#[derive(Debug, Clone, Serialize)]
pub struct AccessContext {
    /// Authenticated user.
    pub user_id: Uuid,
    /// Username for audit attribution.
    pub username: String,
    /// Current global role from the directory, not the token.
    pub global_role: GlobalRole,
    /// Effective capability on the requested project, when one was given.
    pub capability: Option<ProjectRole>,
}

/// Per-request access resolver.
///
/// Combines the caller's global role with any project-specific grant from
/// the registry. The token is revalidated and the user re-resolved from
/// the directory on every call; caller-asserted claims are transport only.
#[derive(Debug, Clone)]
pub struct AccessResolver {
    directory: IdentityDirectory,
    issuer: SessionIssuer,
    registry: ProjectRegistry,
    allow_member_default_capability: bool,
}

impl AccessResolver {
    /// Build a resolver.
    pub fn new(
        directory: IdentityDirectory,
        issuer: SessionIssuer,
        registry: ProjectRegistry,
        allow_member_default_capability: bool,
    ) -> Self {
        Self {
            directory,
            issuer,
            registry,
            allow_member_default_capability,
        }
    }

    /// Decide whether the bearer of `token` may act with `required`
    /// capability, optionally scoped to a project.
    ///
    /// * Admin global role passes unconditionally.
    /// * With a project id, the capability comes from the caller's
    ///   assignment (absence denies), compared on the
    ///   `Viewer < Editor < Manager` order.
    /// * Without a project id, any active account satisfies a `Viewer`
    ///   requirement (directory-level reads); anything stronger is
    ///   admin-only.
    pub fn authorize(
        &self,
        token: &str,
        project_id: Option<Uuid>,
        required: ProjectRole,
    ) -> Result<AccessContext, AuthorizationError> {
        let claims = self.issuer.verify(token)?;
        let user = self
            .directory
            .get_user(claims.subject)
            .ok_or(AuthorizationError::TokenInvalid)?;
        if !user.active {
            // A deactivated account's outstanding tokens die immediately.
            return Err(AuthorizationError::TokenInvalid);
        }

        if user.global_role == GlobalRole::Admin {
            return Ok(AccessContext {
                user_id: user.id,
                username: user.username,
                global_role: user.global_role,
                capability: project_id.map(|_| ProjectRole::Manager),
            });
        }

        let Some(project_id) = project_id else {
            if required == ProjectRole::Viewer {
                return Ok(AccessContext {
                    user_id: user.id,
                    username: user.username,
                    global_role: user.global_role,
                    capability: None,
                });
            }
            return Err(AuthorizationError::InsufficientRole);
        };

        let assigned = self.registry.resolve_assignment(user.id, project_id);
        let capability = match assigned {
            Some(role) => Some(role),
            None if self.allow_member_default_capability
                && user.global_role == GlobalRole::Member =>
            {
                Some(ProjectRole::Editor)
            }
            None => None,
        };

        match capability {
            Some(role) if role >= required => Ok(AccessContext {
                user_id: user.id,
                username: user.username,
                global_role: user.global_role,
                capability: Some(role),
            }),
            _ => {
                debug!(user = %user.id, project = %project_id, required = %required, "access denied");
                Err(AuthorizationError::InsufficientRole)
            }
        }
    }
}

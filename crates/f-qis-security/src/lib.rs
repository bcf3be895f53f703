//! ---
//! qis_section: "06-security-access-control"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Identity, session issuance, and access resolution."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Security subsystem: the identity directory, the stateless session
//! issuer, the per-request access resolver, and the hash-chained audit
//! log.

pub mod access;
pub mod audit;
pub mod identity;
pub mod session;

pub use access::{AccessContext, AccessResolver, AuthorizationError};
pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use identity::{GlobalRole, IdentityDirectory, IdentityError, UserAccount};
pub use session::{
    AuthenticationError, KeyMaterial, SessionIssuer, SessionToken, TokenClaims,
};

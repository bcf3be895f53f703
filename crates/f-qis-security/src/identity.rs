//! ---
//! qis_section: "06-security-access-control"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Identity, session issuance, and access resolution."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// System-wide privilege level, independent of any project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GlobalRole {
    /// Can authenticate; sees only what explicit assignments grant.
    #[default]
    Visitor,
    /// Regular staff account. Grants no project capability by itself.
    Member,
    /// Full, unconditional access and account administration.
    Admin,
}

/// Representation of a user within the identity directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    /// Stable identifier.
    pub id: Uuid,
    /// Human readable username, unique across the directory.
    pub username: String,
    /// Salted SHA-256 credential hash in `salt$hex` form. Never the secret.
    pub credential_hash: String,
    /// System-wide role.
    pub global_role: GlobalRole,
    /// Whether the user can authenticate. Accounts are deactivated, never
    /// hard-deleted, while assignments or authored records reference them.
    pub active: bool,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// Errors returned by the identity subsystem.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Attempted to create a user whose username is already taken.
    #[error("username already taken")]
    UsernameTaken,
    /// User not found.
    #[error("user not found")]
    UserNotFound,
    /// Credential verification failure.
    #[error("invalid credential")]
    InvalidCredential,
    /// The account exists but cannot authenticate.
    #[error("account is inactive")]
    InactiveAccount,
}

/// In-memory identity directory.
#[derive(Debug, Default, Clone)]
pub struct IdentityDirectory {
    users: Arc<RwLock<HashMap<Uuid, UserAccount>>>,
}

impl IdentityDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any account exists yet. Used for bootstrap seeding.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// Create a user account. Usernames are unique.
    pub fn create_user(
        &self,
        username: impl Into<String>,
        secret: &str,
        global_role: GlobalRole,
    ) -> Result<UserAccount, IdentityError> {
        let username = username.into();
        let mut users = self.users.write();
        if users.values().any(|user| user.username == username) {
            return Err(IdentityError::UsernameTaken);
        }
        let user = UserAccount {
            id: Uuid::new_v4(),
            username,
            credential_hash: hash_secret(secret),
            global_role,
            active: true,
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        debug!(user = %user.id, username = %user.username, role = %user.global_role, "user created");
        Ok(user)
    }

    /// Retrieve a user by id.
    pub fn get_user(&self, id: Uuid) -> Option<UserAccount> {
        self.users.read().get(&id).cloned()
    }

    /// Retrieve a user by username.
    pub fn get_by_username(&self, username: &str) -> Option<UserAccount> {
        self.users
            .read()
            .values()
            .find(|user| user.username == username)
            .cloned()
    }

    /// Verify a username/secret pair against the stored hash.
    ///
    /// Inactive accounts are refused even when the secret matches.
    pub fn verify_credential(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<UserAccount, IdentityError> {
        let user = self
            .get_by_username(username)
            .ok_or(IdentityError::InvalidCredential)?;
        if !verify_secret(secret, &user.credential_hash) {
            return Err(IdentityError::InvalidCredential);
        }
        if !user.active {
            return Err(IdentityError::InactiveAccount);
        }
        Ok(user)
    }

    /// Replace a user's credential hash with one for the new secret.
    pub fn set_password(&self, id: Uuid, new_secret: &str) -> Result<(), IdentityError> {
        let mut users = self.users.write();
        let user = users.get_mut(&id).ok_or(IdentityError::UserNotFound)?;
        user.credential_hash = hash_secret(new_secret);
        debug!(user = %id, "credential replaced");
        Ok(())
    }

    /// Flip the active flag. Deactivation is the only retirement path for
    /// accounts still referenced by assignments or authored records.
    pub fn set_active(&self, id: Uuid, active: bool) -> Result<(), IdentityError> {
        let mut users = self.users.write();
        let user = users.get_mut(&id).ok_or(IdentityError::UserNotFound)?;
        user.active = active;
        Ok(())
    }
}

/// Hash a secret with a fresh random salt, producing `salt$hex`.
fn hash_secret(secret: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);
    format!("{salt_hex}${}", digest_with_salt(&salt_hex, secret))
}

fn verify_secret(secret: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt_hex, expected)) => digest_with_salt(salt_hex, secret) == expected,
        None => false,
    }
}

fn digest_with_salt(salt_hex: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

//! ---
//! qis_section: "06-security-access-control"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Identity, session issuance, and access resolution."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::access::AuthorizationError;
use crate::identity::{GlobalRole, IdentityDirectory, IdentityError};

type HmacSha256 = Hmac<Sha256>;

/// Opaque symmetric key material (32 bytes) for token signing.
#[derive(Debug, Clone)]
pub struct KeyMaterial(pub [u8; 32]);

impl KeyMaterial {
    /// Generate random key material.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse key material from a base64 string.
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let decoded = BASE64.decode(encoded).ok()?;
        let bytes: [u8; 32] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Render as base64 string.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Compute a SHA-256 fingerprint of the key for audit/logging.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hex::encode(hasher.finalize())
    }
}

/// Claims embedded in a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// User identifier the token was issued for.
    pub subject: Uuid,
    /// Global role at issuance time. Transport only: the access resolver
    /// re-resolves the user and never trusts this field for decisions.
    pub global_role: GlobalRole,
    /// Issued timestamp.
    pub issued_at: DateTime<Utc>,
    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Token returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionToken {
    /// The opaque bearer string: `base64url(claims).base64url(mac)`.
    pub token: String,
    /// Expiry mirrored out of the claims for client convenience.
    pub expires_at: DateTime<Utc>,
}

/// Errors returned when issuing a session.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// Unknown username or wrong secret.
    #[error("invalid credential")]
    InvalidCredential,
    /// The account exists but is deactivated.
    #[error("account is inactive")]
    InactiveAccount,
}

impl From<IdentityError> for AuthenticationError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InactiveAccount => AuthenticationError::InactiveAccount,
            _ => AuthenticationError::InvalidCredential,
        }
    }
}

/// Stateless session issuer.
///
/// Holds no per-session state after issuance; every call revalidates the
/// token signature and expiry from scratch.
#[derive(Debug, Clone)]
pub struct SessionIssuer {
    directory: IdentityDirectory,
    key: KeyMaterial,
    ttl: Duration,
}

impl SessionIssuer {
    /// Build an issuer over the identity directory.
    pub fn new(directory: IdentityDirectory, key: KeyMaterial, ttl: std::time::Duration) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(20));
        Self {
            directory,
            key,
            ttl,
        }
    }

    /// Authenticate a credential and issue a time-bounded token.
    pub fn authenticate(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<SessionToken, AuthenticationError> {
        let user = self.directory.verify_credential(username, secret)?;
        let issued_at = Utc::now();
        let claims = TokenClaims {
            subject: user.id,
            global_role: user.global_role,
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        let token = self.sign(&claims);
        debug!(user = %user.id, expires_at = %claims.expires_at, "session token issued");
        Ok(SessionToken {
            token,
            expires_at: claims.expires_at,
        })
    }

    /// Validate a bearer string and return its claims.
    ///
    /// The signature is checked before the expiry so a forged token is
    /// always `TokenInvalid`, never `TokenExpired`.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthorizationError> {
        let (payload_b64, mac_b64) = token
            .split_once('.')
            .ok_or(AuthorizationError::TokenInvalid)?;
        let payload = BASE64_URL
            .decode(payload_b64)
            .map_err(|_| AuthorizationError::TokenInvalid)?;
        let mac = BASE64_URL
            .decode(mac_b64)
            .map_err(|_| AuthorizationError::TokenInvalid)?;

        let mut verifier = HmacSha256::new_from_slice(&self.key.0)
            .map_err(|_| AuthorizationError::TokenInvalid)?;
        verifier.update(&payload);
        verifier
            .verify_slice(&mac)
            .map_err(|_| AuthorizationError::TokenInvalid)?;

        let claims: TokenClaims =
            serde_json::from_slice(&payload).map_err(|_| AuthorizationError::TokenInvalid)?;
        if Utc::now() > claims.expires_at {
            return Err(AuthorizationError::TokenExpired);
        }
        Ok(claims)
    }

    /// Change a password as a freshly authenticated self-request.
    ///
    /// The old secret is re-verified; there is no self-service reset path.
    pub fn change_password(
        &self,
        username: &str,
        old_secret: &str,
        new_secret: &str,
    ) -> Result<(), AuthenticationError> {
        let user = self.directory.verify_credential(username, old_secret)?;
        self.directory
            .set_password(user.id, new_secret)
            .map_err(AuthenticationError::from)
    }

    fn sign(&self, claims: &TokenClaims) -> String {
        let payload = serde_json::to_vec(claims).expect("claims serialise");
        let mut mac = HmacSha256::new_from_slice(&self.key.0).expect("hmac accepts 32-byte key");
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        format!(
            "{}.{}",
            BASE64_URL.encode(payload),
            BASE64_URL.encode(signature)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn issuer_with_user(username: &str, secret: &str, ttl: StdDuration) -> (SessionIssuer, Uuid) {
        let directory = IdentityDirectory::new();
        let user = directory
            .create_user(username, secret, GlobalRole::Member)
            .unwrap();
        (
            SessionIssuer::new(directory, KeyMaterial::generate(), ttl),
            user.id,
        )
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let (issuer, user_id) = issuer_with_user("alice", "pw", StdDuration::from_secs(600));
        let token = issuer.authenticate("alice", "pw").unwrap();
        let claims = issuer.verify(&token.token).unwrap();
        assert_eq!(claims.subject, user_id);
        assert_eq!(claims.global_role, GlobalRole::Member);
        assert_eq!(claims.expires_at, token.expires_at);
    }

    #[test]
    fn wrong_secret_is_invalid_credential() {
        let (issuer, _) = issuer_with_user("alice", "pw", StdDuration::from_secs(600));
        assert!(matches!(
            issuer.authenticate("alice", "nope").unwrap_err(),
            AuthenticationError::InvalidCredential
        ));
        assert!(matches!(
            issuer.authenticate("ghost", "pw").unwrap_err(),
            AuthenticationError::InvalidCredential
        ));
    }

    #[test]
    fn tampered_payload_is_rejected_as_invalid() {
        let (issuer, _) = issuer_with_user("alice", "pw", StdDuration::from_secs(600));
        let token = issuer.authenticate("alice", "pw").unwrap().token;
        let (payload, mac) = token.split_once('.').unwrap();
        let mut bytes = BASE64_URL.decode(payload).unwrap();
        bytes[0] ^= 0x01;
        let forged = format!("{}.{}", BASE64_URL.encode(bytes), mac);
        assert!(matches!(
            issuer.verify(&forged).unwrap_err(),
            AuthorizationError::TokenInvalid
        ));
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let (issuer, _) = issuer_with_user("alice", "pw", StdDuration::from_secs(600));
        let token = issuer.authenticate("alice", "pw").unwrap().token;

        let other = SessionIssuer::new(
            IdentityDirectory::new(),
            KeyMaterial::generate(),
            StdDuration::from_secs(600),
        );
        assert!(matches!(
            other.verify(&token).unwrap_err(),
            AuthorizationError::TokenInvalid
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let directory = IdentityDirectory::new();
        directory
            .create_user("alice", "pw", GlobalRole::Member)
            .unwrap();
        let key = KeyMaterial::generate();
        let issuer = SessionIssuer::new(directory, key, StdDuration::from_secs(600));

        let issued_at = Utc::now() - Duration::hours(2);
        let claims = TokenClaims {
            subject: Uuid::new_v4(),
            global_role: GlobalRole::Member,
            issued_at,
            expires_at: issued_at + Duration::minutes(5),
        };
        let token = issuer.sign(&claims);
        assert!(matches!(
            issuer.verify(&token).unwrap_err(),
            AuthorizationError::TokenExpired
        ));
    }

    #[test]
    fn change_password_requires_old_secret() {
        let (issuer, _) = issuer_with_user("alice", "old", StdDuration::from_secs(600));
        assert!(matches!(
            issuer.change_password("alice", "bad", "new").unwrap_err(),
            AuthenticationError::InvalidCredential
        ));
        issuer.change_password("alice", "old", "new").unwrap();
        assert!(issuer.authenticate("alice", "new").is_ok());
    }

    #[test]
    fn key_material_round_trips_base64() {
        let key = KeyMaterial::generate();
        let parsed = KeyMaterial::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.0, parsed.0);
        assert_eq!(key.fingerprint(), parsed.fingerprint());
        assert!(KeyMaterial::from_base64("dG9vc2hvcnQ=").is_none());
    }
}

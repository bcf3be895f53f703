//! ---
//! qis_section: "01-core-functionality"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Shared primitives and utilities for the core runtime."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_token_ttl() -> Duration {
    Duration::from_secs(20 * 60)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

fn default_journal_directory() -> PathBuf {
    PathBuf::from("target/journal")
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("target/audit/audit.log")
}

/// Primary configuration object for the F-QIS runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "F_QIS_CONFIG";

    /// Load configuration from disk, respecting the `F_QIS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.auth.token_ttl.is_zero() {
            return Err(anyhow!("auth.token_ttl_seconds must be greater than zero"));
        }
        if let Some(key) = &self.auth.signing_key {
            let decoded = BASE64
                .decode(key)
                .context("auth.signing_key is not valid base64")?;
            if decoded.len() != 32 {
                return Err(anyhow!(
                    "auth.signing_key must decode to 32 bytes, got {}",
                    decoded.len()
                ));
            }
        }
        if self.logging.directory.as_os_str().is_empty() {
            return Err(anyhow!("logging.directory must not be empty"));
        }
        if self.persistence.journal_directory.as_os_str().is_empty() {
            return Err(anyhow!("persistence.journal_directory must not be empty"));
        }
        Ok(())
    }
}

/// Session issuance settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of issued session tokens.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "token_ttl_seconds", default = "default_token_ttl")]
    pub token_ttl: Duration,
    /// Base64-encoded 32-byte HMAC key. Generated at startup when absent,
    /// which invalidates outstanding tokens across restarts.
    #[serde(default)]
    pub signing_key: Option<String>,
    /// Administrator account seeded when the identity directory is empty.
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdminConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: default_token_ttl(),
            signing_key: None,
            bootstrap_admin: None,
        }
    }
}

/// Bootstrap administrator credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdminConfig {
    pub username: String,
    pub secret: String,
}

/// Product-level policy toggles.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    /// Legacy behaviour: treat a global Member with no project assignment
    /// as holding Editor capability project-wide. Off by default; enabling
    /// it is a product decision.
    #[serde(default)]
    pub allow_member_default_capability: bool,
}

/// Logging sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

/// REST API listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the append-only mutation journal.
    #[serde(default = "default_journal_directory")]
    pub journal_directory: PathBuf,
    /// Path of the hash-chained audit log.
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            journal_directory: default_journal_directory(),
            audit_log: default_audit_log(),
        }
    }
}

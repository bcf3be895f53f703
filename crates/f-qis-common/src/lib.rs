//! ---
//! qis_section: "01-core-functionality"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Shared primitives and utilities for the core runtime."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
//! Core shared primitives for the F-QIS workspace.
//! This crate exposes configuration loading and the logging bootstrap
//! consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, AuthConfig, BootstrapAdminConfig, LoggingConfig, PersistenceConfig,
    PolicyConfig,
};
pub use logging::{init_tracing, LogFormat};

//! ---
//! qis_section: "01-core-functionality"
//! qis_subsection: "binary"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "Binary entrypoint for the F-QIS daemon."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use f_qis_api::{spawn_api_server, ApiState};
use f_qis_common::config::AppConfig;
use f_qis_common::logging::init_tracing;
use f_qis_registry::ProjectRegistry;
use f_qis_security::{
    AccessResolver, AuditLog, GlobalRole, IdentityDirectory, KeyMaterial, SessionIssuer,
};
use f_qis_workflow::{MemoryRecordStore, WorkflowEngine};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "F-QIS daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the API listen address")]
    listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the inspection service")]
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/qisd.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
    init_tracing("f-qisd", &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let directory = IdentityDirectory::new();
    seed_bootstrap_admin(&directory, &config);

    let key = match config.auth.signing_key.as_deref() {
        Some(encoded) => KeyMaterial::from_base64(encoded)
            .ok_or_else(|| anyhow::anyhow!("auth.signing_key is not a 32-byte base64 key"))?,
        None => {
            let key = KeyMaterial::generate();
            warn!(
                fingerprint = %key.fingerprint(),
                "no signing key configured; generated an ephemeral one, outstanding tokens will not survive a restart"
            );
            key
        }
    };

    let registry = ProjectRegistry::new();
    let issuer = SessionIssuer::new(directory.clone(), key, config.auth.token_ttl);
    let resolver = AccessResolver::new(
        directory.clone(),
        issuer.clone(),
        registry.clone(),
        config.policy.allow_member_default_capability,
    );

    let journal_path = config.persistence.journal_directory.join("records.jsonl");
    let store = MemoryRecordStore::with_journal(&journal_path)
        .map_err(|err| anyhow::anyhow!("unable to open mutation journal: {err}"))?;
    let engine = WorkflowEngine::new(Arc::new(store));
    let audit = AuditLog::new(&config.persistence.audit_log)?;

    let state = Arc::new(ApiState::new(
        directory, issuer, resolver, registry, engine, audit,
    ));

    if !config.api.enabled {
        info!("api server disabled by configuration; nothing to serve");
        return Ok(());
    }

    let server = spawn_api_server(state, config.api.listen)?;
    info!(address = %server.addr(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await?;
    Ok(())
}

fn seed_bootstrap_admin(directory: &IdentityDirectory, config: &AppConfig) {
    if !directory.is_empty() {
        return;
    }
    match &config.auth.bootstrap_admin {
        Some(bootstrap) => {
            match directory.create_user(&bootstrap.username, &bootstrap.secret, GlobalRole::Admin) {
                Ok(user) => info!(user = %user.id, username = %user.username, "bootstrap admin seeded"),
                Err(err) => warn!(error = %err, "failed to seed bootstrap admin"),
            }
        }
        None => warn!("identity directory is empty and no bootstrap admin is configured; no caller will be able to authenticate"),
    }
}

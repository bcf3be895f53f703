//! ---
//! qis_section: "05-networking-external-interfaces"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "REST API surface for external integrations."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use f_qis_registry::{ProjectRegistry, ProjectRole};
use f_qis_security::{
    AccessContext, AccessResolver, AuditLog, AuthorizationError, IdentityDirectory, SessionIssuer,
};
use f_qis_workflow::WorkflowEngine;

mod error;
mod handlers;

pub use error::{ApiError, ErrorBody, ErrorKind};

/// Shared API state exposed to handlers.
pub struct ApiState {
    directory: IdentityDirectory,
    issuer: SessionIssuer,
    resolver: AccessResolver,
    registry: ProjectRegistry,
    engine: WorkflowEngine,
    audit: AuditLog,
}

impl ApiState {
    /// Wire the API over the assembled subsystems.
    pub fn new(
        directory: IdentityDirectory,
        issuer: SessionIssuer,
        resolver: AccessResolver,
        registry: ProjectRegistry,
        engine: WorkflowEngine,
        audit: AuditLog,
    ) -> Self {
        Self {
            directory,
            issuer,
            resolver,
            registry,
            engine,
            audit,
        }
    }

    pub(crate) fn directory(&self) -> &IdentityDirectory {
        &self.directory
    }

    pub(crate) fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    pub(crate) fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub(crate) fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub(crate) fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Authorize a mutating call. Capability misses surface as 403.
    pub(crate) fn authorize_write(
        &self,
        headers: &HeaderMap,
        project_id: Option<Uuid>,
        required: ProjectRole,
    ) -> Result<AccessContext, ApiError> {
        let token = bearer_token(headers)?;
        self.resolver
            .authorize(token, project_id, required)
            .map_err(ApiError::from)
    }

    /// Authorize a read. A capability miss on a project-scoped read is
    /// collapsed into 404 so record existence never leaks across project
    /// boundaries.
    pub(crate) fn authorize_read(
        &self,
        headers: &HeaderMap,
        project_id: Option<Uuid>,
        required: ProjectRole,
    ) -> Result<AccessContext, ApiError> {
        let token = bearer_token(headers)?;
        self.resolver
            .authorize(token, project_id, required)
            .map_err(|err| match err {
                AuthorizationError::InsufficientRole if project_id.is_some() => {
                    ApiError::not_found()
                }
                other => ApiError::from(other),
            })
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState").finish_non_exhaustive()
    }
}

/// Extract the bearer credential from the Authorization header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(ApiError::missing_token)
}

/// Assemble the REST router over shared state.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/auth/token", post(handlers::issue_token))
        .route("/projects", get(handlers::list_projects).post(handlers::create_project))
        .route("/projects/:project_id", axum::routing::put(handlers::update_project))
        .route(
            "/projects/:project_id/assignments",
            post(handlers::grant_assignment).delete(handlers::revoke_assignment),
        )
        .route(
            "/material/:project_id",
            get(handlers::list_materials).post(handlers::create_material),
        )
        .route(
            "/material/:project_id/:record_id",
            get(handlers::get_material)
                .put(handlers::update_material)
                .delete(handlers::delete_material),
        )
        .route(
            "/fitup/:project_id",
            get(handlers::list_fitups).post(handlers::create_fitup),
        )
        .route(
            "/fitup/:project_id/:record_id",
            get(handlers::get_fitup)
                .put(handlers::update_fitup)
                .delete(handlers::delete_fitup),
        )
        .route(
            "/final/:project_id",
            get(handlers::list_finals).post(handlers::create_final),
        )
        .route(
            "/final/:project_id/:record_id",
            get(handlers::get_final).put(handlers::update_final),
        )
        .route(
            "/ndt/:project_id",
            get(handlers::list_ndts).post(handlers::create_ndt),
        )
        .route(
            "/ndt/:project_id/:record_id",
            get(handlers::get_ndt).put(handlers::update_ndt),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Bound listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop the server and wait for the accept loop to drain.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the REST API on the given address.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = build_router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound API address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

//! ---
//! qis_section: "05-networking-external-interfaces"
//! qis_subsection: "module"
//! qis_type: "source"
//! qis_scope: "code"
//! qis_description: "REST API surface for external integrations."
//! qis_version: "v0.0.0-prealpha"
//! qis_owner: "tbd"
//! ---
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use f_qis_registry::{
    NewProject, Project, ProjectAssignment, ProjectRole, ProjectStatus, ProjectUpdate,
};
use f_qis_security::{AccessContext, AuditAction, SessionToken};
use f_qis_workflow::{
    FinalDraft, FinalInspection, FinalUpdate, FitUpDraft, FitUpInspection, FitUpUpdate,
    MaterialDraft, MaterialInspection, MaterialUpdate, NdtDraft, NdtRequest, NdtUpdate,
};

use crate::error::{ApiError, ErrorKind};
use crate::ApiState;

/// Parse a boundary string into a closed enum, rejecting unknown values.
fn parse_field<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationError,
            format!("invalid value {raw:?} for field {field}"),
        )
    })
}

fn scoped_capability(ctx: &AccessContext) -> ProjectRole {
    ctx.capability.unwrap_or(ProjectRole::Viewer)
}

fn require_project(state: &ApiState, project_id: Uuid) -> Result<(), ApiError> {
    state
        .registry()
        .get_project(project_id)
        .map(|_| ())
        .ok_or_else(ApiError::not_found)
}

fn record_audit(
    state: &ApiState,
    ctx: &AccessContext,
    action: AuditAction,
    project_id: Option<Uuid>,
    metadata: serde_json::Value,
) {
    if let Err(err) = state.audit().append(ctx.user_id, action, project_id, metadata) {
        warn!(error = %err, action = %action, "audit append failed");
    }
}

// ---- authentication ------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct TokenRequest {
    username: String,
    password: String,
}

pub(crate) async fn issue_token(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<SessionToken>, ApiError> {
    let token = state
        .issuer()
        .authenticate(&request.username, &request.password)?;
    if let Some(user) = state.directory().get_by_username(&request.username) {
        if let Err(err) =
            state
                .audit()
                .append(user.id, AuditAction::TokenIssued, None, json!({}))
        {
            warn!(error = %err, "audit append failed");
        }
    }
    Ok(Json(token))
}

// ---- projects ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectRequest {
    number: String,
    name: String,
    client: String,
    status: Option<String>,
    manager: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectUpdateRequest {
    name: Option<String>,
    client: Option<String>,
    status: Option<String>,
    manager: Option<Uuid>,
}

pub(crate) async fn list_projects(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Project>>, ApiError> {
    state.authorize_read(&headers, None, ProjectRole::Viewer)?;
    Ok(Json(state.registry().list_projects()))
}

pub(crate) async fn create_project(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<ProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    // Project creation is admin-only: no project scope exists yet, and
    // only admins pass a non-viewer directory-level requirement.
    let ctx = state.authorize_write(&headers, None, ProjectRole::Manager)?;
    let status = match request.status.as_deref() {
        Some(raw) => parse_field::<ProjectStatus>("status", raw)?,
        None => ProjectStatus::default(),
    };
    let project = state.registry().create_project(NewProject {
        number: request.number,
        name: request.name,
        client: request.client,
        status,
        manager: request.manager.unwrap_or(ctx.user_id),
    })?;
    record_audit(
        &state,
        &ctx,
        AuditAction::ProjectMutated,
        Some(project.id),
        json!({"number": project.number}),
    );
    Ok((StatusCode::CREATED, Json(project)))
}

pub(crate) async fn update_project(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(request): Json<ProjectUpdateRequest>,
) -> Result<Json<Project>, ApiError> {
    let ctx = state.authorize_write(&headers, None, ProjectRole::Manager)?;
    let status = match request.status.as_deref() {
        Some(raw) => Some(parse_field::<ProjectStatus>("status", raw)?),
        None => None,
    };
    let project = state.registry().update_project(
        project_id,
        ProjectUpdate {
            name: request.name,
            client: request.client,
            status,
            manager: request.manager,
        },
    )?;
    record_audit(
        &state,
        &ctx,
        AuditAction::ProjectMutated,
        Some(project.id),
        json!({"number": project.number}),
    );
    Ok(Json(project))
}

// ---- assignments ---------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentRequest {
    user_id: Uuid,
    role: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevokeParams {
    user_id: Uuid,
}

pub(crate) async fn grant_assignment(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(request): Json<AssignmentRequest>,
) -> Result<Json<ProjectAssignment>, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Manager)?;
    require_project(&state, project_id)?;
    if state.directory().get_user(request.user_id).is_none() {
        return Err(ApiError::not_found());
    }
    let role = parse_field::<ProjectRole>("role", &request.role)?;
    let assignment = state
        .registry()
        .assign(request.user_id, project_id, role, ctx.user_id)?;
    record_audit(
        &state,
        &ctx,
        AuditAction::AssignmentGranted,
        Some(project_id),
        json!({"user_id": request.user_id, "role": role}),
    );
    Ok(Json(assignment))
}

pub(crate) async fn revoke_assignment(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Query(params): Query<RevokeParams>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Manager)?;
    require_project(&state, project_id)?;
    state.registry().revoke(params.user_id, project_id);
    record_audit(
        &state,
        &ctx,
        AuditAction::AssignmentRevoked,
        Some(project_id),
        json!({"user_id": params.user_id}),
    );
    Ok(StatusCode::NO_CONTENT)
}

// ---- material inspections ------------------------------------------------

pub(crate) async fn list_materials(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<MaterialInspection>>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    require_project(&state, project_id)?;
    Ok(Json(
        state
            .engine()
            .list_materials(project_id, scoped_capability(&ctx))?,
    ))
}

pub(crate) async fn create_material(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(draft): Json<MaterialDraft>,
) -> Result<(StatusCode, Json<MaterialInspection>), ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    require_project(&state, project_id)?;
    let record =
        state
            .engine()
            .create_material(project_id, draft, ctx.user_id, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordCreated,
        Some(project_id),
        json!({"stage": "material", "record_id": record.id, "report_no": record.report_no}),
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_material(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MaterialInspection>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    Ok(Json(state.engine().get_material(
        record_id,
        project_id,
        scoped_capability(&ctx),
    )?))
}

pub(crate) async fn update_material(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<MaterialUpdate>,
) -> Result<Json<MaterialInspection>, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    let record = state.engine().update_material(
        record_id,
        project_id,
        update,
        scoped_capability(&ctx),
    )?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordUpdated,
        Some(project_id),
        json!({"stage": "material", "record_id": record.id}),
    );
    Ok(Json(record))
}

pub(crate) async fn delete_material(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    state
        .engine()
        .delete_material(record_id, project_id, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordDeleted,
        Some(project_id),
        json!({"stage": "material", "record_id": record_id}),
    );
    Ok(StatusCode::NO_CONTENT)
}

// ---- fit-up inspections --------------------------------------------------

pub(crate) async fn list_fitups(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<FitUpInspection>>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    require_project(&state, project_id)?;
    Ok(Json(
        state
            .engine()
            .list_fitups(project_id, scoped_capability(&ctx))?,
    ))
}

pub(crate) async fn create_fitup(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(draft): Json<FitUpDraft>,
) -> Result<(StatusCode, Json<FitUpInspection>), ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    require_project(&state, project_id)?;
    let record =
        state
            .engine()
            .create_fitup(project_id, draft, ctx.user_id, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordCreated,
        Some(project_id),
        json!({"stage": "fitup", "record_id": record.id, "report_no": record.report_no}),
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_fitup(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<FitUpInspection>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    Ok(Json(state.engine().get_fitup(
        record_id,
        project_id,
        scoped_capability(&ctx),
    )?))
}

pub(crate) async fn update_fitup(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<FitUpUpdate>,
) -> Result<Json<FitUpInspection>, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    let record =
        state
            .engine()
            .update_fitup(record_id, project_id, update, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordUpdated,
        Some(project_id),
        json!({"stage": "fitup", "record_id": record.id}),
    );
    Ok(Json(record))
}

pub(crate) async fn delete_fitup(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    state
        .engine()
        .delete_fitup(record_id, project_id, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordDeleted,
        Some(project_id),
        json!({"stage": "fitup", "record_id": record_id}),
    );
    Ok(StatusCode::NO_CONTENT)
}

// ---- final inspections ---------------------------------------------------

pub(crate) async fn list_finals(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<FinalInspection>>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    require_project(&state, project_id)?;
    Ok(Json(
        state
            .engine()
            .list_finals(project_id, scoped_capability(&ctx))?,
    ))
}

pub(crate) async fn create_final(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(draft): Json<FinalDraft>,
) -> Result<(StatusCode, Json<FinalInspection>), ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    require_project(&state, project_id)?;
    let record =
        state
            .engine()
            .create_final(project_id, draft, ctx.user_id, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordCreated,
        Some(project_id),
        json!({"stage": "final", "record_id": record.id, "report_no": record.report_no}),
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_final(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<FinalInspection>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    Ok(Json(state.engine().get_final(
        record_id,
        project_id,
        scoped_capability(&ctx),
    )?))
}

pub(crate) async fn update_final(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<FinalUpdate>,
) -> Result<Json<FinalInspection>, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    let record =
        state
            .engine()
            .update_final(record_id, project_id, update, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordUpdated,
        Some(project_id),
        json!({"stage": "final", "record_id": record.id}),
    );
    Ok(Json(record))
}

// ---- ndt requests --------------------------------------------------------

pub(crate) async fn list_ndts(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<NdtRequest>>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    require_project(&state, project_id)?;
    Ok(Json(
        state
            .engine()
            .list_ndts(project_id, scoped_capability(&ctx))?,
    ))
}

pub(crate) async fn create_ndt(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(draft): Json<NdtDraft>,
) -> Result<(StatusCode, Json<NdtRequest>), ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    require_project(&state, project_id)?;
    let record = state
        .engine()
        .create_ndt(project_id, draft, ctx.user_id, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordCreated,
        Some(project_id),
        json!({"stage": "ndt", "record_id": record.id, "report_no": record.report_no}),
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_ndt(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<NdtRequest>, ApiError> {
    let ctx = state.authorize_read(&headers, Some(project_id), ProjectRole::Viewer)?;
    Ok(Json(state.engine().get_ndt(
        record_id,
        project_id,
        scoped_capability(&ctx),
    )?))
}

pub(crate) async fn update_ndt(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((project_id, record_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<NdtUpdate>,
) -> Result<Json<NdtRequest>, ApiError> {
    let ctx = state.authorize_write(&headers, Some(project_id), ProjectRole::Editor)?;
    let record =
        state
            .engine()
            .update_ndt(record_id, project_id, update, scoped_capability(&ctx))?;
    record_audit(
        &state,
        &ctx,
        AuditAction::RecordUpdated,
        Some(project_id),
        json!({"stage": "ndt", "record_id": record.id}),
    );
    Ok(Json(record))
}

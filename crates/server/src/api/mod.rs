// REST surface for notebooks, proposals, collaborators, and notifications.
//
// Handlers stay thin: authenticate, validate, take the database lock for
// one synchronous operation, and translate `CoreError` into the JSON error
// envelope. The lock is never held across an await point.

pub mod error;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Extension, Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, AllowOrigin, CorsLayer};
use tracing::info;
use uuid::Uuid;

use redline_common::types::{
    Actor, AuthorKind, ChatRole, CollaboratorRole, ProposalStatus, ProposedEdit,
};

use crate::{
    activity::{ActivityLog, NewActivityEntry, Notifications},
    api::error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
        ApiError, ErrorCode,
    },
    api::validation::ValidatedJson,
    auth::{jwt::SessionTokenService, middleware::require_bearer_auth},
    ledger::ProposalLedger,
    oracle::{persona_for, OracleClient},
    reconcile::{Reconciler, ReviewAction},
    registry::{generate_agent_name, CollaboratorRegistry},
    store::db::Db,
    store::notebooks::NotebookStore,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub oracle: Arc<OracleClient>,
    pub tokens: Arc<SessionTokenService>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/notebooks", post(create_notebook).get(list_notebooks))
        .route(
            "/v1/notebooks/{id}",
            get(get_notebook).put(update_notebook).delete(delete_notebook),
        )
        .route("/v1/notebooks/{id}/publish", post(publish_notebook))
        .route("/v1/notebooks/{id}/summarize", post(summarize_notebook))
        .route("/v1/notebooks/{id}/proposals", post(submit_proposals).get(list_proposals))
        .route("/v1/proposals/{id}/review", post(review_proposal))
        .route("/v1/notebooks/{id}/invites", post(invite_collaborator))
        .route("/v1/notebooks/{id}/collaborators", get(list_collaborators))
        .route("/v1/notebooks/{id}/agents", post(add_agent))
        .route("/v1/notebooks/{id}/agents/{name}", delete(remove_agent))
        .route("/v1/notebooks/{id}/agents/{name}/analyze", post(analyze_notebook))
        .route("/v1/notebooks/{id}/activity", get(list_activity))
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/{id}/read", post(mark_notification_read))
        .route("/v1/notifications/read-all", post(mark_all_notifications_read))
        .layer(middleware::from_fn_with_state(state.tokens.clone(), require_bearer_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(DefaultBodyLimit::max(validation::MAX_REST_BODY_BYTES))
        .with_state(state)
}

/// Propagate or mint an `x-request-id`, scoping it so error envelopes built
/// anywhere below can pick it up.
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);
    response
}

pub fn cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        None | Some("*") => {
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        }
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ── Notebooks ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateNotebookRequest {
    title: String,
    #[serde(default)]
    body: String,
}

async fn create_notebook(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ValidatedJson(payload): ValidatedJson<CreateNotebookRequest>,
) -> Result<Response, ApiError> {
    let notebook = {
        let mut conn = state.db.lock();
        NotebookStore::create(&mut conn, &actor, &payload.title, &payload.body, Utc::now())?
    };
    info!(notebook_id = %notebook.id, "notebook created");
    Ok((StatusCode::CREATED, Json(json!({ "notebook": notebook }))).into_response())
}

async fn list_notebooks(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, ApiError> {
    let notebooks = {
        let conn = state.db.lock();
        NotebookStore::list_for(&conn, actor.user_id)?
    };
    Ok(Json(json!({ "notebooks": notebooks })).into_response())
}

async fn get_notebook(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (notebook, collaborators) = {
        let mut conn = state.db.lock();
        // First visit after an invite binds the pending row to this user.
        CollaboratorRegistry::bind_invite(&mut conn, id, &actor, Utc::now())?;
        let capability = CollaboratorRegistry::access_check(&conn, id, actor.user_id)?;
        if !capability.granted() {
            return Err(ApiError::new(
                ErrorCode::AuthForbidden,
                "caller lacks access to this notebook",
            ));
        }
        (NotebookStore::get(&conn, id)?, CollaboratorRegistry::list(&conn, id)?)
    };
    Ok(Json(json!({ "notebook": notebook, "collaborators": collaborators })).into_response())
}

#[derive(Deserialize)]
struct UpdateNotebookRequest {
    body: String,
}

async fn update_notebook(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateNotebookRequest>,
) -> Result<Response, ApiError> {
    let notebook = {
        let mut conn = state.db.lock();
        NotebookStore::save_body(&mut conn, id, &actor, &payload.body, Utc::now())?
    };
    Ok(Json(json!({ "notebook": notebook })).into_response())
}

async fn delete_notebook(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    {
        let mut conn = state.db.lock();
        NotebookStore::delete(&mut conn, id, &actor)?;
    }
    info!(notebook_id = %id, "notebook deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Deserialize)]
struct PublishRequest {
    body: String,
}

async fn publish_notebook(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<PublishRequest>,
) -> Result<Response, ApiError> {
    let notebook = {
        let mut conn = state.db.lock();
        Reconciler::publish_final(&mut conn, id, &actor, &payload.body, Utc::now())?
    };
    info!(notebook_id = %id, "final version published");
    Ok(Json(json!({ "notebook": notebook })).into_response())
}

async fn summarize_notebook(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let body = {
        let conn = state.db.lock();
        let capability = CollaboratorRegistry::access_check(&conn, id, actor.user_id)?;
        if !capability.granted() {
            return Err(ApiError::new(
                ErrorCode::AuthForbidden,
                "caller lacks access to this notebook",
            ));
        }
        NotebookStore::get(&conn, id)?.body
    };
    let summary = state.oracle.summarize(&body).await?;
    Ok(Json(json!({ "summary": summary })).into_response())
}

// ── Proposals ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ProposeRequest {
    #[serde(default)]
    agent_name: Option<String>,
    edits: Vec<ProposedEdit>,
}

async fn submit_proposals(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ProposeRequest>,
) -> Result<Response, ApiError> {
    let proposals = {
        let mut conn = state.db.lock();
        ProposalLedger::propose(
            &mut conn,
            id,
            &actor,
            payload.agent_name.as_deref(),
            &payload.edits,
            Utc::now(),
        )?
    };
    Ok((StatusCode::CREATED, Json(json!({ "proposals": proposals }))).into_response())
}

#[derive(Deserialize)]
struct ListProposalsQuery {
    status: Option<String>,
}

async fn list_proposals(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListProposalsQuery>,
) -> Result<Response, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(ProposalStatus::parse(raw).ok_or_else(|| {
            ApiError::new(ErrorCode::ValidationFailed, format!("unknown status `{raw}`"))
        })?),
    };
    let proposals = {
        let conn = state.db.lock();
        let capability = CollaboratorRegistry::access_check(&conn, id, actor.user_id)?;
        if !capability.granted() {
            return Err(ApiError::new(
                ErrorCode::AuthForbidden,
                "caller lacks access to this notebook",
            ));
        }
        ProposalLedger::list_filtered(&conn, id, status)?
    };
    Ok(Json(json!({ "proposals": proposals })).into_response())
}

#[derive(Deserialize)]
struct ReviewRequest {
    action: String,
}

async fn review_proposal(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ReviewRequest>,
) -> Result<Response, ApiError> {
    let action = ReviewAction::parse(&payload.action).ok_or_else(|| {
        ApiError::new(
            ErrorCode::ValidationFailed,
            format!("unknown review action `{}`", payload.action),
        )
    })?;
    let proposal = {
        let mut conn = state.db.lock();
        Reconciler::review(&mut conn, id, &actor, action, Utc::now())?
    };
    info!(proposal_id = %id, action = action.as_str(), "proposal reviewed");
    Ok(Json(json!({ "proposal": proposal })).into_response())
}

// ── Collaborators and agents ───────────────────────────────────────

#[derive(Deserialize)]
struct InviteRequest {
    email: String,
}

async fn invite_collaborator(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<InviteRequest>,
) -> Result<Response, ApiError> {
    let collaborator = {
        let mut conn = state.db.lock();
        CollaboratorRegistry::invite_human(&mut conn, id, &actor, &payload.email, Utc::now())?
    };
    // Delivery of the invite is out of scope; the link is handed back for
    // whatever channel the caller uses. Visiting it binds the invite.
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "collaborator": collaborator,
            "invite_link": format!("/notebooks/{id}"),
        })),
    )
        .into_response())
}

async fn list_collaborators(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let collaborators = {
        let conn = state.db.lock();
        let capability = CollaboratorRegistry::access_check(&conn, id, actor.user_id)?;
        if !capability.granted() {
            return Err(ApiError::new(
                ErrorCode::AuthForbidden,
                "caller lacks access to this notebook",
            ));
        }
        CollaboratorRegistry::list(&conn, id)?
    };
    Ok(Json(json!({ "collaborators": collaborators })).into_response())
}

#[derive(Deserialize)]
struct AddAgentRequest {
    agent_type: String,
    #[serde(default)]
    agent_name: Option<String>,
}

async fn add_agent(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<AddAgentRequest>,
) -> Result<Response, ApiError> {
    let name = payload
        .agent_name
        .unwrap_or_else(|| generate_agent_name(&payload.agent_type));
    let collaborator = {
        let mut conn = state.db.lock();
        CollaboratorRegistry::add_agent(
            &mut conn,
            id,
            &actor,
            &name,
            &payload.agent_type,
            CollaboratorRole::Editor,
            Utc::now(),
        )?
    };
    info!(notebook_id = %id, agent = %name, "agent added");
    Ok((StatusCode::CREATED, Json(json!({ "collaborator": collaborator }))).into_response())
}

async fn remove_agent(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    {
        let mut conn = state.db.lock();
        CollaboratorRegistry::remove_agent(&mut conn, id, &actor, &name, Utc::now())?;
    }
    info!(notebook_id = %id, agent = %name, "agent removed");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Run an agent's persona over the notebook and file its suggestions as
/// pending proposals in one pass.
async fn analyze_notebook(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let (body, agent_type) = {
        let conn = state.db.lock();
        let capability = CollaboratorRegistry::access_check(&conn, id, actor.user_id)?;
        if !capability.granted() {
            return Err(ApiError::new(
                ErrorCode::AuthForbidden,
                "caller lacks access to this notebook",
            ));
        }
        let agent = CollaboratorRegistry::active_agent(&conn, id, &name)?;
        let agent_type = agent
            .agent_type
            .ok_or_else(|| ApiError::new(ErrorCode::InternalError, "agent row missing type"))?;
        ActivityLog::append(
            &conn,
            &NewActivityEntry {
                notebook_id: id,
                content: format!("{name} is analyzing the document..."),
                author_kind: AuthorKind::Agent,
                author_name: Some(name.clone()),
                role: ChatRole::Assistant,
                created_at: Utc::now(),
            },
        )?;
        (NotebookStore::get(&conn, id)?.body, agent_type)
    };

    let persona = persona_for(&agent_type).ok_or_else(|| {
        ApiError::new(
            ErrorCode::ValidationFailed,
            format!("no persona registered for agent type `{agent_type}`"),
        )
    })?;
    let analysis = state.oracle.analyze(persona, &body).await?;

    let proposals = {
        let mut conn = state.db.lock();
        let proposals = if analysis.suggestions.is_empty() {
            Vec::new()
        } else {
            let edits: Vec<ProposedEdit> =
                analysis.suggestions.iter().cloned().map(|s| s.into_edit()).collect();
            ProposalLedger::propose(&mut conn, id, &actor, Some(&name), &edits, Utc::now())?
        };
        ActivityLog::append(
            &conn,
            &NewActivityEntry {
                notebook_id: id,
                content: format!(
                    "{name} completed analysis with {} suggestion(s)",
                    analysis.suggestions.len()
                ),
                author_kind: AuthorKind::Agent,
                author_name: Some(name.clone()),
                role: ChatRole::Assistant,
                created_at: Utc::now(),
            },
        )?;
        proposals
    };

    Ok(Json(json!({ "analysis": analysis, "proposals": proposals })).into_response())
}

// ── Activity and notifications ─────────────────────────────────────

#[derive(Deserialize)]
struct ActivityQuery {
    limit: Option<u32>,
}

async fn list_activity(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> Result<Response, ApiError> {
    let entries = {
        let conn = state.db.lock();
        let capability = CollaboratorRegistry::access_check(&conn, id, actor.user_id)?;
        if !capability.granted() {
            return Err(ApiError::new(
                ErrorCode::AuthForbidden,
                "caller lacks access to this notebook",
            ));
        }
        ActivityLog::query(&conn, id, query.limit.unwrap_or(200))?
    };
    Ok(Json(json!({ "entries": entries })).into_response())
}

async fn list_notifications(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, ApiError> {
    let feed = {
        let conn = state.db.lock();
        Notifications::list(&conn, actor.user_id)?
    };
    Ok(Json(json!({ "notifications": feed.notifications, "unread": feed.unread }))
        .into_response())
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let updated = {
        let conn = state.db.lock();
        Notifications::mark_read(&conn, actor.user_id, id)?
    };
    Ok(Json(json!({ "updated": updated })).into_response())
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, ApiError> {
    let updated = {
        let conn = state.db.lock();
        Notifications::mark_all_read(&conn, actor.user_id)?
    };
    Ok(Json(json!({ "updated": updated })).into_response())
}

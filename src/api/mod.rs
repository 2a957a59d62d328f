//! HTTP and WebSocket surface.

pub mod error;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::cache::CacheEntry;
use crate::collab::{HashIdentifier, Member, TeamRoster, MAX_CANDIDATES};
use crate::coordinator::{
    Coordinator, CrackRequest, CreateOutcome, HashTypeInfo, JobView, Strategy,
};
use crate::error::CoordinatorError;
use crate::transport::PeerHub;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub hub: Arc<PeerHub>,
    pub roster: Arc<TeamRoster>,
    pub identifier: Arc<dyn HashIdentifier>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub team_id: String,
    pub requested_by: String,
    pub hash: String,
    /// Identified from the hash when absent
    #[serde(default)]
    pub hash_type: Option<HashTypeInfo>,
    pub wordlists: Vec<String>,
    #[serde(default)]
    pub strategy: Strategy,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentifyRequest {
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub candidates: Vec<HashTypeInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub team_name: String,
    pub user_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTeamRequest {
    pub user_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMembership {
    pub team_id: String,
    pub user_id: String,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/jobs", get(list_jobs_handler).post(submit_job_handler))
        .route("/api/jobs/:id", get(job_status_handler))
        .route("/api/jobs/:id/cancel", post(cancel_job_handler))
        .route("/api/cache/:fingerprint", get(cache_handler))
        .route("/api/identify", post(identify_handler))
        .route("/api/teams", post(create_team_handler))
        .route("/api/teams/:id/join", post(join_team_handler))
        .route("/api/teams/:id/members", get(members_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_api(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "jobs": state.coordinator.list_jobs().len(),
        "peers": state.hub.connection_count().await,
        "cacheEntries": state.coordinator.cache().len(),
    }))
}

async fn list_jobs_handler(State(state): State<AppState>) -> Json<Vec<JobView>> {
    Json(state.coordinator.list_jobs())
}

async fn submit_job_handler(
    State(state): State<AppState>,
    Json(payload): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<CreateOutcome>), ApiError> {
    let hash_type_info = match payload.hash_type {
        Some(info) => info,
        None => pick_hash_type(state.identifier.as_ref(), &payload.hash)?,
    };

    let request = CrackRequest::new(
        payload.team_id,
        payload.requested_by,
        payload.hash,
        hash_type_info,
        payload.wordlists,
    )
    .with_strategy(payload.strategy);

    let outcome = state.coordinator.create_job(request).await?;
    let status = match outcome {
        CreateOutcome::Created { .. } => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Best identified candidate that some engine can attack.
fn pick_hash_type(identifier: &dyn HashIdentifier, hash: &str) -> Result<HashTypeInfo, ApiError> {
    let candidates = identifier.identify(hash);
    candidates
        .into_iter()
        .take(MAX_CANDIDATES)
        .find(HashTypeInfo::has_engine_mapping)
        .ok_or_else(|| {
            CoordinatorError::EngineUnavailable(format!("unidentified hash {}", hash.trim())).into()
        })
}

async fn job_status_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    Ok(Json(state.coordinator.get_job_status(id)?))
}

async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or_else(|| "Cancelled by request".to_string());
    let cancelled = state.coordinator.cancel_job(id, &reason).await?;
    Ok(Json(json!({ "jobId": id, "cancelled": cancelled })))
}

async fn cache_handler(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<CacheEntry>, ApiError> {
    state
        .coordinator
        .cache()
        .get(&fingerprint)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No cached result for {}", fingerprint)))
}

async fn identify_handler(
    State(state): State<AppState>,
    Json(payload): Json<IdentifyRequest>,
) -> Json<IdentifyResponse> {
    let mut candidates = state.identifier.identify(&payload.hash);
    candidates.truncate(MAX_CANDIDATES);
    Json(IdentifyResponse { candidates })
}

async fn create_team_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamMembership>), ApiError> {
    let (team_id, user_id) = state
        .roster
        .create_team(&payload.team_name, &payload.user_name)?;
    Ok((StatusCode::CREATED, Json(TeamMembership { team_id, user_id })))
}

async fn join_team_handler(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(payload): Json<JoinTeamRequest>,
) -> Result<Json<TeamMembership>, ApiError> {
    let user_id = state.roster.join_team(&team_id, &payload.user_name)?;
    Ok(Json(TeamMembership { team_id, user_id }))
}

async fn members_handler(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<Vec<Member>>, ApiError> {
    Ok(Json(state.roster.members(&team_id)?))
}

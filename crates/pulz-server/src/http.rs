//! Route table for `/api/pulz` (`SPEC_FULL.md` §6), built the way
//! `tandem-server::http::app_router` lays CORS + an auth gate over a flat
//! `Router::new().route(...)` chain, just nested under one prefix instead of
//! mounted at the root.

use std::path::Path as FsPath;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use pulz_execution::ExecutorError;
use pulz_orchestrator::{LifecycleError, MissionStartError};
use pulz_store::StoreError;
use pulz_types::{
    Artifact, ArtifactKind, AuthorityMode, FeedEvent, MissionStartRequest, StatusResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::{AppState, VerifiedUser};

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/status", get(status))
        .route("/mission/start", post(mission_start))
        .route("/mission/stop", post(mission_stop))
        .route("/feed", get(feed))
        .route("/queue", get(queue))
        .route("/proposals", get(proposals))
        .route("/queue/{id}/approve", post(approve))
        .route("/queue/{id}/reject", post(reject))
        .route("/proposals/{id}/execute", post(execute))
        .route("/executions/{id}/cancel", post(cancel_execution))
        .route("/executions", get(list_executions))
        .route("/executions/{id}", get(get_execution))
        .route("/telemetry/summary", get(telemetry_summary))
        .route(
            "/missions/{id}/authority",
            get(get_authority).post(set_authority),
        )
        .route("/artifacts", get(list_artifacts))
        .route("/artifacts/{id}", get(get_artifact));

    Router::new()
        .nest("/api/pulz", api)
        .layer(cors)
        .with_state(state)
}

/// Maps domain errors onto the `StatusCode`s described by `spec.md` §7:
/// not-found ids get 404, state conflicts and invalid input get 4xx, anything
/// unexpected gets 500 and is logged rather than leaked to the caller.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("store error: {err}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::ProposalNotFound | LifecycleError::ExecutionNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, err.to_string())
            }
            LifecycleError::InvalidLane => ApiError::new(StatusCode::BAD_REQUEST, err.to_string()),
            LifecycleError::InvalidTransition
            | LifecycleError::ExecutionInProgress
            | LifecycleError::ExecutionBlocked => ApiError::new(StatusCode::CONFLICT, err.to_string()),
            LifecycleError::Store(_) | LifecycleError::Io(_) | LifecycleError::Serde(_) => {
                tracing::error!("lifecycle error: {err}");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl From<MissionStartError> for ApiError {
    fn from(err: MissionStartError) -> Self {
        match err {
            MissionStartError::AlreadyRunning => ApiError::new(StatusCode::CONFLICT, err.to_string()),
            MissionStartError::InvalidAuthorityMode => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            MissionStartError::Store(_) => {
                tracing::error!("mission start error: {err}");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

async fn status(_user: VerifiedUser, State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.engine.status().await)
}

async fn mission_start(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Json(req): Json<MissionStartRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(state.engine.start(req).await?))
}

async fn mission_stop(
    _user: VerifiedUser,
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(state.engine.stop().await?))
}

#[derive(Debug, Deserialize, Default)]
struct ProposalsQuery {
    status: Option<String>,
}

async fn queue(
    _user: VerifiedUser,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let proposals = state.engine.store().list_queue().await?;
    Ok(Json(json!(proposals)))
}

async fn proposals(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Query(query): Query<ProposalsQuery>,
) -> Result<Json<Value>, ApiError> {
    let statuses = query
        .status
        .as_deref()
        .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    let proposals = state.engine.store().list_proposals_by_status(statuses).await?;
    Ok(Json(json!(proposals)))
}

async fn approve(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.engine.approve(id).await?;
    Ok(Json(json!({
        "status": "approved",
        "artifact_id": outcome.artifact_id,
        "execution_id": outcome.execution_id,
    })))
}

async fn reject(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.engine.reject(id).await?;
    Ok(Json(json!({ "status": "cancelled" })))
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    lane: String,
    #[serde(default)]
    allow_rerun: bool,
}

async fn execute(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<Value>, ApiError> {
    let execution_id = state.engine.execute(id, &body.lane, body.allow_rerun).await?;
    Ok(Json(json!({ "status": "queued", "execution_id": execution_id })))
}

async fn cancel_execution(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.engine.cancel_execution(id.clone()).await?;
    let execution = state
        .engine
        .store()
        .get_execution(id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "execution not found"))?;
    Ok(Json(json!({ "status": execution.status.as_str() })))
}

#[derive(Debug, Deserialize, Default)]
struct ExecutionsQuery {
    status: Option<String>,
    lane: Option<String>,
    mission_id: Option<String>,
}

async fn list_executions(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let executions = state
        .engine
        .store()
        .list_executions(query.status, query.lane, query.mission_id)
        .await?;
    Ok(Json(json!(executions)))
}

async fn get_execution(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let execution = state
        .engine
        .store()
        .get_execution(id.clone())
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "execution not found"))?;
    let artifacts = state.engine.store().list_artifacts_for_execution(id).await?;
    Ok(Json(json!({ "execution": execution, "artifacts": artifacts })))
}

async fn telemetry_summary(
    _user: VerifiedUser,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let summary = pulz_telemetry::telemetry_summary(
        state.engine.store(),
        &state.engine.config().cost_per_1m_tokens_usd,
    )
    .await?;
    Ok(Json(json!(summary)))
}

#[derive(Debug, Deserialize)]
struct AuthorityBody {
    authority_mode: String,
}

async fn get_authority(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mission = state
        .engine
        .store()
        .get_mission(id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "mission not found"))?;
    Ok(Json(json!({ "authority_mode": mission.authority_mode.as_str() })))
}

async fn set_authority(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AuthorityBody>,
) -> Result<Json<Value>, ApiError> {
    let mode = AuthorityMode::parse(&body.authority_mode)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "invalid authority_mode"))?;
    let updated = state.engine.set_authority_mode(id, mode).await?;
    if !updated {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "mission not found"));
    }
    Ok(Json(json!({ "authority_mode": mode.as_str() })))
}

async fn list_artifacts(
    _user: VerifiedUser,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let artifacts = state.engine.store().list_recent_artifacts(50).await?;
    Ok(Json(json!(artifacts)))
}

#[derive(Debug, Deserialize, Default)]
struct ArtifactQuery {
    format: Option<String>,
}

async fn get_artifact(
    _user: VerifiedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ArtifactQuery>,
) -> Result<Response, ApiError> {
    let artifact = state
        .engine
        .store()
        .get_artifact(id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "artifact not found"))?;

    match query.format.as_deref() {
        Some("text") => Ok(artifact_text(&artifact).into_response()),
        Some("download") => artifact_download(&artifact).await,
        _ => Ok(Json(artifact).into_response()),
    }
}

fn artifact_text(artifact: &Artifact) -> String {
    artifact.text.clone().unwrap_or_else(|| {
        artifact
            .data
            .as_ref()
            .map(|v| serde_json::to_string_pretty(v).unwrap_or_default())
            .unwrap_or_default()
    })
}

async fn artifact_download(artifact: &Artifact) -> Result<Response, ApiError> {
    let bytes = tokio::fs::read(&artifact.path).await.map_err(|err| {
        tracing::error!("failed to read artifact {}: {err}", artifact.path);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })?;
    let filename = FsPath::new(&artifact.path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| artifact.id.clone());

    let disposition = header::HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|err| {
            tracing::error!("invalid content-disposition for artifact {}: {err}", artifact.id);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })?;

    let response = (
        [
            (header::CONTENT_TYPE, header::HeaderValue::from_static(content_type(artifact.kind))),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response();
    Ok(response)
}

fn content_type(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Json => "application/json",
        ArtifactKind::Html => "text/html; charset=utf-8",
        ArtifactKind::Pdf => "application/pdf",
        ArtifactKind::Doc => "application/msword",
        ArtifactKind::Zip => "application/zip",
    }
}

/// `/feed` SSE stream (`spec.md` §4.4/§6): every [`FeedEvent`] published on the
/// broadcaster is forwarded as `event: <kind>\ndata: <json>`, with a
/// `heartbeat` synthesised every 10 idle seconds the way `tandem-server`'s
/// `sse_stream` keeps the connection alive via `KeepAlive`, except here the
/// heartbeat also carries mission-progress fields (`spec` §6 SSE framing).
async fn feed(
    _user: VerifiedUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (sub_id, rx) = state.engine.broadcaster().subscribe().await;
    let broadcaster = state.engine.broadcaster().clone();
    let engine = state.engine.clone();

    let stream = futures::stream::unfold(
        (rx, sub_id, broadcaster, engine),
        |(mut rx, sub_id, broadcaster, engine)| async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
            interval.tick().await; // first tick fires immediately; skip it.
            tokio::select! {
                event = rx.recv() => {
                    let event = event?;
                    let sse = to_sse_event(&event);
                    Some((sse, (rx, sub_id, broadcaster, engine)))
                }
                _ = interval.tick() => {
                    let heartbeat = build_heartbeat(&engine).await;
                    let sse = to_sse_event(&heartbeat);
                    Some((sse, (rx, sub_id, broadcaster, engine)))
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(10)))
}

fn to_sse_event(event: &FeedEvent) -> Result<Event, std::convert::Infallible> {
    let data = serde_json::to_string(&event.payload).unwrap_or_default();
    Ok(Event::default().event(event.kind.clone()).data(data))
}

async fn build_heartbeat(engine: &pulz_orchestrator::MissionEngineHandle) -> FeedEvent {
    let state = engine.engine().state_handle().snapshot().await;
    let running = state
        .mission
        .as_ref()
        .map(|m| m.status == pulz_types::MissionRunStatus::Running)
        .unwrap_or(false);
    let time_left = state
        .mission
        .as_ref()
        .and_then(|m| chrono::DateTime::parse_from_rfc3339(&m.ends_at).ok())
        .map(|ends_at| {
            (ends_at.with_timezone(&chrono::Utc) - chrono::Utc::now())
                .num_seconds()
                .max(0) as f64
        })
        .unwrap_or(0.0);
    let queue_size = engine.store().list_queue().await.map(|q| q.len() as u64).unwrap_or(0);
    FeedEvent::heartbeat(running, time_left, queue_size)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pulz_execution::CancellationRegistry;
    use pulz_orchestrator::{Broadcaster, MissionEngine, MissionStateHandle};
    use pulz_store::Store;
    use pulz_types::{ContactMethod, ExecutionMode, Proposal, ProposalData, ProposalStatus};
    use tower::ServiceExt;

    use super::*;
    use crate::NoAuth;

    async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("engine.sqlite3")).await.unwrap();
        let mut config = pulz_core::EngineConfig::from_env();
        config.data_dir = dir.path().to_path_buf();
        let broadcaster = Broadcaster::new();
        let cancellations = CancellationRegistry::new();
        let state = MissionStateHandle::new();
        let engine = MissionEngine::new(store, broadcaster, config, cancellations, state);
        let handle = pulz_orchestrator::MissionEngineHandle::new(engine);
        (AppState::new(handle, Arc::new(NoAuth)), dir)
    }

    fn sample_proposal(id: &str, status: ProposalStatus, mode: ExecutionMode) -> Proposal {
        let now = "2026-01-01T00:00:00Z".to_string();
        Proposal {
            id: id.to_string(),
            signal_id: "sig-1".to_string(),
            status,
            created_at: now.clone(),
            updated_at: now,
            approved_at: None,
            executing_at: None,
            executed_at: None,
            execution_mode: mode,
            mission_id: None,
            estimated_revenue_cents: None,
            realized_revenue_cents: None,
            data: ProposalData {
                problem_summary: "Need a resume template".to_string(),
                solution_options: vec!["MVP".to_string()],
                suggested_price_range: "$600 - $1,500".to_string(),
                estimated_build_time_minutes: 240,
                message_template: "Hi".to_string(),
                contact_method: ContactMethod {
                    channel: "reddit".to_string(),
                    handle: None,
                    author: None,
                    permalink: None,
                    url: None,
                    link: None,
                },
            },
        }
    }

    #[tokio::test]
    async fn status_route_returns_idle_snapshot() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/pulz/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["items_processed"], 0);
    }

    #[tokio::test]
    async fn approve_route_auto_enqueues_and_runs_to_completion() {
        let (state, _dir) = test_state().await;
        let engine = state.engine.clone();
        engine
            .store()
            .insert_proposal(sample_proposal("p-1", ProposalStatus::Queued, ExecutionMode::AutoAfterApproval))
            .await
            .unwrap();
        let app = app_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/pulz/queue/p-1/approve")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "approved");
        assert!(json["execution_id"].is_string());

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let proposal = engine.store().get_proposal("p-1".to_string()).await.unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Executed);
    }

    #[tokio::test]
    async fn reject_unknown_proposal_is_not_found() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/pulz/queue/missing/reject")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn execute_rejects_invalid_lane_with_bad_request() {
        let (state, _dir) = test_state().await;
        state
            .engine
            .store()
            .insert_proposal(sample_proposal("p-2", ProposalStatus::Approved, ExecutionMode::Manual))
            .await
            .unwrap();
        let app = app_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/pulz/proposals/p-2/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"lane":"not-a-lane"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mission_start_rejects_invalid_authority_mode() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/pulz/mission/start")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"sources":["reddit_smallbusiness"],"rate_per_source_per_minute":2.0,"max_items":10,"authority_mode":"bogus"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

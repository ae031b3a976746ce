//! Control API over the [`SessionStore`].
//!
//! | Method | Path                       | Effect                         |
//! |--------|----------------------------|--------------------------------|
//! | GET    | `/health`                  | liveness                       |
//! | GET    | `/sessions`                | ids of registered sessions     |
//! | POST   | `/sessions`                | start a new session            |
//! | GET    | `/sessions/{id}/state`     | full state snapshot            |
//! | GET    | `/sessions/{id}/summary`   | condensed summary              |
//! | GET    | `/sessions/{id}/events/{role}` | audited events of one role |
//! | POST   | `/sessions/{id}/pause`     | suspend the supervisor loop    |
//! | POST   | `/sessions/{id}/resume`    | resume the supervisor loop     |
//! | POST   | `/sessions/{id}/stop`      | stop every worker and the loop |
//! | POST   | `/sessions/{id}/review`    | force a review round           |

use crate::audit::{AuditLog, load_manifest};
use crate::config::SessionPaths;
use crate::errors::SessionError;
use crate::event::{Event, Role};
use crate::orchestrator::{SessionHandle, SessionLauncher};
use crate::session::{SessionSnapshot, SessionStore, SessionSummary};
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Registered sessions, plus the launcher when the API may start new ones.
pub struct AppState {
    pub store: SessionStore,
    pub launcher: Option<SessionLauncher>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            launcher: None,
        }
    }

    pub fn with_launcher(mut self, launcher: SessionLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub prompt: String,
    pub target_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub workspace_dir: PathBuf,
    pub target_dir: PathBuf,
}

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub session_id: String,
    pub action: &'static str,
    pub paused: bool,
    pub stopped: bool,
}

impl ControlResponse {
    fn new(handle: &SessionHandle, action: &'static str) -> Self {
        Self {
            session_id: handle.session_id().to_string(),
            action,
            paused: handle.is_paused(),
            stopped: handle.is_stopped(),
        }
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", get(list_sessions).post(start_session))
        .route("/sessions/{id}/state", get(session_state))
        .route("/sessions/{id}/summary", get(session_summary))
        .route("/sessions/{id}/events/{role}", get(session_events))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/stop", post(stop_session))
        .route("/sessions/{id}/review", post(review_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the control API on `127.0.0.1:<port>` until `shutdown` resolves.
pub async fn serve(
    state: SharedState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "Control API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<String>> {
    Json(state.store.list().await)
}

async fn start_session(
    State(state): State<SharedState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let launcher = state.launcher.as_ref().ok_or_else(|| {
        ApiError::Unavailable("This server does not start sessions".to_string())
    })?;
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest(
            "The task prompt must not be empty".to_string(),
        ));
    }

    let handle = launcher
        .start(&state.store, prompt, req.target_dir.as_deref())
        .await?;
    let snapshot = handle.snapshot().await;
    info!(session_id = %handle.session_id(), "Session started through the API");
    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session_id: handle.session_id().to_string(),
            workspace_dir: snapshot.session.workspace_dir,
            target_dir: snapshot.session.target_dir,
        }),
    ))
}

async fn session_events(
    State(state): State<SharedState>,
    Path((id, role)): Path<(String, String)>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let handle = state.store.get(&id).await?;
    let role: Role = role
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;

    let workspace_dir = handle.snapshot().await.session.workspace_dir;
    let manifest =
        load_manifest(&workspace_dir).map_err(|e| ApiError::Internal(format!("{:#}", e)))?;
    let log = AuditLog::new(SessionPaths::new(
        workspace_dir,
        manifest.target_dir,
        manifest.support_dir,
    ));
    let events = log
        .load_events(role)
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;
    Ok(Json(events))
}

async fn session_state(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state.store.get(&id).await?;
    Ok(Json(handle.snapshot().await))
}

async fn session_summary(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let handle = state.store.get(&id).await?;
    Ok(Json(handle.summary().await))
}

async fn pause_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let handle = state.store.get(&id).await?;
    handle.pause();
    Ok(Json(ControlResponse::new(&handle, "pause")))
}

async fn resume_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let handle = state.store.get(&id).await?;
    handle.resume();
    Ok(Json(ControlResponse::new(&handle, "resume")))
}

async fn stop_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let handle = state.store.get(&id).await?;
    handle.stop();
    Ok(Json(ControlResponse::new(&handle, "stop")))
}

async fn review_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let handle = state.store.get(&id).await?;
    handle.trigger_review();
    Ok(Json(ControlResponse::new(&handle, "review")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::SessionManifest;
    use crate::event::EventKind;
    use crate::orchestrator::{CoordinatorSettings, WorkerFactory};
    use crate::session::SessionState;
    use crate::triad_config::TriadConfig;
    use crate::worker::mock::MockWorker;
    use crate::worker::{LaunchConfig, Worker};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn setup() -> (SharedState, SessionHandle) {
        let store = SessionStore::new();
        let handle = SessionHandle::new(SessionState::new(
            "orch_api",
            "Add search",
            PathBuf::from("/w"),
            PathBuf::from("/t"),
        ));
        store.insert(handle.clone()).await;
        (Arc::new(AppState::new(store)), handle)
    }

    async fn send(state: &SharedState, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        dispatch(state, req).await
    }

    async fn send_json(
        state: &SharedState,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        dispatch(state, req).await
    }

    async fn dispatch(state: &SharedState, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = setup().await;
        let (status, json) = send(&state, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let (state, _) = setup().await;
        let (status, json) = send(&state, "GET", "/sessions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!(["orch_api"]));
    }

    #[tokio::test]
    async fn test_state_snapshot() {
        let (state, _) = setup().await;
        let (status, json) = send(&state, "GET", "/sessions/orch_api/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session"]["session_id"], "orch_api");
        assert_eq!(json["session"]["workers"]["architect"]["status"], "idle");
        assert_eq!(json["paused"], false);
    }

    #[tokio::test]
    async fn test_summary() {
        let (state, _) = setup().await;
        let (status, json) = send(&state, "GET", "/sessions/orch_api/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user_prompt"], "Add search");
        assert_eq!(json["reviews"]["total"], 0);
        assert_eq!(json["complete"], false);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (state, _) = setup().await;
        let (status, json) = send(&state, "GET", "/sessions/orch_nope/state").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Session orch_nope not found");

        let (status, _) = send(&state, "POST", "/sessions/orch_nope/stop").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_control_calls_reach_handle() {
        let (state, handle) = setup().await;

        let (status, json) = send(&state, "POST", "/sessions/orch_api/pause").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["paused"], true);
        assert!(handle.is_paused());

        let (_, json) = send(&state, "POST", "/sessions/orch_api/resume").await;
        assert_eq!(json["paused"], false);
        assert!(!handle.is_paused());

        let (_, json) = send(&state, "POST", "/sessions/orch_api/review").await;
        assert_eq!(json["action"], "review");
        assert!(handle.take_review_request());

        let (_, json) = send(&state, "POST", "/sessions/orch_api/stop").await;
        assert_eq!(json["stopped"], true);
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_state_endpoint_is_get_only() {
        let (state, _) = setup().await;
        let req = Request::builder()
            .method("POST")
            .uri("/sessions/orch_api/state")
            .body(Body::empty())
            .unwrap();
        let resp = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    struct ExitingFactory;

    impl WorkerFactory for ExitingFactory {
        fn create(
            &self,
            role: Role,
            _prompt: String,
            _paths: &SessionPaths,
            config: LaunchConfig,
        ) -> Box<dyn Worker> {
            let mut worker = MockWorker::new(role).exiting_after(0);
            worker.config = config;
            Box::new(worker)
        }
    }

    fn launcher_state(dir: &TempDir) -> SharedState {
        let config = TriadConfig::from_toml(dir.path().to_path_buf(), Default::default());
        let launcher = SessionLauncher::new(&config, Arc::new(ExitingFactory)).with_settings(
            CoordinatorSettings {
                poll_interval: std::time::Duration::from_millis(10),
                ..Default::default()
            },
        );
        Arc::new(AppState::new(SessionStore::new()).with_launcher(launcher))
    }

    #[tokio::test]
    async fn test_start_session_registers_it() {
        let dir = TempDir::new().unwrap();
        let state = launcher_state(&dir);

        let (status, json) = send_json(
            &state,
            "/sessions",
            serde_json::json!({"prompt": "Add search", "target_dir": "app"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json["session_id"].as_str().unwrap().to_string();
        assert!(id.starts_with("orch_"));
        assert_eq!(json["target_dir"], dir.path().join("app").display().to_string());

        let (_, list) = send(&state, "GET", "/sessions").await;
        assert_eq!(list, serde_json::json!([id]));

        let (status, summary) = send(&state, "GET", &format!("/sessions/{}/summary", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["user_prompt"], "Add search");
    }

    #[tokio::test]
    async fn test_start_session_rejects_empty_prompt() {
        let dir = TempDir::new().unwrap();
        let state = launcher_state(&dir);
        let (status, json) = send_json(&state, "/sessions", serde_json::json!({"prompt": "  "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "The task prompt must not be empty");
        assert!(state.store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_session_without_launcher() {
        let (state, _) = setup().await;
        let (status, _) = send_json(&state, "/sessions", serde_json::json!({"prompt": "x"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_role_events_come_from_audit_log() {
        let dir = TempDir::new().unwrap();
        let paths = SessionPaths::new(
            dir.path().join("orch_ev"),
            dir.path().join("target"),
            dir.path().join(".triad"),
        );
        paths.ensure_directories().unwrap();
        let log = AuditLog::new(paths.clone());
        log.write_manifest(&SessionManifest {
            session_id: "orch_ev".to_string(),
            user_prompt: "Add search".to_string(),
            target_dir: paths.target_dir.clone(),
            support_dir: paths.support_dir.clone(),
            started_at: chrono::Utc::now(),
        })
        .unwrap();
        log.append_event(&Event::new(Role::Reviewer, EventKind::Finding, "Missing index"))
            .unwrap();

        let store = SessionStore::new();
        store
            .insert(SessionHandle::new(SessionState::new(
                "orch_ev",
                "Add search",
                paths.workspace_dir.clone(),
                paths.target_dir.clone(),
            )))
            .await;
        let state = Arc::new(AppState::new(store));

        let (status, json) = send(&state, "GET", "/sessions/orch_ev/events/reviewer").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["payload"]["text"], "Missing index");

        let (status, json) = send(&state, "GET", "/sessions/orch_ev/events/architect").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));

        let (status, _) = send(&state, "GET", "/sessions/orch_ev/events/designer").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, "GET", "/sessions/orch_nope/events/reviewer").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

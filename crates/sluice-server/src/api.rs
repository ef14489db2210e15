// HTTP submission boundary
// Decision: admission errors map to status codes here; the core only returns QueueError.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sluice_core::store::StateCounts;
use sluice_core::{BoundedQueue, QueueError, StateStore, Task, TaskId, TaskState};
use tower_http::trace::TraceLayer;

/// Request bodies above this are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<BoundedQueue>,
    pub store: Arc<dyn StateStore>,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub id: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub max_retries: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub id: String,
    pub state: TaskState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub id: String,
    pub state: TaskState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub capacity: usize,
    pub len: usize,
    pub accepting: bool,
    pub states: StateCounts,
}

/// Error surfaced to HTTP callers as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnsupportedMediaType,
    NotFound,
    Admission(QueueError),
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError::Admission(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "content-type must be application/json".to_string(),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "task not found".to_string()),
            ApiError::Admission(QueueError::DuplicateId) => {
                (StatusCode::CONFLICT, "duplicate id".to_string())
            }
            // full or closed: callers should retry later
            ApiError::Admission(QueueError::QueueFull | QueueError::Closed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "queue unavailable".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Create the router
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/enqueue", post(enqueue))
        .route("/healthz", get(healthz))
        .route("/tasks/:id", get(get_task))
        .route("/stats", get(stats))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /healthz - liveness; never touches the queue
async fn healthz() -> &'static str {
    "ok"
}

/// POST /enqueue - admit a task
async fn enqueue(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    if let Some(ct) = headers.get(header::CONTENT_TYPE) {
        let ct = ct.to_str().map_err(|_| ApiError::UnsupportedMediaType)?;
        if !ct.is_empty() && !ct.starts_with("application/json") {
            return Err(ApiError::UnsupportedMediaType);
        }
    }

    let req: EnqueueRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("invalid JSON".to_string()))?;
    let max_retries = validate(&req)?;

    state
        .queue
        .enqueue(Task::new(req.id.clone(), req.payload, max_retries))?;

    tracing::debug!(task_id = %req.id, max_retries, "task accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            id: req.id,
            state: TaskState::Queued,
        }),
    ))
}

fn validate(req: &EnqueueRequest) -> Result<u32, ApiError> {
    if req.id.trim().is_empty() {
        return Err(ApiError::BadRequest("id is required".to_string()));
    }
    if req.max_retries < 0 {
        return Err(ApiError::BadRequest("max_retries must be >= 0".to_string()));
    }
    u32::try_from(req.max_retries)
        .map_err(|_| ApiError::BadRequest("max_retries is too large".to_string()))
}

/// GET /tasks/:id - current state of a task
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let entry = state
        .store
        .entry(&TaskId::new(id.as_str()))
        .ok_or(ApiError::NotFound)?;
    Ok(Json(TaskStatusResponse {
        id,
        state: entry.state,
        updated_at: entry.updated_at,
    }))
}

/// GET /stats - queue occupancy and per-state counts
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        capacity: state.queue.capacity(),
        len: state.queue.len(),
        accepting: state.queue.accepting(),
        states: state.store.counts(),
    })
}

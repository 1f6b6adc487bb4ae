//! Allocation API
//!
//! HTTP surface used by the portal frontend to hand sessions to learners.
//!
//! Routes:
//! - `POST /api/environments/{environment}/sessions` - bind a session to a user
//! - `DELETE /api/sessions/{session}` - release an allocated session
//! - `GET /healthz` - liveness

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::ClusterApi;
use crate::pool::{Allocation, PoolManager, Release, SessionHandle};

/// Allocation API errors
#[derive(Debug, Error)]
pub enum AllocationError {
    /// No session available
    #[error("busy")]
    Busy,

    /// Environment does not exist
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    /// Session does not exist
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session is idle in the pool and bound to no one
    #[error("session not allocated: {0}")]
    SessionNotAllocated(String),

    /// Malformed request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Cluster temporarily unreachable
    #[error("temporarily unavailable")]
    Unavailable,

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::Error> for AllocationError {
    fn from(e: crate::Error) -> Self {
        if e.is_retryable() {
            warn!(error = %e, "allocation request hit a temporary error");
            Self::Unavailable
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl IntoResponse for AllocationError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AllocationError::Busy | AllocationError::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AllocationError::EnvironmentNotFound(_) | AllocationError::SessionNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AllocationError::SessionNotAllocated(_) => (StatusCode::CONFLICT, self.to_string()),
            AllocationError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AllocationError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

/// Body of an allocation request
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AllocationRequest {
    /// Learner identity
    pub user: String,
}

/// Body of a successful allocation
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResponse {
    /// Session name, used to release it
    pub name: String,
    /// Session URL
    pub url: String,
    /// Session login
    pub username: String,
    /// Session password
    pub password: String,
    /// Expiry deadline
    pub expires_at: DateTime<Utc>,
}

impl From<SessionHandle> for AllocationResponse {
    fn from(handle: SessionHandle) -> Self {
        Self {
            name: handle.name,
            url: handle.url,
            username: handle.credentials.username,
            password: handle.credentials.password,
            expires_at: handle.expires_at,
        }
    }
}

/// Shared handler state
pub struct AllocationState {
    api: Arc<dyn ClusterApi>,
    pool: Arc<PoolManager>,
}

impl AllocationState {
    /// Create handler state
    pub fn new(api: Arc<dyn ClusterApi>, pool: Arc<PoolManager>) -> Self {
        Self { api, pool }
    }
}

/// Bind a session of an environment to a user
pub async fn allocate_handler(
    State(state): State<Arc<AllocationState>>,
    Path(environment): Path<String>,
    Json(request): Json<AllocationRequest>,
) -> Result<Json<AllocationResponse>, AllocationError> {
    debug!(environment = %environment, "allocation request received");

    let user = request.user.trim();
    if user.is_empty() {
        return Err(AllocationError::InvalidRequest("user must not be empty".into()));
    }

    // environments live in a namespace of the same name
    let env = state
        .api
        .get_environment(&environment, &environment)
        .await?
        .ok_or_else(|| AllocationError::EnvironmentNotFound(environment.clone()))?;

    match state.pool.allocate(&env, user).await? {
        Allocation::Allocated(handle) => {
            info!(environment = %environment, session = %handle.name, "session handed out");
            Ok(Json(handle.into()))
        }
        Allocation::Busy => Err(AllocationError::Busy),
    }
}

/// Release an allocated session
pub async fn release_handler(
    State(state): State<Arc<AllocationState>>,
    Path(session): Path<String>,
) -> Result<StatusCode, AllocationError> {
    match state.pool.release(&session).await? {
        Release::Released => Ok(StatusCode::NO_CONTENT),
        Release::NotFound => Err(AllocationError::SessionNotFound(session)),
        Release::NotAllocated => Err(AllocationError::SessionNotAllocated(session)),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Create the allocation router
pub fn allocation_router(state: Arc<AllocationState>) -> Router {
    Router::new()
        .route(
            "/api/environments/{environment}/sessions",
            post(allocate_handler),
        )
        .route("/api/sessions/{session}", delete(release_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve the allocation API until the process stops
pub async fn serve(addr: SocketAddr, state: Arc<AllocationState>) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::Error::internal_with_context("allocation api", e.to_string()))?;
    info!(%addr, "allocation API listening");

    axum::serve(listener, allocation_router(state))
        .await
        .map_err(|e| crate::Error::internal_with_context("allocation api", e.to_string()))
}

//! Request/response transport adapter.
//!
//! Exposes the orchestration loop as a small JSON API on an axum [`Router`]:
//!
//! | Route | Body | Reply |
//! |---|---|---|
//! | `GET /health`, `GET /api/health` | | `{status, mcpServer, connected}` |
//! | `GET /api/tools` | | `{tools}` |
//! | `POST /api/chat` | `{message, sessionId?}` | `{message, toolCalls, sessionId}` |
//! | `POST /api/clear` | `{sessionId}` | `{success: true}` |
//! | `GET /ws` | WebSocket upgrade, see [`ws_adapter`](crate::ws_adapter) | |
//!
//! Failures are answered with HTTP 500 and `{error}`. A failed chat turn leaves the
//! session's history untouched.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpchat::clients::claude::ClaudeClient;
//! use mcpchat::http_adapter::{router, AppState};
//! use mcpchat::tool_protocols::McpGatewayClient;
//! use mcpchat::{SessionStore, ToolOrchestrator};
//!
//! # async {
//! let client = ClaudeClient::new_with_model_str("sk-ant-...", "claude-3-5-sonnet-20241022");
//! let state = AppState::new(
//!     Arc::new(ToolOrchestrator::new(Arc::new(client))),
//!     Arc::new(McpGatewayClient::new("http://localhost:8080/mcp")),
//!     Arc::new(SessionStore::new()),
//!     "http://localhost:8080/mcp",
//! );
//! let app = router(state, &["http://localhost:5173".to_string()]);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # };
//! ```

use crate::orchestration::{OrchestrationError, OrchestrationOutcome, ToolOrchestrator};
use crate::session_store::SessionStore;
use crate::tool_protocol::{ToolGateway, ToolInvocation};
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ToolOrchestrator>,
    /// The single gateway connection shared by every session.
    pub gateway: Arc<dyn ToolGateway>,
    pub sessions: Arc<SessionStore>,
    /// Reported by the health endpoint.
    pub mcp_server_url: String,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ToolOrchestrator>,
        gateway: Arc<dyn ToolGateway>,
        sessions: Arc<SessionStore>,
        mcp_server_url: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            gateway,
            sessions,
            mcp_server_url: mcp_server_url.into(),
        }
    }

    /// Reconnect the gateway if it is down. Failures are logged; the operation that
    /// follows will then report `Not connected`.
    pub async fn ensure_gateway(&self) {
        if self.gateway.is_connected() {
            return;
        }
        log::info!("tool gateway not connected, attempting to reconnect");
        if let Err(e) = self.gateway.connect().await {
            log::warn!("reconnect failed: {}", e);
        }
    }

    /// Run one turn for `session_id` and commit it on success.
    pub async fn handle_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<OrchestrationOutcome, OrchestrationError> {
        self.ensure_gateway().await;
        let history = self.sessions.get(session_id).await;
        let outcome = self
            .orchestrator
            .run(message, &history, self.gateway.as_ref())
            .await?;
        self.sessions
            .commit_turn(session_id, message, &outcome.response)
            .await;
        Ok(outcome)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    pub session_id: String,
}

/// A failure reported to the HTTP client as `500 {"error": ...}`.
#[derive(Debug)]
pub struct ApiError(pub String);

impl<E: std::error::Error> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": self.0})),
        )
            .into_response()
    }
}

/// Build the router with every route and the CORS policy for `allowed_origins`.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/chat", post(chat))
        .route("/api/clear", post(clear))
        .route("/ws", get(crate::ws_adapter::ws_handler))
        .layer(ServiceBuilder::new().layer(cors_layer(allowed_origins)))
        .with_state(state)
}

/// `*` anywhere in the list allows any origin; otherwise only the listed ones, with
/// credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "mcpServer": state.mcp_server_url,
        "connected": state.gateway.is_connected(),
    }))
}

async fn list_tools(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.ensure_gateway().await;
    let tools = state.gateway.list_tools().await.map_err(|e| {
        log::error!("Error getting tools: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(json!({"tools": tools})))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(SessionStore::new_session_id);

    let outcome = state
        .handle_message(&session_id, &request.message)
        .await
        .map_err(|e| {
            log::error!("Error processing message for session {}: {}", session_id, e);
            ApiError::from(e)
        })?;

    Ok(Json(ChatResponse {
        message: outcome.response,
        tool_calls: outcome.tool_calls,
        session_id,
    }))
}

async fn clear(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> Json<serde_json::Value> {
    state.sessions.clear(&request.session_id).await;
    Json(json!({"success": true}))
}

//! Tool Gateway Implementations
//!
//! [`McpGatewayClient`] is the [`ToolGateway`] used in production: a client for remote
//! MCP (Model Context Protocol) servers over the Streamable HTTP transport, i.e. JSON-RPC
//! 2.0 messages POSTed to a single endpoint.
//!
//! # Lifecycle
//!
//! ```text
//! connect()     → initialize ─▶ (Mcp-Session-Id) ─▶ notifications/initialized
//! list_tools()  → tools/list  (follows nextCursor)
//! call_tool()   → tools/call  {name, arguments}
//! disconnect()  → DELETE with Mcp-Session-Id
//! ```
//!
//! One client is shared by every session. Each operation is its own HTTP request/response
//! pair, so concurrent calls from different turns cannot receive each other's results.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::tool_protocol::ToolGateway;
//! use mcpchat::tool_protocols::McpGatewayClient;
//!
//! # async {
//! let gateway = McpGatewayClient::new("http://localhost:8080/mcp");
//! if let Err(e) = gateway.connect().await {
//!     eprintln!("running without tools: {}", e);
//! }
//! # };
//! ```

use crate::clients::http_pool::{build_client, get_http_client};
use crate::event::{EventHandler, GatewayEvent};
use crate::tool_protocol::{GatewayError, ToolCallResult, ToolDescriptor, ToolGateway};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use sse_stream::{Sse, SseStream};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// MCP revision requested during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Name and version announced to the server in `initialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "mcp-web-client".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// State negotiated by a successful handshake.
#[derive(Debug, Clone)]
struct McpSession {
    session_id: Option<String>,
    protocol_version: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<JsonValue>,
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolsListPage {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

/// Failure of a single JSON-RPC exchange.
#[derive(Debug)]
enum RpcError {
    /// The HTTP request itself failed.
    Transport(String),
    /// Non-success HTTP status.
    Status { status: u16, body: String },
    /// The body was not a JSON-RPC message.
    Decode(String),
    /// The server answered with a JSON-RPC error object.
    Remote(JsonRpcError),
    /// A request got no response carrying its id.
    MissingResponse,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Transport(msg) => write!(f, "{}", msg),
            RpcError::Status { status, body } if body.is_empty() => {
                write!(f, "server returned HTTP {}", status)
            }
            RpcError::Status { status, body } => {
                write!(f, "server returned HTTP {}: {}", status, body)
            }
            RpcError::Decode(msg) => write!(f, "invalid JSON-RPC message: {}", msg),
            RpcError::Remote(err) => write!(f, "{} (code {})", err.message, err.code),
            RpcError::MissingResponse => write!(f, "server sent no response"),
        }
    }
}

/// Raw outcome of one POST.
struct RpcReply {
    session_id: Option<String>,
    response: Option<JsonRpcResponse>,
}

/// MCP Streamable HTTP client implementing [`ToolGateway`].
pub struct McpGatewayClient {
    endpoint: String,
    http: reqwest::Client,
    client_info: ClientInfo,
    connected: AtomicBool,
    session: RwLock<Option<McpSession>>,
    next_request_id: AtomicU64,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl McpGatewayClient {
    /// Create a not-yet-connected client for the given MCP endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            http: get_http_client(&endpoint),
            endpoint,
            client_info: ClientInfo::default(),
            connected: AtomicBool::new(false),
            session: RwLock::new(None),
            next_request_id: AtomicU64::new(1),
            event_handler: None,
        }
    }

    /// Bound every request by a timeout. By default requests may take as long as the
    /// server needs.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.http = build_client(Some(Duration::from_secs(timeout_secs)));
        self
    }

    /// Override the client name/version sent in `initialize`.
    pub fn with_client_info(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.client_info = ClientInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Receive [`GatewayEvent`]s for connection lifecycle changes.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Session id issued by the server, if connected and the server uses sessions.
    pub async fn session_id(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.session_id.clone())
    }

    async fn emit(&self, event: GatewayEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_gateway_event(&event).await;
        }
    }

    /// POST one JSON-RPC message and decode whatever came back.
    async fn post(
        &self,
        session: Option<&McpSession>,
        payload: &JsonValue,
    ) -> Result<RpcReply, RpcError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(payload);
        if let Some(session) = session {
            if let Some(id) = &session.session_id {
                request = request.header(SESSION_HEADER, id.as_str());
            }
            request = request.header(PROTOCOL_VERSION_HEADER, session.protocol_version.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let response = if is_event_stream {
            let events = SseStream::from_byte_stream(response.bytes_stream());
            find_response_in_event_stream(events, payload.get("id")).await?
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
            if body.trim().is_empty() {
                None
            } else {
                Some(serde_json::from_str(&body).map_err(|e| RpcError::Decode(e.to_string()))?)
            }
        };

        Ok(RpcReply {
            session_id,
            response,
        })
    }

    /// Send a request and return `(session header, result)`.
    async fn request(
        &self,
        session: Option<&McpSession>,
        method: &str,
        params: JsonValue,
    ) -> Result<(Option<String>, JsonValue), RpcError> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let reply = self.post(session, &payload).await?;
        let response = reply.response.ok_or(RpcError::MissingResponse)?;
        if let Some(error) = response.error {
            return Err(RpcError::Remote(error));
        }
        Ok((reply.session_id, response.result.unwrap_or(JsonValue::Null)))
    }

    async fn notify(&self, session: &McpSession, method: &str) -> Result<(), RpcError> {
        let payload = json!({"jsonrpc": "2.0", "method": method});
        self.post(Some(session), &payload).await.map(|_| ())
    }

    /// Run `initialize` + `notifications/initialized`. Returns the negotiated session and
    /// the server's advertised name.
    async fn handshake(&self) -> Result<(McpSession, Option<String>), RpcError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {"tools": {}, "resources": {}, "prompts": {}},
            "clientInfo": {
                "name": self.client_info.name,
                "version": self.client_info.version,
            },
        });
        let (session_id, result) = self.request(None, "initialize", params).await?;

        let session = McpSession {
            session_id,
            protocol_version: result
                .get("protocolVersion")
                .and_then(JsonValue::as_str)
                .unwrap_or(MCP_PROTOCOL_VERSION)
                .to_string(),
        };
        self.notify(&session, "notifications/initialized").await?;

        let server_name = result
            .pointer("/serverInfo/name")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        Ok((session, server_name))
    }

    /// Issue a request on the established session, mapping exchange failures with
    /// `map_err`. A 404 on a session-bound request means the server dropped us.
    async fn session_request<F>(
        &self,
        method: &str,
        params: JsonValue,
        map_err: F,
    ) -> Result<JsonValue, GatewayError>
    where
        F: FnOnce(RpcError) -> GatewayError,
    {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(GatewayError::NotConnected)?;

        match self.request(Some(&session), method, params).await {
            Ok((_, result)) => Ok(result),
            Err(RpcError::Status { status: 404, .. }) if session.session_id.is_some() => {
                self.expire_session(&session).await;
                Err(GatewayError::NotConnected)
            }
            Err(err) => Err(map_err(err)),
        }
    }

    async fn expire_session(&self, expired: &McpSession) {
        let mut guard = self.session.write().await;
        let still_current = guard
            .as_ref()
            .map(|current| current.session_id == expired.session_id)
            .unwrap_or(false);
        if still_current {
            *guard = None;
            self.connected.store(false, Ordering::Release);
            drop(guard);
            self.emit(GatewayEvent::SessionExpired {
                endpoint: self.endpoint.clone(),
            })
            .await;
        }
    }
}

#[async_trait]
impl ToolGateway for McpGatewayClient {
    async fn connect(&self) -> Result<(), GatewayError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        // Concurrent callers queue on the write lock; only the first performs the handshake.
        let mut guard = self.session.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let handshake = self.handshake().await;
        // Handlers may call back into the gateway, so emit only after releasing the lock.
        match handshake {
            Ok((session, server_name)) => {
                let protocol_version = session.protocol_version.clone();
                *guard = Some(session);
                self.connected.store(true, Ordering::Release);
                drop(guard);
                self.emit(GatewayEvent::Connected {
                    endpoint: self.endpoint.clone(),
                    server_name,
                    protocol_version,
                })
                .await;
                Ok(())
            }
            Err(err) => {
                drop(guard);
                let message = err.to_string();
                self.emit(GatewayEvent::ConnectionFailed {
                    endpoint: self.endpoint.clone(),
                    error: message.clone(),
                })
                .await;
                Err(GatewayError::Connection(message))
            }
        }
    }

    async fn disconnect(&self) {
        let session = {
            let mut guard = self.session.write().await;
            self.connected.store(false, Ordering::Release);
            guard.take()
        };
        let Some(session) = session else {
            return;
        };

        if let Some(id) = &session.session_id {
            let result = self
                .http
                .delete(&self.endpoint)
                .header(SESSION_HEADER, id.as_str())
                .send()
                .await;
            if let Err(e) = result {
                log::debug!("MCP session termination failed: {}", e);
            }
        }

        self.emit(GatewayEvent::Disconnected {
            endpoint: self.endpoint.clone(),
        })
        .await;
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            let params = match &cursor {
                Some(cursor) => json!({"cursor": cursor}),
                None => json!({}),
            };
            let result = self
                .session_request("tools/list", params, |e| GatewayError::Protocol(e.to_string()))
                .await?;
            let page: ToolsListPage = serde_json::from_value(result)
                .map_err(|e| GatewayError::Protocol(format!("invalid tools/list result: {}", e)))?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && seen_cursors.insert(next.clone()) => {
                    cursor = Some(next)
                }
                Some(next) if !next.is_empty() => {
                    log::warn!("tools/list cursor {} repeated, stopping pagination", next);
                    break;
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: JsonValue,
    ) -> Result<ToolCallResult, GatewayError> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let tool = name.to_string();

        let result = self
            .session_request(
                "tools/call",
                json!({"name": name, "arguments": arguments}),
                |e| match e {
                    RpcError::Remote(err) => GatewayError::ToolExecution {
                        tool,
                        message: err.message,
                    },
                    other => GatewayError::Protocol(other.to_string()),
                },
            )
            .await?;

        let result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| GatewayError::Protocol(format!("invalid tools/call result: {}", e)))?;
        if result.is_error {
            return Err(GatewayError::ToolExecution {
                tool: name.to_string(),
                message: result.joined_text(),
            });
        }
        Ok(result)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn protocol_name(&self) -> &str {
        "mcp"
    }
}

/// Pick the JSON-RPC response with the request's id out of an event stream.
/// Server-initiated requests and notifications on the same stream are skipped, and the
/// rest of the stream is left unread once the response arrives.
async fn find_response_in_event_stream<S>(
    events: S,
    expected_id: Option<&JsonValue>,
) -> Result<Option<JsonRpcResponse>, RpcError>
where
    S: Stream<Item = Result<Sse, sse_stream::Error>>,
{
    let mut events = std::pin::pin!(events);
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| match e {
            sse_stream::Error::Body(e) => RpcError::Transport(e.to_string()),
            other => RpcError::Decode(other.to_string()),
        })?;
        let Some(data) = event.data else {
            continue;
        };
        let message: JsonValue = match serde_json::from_str(&data) {
            Ok(message) => message,
            Err(_) => continue,
        };
        if message.get("result").is_none() && message.get("error").is_none() {
            continue;
        }
        let response: JsonRpcResponse =
            serde_json::from_value(message).map_err(|e| RpcError::Decode(e.to_string()))?;
        if expected_id.is_none() || response.id.as_ref() == expected_id {
            return Ok(Some(response));
        }
    }
    Ok(None)
}

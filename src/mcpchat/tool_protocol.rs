//! Tool Gateway Abstraction Layer
//!
//! This module defines the contract between the orchestration loop and the remote endpoint
//! that actually executes tools. The orchestration loop only ever sees the
//! [`ToolGateway`] trait, which keeps the concrete transport ([`McpGatewayClient`] over
//! MCP Streamable HTTP, or a mock in tests) swappable.
//!
//! # Architecture
//!
//! ```text
//! ToolOrchestrator → ToolGateway (trait) → [McpGatewayClient | user-defined]
//! ```
//!
//! [`McpGatewayClient`]: crate::tool_protocols::McpGatewayClient

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// A tool advertised by the gateway's live listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name within a listing.
    pub name: String,
    /// Human readable description; MCP servers may omit it.
    #[serde(default)]
    pub description: String,
    /// JSON schema describing the accepted arguments.
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool call performed during a turn.
///
/// Arguments are passed through untouched; validating them against the schema is the
/// remote server's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation identifier taken from the model's tool-use block.
    pub id: String,
    pub name: String,
    #[serde(rename = "args")]
    pub arguments: serde_json::Value,
}

/// One item of a tool result's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    /// Content kind (`text`, `image`, `resource`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Remaining fields of non-text items, kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Result of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Convenience constructor for a single text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    /// Concatenate the result into one blob for re-injection into history.
    ///
    /// Segments are joined by `\n`; non-text items contribute an empty segment.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|item| {
                if item.kind == "text" {
                    item.text.as_deref().unwrap_or("")
                } else {
                    ""
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Error types for gateway operations
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The endpoint was unreachable or rejected the handshake.
    Connection(String),
    /// An operation was attempted while not connected.
    NotConnected,
    /// The remote endpoint reported a failure for one specific tool call.
    ToolExecution { tool: String, message: String },
    /// A transport or decoding failure on an established connection.
    Protocol(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Connection(msg) => write!(f, "Failed to connect to tool server: {}", msg),
            GatewayError::NotConnected => write!(f, "Not connected"),
            GatewayError::ToolExecution { tool, message } => {
                write!(f, "Tool '{}' failed: {}", tool, message)
            }
            GatewayError::Protocol(msg) => write!(f, "Tool server protocol error: {}", msg),
        }
    }
}

impl Error for GatewayError {}

/// A single logical connection to a remote tool-execution endpoint.
///
/// Implementations are shared by every session's turn at once, so all methods take
/// `&self` and must be safe under concurrent use.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Establish the session with the remote endpoint. Returns immediately when already
    /// connected.
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Release the connection. A no-op when not connected.
    async fn disconnect(&self);

    /// Current tool listing. Fails with [`GatewayError::NotConnected`] before `connect()`.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError>;

    /// Invoke one tool and wait for its result.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, GatewayError>;

    /// Connected / not-connected flag.
    fn is_connected(&self) -> bool;

    /// Protocol identifier (e.g. "mcp").
    fn protocol_name(&self) -> &str;
}

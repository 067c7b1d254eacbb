//! Orchestration and gateway event system.
//!
//! Provides a callback-based observability layer for the tool-calling loop and the
//! gateway connection. Implement [`EventHandler`] to receive real-time notifications
//! about:
//!
//! - **Turn lifecycle**: start, completion, failure of a user turn
//! - **Model round-trips**: each call into the language model
//! - **Tool operations**: tool call detection, execution outcomes, iteration limits
//! - **Gateway lifecycle**: connect, connect failures, disconnect, expired sessions
//!
//! Both handler methods have default no-op implementations, so you only override what
//! you care about. [`LogEventHandler`] forwards everything to the `log` facade.
//!
//! # Event Flow (during a typical `run()` call)
//!
//! ```text
//! TurnStarted
//!   └─ ToolsListed
//!   └─ ModelCallStarted { iteration: 1 }
//!   └─ ModelCallCompleted { iteration: 1 }
//!   └─ (if the response requests a tool)
//!       ├─ ToolCallDetected { iteration: 1 }
//!       ├─ ToolExecutionCompleted { iteration: 1 }
//!       ├─ ModelCallStarted { iteration: 2 }
//!       └─ ModelCallCompleted { iteration: 2 }
//!   └─ (loop continues until a text-only response or the iteration cap)
//! TurnCompleted | TurnFailed
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::event::{EventHandler, OrchestrationEvent};
//! use async_trait::async_trait;
//!
//! struct ToolPrinter;
//!
//! #[async_trait]
//! impl EventHandler for ToolPrinter {
//!     async fn on_orchestration_event(&self, event: &OrchestrationEvent) {
//!         if let OrchestrationEvent::ToolCallDetected { tool_name, .. } = event {
//!             println!("calling {}", tool_name);
//!         }
//!     }
//! }
//! ```

use crate::client_wrapper::TokenUsage;
use async_trait::async_trait;

/// Events emitted by [`ToolOrchestrator::run`](crate::orchestration::ToolOrchestrator::run).
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationEvent {
    // ── Turn lifecycle ───────────────────────────────────────────────────

    /// Fired at the start of a turn.
    TurnStarted {
        /// First ~120 characters of the user message.
        message_preview: String,
        /// Number of prior messages handed in by the caller.
        history_len: usize,
    },

    /// The gateway returned the tool listing for this turn.
    ToolsListed { tool_count: usize },

    /// Fired when `run()` returns successfully.
    TurnCompleted {
        /// Number of tool calls executed during the turn.
        tool_calls_made: usize,
        /// Character length of the final response text.
        response_length: usize,
        /// Aggregate usage over all model calls, if the client reports it.
        tokens_used: Option<TokenUsage>,
    },

    /// Fired when `run()` aborts the turn with an error.
    TurnFailed { error: String },

    // ── Model round-trips ────────────────────────────────────────────────

    /// Fired **before** each model call. Iteration 1 is the initial call.
    ModelCallStarted { iteration: usize },

    /// Fired **after** each model call.
    ModelCallCompleted {
        iteration: usize,
        /// Usage of this call, if reported.
        tokens_used: Option<TokenUsage>,
        /// Whether the response contains a tool-use block.
        tool_requested: bool,
    },

    // ── Tool operations ──────────────────────────────────────────────────

    /// The model asked for a tool.
    ToolCallDetected {
        iteration: usize,
        /// Correlation identifier of the tool-use block.
        invocation_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// A tool finished executing (success or failure).
    ToolExecutionCompleted {
        iteration: usize,
        invocation_id: String,
        tool_name: String,
        success: bool,
        /// Error message if the tool failed, `None` on success.
        error: Option<String>,
        /// Character length of the joined result text (0 on failure).
        result_length: usize,
    },

    /// The loop hit its iteration cap without a text-only response.
    MaxIterationsReached { iterations: usize },
}

/// Events emitted by [`McpGatewayClient`](crate::tool_protocols::McpGatewayClient).
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// The handshake succeeded.
    Connected {
        endpoint: String,
        server_name: Option<String>,
        protocol_version: String,
    },
    /// The handshake failed; the client stays not-connected.
    ConnectionFailed { endpoint: String, error: String },
    /// The connection was released by `disconnect()`.
    Disconnected { endpoint: String },
    /// The server no longer recognises our session id.
    SessionExpired { endpoint: String },
}

/// Receives orchestration and gateway events. All methods default to no-ops.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_orchestration_event(&self, _event: &OrchestrationEvent) {}

    async fn on_gateway_event(&self, _event: &GatewayEvent) {}
}

/// Handler that writes every event to the `log` facade.
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn on_orchestration_event(&self, event: &OrchestrationEvent) {
        match event {
            OrchestrationEvent::TurnStarted {
                message_preview,
                history_len,
            } => log::info!(
                "turn started ({} prior messages): {}",
                history_len,
                message_preview
            ),
            OrchestrationEvent::ToolCallDetected {
                iteration,
                tool_name,
                arguments,
                ..
            } => log::info!(
                "tool call #{}: {} {}",
                iteration,
                tool_name,
                arguments
            ),
            OrchestrationEvent::ToolExecutionCompleted {
                tool_name,
                success: false,
                error,
                ..
            } => log::warn!(
                "tool {} failed: {}",
                tool_name,
                error.as_deref().unwrap_or("unknown error")
            ),
            OrchestrationEvent::MaxIterationsReached { iterations } => {
                log::warn!("tool loop stopped after {} iterations", iterations)
            }
            OrchestrationEvent::TurnCompleted {
                tool_calls_made,
                response_length,
                ..
            } => log::info!(
                "turn completed: {} tool calls, {} chars",
                tool_calls_made,
                response_length
            ),
            OrchestrationEvent::TurnFailed { error } => log::error!("turn failed: {}", error),
            other => log::debug!("{:?}", other),
        }
    }

    async fn on_gateway_event(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Connected {
                endpoint,
                server_name,
                ..
            } => log::info!(
                "Connected to MCP server {} ({})",
                endpoint,
                server_name.as_deref().unwrap_or("unnamed")
            ),
            GatewayEvent::ConnectionFailed { endpoint, error } => {
                log::error!("Failed to connect to MCP server {}: {}", endpoint, error)
            }
            GatewayEvent::Disconnected { endpoint } => {
                log::info!("Disconnected from MCP server {}", endpoint)
            }
            GatewayEvent::SessionExpired { endpoint } => {
                log::warn!("MCP session expired on {}", endpoint)
            }
        }
    }
}

//! # mcpchat
//!
//! mcpchat lets a human converse with a Claude model that can call tools exposed by a
//! remote MCP (Model Context Protocol) server. Natural-language requests become tool calls,
//! and tool results become natural-language answers.
//!
//! The crate provides layered abstractions for:
//!
//! * **The tool-calling loop**: [`ToolOrchestrator`] drives a bounded sequence of model
//!   calls for one user turn, executing the tools the model asks for and feeding the
//!   results back, at most [`orchestration::MAX_TOOL_ITERATIONS`] model calls per turn
//! * **Remote tools**: the [`ToolGateway`] trait, implemented over MCP Streamable HTTP by
//!   [`tool_protocols::McpGatewayClient`]
//! * **Models**: the [`ClientWrapper`] trait, implemented for the Anthropic Messages API by
//!   [`clients::claude::ClaudeClient`]
//! * **Conversations**: [`SessionStore`] keeps each session's history in memory, bounded
//!   in size, with explicit clear and drop
//! * **Serving** (feature `server`, on by default): an axum router with a JSON chat API
//!   and a WebSocket event stream, see [`http_adapter`] and [`ws_adapter`]
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpchat::clients::claude::{ClaudeClient, Model};
//! use mcpchat::tool_protocols::McpGatewayClient;
//! use mcpchat::{SessionStore, ToolGateway, ToolOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mcpchat::init_logger();
//!
//!     let client = ClaudeClient::new_with_model_enum(
//!         &std::env::var("ANTHROPIC_API_KEY")?,
//!         Model::ClaudeSonnet35,
//!     );
//!     let orchestrator = ToolOrchestrator::new(Arc::new(client));
//!     let gateway = McpGatewayClient::new("http://localhost:8080/mcp");
//!     gateway.connect().await?;
//!
//!     let sessions = SessionStore::new();
//!     let session_id = SessionStore::new_session_id();
//!
//!     let history = sessions.get(&session_id).await;
//!     let outcome = orchestrator.run("What tools do you have?", &history, &gateway).await?;
//!     sessions
//!         .commit_turn(&session_id, "What tools do you have?", &outcome.response)
//!         .await;
//!
//!     println!("{}", outcome.response);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding mcpchat can opt in to `RUST_LOG` driven diagnostics without
/// choosing a logging backend upfront.
///
/// ```rust
/// mcpchat::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `mcpchat` module.
pub mod mcpchat;

// Re-exporting key items for easier external access.
pub use mcpchat::client_wrapper;
pub use mcpchat::client_wrapper::{ClientWrapper, Completion, ContentBlock, Message, Role};
pub use mcpchat::clients;
pub use mcpchat::config;
pub use mcpchat::config::ChatServerConfig;
pub use mcpchat::event;
pub use mcpchat::event::{EventHandler, GatewayEvent, LogEventHandler, OrchestrationEvent};
pub use mcpchat::orchestration;
pub use mcpchat::orchestration::{OrchestrationError, OrchestrationOutcome, ToolOrchestrator};
pub use mcpchat::session_store;
pub use mcpchat::session_store::SessionStore;
pub use mcpchat::tool_protocol;
pub use mcpchat::tool_protocol::{GatewayError, ToolDescriptor, ToolGateway, ToolInvocation};
pub use mcpchat::tool_protocols;

#[cfg(feature = "server")]
pub use mcpchat::http_adapter;
#[cfg(feature = "server")]
pub use mcpchat::ws_adapter;

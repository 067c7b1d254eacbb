//! Chat server: HTTP + WebSocket front end for the tool-calling loop.
//!
//! ```bash
//! ANTHROPIC_API_KEY=sk-ant-... MCP_SERVER_URL=http://localhost:8080/mcp \
//!     RUST_LOG=info cargo run --bin mcpchat-server
//! ```

use std::error::Error;
use std::sync::Arc;

use mcpchat::clients::claude::ClaudeClient;
use mcpchat::http_adapter::{router, AppState};
use mcpchat::tool_protocols::McpGatewayClient;
use mcpchat::{ChatServerConfig, LogEventHandler, SessionStore, ToolGateway, ToolOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    mcpchat::init_logger();

    let config = ChatServerConfig::from_env()?;
    let api_key = config.require_api_key()?;

    let events = Arc::new(LogEventHandler);
    let client = ClaudeClient::new_with_model_str(api_key, &config.anthropic_model)
        .with_max_tokens(config.anthropic_max_tokens);
    let orchestrator = ToolOrchestrator::new(Arc::new(client)).with_event_handler(events.clone());
    let gateway: Arc<dyn ToolGateway> =
        Arc::new(McpGatewayClient::new(&config.mcp_server_url).with_event_handler(events));
    let sessions = Arc::new(SessionStore::with_capacity_limit(config.max_sessions));

    // The server keeps serving without tools if the first connect fails.
    let initial = Arc::clone(&gateway);
    tokio::spawn(async move {
        if let Err(e) = initial.connect().await {
            log::error!("Failed to connect to MCP server: {}", e);
        }
    });

    let state = AppState::new(
        Arc::new(orchestrator),
        Arc::clone(&gateway),
        sessions,
        config.mcp_server_url.clone(),
    );
    let app = router(state, &config.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    log::info!("Server running on {}", listener.local_addr()?);
    log::info!("MCP Server: {}", config.mcp_server_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.disconnect().await;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutting down...");
}

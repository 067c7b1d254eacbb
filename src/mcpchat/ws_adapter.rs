//! Event-stream transport adapter over WebSocket.
//!
//! Each connection owns exactly one session, created when the socket opens and dropped
//! from the [`SessionStore`] when it closes. Frames are JSON text tagged by `type`:
//!
//! ```text
//! server → {"type":"session","sessionId":"..."}            on connect
//! client → {"type":"get-tools"}
//! server → {"type":"tools","tools":[...]}
//! client → {"type":"message","message":"Look up X"}
//! server → {"type":"user-message","message":"Look up X"}
//! server → {"type":"assistant-message","message":"...","toolCalls":[...]}
//! client → {"type":"clear"}
//! server → {"type":"cleared"}
//! server → {"type":"error","message":"..."}                 on any failure
//! ```
//!
//! Frames from one connection are handled one at a time, so a session never has two
//! turns in flight.

use crate::http_adapter::AppState;
use crate::session_store::SessionStore;
use crate::tool_protocol::{ToolDescriptor, ToolInvocation};
use axum::{
    extract::{
        ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Frames sent by the browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    GetTools,
    Message { message: String },
    Clear,
}

/// Frames sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Tools {
        tools: Vec<ToolDescriptor>,
    },
    UserMessage {
        message: String,
    },
    AssistantMessage {
        message: String,
        #[serde(rename = "toolCalls")]
        tool_calls: Vec<ToolInvocation>,
    },
    Error {
        message: String,
    },
    Cleared,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let session_id = SessionStore::new_session_id();
    log::info!("client connected: session {}", session_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    log::error!("failed to encode frame: {}", e);
                    continue;
                }
            };
            if sender.send(WsFrame::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(ServerFrame::Session {
        session_id: session_id.clone(),
    });

    let recv_state = state.clone();
    let recv_session = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            match frame {
                WsFrame::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(frame) => handle_frame(&recv_state, &recv_session, frame, &tx).await,
                    Err(e) => {
                        log::warn!("invalid frame from {}: {}", recv_session, e);
                        let _ = tx.send(ServerFrame::Error {
                            message: format!("Invalid message: {}", e),
                        });
                    }
                },
                WsFrame::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.sessions.drop_session(&session_id).await;
    log::info!("client disconnected: session {}", session_id);
}

/// React to one client frame. Replies go through `tx`.
pub async fn handle_frame(
    state: &AppState,
    session_id: &str,
    frame: ClientFrame,
    tx: &mpsc::UnboundedSender<ServerFrame>,
) {
    let reply = match frame {
        ClientFrame::GetTools => {
            state.ensure_gateway().await;
            match state.gateway.list_tools().await {
                Ok(tools) => ServerFrame::Tools { tools },
                Err(e) => {
                    log::error!("Error getting tools: {}", e);
                    ServerFrame::Error {
                        message: "Failed to get tools".to_string(),
                    }
                }
            }
        }
        ClientFrame::Message { message } => {
            let _ = tx.send(ServerFrame::UserMessage {
                message: message.clone(),
            });
            match state.handle_message(session_id, &message).await {
                Ok(outcome) => ServerFrame::AssistantMessage {
                    message: outcome.response,
                    tool_calls: outcome.tool_calls,
                },
                Err(e) => {
                    log::error!("Error processing message for session {}: {}", session_id, e);
                    ServerFrame::Error {
                        message: e.to_string(),
                    }
                }
            }
        }
        ClientFrame::Clear => {
            state.sessions.clear(session_id).await;
            ServerFrame::Cleared
        }
    };
    let _ = tx.send(reply);
}

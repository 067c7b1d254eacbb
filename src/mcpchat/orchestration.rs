//! The tool-calling loop that turns one user message into a final answer.
//!
//! [`ToolOrchestrator::run`] binds a [`ClientWrapper`] to whatever tools a
//! [`ToolGateway`] currently lists and drives a bounded sequence of model calls:
//!
//! ```text
//! AwaitingModel ─▶ ModelResponded ─┬─▶ Done                 (no tool-use block)
//!       ▲                          └─▶ ExecutingTool ──┐    (first tool-use block)
//!       └──────────────────────────────────────────────┘
//! ```
//!
//! At most [`MAX_TOOL_ITERATIONS`] model calls are made per turn. Hitting the ceiling is
//! not an error: the turn completes with whatever answer is held, usually empty.
//!
//! The caller's history is never touched. `run` works on a private copy and the caller
//! commits the turn (see [`SessionStore::commit_turn`](crate::session_store::SessionStore::commit_turn))
//! only after `run` returns `Ok`, so a failed turn leaves no trace.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpchat::clients::claude::{ClaudeClient, Model};
//! use mcpchat::orchestration::ToolOrchestrator;
//! use mcpchat::tool_protocol::ToolGateway;
//! use mcpchat::tool_protocols::McpGatewayClient;
//!
//! # async {
//! let client = ClaudeClient::new_with_model_enum("sk-ant-...", Model::ClaudeSonnet35);
//! let orchestrator = ToolOrchestrator::new(Arc::new(client));
//! let gateway = McpGatewayClient::new("http://localhost:8080/mcp");
//! gateway.connect().await.unwrap();
//!
//! let outcome = orchestrator.run("Look up X", &[], &gateway).await.unwrap();
//! println!("{} ({} tool calls)", outcome.response, outcome.tool_calls.len());
//! # };
//! ```

use crate::client_wrapper::{ClientWrapper, ContentBlock, Message, ModelError, TokenUsage};
use crate::event::{EventHandler, OrchestrationEvent};
use crate::tool_protocol::{GatewayError, ToolGateway, ToolInvocation};
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Hard ceiling on model calls per turn.
pub const MAX_TOOL_ITERATIONS: usize = 5;

/// Result of one successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationOutcome {
    /// First text block of the last text-only response; empty if there was none.
    pub response: String,
    /// Tools executed during the turn, in invocation order.
    pub tool_calls: Vec<ToolInvocation>,
    /// Number of model calls made.
    pub iterations: usize,
    /// `true` when the turn stopped at [`MAX_TOOL_ITERATIONS`] without a text-only response.
    pub hit_iteration_limit: bool,
    /// Usage summed over every model call, when the client reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<TokenUsage>,
}

/// The first unrecovered error of a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    /// Listing or calling tools failed.
    Gateway(GatewayError),
    /// The language model call failed.
    Model(ModelError),
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::Gateway(err) => write!(f, "{}", err),
            OrchestrationError::Model(err) => write!(f, "{}", err),
        }
    }
}

impl Error for OrchestrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OrchestrationError::Gateway(err) => Some(err),
            OrchestrationError::Model(err) => Some(err),
        }
    }
}

impl From<GatewayError> for OrchestrationError {
    fn from(err: GatewayError) -> Self {
        OrchestrationError::Gateway(err)
    }
}

impl From<ModelError> for OrchestrationError {
    fn from(err: ModelError) -> Self {
        OrchestrationError::Model(err)
    }
}

/// Working history of a single turn.
///
/// Tool-use blocks only enter through `push_tool_exchange`, together with the result
/// that answers them, so the model never sees an unanswered invocation. Tool-use blocks
/// the loop did not act upon are left out of the assistant message.
struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    fn new(history: &[Message]) -> Self {
        Conversation {
            messages: history.to_vec(),
        }
    }

    fn push_user(&mut self, content: &str) {
        self.messages.push(Message::user(content));
    }

    fn push_tool_exchange(
        &mut self,
        assistant_blocks: Vec<ContentBlock>,
        tool_use_id: &str,
        result_text: String,
    ) {
        let blocks = assistant_blocks
            .into_iter()
            .filter(|block| match block {
                ContentBlock::ToolUse { id, .. } => id == tool_use_id,
                ContentBlock::Text { .. } => true,
            })
            .collect();
        self.messages.push(Message::assistant_blocks(blocks));
        self.messages.push(Message::tool_result(tool_use_id, result_text));
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Drives the tool-calling loop for any number of sessions.
///
/// The orchestrator holds no per-session state, so one instance is shared by every
/// transport adapter and may run turns for different sessions concurrently.
pub struct ToolOrchestrator {
    client: Arc<dyn ClientWrapper>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ToolOrchestrator {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        ToolOrchestrator {
            client,
            event_handler: None,
        }
    }

    /// Receive [`OrchestrationEvent`]s for every turn.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    async fn emit(&self, event: OrchestrationEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_orchestration_event(&event).await;
        }
    }

    /// Run one turn.
    ///
    /// `history` is the session's committed history *without* `user_message`. On success
    /// the caller is expected to persist `user_message` and `outcome.response`; on error it
    /// should persist nothing.
    ///
    /// # Events Emitted
    ///
    /// 1. [`TurnStarted`](OrchestrationEvent::TurnStarted)
    /// 2. [`ToolsListed`](OrchestrationEvent::ToolsListed)
    /// 3. [`ModelCallStarted`](OrchestrationEvent::ModelCallStarted) /
    ///    [`ModelCallCompleted`](OrchestrationEvent::ModelCallCompleted) per model call
    /// 4. [`ToolCallDetected`](OrchestrationEvent::ToolCallDetected) /
    ///    [`ToolExecutionCompleted`](OrchestrationEvent::ToolExecutionCompleted) per tool call
    /// 5. [`MaxIterationsReached`](OrchestrationEvent::MaxIterationsReached) if the ceiling is hit
    /// 6. [`TurnCompleted`](OrchestrationEvent::TurnCompleted) or
    ///    [`TurnFailed`](OrchestrationEvent::TurnFailed)
    pub async fn run(
        &self,
        user_message: &str,
        history: &[Message],
        gateway: &dyn ToolGateway,
    ) -> Result<OrchestrationOutcome, OrchestrationError> {
        let preview_end = user_message
            .char_indices()
            .nth(120)
            .map(|(i, _)| i)
            .unwrap_or(user_message.len());
        self.emit(OrchestrationEvent::TurnStarted {
            message_preview: user_message[..preview_end].to_string(),
            history_len: history.len(),
        })
        .await;

        match self.run_turn(user_message, history, gateway).await {
            Ok(outcome) => {
                self.emit(OrchestrationEvent::TurnCompleted {
                    tool_calls_made: outcome.tool_calls.len(),
                    response_length: outcome.response.len(),
                    tokens_used: outcome.tokens_used.clone(),
                })
                .await;
                Ok(outcome)
            }
            Err(err) => {
                self.emit(OrchestrationEvent::TurnFailed {
                    error: err.to_string(),
                })
                .await;
                Err(err)
            }
        }
    }

    async fn run_turn(
        &self,
        user_message: &str,
        history: &[Message],
        gateway: &dyn ToolGateway,
    ) -> Result<OrchestrationOutcome, OrchestrationError> {
        let mut conversation = Conversation::new(history);
        conversation.push_user(user_message);

        let tools = gateway.list_tools().await?;
        self.emit(OrchestrationEvent::ToolsListed {
            tool_count: tools.len(),
        })
        .await;

        let mut response = String::new();
        let mut tool_calls: Vec<ToolInvocation> = Vec::new();
        let mut tokens_used: Option<TokenUsage> = None;
        let mut iterations = 0;
        let mut finished = false;

        while iterations < MAX_TOOL_ITERATIONS {
            iterations += 1;
            self.emit(OrchestrationEvent::ModelCallStarted {
                iteration: iterations,
            })
            .await;

            let completion = self
                .client
                .create_completion(conversation.messages(), &tools)
                .await?;

            // The client's last-usage slot is shared by all sessions; trust the completion only.
            let call_usage = completion.usage.clone();
            if let Some(usage) = &call_usage {
                tokens_used
                    .get_or_insert_with(TokenUsage::default)
                    .accumulate(usage);
            }

            let tool_use = completion.first_tool_use();
            self.emit(OrchestrationEvent::ModelCallCompleted {
                iteration: iterations,
                tokens_used: call_usage,
                tool_requested: tool_use.is_some(),
            })
            .await;

            let Some(tool_use) = tool_use else {
                response = completion.first_text().unwrap_or_default().to_string();
                finished = true;
                break;
            };

            let invocation = ToolInvocation {
                id: tool_use.id.to_string(),
                name: tool_use.name.to_string(),
                arguments: tool_use.input.clone(),
            };
            tool_calls.push(invocation.clone());
            self.emit(OrchestrationEvent::ToolCallDetected {
                iteration: iterations,
                invocation_id: invocation.id.clone(),
                tool_name: invocation.name.clone(),
                arguments: invocation.arguments.clone(),
            })
            .await;

            match gateway
                .call_tool(&invocation.name, invocation.arguments.clone())
                .await
            {
                Ok(result) => {
                    let result_text = result.joined_text();
                    self.emit(OrchestrationEvent::ToolExecutionCompleted {
                        iteration: iterations,
                        invocation_id: invocation.id.clone(),
                        tool_name: invocation.name.clone(),
                        success: true,
                        error: None,
                        result_length: result_text.len(),
                    })
                    .await;
                    conversation.push_tool_exchange(
                        completion.content,
                        &invocation.id,
                        result_text,
                    );
                }
                Err(err) => {
                    self.emit(OrchestrationEvent::ToolExecutionCompleted {
                        iteration: iterations,
                        invocation_id: invocation.id,
                        tool_name: invocation.name,
                        success: false,
                        error: Some(err.to_string()),
                        result_length: 0,
                    })
                    .await;
                    return Err(err.into());
                }
            }
        }

        if !finished {
            self.emit(OrchestrationEvent::MaxIterationsReached { iterations })
                .await;
        }

        Ok(OrchestrationOutcome {
            response,
            tool_calls,
            iterations,
            hit_iteration_limit: !finished,
            tokens_used,
        })
    }
}

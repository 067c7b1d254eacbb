//! Conversation messages and the language-model seam.
//!
//! A [`ClientWrapper`] is a wrapper around a specific LLM service that can invoke tools.
//! It does not keep track of the conversation, for that the caller owns a history of
//! [`Message`]s (see [`SessionStore`](crate::session_store::SessionStore)) and hands it to
//! the [`ToolOrchestrator`](crate::orchestration::ToolOrchestrator) for every turn.
//!
//! History is a tagged union rather than loosely typed JSON:
//!
//! ```text
//! Message::User        { content: String }
//! Message::Assistant   { content: Text(String) | Blocks([Text | ToolUse]) }
//! Message::ToolResult  { tool_use_id, content }
//! ```
//!
//! # Example
//!
//! ```rust
//! use mcpchat::client_wrapper::{ContentBlock, Message, Role};
//!
//! let history = vec![
//!     Message::user("Look up X"),
//!     Message::assistant_blocks(vec![ContentBlock::tool_use(
//!         "toolu_01",
//!         "lookup",
//!         serde_json::json!({"q": "X"}),
//!     )]),
//!     Message::tool_result("toolu_01", "result-X"),
//! ];
//! assert_eq!(history[2].role(), Role::ToolResult);
//! ```

use crate::tool_protocol::ToolDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use tokio::sync::Mutex;

/// Represents the possible roles for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A message typed by the human (or app) user.
    User,
    /// Content generated by the model.
    Assistant,
    /// Carries the output of a tool back to the model.
    ToolResult,
}

/// A single block of structured model output.
///
/// The serialized form (`{"type": "text", ...}` / `{"type": "tool_use", ...}`) matches the
/// Anthropic content block shape so blocks can be replayed to the model verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// A request from the model to invoke a tool.
    ToolUse {
        /// Correlation identifier pairing this invocation with its result.
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Assistant content: either plain text or the raw block sequence of a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One entry of a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: MessageContent,
    },
    ToolResult {
        /// Identifier of the [`ContentBlock::ToolUse`] this result answers.
        tool_use_id: String,
        /// Tool output, text segments already joined by newlines.
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Message::Assistant {
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::ToolResult { .. } => Role::ToolResult,
        }
    }

    /// Tool-use blocks carried by an assistant message, in order.
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        match self {
            Message::Assistant {
                content: MessageContent::Blocks(blocks),
            } => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Add another call's usage to this running total.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A borrowed view of the tool-use block the orchestration loop acts upon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolUse<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub input: &'a serde_json::Value,
}

/// One model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Raw content blocks, in the order the model produced them.
    pub content: Vec<ContentBlock>,
    /// Provider supplied reason the model stopped (e.g. `end_turn`, `tool_use`).
    pub stop_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// Build a completion from blocks alone, mostly useful for mocks.
    pub fn from_blocks(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            stop_reason: None,
            usage: None,
        }
    }

    /// First tool-use block of the response; any further ones are ignored by the loop.
    pub fn first_tool_use(&self) -> Option<ToolUse<'_>> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ToolUse { id, name, input }),
            ContentBlock::Text { .. } => None,
        })
    }

    /// First text block of the response.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::ToolUse { .. } => None,
        })
    }
}

/// Failure of a language-model invocation. Never retried by this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The request never produced an HTTP response.
    Network(String),
    /// The provider throttled the request (HTTP 429).
    RateLimited,
    /// The provider answered with a non-success status.
    Api { status: u16, body: String },
    /// The response body could not be decoded.
    Parse(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Network(msg) => write!(f, "Model request failed: {}", msg),
            ModelError::RateLimited => write!(f, "Model request was rate limited"),
            ModelError::Api { status, body } => {
                write!(f, "Model API returned HTTP {}: {}", status, body)
            }
            ModelError::Parse(msg) => write!(f, "Invalid model response: {}", msg),
        }
    }
}

impl Error for ModelError {}

/// Trait defining the interface to a tool-calling LLM service.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Identifier of the model this client talks to.
    fn model_name(&self) -> &str;

    /// Invoke the model with the full history and the live tool listing.
    async fn create_completion(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError>;

    /// Hook to retrieve usage from the *last* `create_completion()` call.
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        match self.usage_slot() {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        }
    }

    /// Clients that track usage return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}

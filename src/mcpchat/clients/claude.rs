//! Anthropic Claude client wrapper speaking the native Messages API.
//!
//! Tool use needs structured `tool_use` / `tool_result` content blocks, so this client
//! talks to `POST /v1/messages` directly instead of an OpenAI-compatible surface.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::client_wrapper::{ClientWrapper, Message};
//! use mcpchat::clients::claude::{ClaudeClient, Model};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = std::env::var("ANTHROPIC_API_KEY")?;
//!     let client = ClaudeClient::new_with_model_enum(&key, Model::ClaudeSonnet35);
//!     let completion = client
//!         .create_completion(&[Message::user("List three Claude capabilities.")], &[])
//!         .await?;
//!     println!("{}", completion.first_text().unwrap_or(""));
//!     Ok(())
//! }
//! ```

use crate::client_wrapper::{
    ClientWrapper, Completion, ContentBlock, Message, MessageContent, ModelError, TokenUsage,
};
use crate::clients::http_pool::get_http_client;
use crate::tool_protocol::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// Default base URL of the Anthropic API.
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
/// API version header sent with every request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Completion budget used when none is configured.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Claude models.
pub enum Model {
    /// `claude-3-5-sonnet-20241022` – the default tool-calling model.
    ClaudeSonnet35,
    /// `claude-3-5-haiku-latest` – fastest 3.5 tier.
    ClaudeHaiku35,
    /// `claude-3-7-sonnet-latest`
    ClaudeSonnet37,
    /// `claude-sonnet-4-0` – balanced reasoning + throughput.
    ClaudeSonnet4,
    /// `claude-opus-4-0`
    ClaudeOpus4,
    /// `claude-opus-4-1`
    ClaudeOpus41,
    /// `claude-sonnet-4-5`
    ClaudeSonnet45,
    /// `claude-haiku-4-5`
    ClaudeHaiku45,
}

/// Convert a [`Model`] variant into its public string identifier.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::ClaudeSonnet35 => "claude-3-5-sonnet-20241022".to_string(),
        Model::ClaudeHaiku35 => "claude-3-5-haiku-latest".to_string(),
        Model::ClaudeSonnet37 => "claude-3-7-sonnet-latest".to_string(),
        Model::ClaudeSonnet4 => "claude-sonnet-4-0".to_string(),
        Model::ClaudeOpus4 => "claude-opus-4-0".to_string(),
        Model::ClaudeOpus41 => "claude-opus-4-1".to_string(),
        Model::ClaudeSonnet45 => "claude-sonnet-4-5".to_string(),
        Model::ClaudeHaiku45 => "claude-haiku-4-5".to_string(),
    }
}

/// Client wrapper for Anthropic's Messages API.
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    system_prompt: Option<String>,
    usage: Mutex<Option<TokenUsage>>,
}

impl ClaudeClient {
    /// Create a client from an API key and strongly typed model variant.
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }

    /// Create a client from an API key and explicit model string.
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, ANTHROPIC_API_URL)
    }

    /// Create a client pointing at a custom Claude-compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        ClaudeClient {
            http: get_http_client(&base_url),
            api_key: secret_key.to_string(),
            base_url,
            model: model_name.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            usage: Mutex::new(None),
        }
    }

    /// Override the per-response completion budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Send a system prompt with every request.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Render the request body for `POST /messages`.
    pub(crate) fn build_request_body(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Value {
        let messages: Vec<Value> = history.iter().map(message_to_wire).collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if let Some(system) = &self.system_prompt {
            body["system"] = Value::String(system.clone());
        }
        if !tools.is_empty() {
            let tools: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

/// Map one history entry onto the Messages API shape.
fn message_to_wire(message: &Message) -> Value {
    match message {
        Message::User { content } => json!({"role": "user", "content": content}),
        Message::Assistant {
            content: MessageContent::Text(text),
        } => json!({"role": "assistant", "content": text}),
        Message::Assistant {
            content: MessageContent::Blocks(blocks),
        } => json!({"role": "assistant", "content": blocks}),
        Message::ToolResult {
            tool_use_id,
            content,
        } => json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
            }]
        }),
    }
}

/// Decode a Messages API response body. Unknown block kinds are skipped.
pub(crate) fn parse_response(body: Value) -> Result<Completion, ModelError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::Parse("response has no content array".to_string()))?;

    let mut content = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") | Some("tool_use") => {
                let parsed: ContentBlock = serde_json::from_value(block.clone())
                    .map_err(|e| ModelError::Parse(e.to_string()))?;
                content.push(parsed);
            }
            other => log::debug!("skipping content block of type {:?}", other),
        }
    }

    let usage = body.get("usage").map(|u| {
        let input_tokens = u["input_tokens"].as_u64().unwrap_or(0) as usize;
        let output_tokens = u["output_tokens"].as_u64().unwrap_or(0) as usize;
        TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    });

    Ok(Completion {
        content,
        stop_reason: body
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        usage,
    })
}

#[async_trait]
impl ClientWrapper for ClaudeClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn create_completion(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError> {
        let body = self.build_request_body(history, tools);
        log::debug!(
            "Claude request: model={} messages={} tools={}",
            self.model,
            history.len(),
            tools.len()
        );

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            log::error!("Claude API returned {}: {}", status, text);
            return Err(ModelError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        let completion = parse_response(json)?;

        *self.usage.lock().await = completion.usage.clone();
        Ok(completion)
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}

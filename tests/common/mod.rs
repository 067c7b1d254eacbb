#![allow(dead_code)]

use async_trait::async_trait;
use mcpchat::client_wrapper::{
    ClientWrapper, Completion, ContentBlock, Message, ModelError, TokenUsage,
};
use mcpchat::event::{EventHandler, OrchestrationEvent};
use mcpchat::tool_protocol::{GatewayError, ToolCallResult, ToolDescriptor, ToolGateway};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Model that replays a fixed script of responses and records every history it saw.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<Completion, ModelError>>>,
    pub seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<Completion, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn history_of_call(&self, index: usize) -> Vec<Message> {
        self.seen.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn create_completion(
        &self,
        history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError> {
        self.seen.lock().unwrap().push(history.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Parse("script exhausted".into())))
    }
}

/// Model that asks for a tool on every call, with a fresh correlation id each time.
pub struct LoopingToolClient {
    pub seen: Mutex<Vec<Vec<Message>>>,
}

impl LoopingToolClient {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ClientWrapper for LoopingToolClient {
    fn model_name(&self) -> &str {
        "looping"
    }

    async fn create_completion(
        &self,
        history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError> {
        let mut seen = self.seen.lock().unwrap();
        seen.push(history.to_vec());
        let n = seen.len();
        Ok(Completion::from_blocks(vec![ContentBlock::tool_use(
            format!("toolu_{}", n),
            "lookup",
            json!({"n": n}),
        )]))
    }
}

pub fn text(answer: &str) -> Result<Completion, ModelError> {
    Ok(Completion::from_blocks(vec![ContentBlock::text(answer)]))
}

pub fn tool_use(id: &str, name: &str, input: Value) -> Result<Completion, ModelError> {
    Ok(Completion::from_blocks(vec![ContentBlock::tool_use(id, name, input)]))
}

pub fn with_usage(
    completion: Result<Completion, ModelError>,
    input_tokens: usize,
    output_tokens: usize,
) -> Result<Completion, ModelError> {
    completion.map(|mut c| {
        c.usage = Some(TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        });
        c
    })
}

/// In-memory gateway with canned results per tool name.
pub struct MockGateway {
    connected: AtomicBool,
    refuse_connect: bool,
    tools: Vec<ToolDescriptor>,
    results: HashMap<String, Result<ToolCallResult, GatewayError>>,
    pub calls: Mutex<Vec<(String, Value)>>,
    pub connect_attempts: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl MockGateway {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            refuse_connect: false,
            tools: vec![ToolDescriptor::new(
                "lookup",
                "Look things up",
                json!({"type": "object", "properties": {"q": {"type": "string"}}}),
            )],
            results: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            connect_attempts: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// A gateway whose endpoint rejects every handshake.
    pub fn unreachable() -> Self {
        let mut gateway = Self::connected();
        gateway.connected = AtomicBool::new(false);
        gateway.refuse_connect = true;
        gateway
    }

    /// A gateway that is down but comes up on the next `connect()`.
    pub fn disconnected() -> Self {
        let gateway = Self::connected();
        gateway.connected.store(false, Ordering::SeqCst);
        gateway
    }

    pub fn with_result(mut self, tool: &str, result: Result<ToolCallResult, GatewayError>) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    pub fn tool_calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolGateway for MockGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect {
            return Err(GatewayError::Connection("connection refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        match self.results.get(name) {
            Some(result) => result.clone(),
            None => Ok(ToolCallResult::text(format!("{}-result", name))),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn protocol_name(&self) -> &str {
        "mock"
    }
}

/// Records every orchestration event in order.
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Mutex<Vec<OrchestrationEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<OrchestrationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_orchestration_event(&self, event: &OrchestrationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

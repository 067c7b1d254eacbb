mod common;

use common::{
    text, tool_use, with_usage, LoopingToolClient, MockGateway, RecordingHandler, ScriptedClient,
};
use async_trait::async_trait;
use mcpchat::client_wrapper::{ClientWrapper, ContentBlock, Message, ModelError, TokenUsage};
use mcpchat::event::OrchestrationEvent;
use mcpchat::orchestration::{OrchestrationError, ToolOrchestrator, MAX_TOOL_ITERATIONS};
use mcpchat::tool_protocol::{
    GatewayError, ToolCallResult, ToolDescriptor, ToolGateway, ToolInvocation,
};
use mcpchat::Completion;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Every tool-use block a model call sees must be answered by the very next message.
fn assert_invocations_answered(history: &[Message]) {
    for (index, message) in history.iter().enumerate() {
        for block in message.tool_uses() {
            let ContentBlock::ToolUse { id, .. } = block else {
                unreachable!()
            };
            match history.get(index + 1) {
                Some(Message::ToolResult { tool_use_id, .. }) => assert_eq!(tool_use_id, id),
                other => panic!("tool use {} not answered, next message: {:?}", id, other),
            }
        }
    }
}

#[tokio::test]
async fn test_text_only_response_finishes_in_one_call() {
    let client = Arc::new(ScriptedClient::new(vec![text("I can look things up.")]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::connected();

    let outcome = orchestrator
        .run("What tools do you have?", &[], &gateway)
        .await
        .unwrap();

    assert_eq!(outcome.response, "I can look things up.");
    assert!(outcome.tool_calls.is_empty());
    assert_eq!(outcome.iterations, 1);
    assert!(!outcome.hit_iteration_limit);
    assert_eq!(client.calls(), 1);
    assert_eq!(
        client.history_of_call(0),
        vec![Message::user("What tools do you have?")]
    );
    assert!(gateway.tool_calls().is_empty());
}

#[tokio::test]
async fn test_single_lookup_round_trip() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_use("toolu_1", "lookup", json!({"q": "X"})),
        text("Found result-X"),
    ]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway =
        MockGateway::connected().with_result("lookup", Ok(ToolCallResult::text("result-X")));

    let outcome = orchestrator.run("Look up X", &[], &gateway).await.unwrap();

    assert_eq!(outcome.response, "Found result-X");
    assert_eq!(
        outcome.tool_calls,
        vec![ToolInvocation {
            id: "toolu_1".into(),
            name: "lookup".into(),
            arguments: json!({"q": "X"}),
        }]
    );
    assert_eq!(gateway.tool_calls(), vec![("lookup".to_string(), json!({"q": "X"}))]);

    assert_eq!(
        client.history_of_call(1),
        vec![
            Message::user("Look up X"),
            Message::assistant_blocks(vec![ContentBlock::tool_use(
                "toolu_1",
                "lookup",
                json!({"q": "X"})
            )]),
            Message::tool_result("toolu_1", "result-X"),
        ]
    );
}

#[tokio::test]
async fn test_failed_connect_surfaces_not_connected_without_model_call() {
    let client = Arc::new(ScriptedClient::new(vec![text("never used")]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::unreachable();

    assert!(gateway.connect().await.is_err());
    let err = orchestrator.run("hello", &[], &gateway).await.unwrap_err();

    assert_eq!(err, OrchestrationError::Gateway(GatewayError::NotConnected));
    assert_eq!(err.to_string(), "Not connected");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_chain_of_three_tools_runs_in_order() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_use("a", "lookup", json!({"q": 1})),
        tool_use("b", "search", json!({"q": 2})),
        tool_use("c", "lookup", json!({"q": 3})),
        text("done"),
    ]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::connected();

    let outcome = orchestrator.run("chain", &[], &gateway).await.unwrap();

    assert_eq!(outcome.response, "done");
    assert_eq!(outcome.iterations, 4);
    let names: Vec<_> = outcome.tool_calls.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["lookup", "search", "lookup"]);
    assert_eq!(gateway.tool_calls().len(), 3);

    let last = client.history_of_call(3);
    assert_eq!(last.len(), 7);
    assert_eq!(last[6], Message::tool_result("c", "lookup-result"));
    assert_invocations_answered(&last);
}

#[tokio::test]
async fn test_iteration_ceiling_stops_after_five_calls() {
    let client = Arc::new(LoopingToolClient::new());
    let handler = Arc::new(RecordingHandler::default());
    let orchestrator = ToolOrchestrator::new(client.clone()).with_event_handler(handler.clone());
    let gateway = MockGateway::connected();

    let outcome = orchestrator.run("loop forever", &[], &gateway).await.unwrap();

    assert_eq!(client.calls(), MAX_TOOL_ITERATIONS);
    assert_eq!(gateway.tool_calls().len(), MAX_TOOL_ITERATIONS);
    assert_eq!(outcome.tool_calls.len(), MAX_TOOL_ITERATIONS);
    assert_eq!(outcome.response, "");
    assert!(outcome.hit_iteration_limit);
    assert!(handler
        .events()
        .contains(&OrchestrationEvent::MaxIterationsReached { iterations: 5 }));

    for history in client.seen.lock().unwrap().iter() {
        assert_invocations_answered(history);
    }
}

#[tokio::test]
async fn test_tool_results_keep_correlation_ids() {
    let client = Arc::new(LoopingToolClient::new());
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::connected();

    orchestrator.run("pairing", &[], &gateway).await.unwrap();

    let last = client.seen.lock().unwrap().last().cloned().unwrap();
    let result_ids: Vec<String> = last
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(result_ids, vec!["toolu_1", "toolu_2", "toolu_3", "toolu_4"]);
}

#[tokio::test]
async fn test_tool_failure_aborts_the_turn() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_use("toolu_1", "lookup", json!({"q": "X"})),
        text("unreachable"),
    ]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let failure = GatewayError::ToolExecution {
        tool: "lookup".into(),
        message: "upstream timeout".into(),
    };
    let gateway = MockGateway::connected().with_result("lookup", Err(failure.clone()));

    let err = orchestrator.run("Look up X", &[], &gateway).await.unwrap_err();

    assert_eq!(err, OrchestrationError::Gateway(failure));
    assert_eq!(err.to_string(), "Tool 'lookup' failed: upstream timeout");
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_model_error_is_propagated() {
    let client = Arc::new(ScriptedClient::new(vec![Err(ModelError::Api {
        status: 529,
        body: "overloaded".into(),
    })]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::connected();

    let err = orchestrator.run("hi", &[], &gateway).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::Model(ModelError::Api { status: 529, .. })
    ));
    assert!(gateway.tool_calls().is_empty());
}

#[tokio::test]
async fn test_only_first_tool_use_is_executed() {
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(Completion::from_blocks(vec![
            ContentBlock::text("Checking both."),
            ContentBlock::tool_use("a", "lookup", json!({"q": "X"})),
            ContentBlock::tool_use("b", "search", json!({"q": "Y"})),
        ])),
        text("Only X"),
    ]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::connected();

    let outcome = orchestrator.run("X and Y", &[], &gateway).await.unwrap();

    assert_eq!(outcome.response, "Only X");
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(gateway.tool_calls(), vec![("lookup".to_string(), json!({"q": "X"}))]);
    assert_invocations_answered(&client.history_of_call(1));
}

#[tokio::test]
async fn test_text_only_response_without_text_block_is_empty() {
    let client = Arc::new(ScriptedClient::new(vec![Ok(Completion::from_blocks(vec![]))]));
    let orchestrator = ToolOrchestrator::new(client);
    let gateway = MockGateway::connected();

    let outcome = orchestrator.run("hi", &[], &gateway).await.unwrap();
    assert_eq!(outcome.response, "");
    assert!(!outcome.hit_iteration_limit);
}

#[tokio::test]
async fn test_prior_history_is_sent_before_the_new_message() {
    let client = Arc::new(ScriptedClient::new(vec![text("Again: hi")]));
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::connected();
    let history = vec![Message::user("hi"), Message::assistant_text("hello")];

    orchestrator.run("repeat", &history, &gateway).await.unwrap();

    assert_eq!(
        client.history_of_call(0),
        vec![
            Message::user("hi"),
            Message::assistant_text("hello"),
            Message::user("repeat"),
        ]
    );
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_usage_is_summed_across_model_calls() {
    let client = Arc::new(ScriptedClient::new(vec![
        with_usage(tool_use("toolu_1", "lookup", json!({})), 100, 20),
        with_usage(text("done"), 150, 30),
    ]));
    let orchestrator = ToolOrchestrator::new(client);
    let gateway = MockGateway::connected();

    let outcome = orchestrator.run("count", &[], &gateway).await.unwrap();

    let usage = outcome.tokens_used.unwrap();
    assert_eq!(usage.input_tokens, 250);
    assert_eq!(usage.output_tokens, 50);
    assert_eq!(usage.total_tokens, 300);
}

/// Answers without reporting usage while its last-usage slot holds another call's numbers.
struct SharedSlotClient {
    slot: Mutex<Option<TokenUsage>>,
}

#[async_trait]
impl ClientWrapper for SharedSlotClient {
    fn model_name(&self) -> &str {
        "shared-slot"
    }

    async fn create_completion(
        &self,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError> {
        *self.slot.lock().await = Some(TokenUsage {
            input_tokens: 999,
            output_tokens: 999,
            total_tokens: 1998,
        });
        text("done")
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.slot)
    }
}

#[tokio::test]
async fn test_usage_ignores_the_clients_shared_slot() {
    let client = Arc::new(SharedSlotClient {
        slot: Mutex::new(None),
    });
    let orchestrator = ToolOrchestrator::new(client.clone());
    let gateway = MockGateway::connected();

    let outcome = orchestrator.run("count", &[], &gateway).await.unwrap();

    assert_eq!(outcome.response, "done");
    assert!(outcome.tokens_used.is_none());
    assert!(client.get_last_usage().await.is_some());
}

#[tokio::test]
async fn test_events_follow_the_turn() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_use("toolu_1", "lookup", json!({"q": "X"})),
        text("Found result-X"),
    ]));
    let handler = Arc::new(RecordingHandler::default());
    let orchestrator = ToolOrchestrator::new(client).with_event_handler(handler.clone());
    let gateway =
        MockGateway::connected().with_result("lookup", Ok(ToolCallResult::text("result-X")));

    orchestrator.run("Look up X", &[], &gateway).await.unwrap();

    let kinds: Vec<&'static str> = handler
        .events()
        .iter()
        .map(|event| match event {
            OrchestrationEvent::TurnStarted { .. } => "turn_started",
            OrchestrationEvent::ToolsListed { .. } => "tools_listed",
            OrchestrationEvent::ModelCallStarted { .. } => "model_started",
            OrchestrationEvent::ModelCallCompleted { .. } => "model_completed",
            OrchestrationEvent::ToolCallDetected { .. } => "tool_detected",
            OrchestrationEvent::ToolExecutionCompleted { .. } => "tool_completed",
            OrchestrationEvent::MaxIterationsReached { .. } => "max_iterations",
            OrchestrationEvent::TurnCompleted { .. } => "turn_completed",
            OrchestrationEvent::TurnFailed { .. } => "turn_failed",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "turn_started",
            "tools_listed",
            "model_started",
            "model_completed",
            "tool_detected",
            "tool_completed",
            "model_started",
            "model_completed",
            "turn_completed",
        ]
    );

    assert!(handler.events().contains(&OrchestrationEvent::TurnCompleted {
        tool_calls_made: 1,
        response_length: "Found result-X".len(),
        tokens_used: None,
    }));
}

#[tokio::test]
async fn test_failed_turn_emits_turn_failed() {
    let client = Arc::new(ScriptedClient::new(vec![]));
    let handler = Arc::new(RecordingHandler::default());
    let orchestrator = ToolOrchestrator::new(client).with_event_handler(handler.clone());
    let gateway = MockGateway::disconnected();

    assert!(orchestrator.run("hi", &[], &gateway).await.is_err());
    assert_eq!(gateway.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        handler.events().last(),
        Some(&OrchestrationEvent::TurnFailed {
            error: "Not connected".into()
        })
    );
}

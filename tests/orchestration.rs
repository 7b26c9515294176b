//! End-to-end orchestration tests: event ordering, handoff legality,
//! session lifecycle, and the full procurement pipeline.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use swarmgate::tools::{DecodeJwt, PricingCatalog, QueryPricer};
use swarmgate::workflow::{self, procurement_graph};
use swarmgate::{
    AgentGraph, AgentReply, AgentRole, ConfigBuilder, FunctionTool, Orchestrator,
    OrchestratorConfig, ScriptedProvider, SessionStatus, SwarmError, ToolInvoker, TurnRequest,
    WireEvent, WireToolStatus,
};

fn minimal_invoker() -> ToolInvoker {
    let mut invoker = ToolInvoker::default();
    invoker.register(FunctionTool::new(
        "x",
        "test tool",
        json!({"type": "object"}),
        |_| async { Ok(json!("42")) },
    ));
    invoker.register(FunctionTool::new(
        "slow",
        "sleeps before answering",
        json!({"type": "object"}),
        |_| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(json!("slept"))
        },
    ));
    invoker
}

fn minimal_graph(invoker: &ToolInvoker) -> AgentGraph {
    AgentGraph::builder()
        .role(
            AgentRole::new("A")
                .entry()
                .capability("x")
                .capability("slow")
                .handoff_to("B"),
        )
        .role(AgentRole::new("B"))
        .build(invoker)
        .unwrap()
}

fn minimal_orchestrator(provider: ScriptedProvider, config: OrchestratorConfig) -> Orchestrator {
    let invoker = minimal_invoker();
    let graph = minimal_graph(&invoker);
    Orchestrator::new(graph, invoker, Arc::new(provider), config)
}

/// Every completed/failed tool event must match exactly one earlier calling
/// event for the same tool.
fn assert_tool_events_correlate(events: &[WireEvent]) {
    let mut open: Vec<&str> = Vec::new();
    for event in events {
        if let WireEvent::ToolCall {
            tool_name, status, ..
        } = event
        {
            match status {
                WireToolStatus::Calling => open.push(tool_name),
                WireToolStatus::Completed | WireToolStatus::Failed => {
                    let pos = open
                        .iter()
                        .position(|name| *name == tool_name)
                        .unwrap_or_else(|| {
                            panic!("completion for '{tool_name}' without a calling event")
                        });
                    open.remove(pos);
                }
            }
        }
    }
    assert!(open.is_empty(), "unmatched calling events: {open:?}");
}

#[tokio::test]
async fn scenario_tool_then_handoff_then_final_text() {
    let provider = ScriptedProvider::new()
        .with_tool_call("x", json!({"q": "t"}))
        .with_handoff("B")
        .with_message("done");
    let orchestrator = minimal_orchestrator(provider, ConfigBuilder::new().build());

    let (_, stream) = orchestrator
        .run_turn_stream(TurnRequest::new("find t"))
        .unwrap();
    let events: Vec<WireEvent> = stream.collect().await;

    assert_eq!(
        events[0],
        WireEvent::ToolCall {
            tool_name: "x".to_string(),
            status: WireToolStatus::Calling,
            arguments: Some(json!({"q": "t"})),
        }
    );
    assert_eq!(
        events[1],
        WireEvent::ToolCall {
            tool_name: "x".to_string(),
            status: WireToolStatus::Completed,
            arguments: None,
        }
    );
    assert_eq!(
        events[2],
        WireEvent::Message {
            content: "done".to_string()
        }
    );
    assert_eq!(events[3], WireEvent::Done {});
    assert_tool_events_correlate(&events);
}

#[tokio::test]
async fn scenario_aggregate_mode_reports_answering_agent() {
    let provider = ScriptedProvider::new()
        .with_tool_call("x", json!({"q": "t"}))
        .with_handoff("B")
        .with_message("done");
    let orchestrator = minimal_orchestrator(provider, ConfigBuilder::new().build());

    let response = orchestrator
        .run_turn(TurnRequest::new("find t"))
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("done"));
    assert_eq!(response.agent.as_deref(), Some("B"));
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "x");
    assert_eq!(response.handoffs.len(), 1);
    assert_eq!(response.handoffs[0].from, "A");
    assert_eq!(response.handoffs[0].to, "B");
}

#[tokio::test]
async fn scenario_capability_violation_leaves_session_clean() {
    let provider = ScriptedProvider::new().with_tool_call("forbidden", json!({}));
    let orchestrator = minimal_orchestrator(provider, ConfigBuilder::new().build());

    let (session_id, stream) = orchestrator
        .run_turn_stream(TurnRequest::new("hi"))
        .unwrap();
    let events: Vec<WireEvent> = stream.collect().await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        WireEvent::Error { kind, .. } if kind == "capability_violation"
    ));

    let summary = orchestrator.session(&session_id).unwrap();
    assert_eq!(summary.status, SessionStatus::Idle);
    // only the user message was committed
    assert_eq!(summary.messages, 1);
}

#[tokio::test]
async fn scenario_illegal_handoff_is_never_substituted() {
    // B is terminal; a request to move B -> A has no declared edge.
    let provider = ScriptedProvider::new().with_handoff("B").with_handoff("A");
    let orchestrator = minimal_orchestrator(provider, ConfigBuilder::new().build());

    let (_, stream) = orchestrator.run_turn_stream(TurnRequest::new("hi")).unwrap();
    let events: Vec<WireEvent> = stream.collect().await;

    let last = events.last().unwrap();
    assert!(matches!(
        last,
        WireEvent::Error { kind, message } if kind == "handoff_violation" && message.contains("'B' to 'A'")
    ));
}

#[tokio::test]
async fn scenario_iteration_limit_closes_the_stream() {
    let mut provider = ScriptedProvider::new();
    for _ in 0..16 {
        provider = provider.with_tool_call("x", json!({}));
    }
    let orchestrator = minimal_orchestrator(
        provider,
        ConfigBuilder::new().max_tool_iterations(4).build(),
    );

    let (_, stream) = orchestrator.run_turn_stream(TurnRequest::new("hi")).unwrap();
    let events: Vec<WireEvent> = stream.collect().await;

    assert!(matches!(
        events.last().unwrap(),
        WireEvent::Error { kind, .. } if kind == "iteration_limit_exceeded"
    ));
    // the stream closed: exactly one terminal event
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert_tool_events_correlate(&events);
}

#[tokio::test]
async fn scenario_concurrent_turns_one_proceeds() {
    let provider = ScriptedProvider::new()
        .with_tool_call("slow", json!({}))
        .with_message("first turn answer")
        .with_message("third turn answer");
    let orchestrator = minimal_orchestrator(provider, ConfigBuilder::new().build());
    let session_id = orchestrator
        .create_session(Some("shared".to_string()))
        .unwrap()
        .id;

    let (_, stream) = orchestrator
        .run_turn_stream(TurnRequest::new("one").with_session(session_id.clone()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = orchestrator
        .run_turn(TurnRequest::new("two").with_session(session_id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::ConcurrentTurn { .. }));

    // first turn completes untouched, after which the session accepts turns
    let events: Vec<WireEvent> = stream.collect().await;
    assert_eq!(events.last().unwrap(), &WireEvent::Done {});

    let response = orchestrator
        .run_turn(TurnRequest::new("three").with_session(session_id))
        .await
        .unwrap();
    assert_eq!(response.content.as_deref(), Some("third turn answer"));
}

#[tokio::test]
async fn scenario_capacity_error_with_no_evictable_sessions() {
    let provider = ScriptedProvider::new()
        .with_tool_call("slow", json!({}))
        .with_message("held");
    let orchestrator = minimal_orchestrator(provider, ConfigBuilder::new().max_sessions(1).build());

    let (busy_id, stream) = orchestrator.run_turn_stream(TurnRequest::new("hold")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the only session is running, so nothing can be evicted
    let err = orchestrator.create_session(None).unwrap_err();
    assert!(matches!(err, SwarmError::Capacity { max: 1 }));

    let _ = stream.collect::<Vec<_>>().await;

    // once idle, the running protection lapses and creation evicts it
    orchestrator.create_session(None).unwrap();
    assert!(orchestrator.session(&busy_id).is_err());
}

#[tokio::test]
async fn scenario_sweep_never_expires_a_running_session() {
    let provider = ScriptedProvider::new()
        .with_tool_call("slow", json!({}))
        .with_message("made it");
    let orchestrator = minimal_orchestrator(
        provider,
        ConfigBuilder::new()
            .idle_timeout(Duration::from_millis(100))
            .build(),
    );

    let (session_id, stream) = orchestrator
        .run_turn_stream(TurnRequest::new("work"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // mid-turn and past the idle timeout measured from turn start: deferred
    assert_eq!(orchestrator.registry().sweep(), 0);
    assert!(orchestrator.session(&session_id).is_ok());

    let events: Vec<WireEvent> = stream.collect().await;
    assert_eq!(events.last().unwrap(), &WireEvent::Done {});

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(orchestrator.registry().sweep(), 1);
    assert!(matches!(
        orchestrator.session(&session_id),
        Err(SwarmError::SessionNotFound { .. })
    ));
}

fn stub_jwt(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT"}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{payload}.stub")
}

fn pipeline_invoker() -> ToolInvoker {
    let kya_token = stub_jwt(json!({"typ": "kya", "ssi": "svc-dappier", "iat": 1700000000}));
    let pay_token = stub_jwt(json!({"typ": "kya+pay", "amount": "0.004", "iat": 1700000000}));

    let mut invoker = ToolInvoker::default();
    invoker.register(FunctionTool::new(
        "find-sellers",
        "Search the marketplace for matching seller services",
        json!({"type": "object"}),
        |_| async {
            Ok(json!({"services": [{"id": "svc-dappier", "name": "Dappier Search"}]}))
        },
    ));
    invoker.register(FunctionTool::new(
        "create-kya-token",
        "Issue a KYA token for a seller service",
        json!({"type": "object"}),
        move |_| {
            let token = kya_token.clone();
            async move { Ok(json!({"token": token})) }
        },
    ));
    invoker.register(DecodeJwt);
    invoker.register(FunctionTool::new(
        "connect-mcp",
        "Open a session against the seller's MCP endpoint",
        json!({"type": "object"}),
        |_| async { Ok(json!({"connected": true, "tools": 10})) },
    ));
    invoker.register(PricingCatalog);
    invoker.register(QueryPricer);
    invoker.register(FunctionTool::new(
        "create-kya-payment-token",
        "Issue a combined KYA and payment token",
        json!({"type": "object"}),
        move |_| {
            let token = pay_token.clone();
            async move { Ok(json!({"token": token})) }
        },
    ));
    invoker.register(FunctionTool::new(
        "real-time-search",
        "Run the user's query against the paid search service",
        json!({"type": "object"}),
        |_| async { Ok(json!({"results": ["headline one", "headline two"]})) },
    ));
    invoker.register(FunctionTool::new(
        "charge-token",
        "Charge the payment token",
        json!({"type": "object"}),
        |_| async { Ok(json!({"charged": "0.004", "success": true})) },
    ));
    invoker
}

#[tokio::test]
async fn pipeline_runs_discovery_to_settlement() {
    let kya_token = stub_jwt(json!({"typ": "kya", "ssi": "svc-dappier", "iat": 1700000000}));
    let pay_token = stub_jwt(json!({"typ": "kya+pay", "amount": "0.004", "iat": 1700000000}));

    let provider = ScriptedProvider::new()
        .with_handoff(workflow::SELLER_FINDER)
        .with_reply(
            AgentReply::tool_call("find-sellers", json!({"query": "sports news"}))
                .with_handoff(workflow::KYA_ISSUER),
        )
        .with_reply(
            AgentReply::tool_call("create-kya-token", json!({"service_id": "svc-dappier"}))
                .with_handoff(workflow::TOKEN_INSPECTOR),
        )
        .with_reply(
            AgentReply::tool_call("decode-jwt", json!({"token": kya_token.clone()}))
                .with_handoff(workflow::CONNECTOR),
        )
        .with_reply(
            AgentReply::tool_call("connect-mcp", json!({"service_id": "svc-dappier"}))
                .with_tool_call("get-service-pricing", json!({"service_id": "svc-dappier"}))
                .with_handoff(workflow::PRICE_ESTIMATOR),
        )
        .with_reply(
            AgentReply::tool_call("calculate-query-price", json!({"tool_name": "sports-news"}))
                .with_handoff(workflow::PAYMENT_ISSUER),
        )
        .with_reply(
            AgentReply::tool_call("create-kya-payment-token", json!({"amount": "0.004"}))
                .with_handoff(workflow::TOKEN_INSPECTOR),
        )
        .with_reply(
            AgentReply::tool_call("decode-jwt", json!({"token": pay_token.clone()}))
                .with_handoff(workflow::SEARCHER),
        )
        .with_reply(
            AgentReply::tool_call("real-time-search", json!({"q": "sports news"}))
                .with_handoff(workflow::SETTLEMENT),
        )
        .with_reply(
            AgentReply::tool_call(
                "charge-token",
                json!({"token": pay_token, "charge_amount": "0.004"}),
            )
            .with_handoff(workflow::PLANNER),
        )
        .with_message("Here are today's sports headlines. Charged $0.004.");

    let invoker = pipeline_invoker();
    let graph = procurement_graph(&invoker).unwrap();
    let orchestrator = Orchestrator::new(
        graph,
        invoker,
        Arc::new(provider),
        ConfigBuilder::new().max_tool_iterations(12).build(),
    );

    let (_, stream) = orchestrator
        .run_turn_stream(TurnRequest::new("latest sports news"))
        .unwrap();
    let events: Vec<WireEvent> = stream.collect().await;

    assert_eq!(events.last().unwrap(), &WireEvent::Done {});
    assert_tool_events_correlate(&events);

    let calling_order: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            WireEvent::ToolCall {
                tool_name,
                status: WireToolStatus::Calling,
                ..
            } => Some(tool_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        calling_order,
        vec![
            "find-sellers",
            "create-kya-token",
            "decode-jwt",
            "connect-mcp",
            "get-service-pricing",
            "calculate-query-price",
            "create-kya-payment-token",
            "decode-jwt",
            "real-time-search",
            "charge-token",
        ]
    );

    // no failed calls anywhere in the pipeline
    assert!(!events.iter().any(|e| matches!(
        e,
        WireEvent::ToolCall {
            status: WireToolStatus::Failed,
            ..
        }
    )));

    let summary = &orchestrator.sessions()[0];
    assert_eq!(summary.current_agent.as_deref(), Some(workflow::PLANNER));
    assert_eq!(summary.turns, 1);
}

#[tokio::test]
async fn pipeline_aggregate_records_handoff_chain() {
    let provider = ScriptedProvider::new()
        .with_handoff(workflow::SELLER_FINDER)
        .with_reply(
            AgentReply::tool_call("find-sellers", json!({"query": "news"}))
                .with_handoff(workflow::KYA_ISSUER),
        )
        .with_message("stopping early for the test");

    let invoker = pipeline_invoker();
    let graph = procurement_graph(&invoker).unwrap();
    let orchestrator = Orchestrator::new(
        graph,
        invoker,
        Arc::new(provider),
        ConfigBuilder::new().build(),
    );

    let response = orchestrator
        .run_turn(TurnRequest::new("latest news"))
        .await
        .unwrap();

    assert_eq!(response.agent.as_deref(), Some(workflow::KYA_ISSUER));
    let chain: Vec<(&str, &str)> = response
        .handoffs
        .iter()
        .map(|h| (h.from.as_str(), h.to.as_str()))
        .collect();
    assert_eq!(
        chain,
        vec![
            (workflow::PLANNER, workflow::SELLER_FINDER),
            (workflow::SELLER_FINDER, workflow::KYA_ISSUER),
        ]
    );
}

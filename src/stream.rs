//! Turn event stream
//!
//! The runner produces one ordered sequence of [`RunEvent`]s per turn over an
//! unbounded channel. Both external renderings derive from that same
//! sequence: [`TurnStream`] maps each event to its wire form as it arrives,
//! and [`collect_turn`] folds the sequence into a single aggregate response.
//!
//! Wire vocabulary: `tool_call{tool_name, status: calling|completed|failed}`,
//! `token{content}`, `message{content}`, `done{}`, `error{kind, message}`.
//! A terminal `done` or `error` closes the stream exactly once.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::items::{HandoffRecord, ToolCallRecord, ToolCallRequest};

/// Internal event produced by the turn runner, in causal order.
#[derive(Debug, Clone)]
pub enum RunEvent {
    ToolCallStarted {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallCompleted {
        id: String,
        name: String,
        output: Value,
    },
    ToolCallFailed {
        id: String,
        name: String,
        error: String,
    },
    /// One streamed text chunk from the active agent.
    Token { agent: String, content: String },
    /// A complete (non-chunked) text message from the active agent.
    Message { agent: String, content: String },
    /// A recorded transfer of control. Not part of the wire vocabulary.
    Handoff(HandoffRecord),
    /// Terminal success; carries the final answer and the role that produced it.
    Done {
        agent: String,
        content: Option<String>,
    },
    /// Terminal failure for the turn.
    Failed { kind: String, message: String },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Done { .. } | RunEvent::Failed { .. })
    }
}

/// Status carried by the wire `tool_call` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireToolStatus {
    Calling,
    Completed,
    Failed,
}

/// Error body carried by the wire `error` event and aggregate responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

/// Externally visible event, serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    ToolCall {
        tool_name: String,
        status: WireToolStatus,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        arguments: Option<Value>,
    },
    Token {
        content: String,
    },
    Message {
        content: String,
    },
    Done {},
    Error {
        kind: String,
        message: String,
    },
}

impl WireEvent {
    /// Wire form of an internal event; `None` for events that are recorded
    /// but not externally visible (handoffs).
    pub fn from_run_event(event: &RunEvent) -> Option<WireEvent> {
        match event {
            RunEvent::ToolCallStarted {
                name, arguments, ..
            } => Some(WireEvent::ToolCall {
                tool_name: name.clone(),
                status: WireToolStatus::Calling,
                arguments: Some(arguments.clone()),
            }),
            RunEvent::ToolCallCompleted { name, .. } => Some(WireEvent::ToolCall {
                tool_name: name.clone(),
                status: WireToolStatus::Completed,
                arguments: None,
            }),
            RunEvent::ToolCallFailed { name, .. } => Some(WireEvent::ToolCall {
                tool_name: name.clone(),
                status: WireToolStatus::Failed,
                arguments: None,
            }),
            RunEvent::Token { content, .. } => Some(WireEvent::Token {
                content: content.clone(),
            }),
            RunEvent::Message { content, .. } => Some(WireEvent::Message {
                content: content.clone(),
            }),
            RunEvent::Handoff(_) => None,
            RunEvent::Done { .. } => Some(WireEvent::Done {}),
            RunEvent::Failed { kind, message } => Some(WireEvent::Error {
                kind: kind.clone(),
                message: message.clone(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WireEvent::Done {} | WireEvent::Error { .. })
    }
}

/// Streaming rendering of one turn: wire events in production order with
/// exactly one terminal event, even if the producer goes away mid-turn.
pub struct TurnStream {
    inner: UnboundedReceiverStream<RunEvent>,
    terminated: bool,
}

impl TurnStream {
    pub fn new(rx: mpsc::UnboundedReceiver<RunEvent>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            terminated: false,
        }
    }
}

impl Stream for TurnStream {
    type Item = WireEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(event)) => {
                    let wire = WireEvent::from_run_event(&event);
                    if event.is_terminal() {
                        self.terminated = true;
                    }
                    match wire {
                        Some(wire) => return Poll::Ready(Some(wire)),
                        None => continue,
                    }
                }
                Poll::Ready(None) => {
                    // Producer dropped without a terminal event; never end
                    // the stream ambiguously.
                    self.terminated = true;
                    return Poll::Ready(Some(WireEvent::Error {
                        kind: "stream_interrupted".to_string(),
                        message: "turn ended without a terminal event".to_string(),
                    }));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Aggregate rendering of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Final assistant text, if the turn produced one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    /// Role that produced the final answer.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent: Option<String>,
    /// Tool calls made during the turn, in execution order.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Handoffs recorded during the turn, in order.
    pub handoffs: Vec<HandoffRecord>,
    /// Set when the turn ended with a terminal error.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<WireError>,
}

impl TurnResponse {
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// Fold a turn's event sequence into its aggregate response.
pub async fn collect_turn(mut rx: mpsc::UnboundedReceiver<RunEvent>) -> TurnResponse {
    let mut response = TurnResponse {
        content: None,
        agent: None,
        tool_calls: Vec::new(),
        handoffs: Vec::new(),
        error: None,
    };
    let mut pending: Vec<ToolCallRequest> = Vec::new();

    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        match event {
            RunEvent::ToolCallStarted {
                id,
                name,
                arguments,
            } => pending.push(ToolCallRequest {
                id,
                name,
                arguments,
            }),
            RunEvent::ToolCallCompleted { id, output, .. } => {
                if let Some(pos) = pending.iter().position(|req| req.id == id) {
                    let request = pending.remove(pos);
                    response
                        .tool_calls
                        .push(ToolCallRecord::completed(&request, output));
                }
            }
            RunEvent::ToolCallFailed { id, .. } => {
                if let Some(pos) = pending.iter().position(|req| req.id == id) {
                    let request = pending.remove(pos);
                    response.tool_calls.push(ToolCallRecord::failed(&request));
                }
            }
            RunEvent::Handoff(record) => response.handoffs.push(record),
            RunEvent::Token { .. } | RunEvent::Message { .. } => {}
            RunEvent::Done { agent, content } => {
                response.agent = Some(agent);
                response.content = content;
            }
            RunEvent::Failed { kind, message } => {
                response.error = Some(WireError { kind, message });
            }
        }
        if terminal {
            break;
        }
    }
    response
}

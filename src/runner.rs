//! # Turn runner (orientation)
//!
//! The `OrchestrationRunner` executes exactly one user turn against a session:
//! it invokes the active agent capability, routes requested tool calls through
//! the [`ToolInvoker`](crate::invoker::ToolInvoker) in request order, validates
//! requested handoffs against the [`AgentGraph`](crate::graph::AgentGraph),
//! and interleaves everything into one ordered [`RunEvent`] sequence. Session
//! mutation is exclusive: the caller hands the runner a [`TurnPermit`] and the
//! permit's release returns the session to `idle` no matter how the turn ends.
//!
//! Ordering guarantees upheld here:
//! - tool calls execute strictly in the order the agent requested them;
//! - a tool call's completed/failed event precedes any text produced from its
//!   result (text in a reply was produced before that reply's tool calls ran);
//! - a terminal `Done` or `Failed` event is sent exactly once per turn.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, SwarmError};
use crate::graph::AgentGraph;
use crate::invoker::ToolInvoker;
use crate::items::{HandoffRecord, Message};
use crate::provider::AgentProvider;
use crate::registry::TurnPermit;
use crate::stream::RunEvent;

/// Sender half of a turn's event channel.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<RunEvent>;

/// The consumer went away mid-turn; finish the step in flight and abort.
struct Disconnected;

/// Executes one user turn to completion or to a safe stopping point.
pub struct OrchestrationRunner {
    graph: Arc<AgentGraph>,
    invoker: Arc<ToolInvoker>,
    provider: Arc<dyn AgentProvider>,
    max_iterations: usize,
}

impl OrchestrationRunner {
    pub fn new(
        graph: Arc<AgentGraph>,
        invoker: Arc<ToolInvoker>,
        provider: Arc<dyn AgentProvider>,
        max_iterations: usize,
    ) -> Self {
        Self {
            graph,
            invoker,
            provider,
            max_iterations,
        }
    }

    /// Run one turn. All output flows through `tx`; the terminal event is
    /// always sent (it is simply dropped if the consumer disconnected).
    /// Consuming the permit returns the session to `idle` on every path.
    pub async fn run_turn(&self, permit: TurnPermit, user_message: String, tx: EventSender) {
        let session_id = permit.slot().id();
        info!(session = %session_id, "Starting turn");

        match self.turn_inner(&permit, user_message, &tx).await {
            Ok(Some((agent, content))) => {
                let _ = tx.send(RunEvent::Done { agent, content });
            }
            Ok(None) => {
                debug!(session = %session_id, "Consumer disconnected; turn aborted after step in flight");
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "Turn failed");
                let _ = tx.send(RunEvent::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Core loop. Returns `Ok(None)` when the consumer disconnected; the
    /// session keeps the steps completed before the disconnect.
    async fn turn_inner(
        &self,
        permit: &TurnPermit,
        user_message: String,
        tx: &EventSender,
    ) -> Result<Option<(String, Option<String>)>> {
        let slot = permit.slot();

        let (mut agent_name, mut context, committed) = {
            let mut session = slot.lock();
            session.append(Message::user(user_message));
            let agent = session
                .current_agent
                .clone()
                .unwrap_or_else(|| self.graph.entry_role().name().to_string());
            (agent, session.history().to_vec(), session.history().len())
        };

        let mut final_text: Option<String> = None;
        let mut iterations = 0usize;
        // Set when the previous round folded a tool failure into the context;
        // the agent gets one shot at continuing before the turn fails.
        let mut pending_failure: Option<String> = None;
        let mut disconnected = false;

        'turn: loop {
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(SwarmError::IterationLimitExceeded {
                    max: self.max_iterations,
                });
            }

            let role = self
                .graph
                .role(&agent_name)
                .ok_or_else(|| SwarmError::Configuration {
                    message: format!("session points at undefined role '{agent_name}'"),
                })?;
            let tools = self.invoker.tools_named(role.capabilities_set());

            debug!(iteration = iterations, agent = %agent_name, "Invoking agent");
            let reply = self.provider.respond(role, &context, tools).await?;

            if pending_failure.is_some() && reply.is_empty() {
                let tool = pending_failure.take().unwrap_or_default();
                return Err(SwarmError::ToolInvocation {
                    tool,
                    message: "agent could not proceed after tool failure".to_string(),
                });
            }
            if !reply.is_empty() {
                pending_failure = None;
            }

            // Text first: a reply's text was produced before its tool calls ran.
            if !reply.chunks.is_empty() {
                for chunk in &reply.chunks {
                    if emit(
                        tx,
                        RunEvent::Token {
                            agent: agent_name.clone(),
                            content: chunk.clone(),
                        },
                    )
                    .is_err()
                    {
                        disconnected = true;
                        break 'turn;
                    }
                }
            } else if let Some(content) = reply.content.as_deref().filter(|c| !c.is_empty()) {
                if emit(
                    tx,
                    RunEvent::Message {
                        agent: agent_name.clone(),
                        content: content.to_string(),
                    },
                )
                .is_err()
                {
                    disconnected = true;
                    break 'turn;
                }
            }
            if let Some(content) = reply.content.clone().filter(|c| !c.is_empty()) {
                context.push(Message::assistant(content.clone(), agent_name.clone()));
                final_text = Some(content);
            }

            for call in &reply.tool_calls {
                if !role.may_invoke(&call.name) {
                    return Err(SwarmError::CapabilityViolation {
                        agent: agent_name.clone(),
                        tool: call.name.clone(),
                    });
                }
                if emit(
                    tx,
                    RunEvent::ToolCallStarted {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                )
                .is_err()
                {
                    disconnected = true;
                    break 'turn;
                }

                // Tools are never interrupted mid-execution; a disconnect is
                // only observed once the call returns.
                let result = self.invoker.invoke(&agent_name, call).await?;
                if let Some(error) = &result.error {
                    let sent = emit(
                        tx,
                        RunEvent::ToolCallFailed {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            error: error.clone(),
                        },
                    );
                    context.push(Message::tool(
                        format!("Error: {error}"),
                        agent_name.clone(),
                    ));
                    pending_failure = Some(call.name.clone());
                    if sent.is_err() {
                        disconnected = true;
                        break 'turn;
                    }
                } else {
                    let sent = emit(
                        tx,
                        RunEvent::ToolCallCompleted {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            output: result.output.clone(),
                        },
                    );
                    context.push(Message::tool(result.output.to_string(), agent_name.clone()));
                    if sent.is_err() {
                        disconnected = true;
                        break 'turn;
                    }
                }
            }

            if let Some(handoff) = &reply.handoff {
                if !self.graph.is_legal_handoff(&agent_name, &handoff.target) {
                    return Err(SwarmError::HandoffViolation {
                        from: agent_name.clone(),
                        to: handoff.target.clone(),
                    });
                }
                info!(from = %agent_name, to = %handoff.target, "Handoff");
                let record = HandoffRecord::new(
                    agent_name.clone(),
                    handoff.target.clone(),
                    handoff.reason.clone(),
                );
                agent_name = handoff.target.clone();
                if emit(tx, RunEvent::Handoff(record)).is_err() {
                    disconnected = true;
                    break 'turn;
                }
                continue;
            }

            if reply.tool_calls.is_empty() {
                // No tools, no handoff: the reply is the final answer.
                break;
            }
            // Tool results are in context; same agent reasons over them next.
        }

        {
            let mut session = slot.lock();
            for message in context.into_iter().skip(committed) {
                session.append(message);
            }
            session.current_agent = Some(agent_name.clone());
            session.turns += 1;
            session.touch();
        }

        if disconnected {
            Ok(None)
        } else {
            Ok(Some((agent_name, final_text)))
        }
    }
}

fn emit(tx: &EventSender, event: RunEvent) -> std::result::Result<(), Disconnected> {
    tx.send(event).map_err(|_| Disconnected)
}

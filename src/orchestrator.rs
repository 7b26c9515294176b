//! Orchestrator facade
//!
//! Library-level surface for transports: turn submission in streaming or
//! batched form, session management, and health. A transport (HTTP, CLI)
//! stays a thin shell over these calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::OrchestratorConfig;
use crate::error::{Result, SwarmError};
use crate::graph::AgentGraph;
use crate::invoker::ToolInvoker;
use crate::items::Message;
use crate::provider::AgentProvider;
use crate::registry::{SessionRegistry, SessionSlot, TurnPermit};
use crate::runner::OrchestrationRunner;
use crate::session::SessionSummary;
use crate::stream::{collect_turn, TurnResponse, TurnStream};

/// One turn submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Absent implies creating a fresh session.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    pub message: String,
    /// Seed history for a fresh session; ignored when `session_id` is set.
    #[serde(default)]
    pub prior_messages: Vec<Message>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            message: message.into(),
            prior_messages: Vec::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_prior_messages(mut self, prior_messages: Vec<Message>) -> Self {
        self.prior_messages = prior_messages;
        self
    }
}

/// Registry occupancy and readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub active_sessions: usize,
    pub max_sessions: usize,
    /// Whether the graph and tool set validated at startup.
    pub ready: bool,
}

/// Ties the registry, handoff graph, tool invoker, and agent capability into
/// one lifecycle-scoped store. Independent instances can coexist, so tests
/// never share process-global state.
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    runner: Arc<OrchestrationRunner>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// The graph must have been built against `invoker`, which is what makes
    /// an unregistered capability a startup failure rather than a runtime one.
    pub fn new(
        graph: AgentGraph,
        invoker: ToolInvoker,
        provider: Arc<dyn AgentProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            config.max_sessions,
            config.idle_timeout,
        ));
        let runner = Arc::new(OrchestrationRunner::new(
            Arc::new(graph),
            Arc::new(invoker),
            provider,
            config.max_tool_iterations,
        ));
        Self {
            registry,
            runner,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn resolve(&self, request: &TurnRequest) -> Result<(Arc<SessionSlot>, TurnPermit)> {
        if request.message.trim().is_empty() {
            return Err(SwarmError::Validation {
                message: "message must not be empty".to_string(),
            });
        }

        let fresh = request.session_id.is_none();
        let slot = self.registry.get_or_create(request.session_id.clone())?;
        if fresh && !request.prior_messages.is_empty() {
            let mut session = slot.lock();
            for message in &request.prior_messages {
                session.append(message.clone());
            }
        }

        let permit = self.registry.begin_turn(&slot)?;
        Ok((slot, permit))
    }

    /// Submit a turn and stream its wire events as they are produced.
    ///
    /// Returns the session id alongside the stream so callers that created
    /// the session implicitly can address it afterwards.
    pub fn run_turn_stream(&self, request: TurnRequest) -> Result<(String, TurnStream)> {
        let (slot, permit) = self.resolve(&request)?;
        let session_id = slot.id();

        let (tx, rx) = mpsc::unbounded_channel();
        let runner = self.runner.clone();
        let message = request.message;
        tokio::spawn(async move {
            runner.run_turn(permit, message, tx).await;
        });

        Ok((session_id, TurnStream::new(rx)))
    }

    /// Submit a turn and wait for its aggregate response.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        let (_slot, permit) = self.resolve(&request)?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.runner.run_turn(permit, request.message, tx).await;
        Ok(collect_turn(rx).await)
    }

    pub fn create_session(&self, id: Option<String>) -> Result<SessionSummary> {
        Ok(self.registry.create(id)?.summary())
    }

    pub fn session(&self, id: &str) -> Result<SessionSummary> {
        Ok(self.registry.get(id)?.summary())
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.registry.summaries()
    }

    /// Remove a session regardless of idle state. Idempotent.
    pub fn delete_session(&self, id: &str) {
        self.registry.delete(id);
    }

    pub fn health(&self) -> Health {
        Health {
            active_sessions: self.registry.occupancy(),
            max_sessions: self.registry.max_sessions(),
            ready: true,
        }
    }

    /// Drive periodic sweeps until the returned handle is aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = registry.sweep();
                if swept > 0 {
                    debug!(swept, "Periodic sweep expired sessions");
                }
            }
        })
    }
}

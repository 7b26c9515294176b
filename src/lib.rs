//! # swarmgate
//!
//! Orchestration core for a fixed pipeline of tool-using agents that hand
//! control to one another along a declared graph, streaming tool invocations
//! and text to the caller as one ordered event sequence per turn.
//!
//! ## Core concepts
//!
//! - **AgentGraph**: agent roles as data (capability set, handoff edges,
//!   entry/terminal flags) interpreted by one generic turn loop.
//! - **SessionRegistry**: bounded, concurrency-safe session store with
//!   least-recently-active idle eviction and periodic sweeps.
//! - **OrchestrationRunner**: executes one user turn, interleaving tool
//!   calls, handoff decisions, and text into an ordered event stream.
//! - **ToolInvoker**: uniform capability boundary to every external tool,
//!   with per-call timeouts applied as Tower layers.
//! - **EventStream**: the same internal event sequence rendered either as
//!   streamed wire events or one aggregate response.
//!
//! ## Getting started
//!
//! ```rust
//! use std::sync::Arc;
//! use swarmgate::{
//!     AgentGraph, AgentRole, ConfigBuilder, FunctionTool, Orchestrator,
//!     ScriptedProvider, ToolInvoker, TurnRequest,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut invoker = ToolInvoker::default();
//! invoker.register(FunctionTool::simple("search", "Run a search", |q| q));
//!
//! let graph = AgentGraph::builder()
//!     .role(AgentRole::new("triage").entry().handoff_to("research"))
//!     .role(AgentRole::new("research").capability("search"))
//!     .build(&invoker)?;
//!
//! let provider = Arc::new(
//!     ScriptedProvider::new()
//!         .with_handoff("research")
//!         .with_message("here is what I found"),
//! );
//! let orchestrator = Orchestrator::new(graph, invoker, provider, ConfigBuilder::new().build());
//!
//! let response = orchestrator.run_turn(TurnRequest::new("look this up")).await?;
//! assert_eq!(response.agent.as_deref(), Some("research"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod invoker;
pub mod items;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod runner;
pub mod session;
pub mod stream;
pub mod tool;
pub mod tools;
pub mod workflow;

pub use config::{ConfigBuilder, OrchestratorConfig};
pub use error::{Result, SwarmError};
pub use graph::{AgentGraph, AgentRole};
pub use invoker::ToolInvoker;
pub use items::{HandoffRecord, Message, Role, ToolCallRecord, ToolCallRequest, ToolCallStatus};
pub use orchestrator::{Health, Orchestrator, TurnRequest};
pub use provider::{AgentProvider, AgentReply, HandoffRequest, OpenAIProvider, ScriptedProvider};
pub use registry::{SessionRegistry, SessionSlot, TurnPermit};
pub use runner::OrchestrationRunner;
pub use session::{Session, SessionStatus, SessionSummary};
pub use stream::{RunEvent, TurnResponse, TurnStream, WireEvent, WireError, WireToolStatus};
pub use tool::{FunctionTool, Tool, ToolResult};

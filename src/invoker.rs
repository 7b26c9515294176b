//! Tool invocation as a Tower stack.
//!
//! The [`ToolInvoker`] is the uniform capability boundary between the turn
//! runner and every external tool. Each call is routed through a small Tower
//! stack so cross-cutting concerns (currently a per-call timeout) stay
//! composable layers rather than logic inside the tools themselves.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::debug;

use crate::error::{Result, SwarmError};
use crate::items::ToolCallRequest;
use crate::tool::{Tool, ToolResult};

/// Request passed down the tool stack.
#[derive(Debug, Clone)]
pub struct ToolDispatch {
    /// Correlation id of the originating tool call.
    pub call_id: String,
    /// Agent role on whose behalf the tool runs.
    pub agent: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Leaf service that executes one registered tool.
#[derive(Clone)]
struct ToolService {
    tool: Arc<dyn Tool>,
}

impl Service<ToolDispatch> for ToolService {
    type Response = ToolResult;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ToolDispatch) -> Self::Future {
        let tool = self.tool.clone();
        Box::pin(async move {
            debug!(tool = %req.tool_name, agent = %req.agent, call_id = %req.call_id, "Executing tool");
            let result = tool.execute(req.arguments).await?;
            Ok(result)
        })
    }
}

/// Registry of tools keyed by name, safe to call concurrently across sessions.
///
/// Registration is a startup concern: the set of supported names is consulted
/// by [`AgentGraph`](crate::graph::AgentGraph) construction, so an unsupported
/// capability is a configuration error rather than a runtime surprise.
#[derive(Clone)]
pub struct ToolInvoker {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl Default for ToolInvoker {
    fn default() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for ToolInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInvoker")
            .field("tools", &self.tool_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    /// Register a tool under its own name. Later registrations win.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn supports(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// The registered tools matching a role's capability set, for advertising
    /// to the agent capability.
    pub fn tools_named<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Vec<Arc<dyn Tool>> {
        names
            .into_iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    /// Invoke a registered tool on behalf of `agent`.
    ///
    /// Execution failures and timeouts come back in-band as a [`ToolResult`]
    /// with `error` set; the caller owns the fallback policy. An unregistered
    /// name is an error: graph validation should have made it unreachable.
    pub async fn invoke(&self, agent: &str, request: &ToolCallRequest) -> Result<ToolResult> {
        let tool = self
            .get(&request.name)
            .ok_or_else(|| SwarmError::ToolInvocation {
                tool: request.name.clone(),
                message: "tool is not registered".to_string(),
            })?;

        let stack = ServiceBuilder::new()
            .layer(TimeoutLayer::new(self.timeout))
            .service(ToolService { tool });

        let dispatch = ToolDispatch {
            call_id: request.id.clone(),
            agent: agent.to_string(),
            tool_name: request.name.clone(),
            arguments: request.arguments.clone(),
        };

        match stack.oneshot(dispatch).await {
            Ok(result) => Ok(result),
            Err(e) if e.is::<tower::timeout::error::Elapsed>() => Ok(ToolResult::error(format!(
                "timed out after {:?}",
                self.timeout
            ))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

//! # Agent handoff graph
//!
//! The handoff graph declares which agent roles exist, which tools each role
//! may invoke, and which roles it may transfer control to. A handoff is an
//! explicit transfer of the conversation from one role to another, valid only
//! along a declared edge; the turn runner consults the graph before honoring
//! any transfer an agent requests.
//!
//! Roles are plain data interpreted by one generic turn loop. There is no
//! per-role type or trait object; specializing a role means giving it
//! different instructions, capabilities, and edges.
//!
//! ```rust
//! use swarmgate::graph::{AgentGraph, AgentRole};
//! use swarmgate::invoker::ToolInvoker;
//! use swarmgate::tool::FunctionTool;
//!
//! let mut invoker = ToolInvoker::default();
//! invoker.register(FunctionTool::simple("search", "Run a search", |q| q));
//!
//! let graph = AgentGraph::builder()
//!     .role(AgentRole::new("triage").entry().handoff_to("research"))
//!     .role(AgentRole::new("research").capability("search"))
//!     .build(&invoker)
//!     .unwrap();
//!
//! assert!(graph.is_legal_handoff("triage", "research"));
//! assert!(!graph.is_legal_handoff("research", "triage"));
//! assert!(graph.role("research").unwrap().is_terminal());
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwarmError};
use crate::invoker::ToolInvoker;

/// A named participant in the workflow: instructions, capability set, and
/// declared outgoing handoff edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRole {
    name: String,
    instructions: String,
    capabilities: BTreeSet<String>,
    handoffs: BTreeSet<String>,
    entry: bool,
    terminal: bool,
}

impl AgentRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: String::new(),
            capabilities: BTreeSet::new(),
            handoffs: BTreeSet::new(),
            entry: false,
            terminal: false,
        }
    }

    /// Set the system instructions given to the agent capability for this role.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Permit this role to invoke the named tool.
    pub fn capability(mut self, tool: impl Into<String>) -> Self {
        self.capabilities.insert(tool.into());
        self
    }

    /// Declare a legal handoff edge from this role to `target`.
    pub fn handoff_to(mut self, target: impl Into<String>) -> Self {
        self.handoffs.insert(target.into());
        self
    }

    /// Mark this role as the workflow entry point.
    pub fn entry(mut self) -> Self {
        self.entry = true;
        self
    }

    /// Mark this role as an explicit terminal.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions_text(&self) -> &str {
        &self.instructions
    }

    pub fn capabilities_set(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    pub fn handoff_targets(&self) -> &BTreeSet<String> {
        &self.handoffs
    }

    pub fn is_entry(&self) -> bool {
        self.entry
    }

    /// A role with no outgoing edges is terminal even when not flagged.
    pub fn is_terminal(&self) -> bool {
        self.terminal || self.handoffs.is_empty()
    }

    pub fn may_invoke(&self, tool: &str) -> bool {
        self.capabilities.contains(tool)
    }
}

/// Static, immutable declaration of the agent workflow.
#[derive(Debug, Clone)]
pub struct AgentGraph {
    roles: BTreeMap<String, AgentRole>,
    entry: String,
}

impl AgentGraph {
    pub fn builder() -> AgentGraphBuilder {
        AgentGraphBuilder { roles: Vec::new() }
    }

    /// The single entry role of the workflow.
    pub fn entry_role(&self) -> &AgentRole {
        &self.roles[&self.entry]
    }

    pub fn role(&self, name: &str) -> Option<&AgentRole> {
        self.roles.get(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &AgentRole> {
        self.roles.values()
    }

    /// Whether `from` declares an edge to `to`.
    pub fn is_legal_handoff(&self, from: &str, to: &str) -> bool {
        self.roles
            .get(from)
            .map(|role| role.handoffs.contains(to))
            .unwrap_or(false)
    }

    /// Tool names the named role may invoke; empty for unknown roles.
    pub fn capabilities_of(&self, role: &str) -> BTreeSet<String> {
        self.roles
            .get(role)
            .map(|r| r.capabilities.clone())
            .unwrap_or_default()
    }
}

/// Builder that validates role and edge declarations on `build`.
pub struct AgentGraphBuilder {
    roles: Vec<AgentRole>,
}

impl AgentGraphBuilder {
    pub fn role(mut self, role: AgentRole) -> Self {
        self.roles.push(role);
        self
    }

    /// Validate the declaration and freeze it into an [`AgentGraph`].
    ///
    /// Fails with a configuration error when the graph has no entry role or
    /// more than one, when an edge references an undefined role, or when a
    /// role declares a capability with no registration in `invoker`.
    pub fn build(self, invoker: &ToolInvoker) -> Result<AgentGraph> {
        let mut roles = BTreeMap::new();
        for role in self.roles {
            if roles.insert(role.name.clone(), role.clone()).is_some() {
                return Err(SwarmError::Configuration {
                    message: format!("duplicate role '{}'", role.name),
                });
            }
        }

        let entries: Vec<&str> = roles
            .values()
            .filter(|r| r.entry)
            .map(|r| r.name.as_str())
            .collect();
        let entry = match entries.as_slice() {
            [single] => single.to_string(),
            [] => {
                return Err(SwarmError::Configuration {
                    message: "no entry role declared".to_string(),
                })
            }
            many => {
                return Err(SwarmError::Configuration {
                    message: format!("multiple entry roles declared: {}", many.join(", ")),
                })
            }
        };

        for role in roles.values() {
            for target in &role.handoffs {
                if !roles.contains_key(target) {
                    return Err(SwarmError::Configuration {
                        message: format!(
                            "role '{}' declares handoff to undefined role '{}'",
                            role.name, target
                        ),
                    });
                }
            }
            for tool in &role.capabilities {
                if !invoker.supports(tool) {
                    return Err(SwarmError::Configuration {
                        message: format!(
                            "role '{}' declares capability '{}' with no registered tool",
                            role.name, tool
                        ),
                    });
                }
            }
        }

        Ok(AgentGraph { roles, entry })
    }
}

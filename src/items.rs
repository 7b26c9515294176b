//! Messages, tool-call records, and handoff records
//!
//! This module defines the core data structures exchanged between the
//! registry, the turn runner, and the event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A message in the conversation history. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// The agent role that produced this message; `None` for user messages.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            agent: Some(agent.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn tool(content: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            agent: Some(agent.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Status of a single tool call within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Completed,
    Failed,
}

/// A tool call requested by an agent, as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id linking start and completion events.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// The committed record of a tool call made during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub status: ToolCallStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
}

impl ToolCallRecord {
    pub fn completed(request: &ToolCallRequest, result: Value) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            arguments: request.arguments.clone(),
            status: ToolCallStatus::Completed,
            result: Some(result),
        }
    }

    pub fn failed(request: &ToolCallRequest) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            arguments: request.arguments.clone(),
            status: ToolCallStatus::Failed,
            result: None,
        }
    }
}

/// A recorded transfer of control between agent roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HandoffRecord {
    pub fn new(from: impl Into<String>, to: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            reason,
            timestamp: Utc::now(),
        }
    }
}

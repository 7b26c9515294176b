//! Agent-response capability
//!
//! The language-model call is a capability behind [`AgentProvider`]: given the
//! active role and its context, it returns text, zero or more requested tool
//! calls, and an optional requested handoff target. The turn runner owns
//! everything else (legality, ordering, events).
//!
//! Handoff targets are advertised to the model as `transfer_to_<role>`
//! function tools; the adapter folds any such call back into a
//! [`HandoffRequest`] so the runner never sees handoffs as tools.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{Result, SwarmError};
use crate::graph::AgentRole;
use crate::items::{Message, Role, ToolCallRequest};
use crate::tool::Tool;

/// Prefix for pseudo-tools that request a transfer of control.
pub const HANDOFF_TOOL_PREFIX: &str = "transfer_to_";

/// A requested transfer of control, before legality validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub target: String,
    pub reason: Option<String>,
}

/// One agent invocation's output.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    /// Full response text, if any.
    pub content: Option<String>,
    /// Token-level pieces when the provider streamed; empty otherwise.
    pub chunks: Vec<String>,
    /// Requested tool calls, in request order.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Requested transfer of control.
    pub handoff: Option<HandoffRequest>,
}

impl AgentReply {
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_calls: vec![ToolCallRequest::new(name, arguments)],
            ..Default::default()
        }
    }

    pub fn handoff(target: impl Into<String>) -> Self {
        Self {
            handoff: Some(HandoffRequest {
                target: target.into(),
                reason: None,
            }),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        if self.content.is_none() && !self.chunks.is_empty() {
            self.content = Some(self.chunks.concat());
        }
        self
    }

    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.tool_calls.push(ToolCallRequest::new(name, arguments));
        self
    }

    pub fn with_handoff(mut self, target: impl Into<String>) -> Self {
        self.handoff = Some(HandoffRequest {
            target: target.into(),
            reason: None,
        });
        self
    }

    /// Whether this reply neither speaks, calls a tool, nor hands off.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map(str::is_empty).unwrap_or(true)
            && self.tool_calls.is_empty()
            && self.handoff.is_none()
    }
}

/// Capability that produces one agent invocation's output.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn respond(
        &self,
        role: &AgentRole,
        context: &[Message],
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<AgentReply>;
}

/// OpenAI-backed provider using async-openai.
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_client(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Convert a history message to OpenAI's format. Tool results travel as
    /// plain text context, matching how the upstream transcript is rendered.
    fn convert_message(msg: &Message) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .unwrap()
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .unwrap()
                .into(),
            Role::Tool => ChatCompletionRequestUserMessageArgs::default()
                .content(format!("Tool result: {}", msg.content))
                .build()
                .unwrap()
                .into(),
        }
    }

    fn convert_tools(role: &AgentRole, tools: &[Arc<dyn Tool>]) -> Result<Vec<ChatCompletionTool>> {
        let mut specs = Vec::with_capacity(tools.len() + role.handoff_targets().len());
        for tool in tools {
            specs.push(
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(tool.name())
                            .description(tool.description())
                            .parameters(tool.parameters_schema())
                            .build()
                            .map_err(|e| SwarmError::Provider {
                                message: e.to_string(),
                            })?,
                    )
                    .build()
                    .map_err(|e| SwarmError::Provider {
                        message: e.to_string(),
                    })?,
            );
        }
        for target in role.handoff_targets() {
            specs.push(
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(format!("{HANDOFF_TOOL_PREFIX}{target}"))
                            .description(format!("Transfer the conversation to '{target}'"))
                            .parameters(serde_json::json!({
                                "type": "object",
                                "properties": {
                                    "reason": {"type": "string", "description": "Reason for the transfer"}
                                }
                            }))
                            .build()
                            .map_err(|e| SwarmError::Provider {
                                message: e.to_string(),
                            })?,
                    )
                    .build()
                    .map_err(|e| SwarmError::Provider {
                        message: e.to_string(),
                    })?,
            );
        }
        Ok(specs)
    }
}

#[async_trait]
impl AgentProvider for OpenAIProvider {
    async fn respond(
        &self,
        role: &AgentRole,
        context: &[Message],
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<AgentReply> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            vec![ChatCompletionRequestSystemMessageArgs::default()
                .content(role.instructions_text().to_string())
                .build()
                .map_err(|e| SwarmError::Provider {
                    message: e.to_string(),
                })?
                .into()];
        messages.extend(context.iter().map(Self::convert_message));

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages);
        if let Some(temperature) = self.temperature {
            request.temperature(temperature);
        }
        let specs = Self::convert_tools(role, &tools)?;
        if !specs.is_empty() {
            request.tools(specs);
        }

        let response = self.client.chat().create(request.build()?).await?;
        let choice = response
            .choices
            .first()
            .ok_or_else(|| SwarmError::Provider {
                message: "no choices in response".to_string(),
            })?;

        let mut reply = AgentReply {
            content: choice.message.content.clone(),
            ..Default::default()
        };
        if let Some(tool_calls) = &choice.message.tool_calls {
            for call in tool_calls {
                let arguments: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                if let Some(target) = call.function.name.strip_prefix(HANDOFF_TOOL_PREFIX) {
                    if reply.handoff.is_none() {
                        let reason = arguments
                            .get("reason")
                            .and_then(|v| v.as_str())
                            .map(str::to_string);
                        reply.handoff = Some(HandoffRequest {
                            target: target.to_string(),
                            reason,
                        });
                    }
                } else {
                    reply.tool_calls.push(ToolCallRequest {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        arguments,
                    });
                }
            }
        }
        Ok(reply)
    }
}

/// Scripted provider for tests and demos: pops one queued reply per
/// invocation, falling back to a canned message when the queue runs dry.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<AgentReply>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: AgentReply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_message(self, content: impl Into<String>) -> Self {
        self.with_reply(AgentReply::message(content))
    }

    pub fn with_tool_call(self, name: impl Into<String>, arguments: Value) -> Self {
        self.with_reply(AgentReply::tool_call(name, arguments))
    }

    pub fn with_handoff(self, target: impl Into<String>) -> Self {
        self.with_reply(AgentReply::handoff(target))
    }
}

#[async_trait]
impl AgentProvider for ScriptedProvider {
    async fn respond(
        &self,
        _role: &AgentRole,
        _context: &[Message],
        _tools: Vec<Arc<dyn Tool>>,
    ) -> Result<AgentReply> {
        let mut replies = self.replies.lock().unwrap();
        Ok(replies
            .pop_front()
            .unwrap_or_else(|| AgentReply::message("Default response")))
    }
}

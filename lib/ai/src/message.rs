//! Wire-level chat messages.
//!
//! These are the raw protocol records exchanged with the completion
//! service: user/system/assistant text, assistant tool-call requests, and
//! tool responses. Turn bookkeeping on top of them lives in
//! `taleweaver-conversation`.

use crate::estimate::{MESSAGE_OVERHEAD_TOKENS, TokenEstimator};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// System instruction or injected event.
    System,
    /// User/human message.
    User,
    /// Assistant/model message.
    Assistant,
    /// Tool response message.
    Tool,
}

impl ChatRole {
    /// Returns the wire-format role tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is kept as the raw JSON text exactly as produced by the
/// model. Malformed payloads survive round-trips this way and can be
/// surfaced back to the model instead of poisoning deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned identifier correlating the response to this call.
    pub id: String,
    /// The tool to invoke.
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

impl ToolCallRequest {
    /// Creates a new tool-call request.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decodes the argument text as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the model produced malformed JSON.
    pub fn decode_arguments(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// A message in the conversation protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: ChatRole,
    /// Message content. For tool-response messages this is the encoded
    /// result payload.
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For tool-response messages, the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool-response messages, the tool that produced the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Optional human-readable note attached by a tool (a status string).
    /// Persisted with the message but never sent to the completion service
    /// and never counted toward the token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            annotation: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// Creates a tool-response message answering `call_id` with an encoded
    /// payload.
    #[must_use]
    pub fn tool_response(
        call_id: impl Into<String>,
        name: impl Into<String>,
        payload: &JsonValue,
    ) -> Self {
        let mut msg = Self::new(ChatRole::Tool, payload.to_string());
        msg.tool_call_id = Some(call_id.into());
        msg.tool_name = Some(name.into());
        msg
    }

    /// Adds a tool-call request to an assistant message.
    #[must_use]
    pub fn with_tool_call(mut self, call: ToolCallRequest) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Returns true if this message requests tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Returns a copy suitable for the wire: the annotation is stripped,
    /// everything else is untouched.
    #[must_use]
    pub fn for_wire(&self) -> Self {
        let mut msg = self.clone();
        msg.annotation = None;
        msg
    }

    /// Computes this message's token cost under `estimator`.
    ///
    /// The cost is a fixed per-message framing overhead plus a recursive
    /// walk of the structured fields: content (tool-response payloads are
    /// decoded and walked as JSON), the tool name, and every tool-call
    /// request's name and decoded argument object. Object keys count as
    /// string leaves; numbers, booleans, and null contribute nothing. An
    /// undecodable payload or argument string is costed as a single string
    /// leaf. Annotations never contribute.
    #[must_use]
    pub fn token_cost(&self, estimator: &dyn TokenEstimator) -> u32 {
        let mut total = MESSAGE_OVERHEAD_TOKENS;

        if !self.content.is_empty() {
            total += match self.role {
                ChatRole::Tool => json_text_cost(&self.content, estimator),
                _ => estimator.estimate(&self.content),
            };
        }

        if let Some(name) = &self.tool_name {
            total += estimator.estimate(name);
        }

        for call in &self.tool_calls {
            total += estimator.estimate(&call.name);
            total += json_text_cost(&call.arguments, estimator);
        }

        total
    }
}

/// Costs a string that should contain JSON: decoded and walked if valid,
/// costed as a plain string leaf otherwise.
fn json_text_cost(text: &str, estimator: &dyn TokenEstimator) -> u32 {
    match serde_json::from_str::<JsonValue>(text) {
        Ok(value) => json_value_cost(&value, estimator),
        Err(_) => estimator.estimate(text),
    }
}

/// Recursively sums the estimator cost of every string leaf in a JSON
/// value. Object keys count as string leaves.
fn json_value_cost(value: &JsonValue, estimator: &dyn TokenEstimator) -> u32 {
    match value {
        JsonValue::String(s) => estimator.estimate(s),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| json_value_cost(item, estimator))
            .sum(),
        JsonValue::Object(map) => map
            .iter()
            .map(|(key, item)| estimator.estimate(key) + json_value_cost(item, estimator))
            .sum(),
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) => 0,
    }
}

/// Token usage reported by the completion service for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the reply.
    pub completion_tokens: u32,
    /// Total tokens for the request.
    pub total_tokens: u32,
}

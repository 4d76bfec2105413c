//! Completion-service backend abstraction.
//!
//! The backend trait is the single seam between the conversation core and
//! a concrete provider transport. No provider wire format is assumed here;
//! an implementation maps [`CompletionRequest`] onto whatever its service
//! speaks and maps the reply back into a [`CompletionResponse`].

use crate::error::CompletionError;
use crate::message::{ChatMessage, TokenUsage};
use crate::schema::ToolSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Ordered role-tagged messages forming the prompt.
    pub messages: Vec<ChatMessage>,
    /// Tools advertised for this request. Empty means no tools offered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    /// Forces the model to call the named tool on this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl CompletionRequest {
    /// Creates a request from an assembled message list.
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    /// Advertises tools with this request.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    /// Forces a specific tool choice.
    #[must_use]
    pub fn with_tool_choice(mut self, name: impl Into<String>) -> Self {
        self.tool_choice = Some(name.into());
        self
    }
}

/// A reply from the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The model's reply, possibly carrying tool-call requests.
    pub message: ChatMessage,
    /// Token usage for this request, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Creates a response without usage figures.
    #[must_use]
    pub fn new(message: ChatMessage) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    /// Attaches usage figures.
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Trait for completion-service transports.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Performs one network round-trip to the completion service.
    ///
    /// # Errors
    ///
    /// Returns a [`CompletionError`] when the transport fails, the reply
    /// cannot be decoded, or the service returns an error payload.
    async fn complete(&self, request: &CompletionRequest)
    -> Result<CompletionResponse, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ToolSchema;

    #[test]
    fn request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Begin the tale.")])
            .with_tools(vec![ToolSchema::new("codex_lookup", "Search the codex")])
            .with_tool_choice("codex_lookup");

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tool_choice.as_deref(), Some("codex_lookup"));
    }

    #[test]
    fn response_with_usage() {
        let response = CompletionResponse::new(ChatMessage::assistant("Once upon a time..."))
            .with_usage(TokenUsage {
                prompt_tokens: 20,
                completion_tokens: 5,
                total_tokens: 25,
            });

        assert_eq!(response.usage.map(|u| u.total_tokens), Some(25));
    }

    #[test]
    fn request_serde_roundtrip() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("Guide the story."),
            ChatMessage::user("We enter the forest."),
        ]);

        let encoded = serde_json::to_string(&request).expect("serialize");
        let parsed: CompletionRequest = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(parsed.messages.len(), 2);
        assert!(parsed.tools.is_empty());
        assert!(parsed.tool_choice.is_none());
    }
}

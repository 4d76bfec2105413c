//! Tool dispatcher contract.
//!
//! The dispatcher is an explicit capability object handed to the session;
//! the session never reaches for an ambient tool registry. The active tool
//! set and instructions are re-evaluated on every completion step because
//! both may legitimately change as application state changes.

use crate::error::DispatchError;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use taleweaver_ai::ToolSchema;

/// Result of one tool execution.
///
/// A closed union of the two shapes a tool may return: a bare payload, or
/// a payload with a human-readable status string that becomes the turn
/// annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// A plain result payload.
    Payload(JsonValue),
    /// A payload plus a status note for the caller-facing view.
    Annotated {
        response: JsonValue,
        status_text: String,
    },
}

impl ToolOutcome {
    /// Returns the result payload.
    #[must_use]
    pub fn payload(&self) -> &JsonValue {
        match self {
            Self::Payload(payload) | Self::Annotated {
                response: payload, ..
            } => payload,
        }
    }

    /// Returns the status note, if any.
    #[must_use]
    pub fn status_text(&self) -> Option<&str> {
        match self {
            Self::Payload(_) => None,
            Self::Annotated { status_text, .. } => Some(status_text),
        }
    }
}

/// Trait supplying and executing the callable tools for a session.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Returns the tools currently callable.
    fn available_tools(&self) -> Vec<ToolSchema>;

    /// Returns the current system-prompt text.
    fn instructions(&self) -> String;

    /// Executes the named tool with decoded arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] for unknown tools, rejected arguments,
    /// or execution failures. The session feeds these back to the model as
    /// tool-response messages rather than aborting.
    async fn execute(&self, name: &str, args: &JsonValue) -> Result<ToolOutcome, DispatchError>;

    /// Clears dispatcher-side pending-change flags when a new turn starts.
    fn clear_pending_changes(&self) {}
}

//! AI primitives for the taleweaver platform.
//!
//! This crate provides the wire-level building blocks for talking to a
//! remote language-model completion service:
//!
//! - **Messages**: role-tagged chat messages, including tool-call requests
//!   and tool responses
//! - **Schemas**: typed tool advertisements sent alongside a request
//! - **Estimation**: pluggable token-cost estimation for budget accounting
//! - **Client**: the retrying completion client over an abstract backend
//!
//! The conversation protocol itself (turns, history, tool sequencing) lives
//! in `taleweaver-conversation`.

pub mod backend;
pub mod client;
pub mod error;
pub mod estimate;
pub mod message;
pub mod schema;

pub use backend::{CompletionBackend, CompletionRequest, CompletionResponse};
pub use client::{CompletionClient, RetryPolicy};
pub use error::CompletionError;
pub use estimate::{CharEstimator, TokenEstimator};
pub use message::{ChatMessage, ChatRole, TokenUsage, ToolCallRequest};
pub use schema::{ParameterKind, ToolParameter, ToolSchema};

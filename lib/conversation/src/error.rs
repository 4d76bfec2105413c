//! Error types for the conversation crate.
//!
//! - `DispatchError`: tool lookup/execution failures
//! - `StoreError`: thread-store persistence failures
//! - `SessionError`: failures surfaced by the session state machine

use std::fmt;
use taleweaver_ai::CompletionError;
use taleweaver_core::SessionId;

/// Errors from tool dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No tool with that name is currently available.
    UnknownTool { name: String },
    /// The arguments did not match what the tool expects.
    InvalidArguments { name: String, reason: String },
    /// The tool ran and failed.
    ExecutionFailed { name: String, reason: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool { name } => write!(f, "unknown tool: {name}"),
            Self::InvalidArguments { name, reason } => {
                write!(f, "invalid arguments for tool '{name}': {reason}")
            }
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Errors from thread-store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to load a blob.
    LoadFailed { reason: String },
    /// Failed to save a blob.
    SaveFailed { reason: String },
    /// Failed to delete a blob.
    DeleteFailed { reason: String },
    /// A loaded blob could not be decoded. Unrecoverable: a fresh session
    /// is never silently started over damaged state.
    Corrupt { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadFailed { reason } => write!(f, "thread load failed: {reason}"),
            Self::SaveFailed { reason } => write!(f, "thread save failed: {reason}"),
            Self::DeleteFailed { reason } => write!(f, "thread delete failed: {reason}"),
            Self::Corrupt { reason } => write!(f, "thread blob corrupt: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The completion client failed after exhausting retries.
    Completion(CompletionError),
    /// A thread-store operation failed.
    Store(StoreError),
    /// No snapshot exists for the session key.
    SnapshotMissing { key: SessionId },
    /// An operation needed an open turn but history has none.
    NoOpenTurn,
    /// The pending tool-call index does not exist in the last batch.
    PendingCallMissing { index: usize },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion(e) => write!(f, "completion failed: {e}"),
            Self::Store(e) => write!(f, "store operation failed: {e}"),
            Self::SnapshotMissing { key } => write!(f, "no snapshot for session {key}"),
            Self::NoOpenTurn => write!(f, "no turn is open"),
            Self::PendingCallMissing { index } => {
                write!(f, "pending tool call {index} not found in last batch")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Completion(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CompletionError> for SessionError {
    fn from(e: CompletionError) -> Self {
        Self::Completion(e)
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

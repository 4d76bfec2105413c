//! Conversation orchestration for the taleweaver platform.
//!
//! This crate drives the turn-by-turn protocol against a completion
//! service:
//!
//! - **Turn Record**: the atomic unit of one logical exchange
//! - **History**: chronological turns with token-budgeted selection
//! - **Session**: the state machine sequencing completions and tool calls
//! - **Dispatch**: the capability contract for callable tools
//! - **Store**: whole-blob persistence of conversation state

pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod session;
pub mod store;
pub mod turn;

pub use config::ChatConfig;
pub use dispatch::{ToolDispatcher, ToolOutcome};
pub use error::{DispatchError, SessionError, StoreError};
pub use history::History;
pub use session::{
    ChatSession, SessionPhase, SessionState, TurnInput, TurnOutcome, TurnStatus, UsageTotals,
};
pub use store::{MemoryThreadStore, SessionSnapshot, ThreadStore};
pub use turn::{TurnContent, TurnRecord};

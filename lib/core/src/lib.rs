//! Core domain types for the taleweaver platform.
//!
//! This crate provides the strongly-typed identifiers shared by the
//! conversation-orchestration crates.

pub mod id;

pub use id::{ParseIdError, SessionId, TurnId};

//! Token-cost estimation.
//!
//! The [`TokenEstimator`] trait abstracts over how text is mapped to an
//! integer token cost. The default [`CharEstimator`] uses a chars/4
//! heuristic that requires no external tokenizer; a provider-accurate
//! tokenizer can be plugged in behind the same trait.

/// Per-message fixed overhead approximating protocol framing cost.
///
/// Covers the role tag and message delimiters, so those are not run
/// through the estimator separately.
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Fixed overhead added once per assembled completion request.
pub const REQUEST_OVERHEAD_TOKENS: u32 = 3;

/// Fixed overhead per advertised tool in the tool schedule.
pub const TOOL_OVERHEAD_TOKENS: u32 = 6;

/// Fixed overhead per parameter block within a tool advertisement.
pub const PARAMETER_OVERHEAD_TOKENS: u32 = 3;

/// Estimates the token cost of a text string.
///
/// Implementations must be pure: identical input must always produce an
/// identical cost, since budget selection re-runs the estimate on every
/// prompt build. Must be thread-safe (`Send + Sync`).
pub trait TokenEstimator: Send + Sync {
    /// Estimates the token cost of `text`.
    fn estimate(&self, text: &str) -> u32;
}

/// Simple character-based token estimator (ceil of chars / 4).
///
/// Counts Unicode scalar values, not bytes, so multi-byte text is not
/// over-charged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenEstimator for CharEstimator {
    fn estimate(&self, text: &str) -> u32 {
        u32::try_from(text.chars().count().div_ceil(4)).unwrap_or(u32::MAX)
    }
}

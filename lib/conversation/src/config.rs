//! Session configuration.
//!
//! Strongly-typed configuration for the chat session, loadable from
//! environment variables via the `config` crate.

use serde::Deserialize;

/// Chat session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Token budget for the assembled prompt.
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,

    /// Completion-call ceiling used by the done check. Distinct from the
    /// hard per-turn call ceiling, which always applies.
    #[serde(default = "default_call_limit")]
    pub call_limit: u32,
}

fn default_token_budget() -> u32 {
    3072
}

fn default_call_limit() -> u32 {
    6
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            call_limit: default_call_limit(),
        }
    }
}

impl ChatConfig {
    /// Loads configuration from `TALEWEAVER`-prefixed environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a supplied value cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("TALEWEAVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

//! Engine configuration
//!
//! Tunables and user-facing fallback strings, deserializable from whatever
//! configuration source the host embeds the engine in.

use serde::Deserialize;
use std::time::Duration;

/// Configuration for the conversation engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Time-to-live for every session field and variable binding, in seconds
    pub session_ttl_secs: u64,

    /// Maximum consecutive failed question validations before termination
    pub max_question_retries: u32,

    /// Maximum consecutive unrecognized button replies before termination
    pub max_invalid_button_attempts: u32,

    /// Maximum nodes executed synchronously per inbound event; exceeding it
    /// surfaces a configuration defect instead of looping forever
    pub max_steps_per_event: usize,

    /// Sent when an external API call fails or cannot be templated
    pub api_fallback_message: String,

    /// Sent when the engine hits a node type it does not support
    pub generic_failure_message: String,

    /// Re-prompt for an unrecognized button reply; `{attempt}` and `{max}`
    /// are substituted with the current and maximum attempt counts
    pub invalid_reply_retry_message: String,

    /// Sent before terminating after too many unrecognized button replies
    pub invalid_reply_terminal_message: String,

    /// Re-prompt for a failed answer validation; `{attempt}` and `{max}`
    /// are substituted with the current and maximum attempt counts
    pub validation_retry_message: String,

    /// Sent before terminating after too many failed validations
    pub validation_terminal_message: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,
            max_question_retries: 3,
            max_invalid_button_attempts: 3,
            max_steps_per_event: 25,
            api_fallback_message:
                "Sorry, we could not fetch that information right now. Please try again later."
                    .to_string(),
            generic_failure_message:
                "Sorry, something went wrong with this conversation. Please start again."
                    .to_string(),
            invalid_reply_retry_message:
                "Please choose one of the buttons above ({attempt}/{max}).".to_string(),
            invalid_reply_terminal_message:
                "Too many unrecognized replies, ending this conversation.".to_string(),
            validation_retry_message:
                "That doesn't look valid, please try again ({attempt}/{max}).".to_string(),
            validation_terminal_message:
                "Too many invalid answers, ending this conversation.".to_string(),
        }
    }
}

impl EngineSettings {
    /// Session TTL as a [`Duration`]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Render a retry message template with attempt counts
    pub fn render_attempts(template: &str, attempt: u32, max: u32) -> String {
        template
            .replace("{attempt}", &attempt.to_string())
            .replace("{max}", &max.to_string())
    }
}

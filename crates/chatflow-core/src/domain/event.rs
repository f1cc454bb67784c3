//! Inbound event contract
//!
//! One normalized chat event as delivered by the webhook transport. Exactly
//! one of `text` or the button-reply pair is populated per event.

use serde::{Deserialize, Serialize};

/// An inbound chat event for one `(project, sender)` conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Sender identity within the messaging provider
    pub sender: String,

    /// Project whose flow graph handles this event
    pub project_id: String,

    /// Free-text message body, if this is a text event
    #[serde(default)]
    pub text: Option<String>,

    /// Provider reply id, if this is a button reply
    #[serde(default)]
    pub button_reply_id: Option<String>,

    /// Button title, if this is a button reply
    #[serde(default)]
    pub button_reply_title: Option<String>,
}

impl InboundEvent {
    /// Build a text event
    pub fn text(project_id: impl Into<String>, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            project_id: project_id.into(),
            text: Some(text.into()),
            button_reply_id: None,
            button_reply_title: None,
        }
    }

    /// Build a button-reply event
    pub fn button_reply(
        project_id: impl Into<String>,
        sender: impl Into<String>,
        reply_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            project_id: project_id.into(),
            text: None,
            button_reply_id: Some(reply_id.into()),
            button_reply_title: Some(title.into()),
        }
    }

    /// Whether this event is a button reply
    pub fn is_button_reply(&self) -> bool {
        self.button_reply_id.is_some() || self.button_reply_title.is_some()
    }

    /// The user-entered text: the message body, or the pressed button's
    /// title fed into the flow as ordinary text.
    pub fn effective_text(&self) -> &str {
        self.text
            .as_deref()
            .or(self.button_reply_title.as_deref())
            .unwrap_or("")
    }
}

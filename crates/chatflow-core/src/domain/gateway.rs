//! Messaging gateway capability
//!
//! Outbound provider contract: plain text, interactive button prompts, and
//! media by URL. The engine never talks to a provider directly; gateways are
//! injected so tests can substitute a recording mock.

use async_trait::async_trait;

use crate::EngineError;

/// Maximum number of buttons a provider prompt may carry
pub const MAX_BUTTONS_PER_MESSAGE: usize = 3;

/// A button as sent to the messaging provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundButton {
    /// Provider-visible reply identifier
    pub id: String,

    /// Button label shown to the user
    pub title: String,
}

/// Outbound send contract for a messaging provider
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, to: &str, text: &str) -> Result<(), EngineError>;

    /// Send an interactive prompt with up to [`MAX_BUTTONS_PER_MESSAGE`] buttons
    async fn send_buttons(
        &self,
        to: &str,
        text: &str,
        buttons: &[OutboundButton],
    ) -> Result<(), EngineError>;

    /// Send media by URL with an optional caption
    async fn send_media(
        &self,
        to: &str,
        url: &str,
        media_kind: &str,
        caption: Option<&str>,
    ) -> Result<(), EngineError>;
}

//! Smart-button action resolution
//!
//! Buttons may carry a self-contained action payload (e.g.
//! `FETCH_AND_SEND_MEDIA`) that is resolved before and independently of any
//! flow routing: substitute the sender identity into the request template,
//! perform the call, map the response, send the result. Failures are
//! reported to the user with a generic fallback and never touch session
//! state.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::templating::render_sender;
use crate::domain::flow_graph::ButtonAction;
use crate::domain::gateway::MessagingGateway;
use crate::domain::http::{ApiRequest, ApiResponseKind, HttpFetcher};
use crate::EngineError;

/// Resolves smart-button actions against the outbound capabilities
pub struct ActionResolver {
    fetcher: Arc<dyn HttpFetcher>,
    gateway: Arc<dyn MessagingGateway>,
}

impl ActionResolver {
    /// Create a new action resolver
    pub fn new(fetcher: Arc<dyn HttpFetcher>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { fetcher, gateway }
    }

    /// Resolve one action for `sender`, reporting failures with
    /// `fallback_message` instead of propagating them.
    pub async fn resolve(
        &self,
        sender: &str,
        action: &ButtonAction,
        fallback_message: &str,
    ) -> Result<(), EngineError> {
        debug!(user = sender, action = %action.kind, "Resolving smart-button action");

        match self.perform(sender, action).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    user = sender,
                    action = %action.kind,
                    error = %err,
                    "Smart-button action failed, sending fallback"
                );
                self.gateway.send_text(sender, fallback_message).await
            }
        }
    }

    async fn perform(&self, sender: &str, action: &ButtonAction) -> Result<(), EngineError> {
        let url = render_sender(&action.request.url, sender);
        let request = ApiRequest::from_spec(&action.request, url);

        let response = self.fetcher.fetch(&request).await?;
        let narrowed = action.response_mapping.narrow(&response)?;

        match action.response_mapping.kind {
            ApiResponseKind::Media => {
                let (media_url, caption) = action.response_mapping.media_fields(&narrowed)?;
                self.gateway
                    .send_media(sender, &media_url, "image", caption.as_deref())
                    .await
            }
            ApiResponseKind::Text => {
                let text = match narrowed.as_str() {
                    Some(s) => s.to_string(),
                    None => narrowed.to_string(),
                };
                self.gateway.send_text(sender, &text).await
            }
        }
    }
}

//! Input classification
//!
//! Decides which awaited-input path an inbound event takes before any node
//! is executed. The precedence is fixed by design (see DESIGN.md): awaited
//! buttons win, then a pending question, then a graph-wide button scan, and
//! only then positional continuation. Smart-button actions are resolved by
//! the engine before classification and never reach this module.

use tracing::debug;

use crate::domain::event::InboundEvent;
use crate::domain::flow_graph::{normalize_token, FlowGraph};
use crate::domain::session::{AwaitingButtons, SessionStore};

/// The routing decision for one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The reply matched one of the awaited node's buttons
    ButtonReply {
        /// The blocking buttons node
        node_id: String,
        /// The matched button title, used to select the labeled edge
        label: String,
    },

    /// The reply matched none of the awaited buttons
    InvalidButtonReply {
        /// The still-blocking record
        awaiting: AwaitingButtons,
    },

    /// A question is pending; the raw input goes to its validator
    QuestionAnswer {
        /// Raw, non-normalized answer text
        answer: String,
    },

    /// The token matched a button defined elsewhere in the graph
    GlobalButton {
        /// The buttons node owning the matched button
        node_id: String,
        /// The matched button title
        label: String,
    },

    /// Plain continuation from the stored position, or flow start
    Continuation {
        /// Stored position, `None` for a fresh or expired session
        position: Option<String>,
    },
}

/// Classify one inbound event against the session's pending-input markers
pub async fn classify(
    graph: &FlowGraph,
    session: &SessionStore<'_>,
    event: &InboundEvent,
) -> Classification {
    let token = normalize_token(event.effective_text());

    // 1. A blocking buttons node owns the reply outright.
    if let Some(awaiting) = session.awaiting().await {
        if let Some(choice) = awaiting.allowed.iter().find(|choice| {
            normalize_token(&choice.title) == token || normalize_token(&choice.id) == token
        }) {
            debug!(node_id = %awaiting.node_id, label = %choice.title, "Awaited button matched");
            return Classification::ButtonReply {
                node_id: awaiting.node_id.clone(),
                label: choice.title.clone(),
            };
        }
        debug!(node_id = %awaiting.node_id, token = %token, "Reply matched no awaited button");
        return Classification::InvalidButtonReply { awaiting };
    }

    // 2. A pending question consumes the raw input.
    if session.question_pending().await {
        return Classification::QuestionAnswer {
            answer: event.effective_text().to_string(),
        };
    }

    // 3. Graph-wide button scan: free text that spells a button defined
    //    anywhere in the graph jumps there.
    if let Some((node, button)) = graph.scan_buttons(&token) {
        debug!(node_id = %node.id, label = %button.title, "Global button scan matched");
        return Classification::GlobalButton {
            node_id: node.id.clone(),
            label: button.title.clone(),
        };
    }

    // 4. Positional continuation or flow start.
    Classification::Continuation {
        position: session.position().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{ButtonChoice, SessionScope};
    use crate::domain::store::ConversationStateStore;
    use crate::EngineError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Plain map-backed store; TTLs are ignored, which is fine for
    /// classification tests that never wait.
    struct MapStore {
        entries: Mutex<HashMap<String, Value>>,
    }

    impl MapStore {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ConversationStateStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Value, _ttl: Duration) -> Result<(), EngineError> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), EngineError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn graph() -> FlowGraph {
        serde_json::from_value(serde_json::json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "menu", "type": "buttons", "data": {"properties": {"buttons": [
                    {"title": "Opening Hours"},
                    {"title": "Support"}
                ]}}}
            ],
            "edges": []
        }))
        .unwrap()
    }

    fn session(store: &MapStore) -> SessionStore<'_> {
        SessionStore::new(store, SessionScope::new("p1", "u1"), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_awaited_button_spellings_resolve_identically() {
        let store = MapStore::new();
        let session = session(&store);
        session
            .set_awaiting(&AwaitingButtons {
                node_id: "menu".to_string(),
                allowed: vec![ButtonChoice {
                    id: "btn_0_opening_hours".to_string(),
                    title: "Opening Hours".to_string(),
                }],
            })
            .await;

        for spelling in ["Opening Hours", "  opening   hours ", "OPENING HOURS", "btn_0_opening_hours"] {
            let event = InboundEvent::text("p1", "u1", spelling);
            let classification = classify(&graph(), &session, &event).await;
            assert_eq!(
                classification,
                Classification::ButtonReply {
                    node_id: "menu".to_string(),
                    label: "Opening Hours".to_string(),
                },
                "spelling {:?} should match",
                spelling
            );
        }
    }

    #[tokio::test]
    async fn test_unmatched_reply_while_awaiting() {
        let store = MapStore::new();
        let session = session(&store);
        let awaiting = AwaitingButtons {
            node_id: "menu".to_string(),
            allowed: vec![ButtonChoice {
                id: "btn_0_yes".to_string(),
                title: "Yes".to_string(),
            }],
        };
        session.set_awaiting(&awaiting).await;

        let event = InboundEvent::text("p1", "u1", "maybe?");
        let classification = classify(&graph(), &session, &event).await;
        assert_eq!(classification, Classification::InvalidButtonReply { awaiting });
    }

    #[tokio::test]
    async fn test_question_pending_takes_raw_input() {
        let store = MapStore::new();
        let session = session(&store);
        session.set_question_pending().await;

        // Raw input must not be normalized for validation
        let event = InboundEvent::text("p1", "u1", "  User@Example.COM ");
        let classification = classify(&graph(), &session, &event).await;
        assert_eq!(
            classification,
            Classification::QuestionAnswer {
                answer: "  User@Example.COM ".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_global_scan_before_continuation() {
        let store = MapStore::new();
        let session = session(&store);
        session.set_position("some-node").await;

        let event = InboundEvent::text("p1", "u1", "support");
        let classification = classify(&graph(), &session, &event).await;
        assert_eq!(
            classification,
            Classification::GlobalButton {
                node_id: "menu".to_string(),
                label: "Support".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_continuation_fresh_and_resumed() {
        let store = MapStore::new();
        let session = session(&store);

        let event = InboundEvent::text("p1", "u1", "hi");
        assert_eq!(
            classify(&graph(), &session, &event).await,
            Classification::Continuation { position: None }
        );

        session.set_position("menu2").await;
        assert_eq!(
            classify(&graph(), &session, &event).await,
            Classification::Continuation {
                position: Some("menu2".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_awaiting_wins_over_global_scan() {
        let store = MapStore::new();
        let session = session(&store);
        // Awaiting a different node's buttons while typing another node's label
        let awaiting = AwaitingButtons {
            node_id: "other".to_string(),
            allowed: vec![ButtonChoice {
                id: "btn_0_ok".to_string(),
                title: "Ok".to_string(),
            }],
        };
        session.set_awaiting(&awaiting).await;

        let event = InboundEvent::text("p1", "u1", "Support");
        let classification = classify(&graph(), &session, &event).await;
        assert_eq!(classification, Classification::InvalidButtonReply { awaiting });
    }
}

//! Conversation session state
//!
//! A session is the collection of independently expiring store entries
//! tracking one user's progress through a project's flow: the position
//! pointer, the pending-input markers, the bounded retry counters, and the
//! variable bindings captured by question nodes.
//!
//! Store failures are handled best-effort here: reads fall back to "absent"
//! and writes are logged and dropped, so a flaky store degrades a session
//! instead of wedging it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use crate::domain::store::ConversationStateStore;

/// Session field holding the current node id
const FIELD_POSITION: &str = "position";
/// Session field holding the awaited-buttons record
const FIELD_AWAITING: &str = "awaiting";
/// Session field counting consecutive unrecognized button replies
const FIELD_INVALID_ATTEMPTS: &str = "invalid_attempts";
/// Session field marking a question as asked and unanswered
const FIELD_QUESTION_PENDING: &str = "question_pending";
/// Session field counting consecutive failed question validations
const FIELD_RETRIES: &str = "retries";

/// Key scope for one `(project, sender)` conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionScope {
    /// Project the flow graph belongs to
    pub project_id: String,

    /// Sender identity within the messaging provider
    pub sender: String,
}

impl SessionScope {
    /// Create a new session scope
    pub fn new(project_id: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            sender: sender.into(),
        }
    }

    /// Store key for a session field
    pub fn key(&self, field: &str) -> String {
        format!("{}:{}:{}", self.project_id, self.sender, field)
    }

    /// Store key for a variable binding
    pub fn var_key(&self, name: &str) -> String {
        format!("{}:{}:var:{}", self.project_id, self.sender, name)
    }
}

/// Record set while a buttons node is blocking on a reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwaitingButtons {
    /// The buttons node that is blocking
    pub node_id: String,

    /// Allowed reply choices (id + title pairs)
    pub allowed: Vec<ButtonChoice>,
}

/// One allowed reply for an awaited buttons node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ButtonChoice {
    /// Effective reply identifier
    pub id: String,

    /// Button title as shown to the user
    pub title: String,
}

/// Session accessor binding a scope, a store, and the session TTL.
///
/// Every write refreshes the written field's TTL, so an active conversation
/// keeps itself alive while an abandoned one ages out field by field.
pub struct SessionStore<'a> {
    store: &'a dyn ConversationStateStore,
    scope: SessionScope,
    ttl: Duration,
}

impl<'a> SessionStore<'a> {
    /// Bind a scope to a store with the configured session TTL
    pub fn new(store: &'a dyn ConversationStateStore, scope: SessionScope, ttl: Duration) -> Self {
        Self { store, scope, ttl }
    }

    /// The bound scope
    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    async fn read(&self, field: &str) -> Option<Value> {
        match self.store.get(&self.scope.key(field)).await {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    project_id = %self.scope.project_id,
                    user = %self.scope.sender,
                    field,
                    error = %err,
                    "State store read failed, treating field as absent"
                );
                None
            }
        }
    }

    async fn write(&self, field: &str, value: Value) {
        if let Err(err) = self.store.set(&self.scope.key(field), value, self.ttl).await {
            warn!(
                project_id = %self.scope.project_id,
                user = %self.scope.sender,
                field,
                error = %err,
                "State store write failed, continuing without persisting field"
            );
        }
    }

    async fn remove(&self, field: &str) {
        if let Err(err) = self.store.delete(&self.scope.key(field)).await {
            warn!(
                project_id = %self.scope.project_id,
                user = %self.scope.sender,
                field,
                error = %err,
                "State store delete failed"
            );
        }
    }

    /// Current node id, `None` when the session has not started or expired
    pub async fn position(&self) -> Option<String> {
        self.read(FIELD_POSITION)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Persist the current node id
    pub async fn set_position(&self, node_id: &str) {
        self.write(FIELD_POSITION, json!(node_id)).await;
    }

    /// The awaited-buttons record, if a buttons node is blocking
    pub async fn awaiting(&self) -> Option<AwaitingButtons> {
        let value = self.read(FIELD_AWAITING).await?;
        match serde_json::from_value(value) {
            Ok(awaiting) => Some(awaiting),
            Err(err) => {
                warn!(
                    project_id = %self.scope.project_id,
                    user = %self.scope.sender,
                    error = %err,
                    "Stored awaiting record is malformed, discarding it"
                );
                self.remove(FIELD_AWAITING).await;
                None
            }
        }
    }

    /// Record that a buttons node is blocking on a reply
    pub async fn set_awaiting(&self, awaiting: &AwaitingButtons) {
        match serde_json::to_value(awaiting) {
            Ok(value) => self.write(FIELD_AWAITING, value).await,
            Err(err) => {
                warn!(error = %err, "Failed to serialize awaiting record");
            }
        }
    }

    /// Clear the awaited-buttons record
    pub async fn clear_awaiting(&self) {
        self.remove(FIELD_AWAITING).await;
    }

    /// Whether a question has been asked and not yet answered
    pub async fn question_pending(&self) -> bool {
        self.read(FIELD_QUESTION_PENDING)
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Mark a question as asked and awaiting a validated answer
    pub async fn set_question_pending(&self) {
        self.write(FIELD_QUESTION_PENDING, json!(true)).await;
    }

    /// Clear the question-pending marker
    pub async fn clear_question_pending(&self) {
        self.remove(FIELD_QUESTION_PENDING).await;
    }

    /// Consecutive failed question validations
    pub async fn retries(&self) -> u32 {
        self.counter(FIELD_RETRIES).await
    }

    /// Persist the failed-validation counter
    pub async fn set_retries(&self, count: u32) {
        self.write(FIELD_RETRIES, json!(count)).await;
    }

    /// Consecutive unrecognized button replies
    pub async fn invalid_attempts(&self) -> u32 {
        self.counter(FIELD_INVALID_ATTEMPTS).await
    }

    /// Persist the unrecognized-reply counter
    pub async fn set_invalid_attempts(&self, count: u32) {
        self.write(FIELD_INVALID_ATTEMPTS, json!(count)).await;
    }

    async fn counter(&self, field: &str) -> u32 {
        self.read(field)
            .await
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(0)
    }

    /// A variable binding written by a question node
    pub async fn variable(&self, name: &str) -> Option<String> {
        match self.store.get(&self.scope.var_key(name)).await {
            Ok(value) => value.and_then(|v| v.as_str().map(str::to_string)),
            Err(err) => {
                warn!(
                    project_id = %self.scope.project_id,
                    user = %self.scope.sender,
                    variable = name,
                    error = %err,
                    "State store read failed for variable"
                );
                None
            }
        }
    }

    /// Store a variable binding with the session TTL
    pub async fn set_variable(&self, name: &str, value: &str) {
        if let Err(err) = self
            .store
            .set(&self.scope.var_key(name), json!(value), self.ttl)
            .await
        {
            warn!(
                project_id = %self.scope.project_id,
                user = %self.scope.sender,
                variable = name,
                error = %err,
                "State store write failed for variable"
            );
        }
    }

    /// Clear both pending-input markers and their retry counters
    pub async fn clear_pending_markers(&self) {
        self.remove(FIELD_AWAITING).await;
        self.remove(FIELD_INVALID_ATTEMPTS).await;
        self.remove(FIELD_QUESTION_PENDING).await;
        self.remove(FIELD_RETRIES).await;
    }

    /// Terminate the session: delete every session field.
    ///
    /// Variable bindings are left to their own TTLs; the store contract has
    /// no key listing, and an expired session must not erase answers a
    /// follow-up flow may still read before they age out.
    pub async fn clear_all(&self) {
        self.remove(FIELD_POSITION).await;
        self.clear_pending_markers().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_keys() {
        let scope = SessionScope::new("proj1", "+5511999990000");
        assert_eq!(scope.key("position"), "proj1:+5511999990000:position");
        assert_eq!(scope.var_key("email"), "proj1:+5511999990000:var:email");
    }

    #[test]
    fn test_awaiting_round_trip() {
        let awaiting = AwaitingButtons {
            node_id: "buttons-1".to_string(),
            allowed: vec![
                ButtonChoice {
                    id: "btn_0_yes".to_string(),
                    title: "Yes".to_string(),
                },
                ButtonChoice {
                    id: "no".to_string(),
                    title: "No".to_string(),
                },
            ],
        };

        let value = serde_json::to_value(&awaiting).unwrap();
        let parsed: AwaitingButtons = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, awaiting);
    }
}

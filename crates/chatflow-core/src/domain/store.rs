//! Conversation state store capability
//!
//! The engine persists all per-user session state through this interface so
//! that independent webhook invocations can resume a conversation. Every
//! entry carries its own time-to-live; expiry is the only garbage collection.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::EngineError;

/// A key-value store with per-key expiration backing conversation sessions
#[async_trait]
pub trait ConversationStateStore: Send + Sync {
    /// Get a value by key, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<Value>, EngineError>;

    /// Set a value with a time-to-live; overwrites refresh the TTL
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), EngineError>;

    /// Delete a value by key; deleting an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), EngineError>;
}

//! Conversation Store capability: per-conversation durable state,
//! history, drafts, clarification records, and an append-only event log.

mod memory;
#[cfg(feature = "redis-storage")]
mod redis_store;

pub use memory::InMemoryStore;
#[cfg(feature = "redis-storage")]
pub use redis_store::RedisStore;

use crate::domain::{ChatMessage, ConversationState};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One entry in a conversation's append-only event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()>;

    /// Most recent `max_messages` messages, chronological order. `None`
    /// returns the full history. Empty list if the conversation is absent
    /// or expired.
    async fn get_history(
        &self,
        conversation_id: &str,
        max_messages: Option<usize>,
    ) -> Result<Vec<ChatMessage>>;

    async fn save_state(&self, conversation_id: &str, state: &ConversationState) -> Result<()>;

    async fn get_state(&self, conversation_id: &str) -> Result<Option<ConversationState>>;

    async fn save_draft(&self, conversation_id: &str, draft: &str) -> Result<()>;

    async fn get_draft(&self, conversation_id: &str) -> Result<Option<String>>;

    async fn save_clarification_request(
        &self,
        conversation_id: &str,
        clarification_id: &str,
        questions: &[String],
    ) -> Result<()>;

    async fn save_clarification_response(
        &self,
        conversation_id: &str,
        clarification_id: &str,
        response: &str,
    ) -> Result<()>;

    async fn get_clarification_response(
        &self,
        conversation_id: &str,
        clarification_id: &str,
    ) -> Result<Option<String>>;

    async fn add_event(
        &self,
        conversation_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<String>;

    async fn get_events_since(
        &self,
        conversation_id: &str,
        last_id: &str,
    ) -> Result<Vec<StoredEvent>>;

    async fn extend_ttl(&self, conversation_id: &str, ttl_seconds: u64) -> Result<()>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;

    async fn exists(&self, conversation_id: &str) -> Result<bool>;
}

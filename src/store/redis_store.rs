//! Redis-backed conversation store. Key layout: `conv:{id}:history`,
//! `conv:{id}:state`, `conv:{id}:draft`, `clarify:{conv}:{clarify}:request`,
//! `clarify:{conv}:{clarify}:response`, `events:{id}`.

use super::{ConversationStore, StoredEvent};
use crate::domain::{ChatMessage, ConversationState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

fn history_key(conversation_id: &str) -> String {
    format!("conv:{conversation_id}:history")
}

fn state_key(conversation_id: &str) -> String {
    format!("conv:{conversation_id}:state")
}

fn draft_key(conversation_id: &str) -> String {
    format!("conv:{conversation_id}:draft")
}

fn clarify_request_key(conversation_id: &str, clarification_id: &str) -> String {
    format!("clarify:{conversation_id}:{clarification_id}:request")
}

fn clarify_response_key(conversation_id: &str, clarification_id: &str) -> String {
    format!("clarify:{conversation_id}:{clarification_id}:response")
}

fn events_key(conversation_id: &str) -> String {
    format!("events:{conversation_id}")
}

pub struct RedisStore {
    conn: ConnectionManager,
    default_ttl_seconds: u64,
}

impl RedisStore {
    pub async fn connect(url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| Error::Storage(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self {
            conn,
            default_ttl_seconds,
        })
    }

    fn map_err(e: redis::RedisError) -> Error {
        Error::Storage(e.to_string())
    }
}

#[async_trait]
impl ConversationStore for RedisStore {
    async fn save_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = history_key(conversation_id);
        let serialized = serde_json::to_string(message)?;
        let _: () = conn.rpush(&key, serialized).await.map_err(Self::map_err)?;
        let _: () = conn
            .expire(&key, self.default_ttl_seconds as i64)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get_history(
        &self,
        conversation_id: &str,
        max_messages: Option<usize>,
    ) -> Result<Vec<ChatMessage>> {
        let mut conn = self.conn.clone();
        let key = history_key(conversation_id);
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await.map_err(Self::map_err)?;
        let mut messages: Vec<ChatMessage> = raw
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect();
        if let Some(n) = max_messages {
            if messages.len() > n {
                messages = messages.split_off(messages.len() - n);
            }
        }
        Ok(messages)
    }

    async fn save_state(&self, conversation_id: &str, state: &ConversationState) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = state_key(conversation_id);
        let serialized = serde_json::to_string(state)?;
        let _: () = conn
            .set_ex(&key, serialized, self.default_ttl_seconds)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get_state(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        let mut conn = self.conn.clone();
        let key = state_key(conversation_id);
        let raw: Option<String> = conn.get(&key).await.map_err(Self::map_err)?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    async fn save_draft(&self, conversation_id: &str, draft: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = draft_key(conversation_id);
        let _: () = conn
            .set_ex(&key, draft, self.default_ttl_seconds)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get_draft(&self, conversation_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let key = draft_key(conversation_id);
        Ok(conn.get(&key).await.map_err(Self::map_err)?)
    }

    async fn save_clarification_request(
        &self,
        conversation_id: &str,
        clarification_id: &str,
        questions: &[String],
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = clarify_request_key(conversation_id, clarification_id);
        let serialized = serde_json::to_string(questions)?;
        let _: () = conn
            .set_ex(&key, serialized, self.default_ttl_seconds)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn save_clarification_response(
        &self,
        conversation_id: &str,
        clarification_id: &str,
        response: &str,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = clarify_response_key(conversation_id, clarification_id);
        let _: () = conn
            .set_ex(&key, response, self.default_ttl_seconds)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get_clarification_response(
        &self,
        conversation_id: &str,
        clarification_id: &str,
    ) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let key = clarify_response_key(conversation_id, clarification_id);
        Ok(conn.get(&key).await.map_err(Self::map_err)?)
    }

    async fn add_event(
        &self,
        conversation_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<String> {
        let mut conn = self.conn.clone();
        let key = events_key(conversation_id);
        let id: i64 = conn.incr(format!("{key}:seq"), 1).await.map_err(Self::map_err)?;
        let id = id.to_string();
        let entry = StoredEvent {
            id: id.clone(),
            event_type: event_type.to_string(),
            payload,
        };
        let serialized = serde_json::to_string(&entry)?;
        let _: () = conn.rpush(&key, serialized).await.map_err(Self::map_err)?;
        let _: () = conn
            .expire(&key, self.default_ttl_seconds as i64)
            .await
            .map_err(Self::map_err)?;
        Ok(id)
    }

    async fn get_events_since(
        &self,
        conversation_id: &str,
        last_id: &str,
    ) -> Result<Vec<StoredEvent>> {
        let mut conn = self.conn.clone();
        let key = events_key(conversation_id);
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await.map_err(Self::map_err)?;
        let events: Vec<StoredEvent> = raw
            .iter()
            .filter_map(|s| serde_json::from_str::<StoredEvent>(s).ok())
            .collect();
        let last_seq = last_id.parse::<i64>().ok();
        Ok(events
            .into_iter()
            .filter(|e| match (last_seq, e.id.parse::<i64>()) {
                (Some(last), Ok(current)) => current > last,
                _ => true,
            })
            .collect())
    }

    async fn extend_ttl(&self, conversation_id: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let state = self.get_state(conversation_id).await?;

        for key in [
            history_key(conversation_id),
            state_key(conversation_id),
            draft_key(conversation_id),
            events_key(conversation_id),
        ] {
            let _: () = conn.expire(&key, ttl_seconds as i64).await.map_err(Self::map_err)?;
        }

        // A pending clarification's own keys must track the conversation's
        // lifetime too, not just expire on their own shorter schedule.
        if let Some(clarification_id) = state.and_then(|s| s.pending_clarification).map(|c| c.clarification_id) {
            for key in [
                clarify_request_key(conversation_id, &clarification_id),
                clarify_response_key(conversation_id, &clarification_id),
            ] {
                let _: () = conn.expire(&key, ttl_seconds as i64).await.map_err(Self::map_err)?;
            }
        }

        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let state = self.get_state(conversation_id).await?;

        let mut keys = vec![
            history_key(conversation_id),
            state_key(conversation_id),
            draft_key(conversation_id),
            events_key(conversation_id),
            format!("{}:seq", events_key(conversation_id)),
        ];

        // Delete the pending clarification's keys too rather than leaving
        // them to expire on their own.
        if let Some(clarification_id) = state.and_then(|s| s.pending_clarification).map(|c| c.clarification_id) {
            keys.push(clarify_request_key(conversation_id, &clarification_id));
            keys.push(clarify_response_key(conversation_id, &clarification_id));
        }

        let _: () = conn.del(keys).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn exists(&self, conversation_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = state_key(conversation_id);
        Ok(conn.exists(&key).await.map_err(Self::map_err)?)
    }
}

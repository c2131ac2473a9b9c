//! Process-local conversation store. Used for tests and single-process
//! deployments.

use super::{ConversationStore, StoredEvent};
use crate::domain::{ChatMessage, ConversationState};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

struct Inner {
    history: HashMap<String, Vec<ChatMessage>>,
    state: HashMap<String, ConversationState>,
    drafts: HashMap<String, String>,
    clarification_requests: HashMap<String, Vec<String>>,
    clarification_responses: HashMap<String, String>,
    events: HashMap<String, Vec<StoredEvent>>,
    expiry: HashMap<String, DateTime<Utc>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            history: HashMap::new(),
            state: HashMap::new(),
            drafts: HashMap::new(),
            clarification_requests: HashMap::new(),
            clarification_responses: HashMap::new(),
            events: HashMap::new(),
            expiry: HashMap::new(),
        }
    }

    fn is_expired(&self, conversation_id: &str) -> bool {
        match self.expiry.get(conversation_id) {
            Some(expiry) => Utc::now() > *expiry,
            None => true,
        }
    }

    fn extend_expiry(&mut self, conversation_id: &str, ttl_seconds: u64) {
        self.expiry.insert(
            conversation_id.to_string(),
            Utc::now() + chrono::Duration::seconds(ttl_seconds as i64),
        );
    }

    fn clarification_key(conversation_id: &str, clarification_id: &str) -> String {
        format!("{conversation_id}:{clarification_id}")
    }
}

/// In-memory conversation store with a uniform TTL, refreshed on every
/// touch. Guarded by a single mutex — fine for the moderate concurrency a
/// single process sees; a sharded lock would be premature here.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    default_ttl_seconds: u64,
}

impl InMemoryStore {
    pub fn new(default_ttl_seconds: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            default_ttl_seconds,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(86_400)
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn save_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .history
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        let ttl = self.default_ttl_seconds;
        inner.extend_expiry(conversation_id, ttl);
        Ok(())
    }

    async fn get_history(
        &self,
        conversation_id: &str,
        max_messages: Option<usize>,
    ) -> Result<Vec<ChatMessage>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_expired(conversation_id) {
            return Ok(Vec::new());
        }
        let ttl = self.default_ttl_seconds;
        inner.extend_expiry(conversation_id, ttl);
        let history = inner
            .history
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        Ok(match max_messages {
            Some(n) if history.len() > n => history[history.len() - n..].to_vec(),
            _ => history,
        })
    }

    async fn save_state(&self, conversation_id: &str, state: &ConversationState) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state.insert(conversation_id.to_string(), state.clone());
        let ttl = self.default_ttl_seconds;
        inner.extend_expiry(conversation_id, ttl);
        Ok(())
    }

    async fn get_state(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_expired(conversation_id) {
            return Ok(None);
        }
        let found = inner.state.get(conversation_id).cloned();
        if found.is_some() {
            let ttl = self.default_ttl_seconds;
            inner.extend_expiry(conversation_id, ttl);
        }
        Ok(found)
    }

    async fn save_draft(&self, conversation_id: &str, draft: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .drafts
            .insert(conversation_id.to_string(), draft.to_string());
        let ttl = self.default_ttl_seconds;
        inner.extend_expiry(conversation_id, ttl);
        Ok(())
    }

    async fn get_draft(&self, conversation_id: &str) -> Result<Option<String>> {
        // Reading a draft does not refresh its TTL; only writes do.
        let inner = self.inner.lock().unwrap();
        if inner.is_expired(conversation_id) {
            return Ok(None);
        }
        Ok(inner.drafts.get(conversation_id).cloned())
    }

    async fn save_clarification_request(
        &self,
        conversation_id: &str,
        clarification_id: &str,
        questions: &[String],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let key = Inner::clarification_key(conversation_id, clarification_id);
        inner.clarification_requests.insert(key, questions.to_vec());
        Ok(())
    }

    async fn save_clarification_response(
        &self,
        conversation_id: &str,
        clarification_id: &str,
        response: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let key = Inner::clarification_key(conversation_id, clarification_id);
        inner
            .clarification_responses
            .insert(key, response.to_string());
        Ok(())
    }

    async fn get_clarification_response(
        &self,
        conversation_id: &str,
        clarification_id: &str,
    ) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        let key = Inner::clarification_key(conversation_id, clarification_id);
        Ok(inner.clarification_responses.get(&key).cloned())
    }

    async fn add_event(
        &self,
        conversation_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let events = inner.events.entry(conversation_id.to_string()).or_default();
        let id = events.len().to_string();
        events.push(StoredEvent {
            id: id.clone(),
            event_type: event_type.to_string(),
            payload,
        });
        Ok(id)
    }

    async fn get_events_since(
        &self,
        conversation_id: &str,
        last_id: &str,
    ) -> Result<Vec<StoredEvent>> {
        let inner = self.inner.lock().unwrap();
        let events = inner.events.get(conversation_id).cloned().unwrap_or_default();
        let start_idx = last_id.parse::<usize>().map(|n| n + 1).unwrap_or(0);
        Ok(events.into_iter().skip(start_idx).collect())
    }

    async fn extend_ttl(&self, conversation_id: &str, ttl_seconds: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.extend_expiry(conversation_id, ttl_seconds);
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        // Collect the pending clarification id (if any) before removing state,
        // so its request/response keys are cleaned up too.
        let pending_clarification_id = inner
            .state
            .get(conversation_id)
            .and_then(|s| s.pending_clarification.as_ref())
            .map(|c| c.clarification_id.clone());

        inner.history.remove(conversation_id);
        inner.state.remove(conversation_id);
        inner.drafts.remove(conversation_id);
        inner.events.remove(conversation_id);
        inner.expiry.remove(conversation_id);

        let prefix = format!("{conversation_id}:");
        inner
            .clarification_requests
            .retain(|k, _| !k.starts_with(&prefix));
        inner
            .clarification_responses
            .retain(|k, _| !k.starts_with(&prefix));

        if let Some(clarification_id) = pending_clarification_id {
            let key = Inner::clarification_key(conversation_id, &clarification_id);
            inner.clarification_requests.remove(&key);
            inner.clarification_responses.remove(&key);
        }

        Ok(())
    }

    async fn exists(&self, conversation_id: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(!inner.is_expired(conversation_id) && inner.state.contains_key(conversation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConversationState;

    #[tokio::test]
    async fn save_and_get_history_round_trips() {
        let store = InMemoryStore::default();
        store.save_message("c1", &ChatMessage::user("hi")).await.unwrap();
        store
            .save_message("c1", &ChatMessage::assistant("hello"))
            .await
            .unwrap();

        let history = store.get_history("c1", None).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn get_history_limits_to_max_messages() {
        let store = InMemoryStore::default();
        for i in 0..5 {
            store
                .save_message("c1", &ChatMessage::user(format!("m{i}")))
                .await
                .unwrap();
        }
        let history = store.get_history("c1", Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content.as_deref(), Some("m4"));
    }

    #[tokio::test]
    async fn missing_conversation_has_empty_history_and_does_not_exist() {
        let store = InMemoryStore::default();
        assert!(store.get_history("ghost", None).await.unwrap().is_empty());
        assert!(!store.exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn exists_true_only_after_state_saved() {
        let store = InMemoryStore::default();
        store
            .save_state("c1", &ConversationState::new("c1", None))
            .await
            .unwrap();
        assert!(store.exists("c1").await.unwrap());
    }

    #[tokio::test]
    async fn delete_conversation_removes_every_key_including_clarifications() {
        let store = InMemoryStore::default();
        let mut state = ConversationState::new("c1", None);
        state.pending_clarification = Some(crate::domain::ClarificationState::new(
            "clar-1",
            vec!["which env?".into()],
        ));
        store.save_state("c1", &state).await.unwrap();
        store
            .save_clarification_request("c1", "clar-1", &["which env?".to_string()])
            .await
            .unwrap();
        store
            .save_clarification_response("c1", "clar-1", "prod")
            .await
            .unwrap();

        store.delete_conversation("c1").await.unwrap();

        assert!(!store.exists("c1").await.unwrap());
        assert!(store
            .get_clarification_response("c1", "clar-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn draft_get_does_not_refresh_ttl_but_extends_on_save() {
        let store = InMemoryStore::new(1);
        store.save_draft("c1", "draft text").await.unwrap();
        let draft = store.get_draft("c1").await.unwrap();
        assert_eq!(draft.as_deref(), Some("draft text"));
    }

    #[tokio::test]
    async fn events_since_returns_strictly_later_entries() {
        let store = InMemoryStore::default();
        let id0 = store
            .add_event("c1", "PROCESSING_STARTED", serde_json::json!({}))
            .await
            .unwrap();
        store
            .add_event("c1", "CHAT_ENDED", serde_json::json!({}))
            .await
            .unwrap();

        let events = store.get_events_since("c1", &id0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "CHAT_ENDED");
    }
}

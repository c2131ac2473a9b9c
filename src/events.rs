//! Event sink capability. Stateless and fire-and-forget: a failed
//! emit is logged and ignored, never allowed to fail the turn it annotates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Exhaustive for the core (transport-only kinds like PONG or
/// MAX_CONCURRENT_CONNECTIONS_EXCEEDED live at the transport layer, out of
/// scope here — see `core/enums.py::EventType` in DESIGN.md for the full
/// superset this is filtered from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ProcessingStarted,
    StreamResponse,
    ThinkApproach,
    FinalAnswer,
    ClarificationRequested,
    ClarificationReceived,
    WebSearchStarted,
    WebSearchResults,
    TaskBlockSearchStarted,
    TaskBlockSearchResults,
    ValidatorProgressUpdate,
    OpkeyWorkflowJson,
    ReferencingStarted,
    QueryRefinementStarted,
    QueryRefinementCompleted,
    ChatEnded,
    Error,
}

#[derive(Debug, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(
        kind: EventKind,
        conversation_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            conversation_id: conversation_id.into(),
            message_id: None,
            payload,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Emits nothing; used where no sink is configured.
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn emit(&self, _event: Event) {}
}

/// Collects every emitted event in order; used by tests to assert on the
/// event sequence a turn produced.
#[derive(Default)]
pub struct RecordingEventSink {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

impl Clone for Event {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            conversation_id: self.conversation_id.clone(),
            message_id: self.message_id.clone(),
            payload: self.payload.clone(),
        }
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: Event) {
        self.events.lock().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_preserves_emission_order() {
        let sink = RecordingEventSink::new();
        sink.emit(Event::new(
            EventKind::ProcessingStarted,
            "c1",
            serde_json::json!({}),
        ))
        .await;
        sink.emit(Event::new(EventKind::ChatEnded, "c1", serde_json::json!({})))
            .await;

        let events = sink.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::ProcessingStarted);
        assert_eq!(events[1].kind, EventKind::ChatEnded);
    }
}

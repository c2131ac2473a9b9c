//! Query Preprocessors: three named strategies behind one
//! trait, selected at construction via `Features.query_refinement_mode`.
//! Grounded on `agents/preprocessors/query_refinement.py` and
//! `agents/preprocessors/inline_refinement.py`.

use crate::domain::{ChatMessage, UserInfo};
use crate::events::{Event, EventKind, EventSink};
use crate::llm::LlmProvider;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait QueryPreprocessor: Send + Sync {
    async fn preprocess(
        &self,
        conversation_id: &str,
        message: &str,
        history: &[ChatMessage],
        user_info: Option<&UserInfo>,
    ) -> String;
}

/// Returns the message unchanged. The default when `query_refinement_mode`
/// is `Disabled`.
pub struct PassthroughPreprocessor;

#[async_trait]
impl QueryPreprocessor for PassthroughPreprocessor {
    async fn preprocess(
        &self,
        _conversation_id: &str,
        message: &str,
        _history: &[ChatMessage],
        _user_info: Option<&UserInfo>,
    ) -> String {
        message.to_string()
    }
}

const INLINE_GUIDANCE: &str = "\n\n---\n\
[System Guidance - Query Refinement]\n\
Before building the workflow, consider:\n\
1. Use web_search and task_block_search to discover available blocks.\n\
2. For multi-environment operations, create separate blocks per environment.\n\
3. Prefer pre-built task blocks over AI/Manual blocks when available.\n\
4. Use think_approach to outline your plan before building.\n";

/// Appends fixed guidance directly to the user message. No LLM call, zero
/// added latency.
pub struct InlinePreprocessor;

#[async_trait]
impl QueryPreprocessor for InlinePreprocessor {
    async fn preprocess(
        &self,
        _conversation_id: &str,
        message: &str,
        _history: &[ChatMessage],
        _user_info: Option<&UserInfo>,
    ) -> String {
        format!("{message}{INLINE_GUIDANCE}")
    }
}

const REFINEMENT_SYSTEM_PROMPT: &str = "You refine user requests into detailed guidance for a \
workflow planner. Expand the request with concrete research directions and multi-environment \
considerations, without inventing requirements the user did not ask for.";

const REFINEMENT_TEMPERATURE: f32 = 0.5;

/// Issues a separate LLM call to refine the query before planning. Emits
/// QUERY_REFINEMENT_STARTED / QUERY_REFINEMENT_COMPLETED around the call.
/// On any LLM failure, falls back to the original message unchanged.
pub struct SeparateCallPreprocessor {
    llm: Arc<dyn LlmProvider>,
    events: Option<Arc<dyn EventSink>>,
}

impl SeparateCallPreprocessor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm, events: None }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    async fn emit(&self, conversation_id: &str, kind: EventKind) {
        if let Some(events) = &self.events {
            events.emit(Event::new(kind, conversation_id, serde_json::json!({}))).await;
        }
    }
}

#[async_trait]
impl QueryPreprocessor for SeparateCallPreprocessor {
    async fn preprocess(
        &self,
        conversation_id: &str,
        message: &str,
        _history: &[ChatMessage],
        _user_info: Option<&UserInfo>,
    ) -> String {
        self.emit(conversation_id, EventKind::QueryRefinementStarted).await;

        let messages = vec![
            ChatMessage::system(REFINEMENT_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Transform this user query by adding comprehensive guidance for the workflow planner:\n\n{message}"
            )),
        ];

        let refined = match self.llm.generate(&messages, None, REFINEMENT_TEMPERATURE, None).await {
            Ok(response) => response.content.unwrap_or_else(|| message.to_string()),
            Err(_) => message.to_string(),
        };

        self.emit(conversation_id, EventKind::QueryRefinementCompleted).await;
        refined
    }
}

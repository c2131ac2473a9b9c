//! Referencing Agent: runs after validation succeeds, asking the
//! validator LLM to reconcile cross-block references against the full
//! conversation. Grounded on `agents/referencing.py`.

use crate::domain::{ChatMessage, MessageRole, Workflow};
use crate::events::{Event, EventKind, EventSink};
use crate::llm::LlmProvider;
use regex::Regex;
use std::sync::Arc;

const REFERENCING_TEMPERATURE: f32 = 0.2;

const REFERENCING_SYSTEM_PROMPT: &str = "Review the workflow below against the conversation \
and correct any output variable references that should point at a different block's output. \
Return only the corrected workflow as a JSON object with workflow_json and edges.";

pub struct ReferencingAgent {
    llm: Arc<dyn LlmProvider>,
    events: Option<Arc<dyn EventSink>>,
}

impl ReferencingAgent {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm, events: None }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns `workflow` unchanged on any LLM or parse failure.
    pub async fn run(
        &self,
        conversation_id: &str,
        history: &[ChatMessage],
        workflow: &Workflow,
    ) -> Workflow {
        if let Some(events) = &self.events {
            events
                .emit(Event::new(
                    EventKind::ReferencingStarted,
                    conversation_id,
                    serde_json::json!({}),
                ))
                .await;
        }

        let conversation_text = flatten_history(history);
        let workflow_json = match serde_json::to_string_pretty(workflow) {
            Ok(json) => json,
            Err(_) => return workflow.clone(),
        };

        let messages = vec![
            ChatMessage::system(REFERENCING_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Conversation:\n{conversation_text}\n\nWorkflow:\n{workflow_json}"
            )),
        ];

        let response = match self.llm.generate(&messages, None, REFERENCING_TEMPERATURE, None).await {
            Ok(message) => message.content.unwrap_or_default(),
            Err(_) => return workflow.clone(),
        };

        parse_workflow_loose(&response).unwrap_or_else(|| workflow.clone())
    }
}

fn flatten_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .filter(|m| m.role == MessageRole::User || m.role == MessageRole::Assistant)
        .map(|m| format!("{}: {}", m.role_label(), m.content.clone().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Unlike the Planner's anchored fallback (literal `{"workflow_json"`
/// prefix), this anchors on the first `{` in the text — a looser fallback
/// appropriate to a prompt that asks for only the updated workflow object.
fn parse_workflow_loose(text: &str) -> Option<Workflow> {
    let fence = Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap();
    for capture in fence.captures_iter(text) {
        if let Some(json) = capture.get(1) {
            if let Ok(workflow) = serde_json::from_str::<Workflow>(json.as_str()) {
                return Some(workflow);
            }
        }
    }

    let start = text.find('{')?;
    let slice = &text[start..];
    let mut depth = 0i32;
    let mut end = None;
    for (idx, ch) in slice.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(idx + ch.len_utf8());
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end?;
    serde_json::from_str::<Workflow>(&slice[..end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::ChunkStream;
    use async_trait::async_trait;

    struct StubLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn generate_stream(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<Vec<serde_json::Value>>,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<ChunkStream> {
            unimplemented!()
        }

        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<Vec<serde_json::Value>>,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<ChatMessage> {
            Ok(ChatMessage::assistant(self.response.clone()))
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn sample_workflow() -> Workflow {
        Workflow::new(vec![crate::domain::Block::start("B001")], vec![])
    }

    #[tokio::test]
    async fn parses_bare_json_without_fence() {
        let agent = ReferencingAgent::new(Arc::new(StubLlm {
            response: "{\"workflow_json\":[{\"BlockId\":\"B001\",\"Name\":\"Start\",\"ActionCode\":\"Start\",\"Inputs\":[],\"Outputs\":[]}],\"edges\":[]}".into(),
        }));
        let result = agent.run("c1", &[], &sample_workflow()).await;
        assert_eq!(result.blocks.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_original_on_unparseable_response() {
        let agent = ReferencingAgent::new(Arc::new(StubLlm {
            response: "sorry, I can't help with that".into(),
        }));
        let original = sample_workflow();
        let result = agent.run("c1", &[], &original).await;
        assert_eq!(result.blocks.len(), original.blocks.len());
    }
}

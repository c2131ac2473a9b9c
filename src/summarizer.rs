//! Message Summarizer: collapses a long working message list into a
//! single synthetic summary message when the Planner's token threshold
//! trips. Pure with respect to durable state — the store is never touched.

use crate::domain::ChatMessage;
use crate::llm::LlmProvider;
use std::sync::Arc;

const SUMMARIZER_SYSTEM_PROMPT: &str = "Summarize the following conversation concisely, \
preserving the user's goal, any decisions made, and any information still needed to \
complete the task. Write the summary as plain prose.";

const SUMMARIZER_TEMPERATURE: f32 = 0.1;

pub struct MessageSummarizer {
    llm: Arc<dyn LlmProvider>,
}

impl MessageSummarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Returns `messages` unchanged if it has 2 or fewer entries, or on any
    /// LLM failure. Otherwise returns `[system?, synthetic summary user
    /// message]`.
    pub async fn summarize(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        if messages.len() <= 2 {
            return messages.to_vec();
        }

        let system = messages.iter().find(|m| m.role == crate::domain::MessageRole::System).cloned();
        let conversation_text = format_conversation(messages);

        let call_messages = vec![
            ChatMessage::system(SUMMARIZER_SYSTEM_PROMPT),
            ChatMessage::user(conversation_text),
        ];

        match self
            .llm
            .generate(&call_messages, None, SUMMARIZER_TEMPERATURE, None)
            .await
        {
            Ok(response) => {
                let summary_text = response.content.unwrap_or_default();
                let summary_message =
                    ChatMessage::user(format!("[Conversation Summary]\n{summary_text}"));
                match system {
                    Some(system) => vec![system, summary_message],
                    None => vec![summary_message],
                }
            }
            Err(_) => messages.to_vec(),
        }
    }
}

fn format_conversation(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role != crate::domain::MessageRole::System)
        .map(|m| format!("{}: {}", m.role_label(), m.content.clone().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::ChunkStream;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubLlm {
        fail: AtomicBool,
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
            unimplemented!("summarizer only calls generate")
        }

        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<Vec<serde_json::Value>>,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<ChatMessage> {
            if self.fail.load(Ordering::SeqCst) {
                Err(crate::error::Error::llm_provider("stub", "boom"))
            } else {
                Ok(ChatMessage::assistant("the user wants to export HCM config"))
            }
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn short_history_is_returned_unchanged() {
        let summarizer = MessageSummarizer::new(Arc::new(StubLlm {
            fail: AtomicBool::new(false),
        }));
        let messages = vec![ChatMessage::user("hi")];
        let result = summarizer.summarize(&messages).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn long_history_collapses_to_summary_with_system_preserved() {
        let summarizer = MessageSummarizer::new(Arc::new(StubLlm {
            fail: AtomicBool::new(false),
        }));
        let messages = vec![
            ChatMessage::system("you are a workflow planner"),
            ChatMessage::user("export HCM config"),
            ChatMessage::assistant("sure, which module?"),
            ChatMessage::user("Benefits"),
        ];
        let result = summarizer.summarize(&messages).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].role, crate::domain::MessageRole::System);
        assert!(result[1].content.as_ref().unwrap().starts_with("[Conversation Summary]"));
    }

    #[tokio::test]
    async fn llm_failure_returns_original_list_unchanged() {
        let summarizer = MessageSummarizer::new(Arc::new(StubLlm {
            fail: AtomicBool::new(true),
        }));
        let messages = vec![
            ChatMessage::user("a"),
            ChatMessage::assistant("b"),
            ChatMessage::user("c"),
        ];
        let result = summarizer.summarize(&messages).await;
        assert_eq!(result.len(), 3);
    }
}

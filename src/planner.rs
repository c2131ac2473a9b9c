//! Planner: a bounded tool-calling loop over the LLM Gateway and Tool
//! Registry, grounded on `agents/planner.py`. Returns an explicit outcome
//! rather than raising, except for the one control-flow signal
//! (`ClarificationRequired`) that legitimately unwinds the loop.

use crate::domain::{ChatMessage, ToolCall, Workflow};
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::llm::LlmProvider;
use crate::summarizer::MessageSummarizer;
use crate::tools::{tool_definitions, ToolRegistry};
use crate::wire::assistant_message_from_parts;
use futures::StreamExt;
use regex::Regex;
use std::sync::Arc;

const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_SUMMARIZATION_TOKEN_LIMIT: usize = 100_000;
const PLANNER_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone)]
pub enum PlannerOutcome {
    WorkflowProduced { text: String, workflow: Workflow },
    TextOnly { text: String },
    ClarificationNeeded { clarification_id: String, questions: Vec<String> },
}

pub struct PlannerConfig {
    pub max_iterations: usize,
    pub token_summarization_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            token_summarization_limit: DEFAULT_SUMMARIZATION_TOKEN_LIMIT,
        }
    }
}

pub struct Planner {
    llm: Arc<dyn LlmProvider>,
    registry: ToolRegistry,
    summarizer: Option<Arc<MessageSummarizer>>,
    events: Arc<dyn EventSink>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        registry: ToolRegistry,
        summarizer: Option<Arc<MessageSummarizer>>,
        events: Arc<dyn EventSink>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            summarizer,
            events,
            config,
        }
    }

    /// Runs the bounded tool-calling loop. `working_messages` should already
    /// contain the system prompt followed by conversation history; this
    /// method mutates and returns nothing back into it — callers own history.
    pub async fn run(
        &self,
        conversation_id: &str,
        mut working_messages: Vec<ChatMessage>,
    ) -> Result<PlannerOutcome> {
        let tool_defs = tool_definitions(&self.registry);

        for _iteration in 0..self.config.max_iterations {
            if let Some(summarizer) = &self.summarizer {
                if estimate_prompt_tokens(&working_messages) > self.config.token_summarization_limit {
                    working_messages = self.apply_summarization(summarizer, working_messages).await;
                }
            }

            let chat_response = self
                .stream_turn(conversation_id, &working_messages, tool_defs.clone())
                .await?;

            let accumulated_text = chat_response.content.clone().unwrap_or_default();

            let Some(tool_calls) = chat_response.tool_calls.clone() else {
                return Ok(self.finish_without_tool_calls(accumulated_text));
            };
            if tool_calls.is_empty() {
                return Ok(self.finish_without_tool_calls(accumulated_text));
            }

            working_messages.push(ChatMessage::assistant_with_tool_calls(
                chat_response.content.clone(),
                tool_calls.clone(),
            ));

            let mut pending_workflow: Option<(String, Workflow)> = None;

            for call in &tool_calls {
                match call.name.as_str() {
                    "think_approach" => {
                        self.events
                            .emit(Event::new(
                                EventKind::ThinkApproach,
                                conversation_id,
                                serde_json::json!({ "reasoning": call.arguments.get("reasoning") }),
                            ))
                            .await;
                        working_messages.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            serde_json::json!({ "acknowledged": true }).to_string(),
                        ));
                    }
                    "present_answer" => {
                        self.events
                            .emit(Event::new(
                                EventKind::FinalAnswer,
                                conversation_id,
                                serde_json::json!({ "content": call.arguments.get("content") }),
                            ))
                            .await;
                        working_messages.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            serde_json::json!({ "delivered": true }).to_string(),
                        ));
                    }
                    "submit_workflow" => {
                        let (result, workflow) = self.handle_submit_workflow(call);
                        if let Some(workflow) = workflow {
                            pending_workflow = Some((accumulated_text.clone(), workflow));
                        }
                        working_messages.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            result.to_string(),
                        ));
                    }
                    "clarify" => {
                        let Some(executor) = self.registry.get("clarify") else {
                            return Err(Error::other("clarify tool not registered"));
                        };
                        let output = executor
                            .execute(serde_json::Value::Object(call.arguments.clone()))
                            .await?;
                        let clarification_id = output["clarification_id"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string();
                        let questions: Vec<String> = output["questions"]
                            .as_array()
                            .map(|arr| {
                                arr.iter()
                                    .filter_map(|v| v.as_str().map(str::to_string))
                                    .collect()
                            })
                            .unwrap_or_default();
                        return Ok(PlannerOutcome::ClarificationNeeded {
                            clarification_id,
                            questions,
                        });
                    }
                    name => {
                        let result = self.dispatch_registry_tool(conversation_id, name, call).await;
                        working_messages.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            result.to_string(),
                        ));
                    }
                }
            }

            if let Some((text, workflow)) = pending_workflow {
                return Ok(PlannerOutcome::WorkflowProduced { text, workflow });
            }
        }

        // Iteration cap reached: return whatever the last assistant turn said.
        let last_text = working_messages
            .iter()
            .rev()
            .find(|m| m.role == crate::domain::MessageRole::Assistant)
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        Ok(self.finish_without_tool_calls(last_text))
    }

    fn finish_without_tool_calls(&self, text: String) -> PlannerOutcome {
        match parse_workflow_from_text(&text) {
            Some(workflow) => PlannerOutcome::WorkflowProduced { text, workflow },
            None => PlannerOutcome::TextOnly { text },
        }
    }

    fn handle_submit_workflow(&self, call: &ToolCall) -> (serde_json::Value, Option<Workflow>) {
        let value = serde_json::Value::Object(call.arguments.clone());
        match serde_json::from_value::<Workflow>(value) {
            Ok(workflow) => {
                let errors = workflow.validate_structure();
                if errors.is_empty() {
                    (serde_json::json!({ "status": "accepted" }), Some(workflow))
                } else {
                    (
                        serde_json::json!({ "status": "needs_revision", "errors": errors }),
                        None,
                    )
                }
            }
            Err(e) => (
                serde_json::json!({
                    "status": "needs_revision",
                    "errors": [format!("could not parse workflow: {e}")]
                }),
                None,
            ),
        }
    }

    async fn dispatch_registry_tool(
        &self,
        conversation_id: &str,
        name: &str,
        call: &ToolCall,
    ) -> serde_json::Value {
        let Some(executor) = self.registry.get(name) else {
            return serde_json::json!({ "error": format!("Unknown tool: {name}") });
        };

        self.events
            .emit(Event::new(
                tool_started_event_kind(name),
                conversation_id,
                serde_json::json!({ "tool": name, "arguments": call.arguments }),
            ))
            .await;

        let outcome = executor
            .execute(serde_json::Value::Object(call.arguments.clone()))
            .await;

        match outcome {
            Ok(result) => {
                self.events
                    .emit(Event::new(
                        tool_results_event_kind(name),
                        conversation_id,
                        result.clone(),
                    ))
                    .await;
                result
            }
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        }
    }

    async fn apply_summarization(
        &self,
        summarizer: &MessageSummarizer,
        working_messages: Vec<ChatMessage>,
    ) -> Vec<ChatMessage> {
        summarizer.summarize(&working_messages).await
    }

    /// Streams one assistant turn, forwarding each content delta as a
    /// `StreamResponse` event as it arrives, then reassembles the full
    /// message once the stream completes.
    async fn stream_turn(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
        tools: Vec<serde_json::Value>,
    ) -> Result<ChatMessage> {
        let mut stream = self
            .llm
            .generate_stream(messages, Some(tools), PLANNER_TEMPERATURE, None)
            .await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let is_final_text = chunk.is_complete && !chunk.has_tool_calls();

            if chunk.has_tool_calls() {
                tool_calls = chunk.tool_calls;
            }

            if let Some(text) = chunk.content {
                if is_final_text {
                    content = text;
                } else {
                    self.events
                        .emit(Event::new(
                            EventKind::StreamResponse,
                            conversation_id,
                            serde_json::json!({ "content": text }),
                        ))
                        .await;
                    content.push_str(&text);
                }
            }
        }

        Ok(assistant_message_from_parts(
            if content.is_empty() { None } else { Some(content) },
            tool_calls,
        ))
    }
}

fn tool_started_event_kind(name: &str) -> EventKind {
    match name {
        "task_block_search" => EventKind::TaskBlockSearchStarted,
        _ => EventKind::WebSearchStarted,
    }
}

fn tool_results_event_kind(name: &str) -> EventKind {
    match name {
        "task_block_search" => EventKind::TaskBlockSearchResults,
        _ => EventKind::WebSearchResults,
    }
}

/// `(total_chars + 10*msg_count) / 4`, minimum 1. `total_chars` sums each
/// message's role-name length plus content length. Deliberately distinct
/// from [`crate::context::estimate_tokens`] — see DESIGN.md.
pub fn estimate_prompt_tokens(messages: &[ChatMessage]) -> usize {
    let total_chars: usize = messages
        .iter()
        .map(|m| m.role.as_str().len() + m.content.as_deref().unwrap_or("").len())
        .sum();
    let estimate = (total_chars + 10 * messages.len()) / 4;
    estimate.max(1)
}

/// Best-effort extraction of a workflow from free-form assistant text: first
/// try fenced JSON blocks containing both `workflow_json` and `edges` keys,
/// then fall back to balanced-brace extraction anchored on the literal
/// `{"workflow_json"` prefix.
pub fn parse_workflow_from_text(text: &str) -> Option<Workflow> {
    if let Some(workflow) = parse_fenced_json(text) {
        return Some(workflow);
    }
    parse_anchored_braces(text, "{\"workflow_json\"")
}

fn parse_fenced_json(text: &str) -> Option<Workflow> {
    let fence = Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap();
    for capture in fence.captures_iter(text) {
        let candidate = capture.get(1)?.as_str();
        if !candidate.contains("workflow_json") || !candidate.contains("edges") {
            continue;
        }
        if let Ok(workflow) = serde_json::from_str::<Workflow>(candidate) {
            return Some(workflow);
        }
    }
    None
}

fn parse_anchored_braces(text: &str, anchor: &str) -> Option<Workflow> {
    let start = text.find(anchor)?;
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

    #[test]
    fn estimate_prompt_tokens_never_zero_on_empty() {
        assert_eq!(estimate_prompt_tokens(&[]), 1);
    }

    #[test]
    fn estimate_prompt_tokens_grows_with_content() {
        let short = vec![ChatMessage::user("hi")];
        let long = vec![ChatMessage::user("a".repeat(1000))];
        assert!(estimate_prompt_tokens(&long) > estimate_prompt_tokens(&short));
    }

    #[test]
    fn parses_fenced_workflow_json() {
        let text = "Here is the workflow:\n```json\n{\"workflow_json\":[{\"BlockId\":\"B001\",\"Name\":\"Start\",\"ActionCode\":\"Start\",\"Inputs\":[],\"Outputs\":[]}],\"edges\":[]}\n```\ndone.";
        let workflow = parse_workflow_from_text(text).expect("should parse");
        assert_eq!(workflow.blocks.len(), 1);
    }

    #[test]
    fn falls_back_to_anchored_brace_extraction() {
        let text = "sure, {\"workflow_json\":[{\"BlockId\":\"B001\",\"Name\":\"Start\",\"ActionCode\":\"Start\",\"Inputs\":[],\"Outputs\":[]}],\"edges\":[]} there you go";
        let workflow = parse_workflow_from_text(text).expect("should parse");
        assert_eq!(workflow.blocks.len(), 1);
    }

    #[test]
    fn returns_none_when_no_workflow_present() {
        assert!(parse_workflow_from_text("just chatting, nothing structured here").is_none());
    }
}

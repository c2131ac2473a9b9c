//! OpenAI-compatible chat-completions wire types: outbound request shape,
//! inbound streaming chunk shape, and the tool-call delta reassembly that
//! streaming chunks require.

use crate::domain::{ChatMessage, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireFunction {
    pub name: String,
    /// Arguments are a JSON-encoded string on the wire, per the OpenAI API.
    pub arguments: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        WireMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        call_type: "function".to_string(),
                        function: WireFunction {
                            name: c.name.clone(),
                            arguments: serde_json::Value::Object(c.arguments.clone()).to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id.clone(),
            name: msg.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChunk {
    #[allow(dead_code)]
    pub id: Option<String>,
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChoice {
    #[serde(default)]
    pub delta: WireDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<WireFunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// A single assembled chunk handed back to callers of the gateway's
/// streaming API: a content delta and/or a completed tool-call list.
#[derive(Debug, Clone, Default)]
pub struct LlmStreamChunk {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub is_complete: bool,
}

impl LlmStreamChunk {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates tool-call fragments by index across streaming chunks and
/// flushes a complete tool-call list exactly once, on `finish_reason ==
/// "tool_calls"`. Per-turn state: drop and recreate at every turn boundary.
#[derive(Default)]
pub struct ToolCallAggregator {
    partials: BTreeMap<usize, PartialToolCall>,
    text: String,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one wire chunk; returns the assembled [`LlmStreamChunk`] for
    /// this iteration. `is_complete`/`tool_calls` are only populated once a
    /// non-null `finish_reason` has been observed.
    pub fn process_chunk(&mut self, chunk: WireChunk) -> LlmStreamChunk {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return LlmStreamChunk::default();
        };

        if let Some(content) = &choice.delta.content {
            self.text.push_str(content);
        }

        if let Some(deltas) = choice.delta.tool_calls {
            for delta in deltas {
                let entry = self.partials.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
        }

        let finish_reason = choice.finish_reason;
        let mut result = LlmStreamChunk {
            content: None,
            tool_calls: Vec::new(),
            finish_reason: finish_reason.clone(),
            is_complete: false,
        };

        match finish_reason.as_deref() {
            Some("tool_calls") => {
                result.tool_calls = self
                    .partials
                    .iter()
                    .map(|(_, p)| ToolCall {
                        id: p.id.clone(),
                        name: p.name.clone(),
                        arguments: parse_arguments(&p.arguments),
                    })
                    .collect();
                result.is_complete = true;
            }
            Some(_) => {
                result.content = Some(std::mem::take(&mut self.text));
                result.is_complete = true;
            }
            None => {
                if let Some(content) = &choice.delta.content {
                    result.content = Some(content.clone());
                }
            }
        }

        result
    }
}

fn parse_arguments(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Builds the outbound request for one LLM turn.
pub fn build_request(
    model: &str,
    messages: &[ChatMessage],
    tools: Option<Vec<serde_json::Value>>,
    temperature: f32,
    max_tokens: Option<u32>,
    stream: bool,
) -> WireRequest {
    WireRequest {
        model: model.to_string(),
        messages: messages.iter().map(WireMessage::from).collect(),
        stream,
        max_tokens,
        temperature: Some(temperature),
        tools,
        response_format: None,
    }
}

/// Reassembles a finished assistant message from an accumulated
/// non-streaming response body.
pub fn assistant_message_from_parts(content: Option<String>, tool_calls: Vec<ToolCall>) -> ChatMessage {
    if tool_calls.is_empty() {
        ChatMessage::assistant(content.unwrap_or_default())
    } else {
        ChatMessage::assistant_with_tool_calls(content, tool_calls)
    }
}

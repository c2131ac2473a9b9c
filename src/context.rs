//! Ambient context-window bookkeeping: a rough token estimate for history
//! and a simple truncation helper. This is deliberately a cruder,
//! general-purpose heuristic, distinct from the Planner's own summarization
//! trigger (`planner::estimate_prompt_tokens`) — see DESIGN.md open question
//! 3 for why the two formulas are kept separate rather than unified.

use crate::domain::{ChatMessage, MessageRole};

/// Character-based approximation, ~4 chars per token, plus flat per-message
/// and per-conversation overhead. An approximation, not an exact tokenizer
/// count — always keep a safety margin when checking against a hard limit.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;
    for message in messages {
        total_chars += 8; // role formatting overhead
        if let Some(content) = &message.content {
            total_chars += content.len();
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                total_chars += call.name.len();
                total_chars += call.id.len();
                total_chars += serde_json::Value::Object(call.arguments.clone()).to_string().len();
            }
        }
    }
    total_chars += 16; // conversation-level overhead

    (total_chars + 3) / 4
}

/// Keep the most recent `keep` messages, always preserving a leading system
/// message when `preserve_system` is set.
pub fn truncate_messages(messages: &[ChatMessage], keep: usize, preserve_system: bool) -> Vec<ChatMessage> {
    if messages.is_empty() {
        return Vec::new();
    }
    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system = preserve_system && messages[0].role == MessageRole::System;

    if has_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start.max(1)..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

pub fn is_approaching_limit(messages: &[ChatMessage], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_zero_tokens() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn estimate_grows_with_content() {
        let short = vec![ChatMessage::user("hi")];
        let long = vec![ChatMessage::user("x".repeat(1000))];
        assert!(estimate_tokens(&long) > estimate_tokens(&short));
    }

    #[test]
    fn truncate_preserves_leading_system_message() {
        let messages = vec![
            ChatMessage::system("system prompt"),
            ChatMessage::user("m1"),
            ChatMessage::user("m2"),
            ChatMessage::user("m3"),
            ChatMessage::user("m4"),
        ];
        let truncated = truncate_messages(&messages, 2, true);
        assert_eq!(truncated.len(), 3);
        assert_eq!(truncated[0].role, MessageRole::System);
    }

    #[test]
    fn truncate_without_preserve_keeps_plain_tail() {
        let messages = vec![
            ChatMessage::system("system prompt"),
            ChatMessage::user("m1"),
            ChatMessage::user("m2"),
            ChatMessage::user("m3"),
        ];
        let truncated = truncate_messages(&messages, 2, false);
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].role, MessageRole::User);
    }

    #[test]
    fn approaching_limit_checks_margin() {
        let messages = vec![ChatMessage::user("x".repeat(1000))];
        assert!(!is_approaching_limit(&messages, 1000, 0.9));
        assert!(is_approaching_limit(&messages, 200, 0.9));
    }
}

//! Conversation state record, the orchestrator's durable state-machine value.

use super::message::UserInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    AwaitingClarification,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationState {
    pub clarification_id: String,
    pub questions: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl ClarificationState {
    pub fn new(clarification_id: impl Into<String>, questions: Vec<String>) -> Self {
        Self {
            clarification_id: clarification_id.into(),
            questions,
            created_at: Utc::now(),
            response: None,
            responded_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_clarification: Option<ClarificationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_response: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>, user_info: Option<UserInfo>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            user_info,
            pending_clarification: None,
            draft_response: None,
            metadata: HashMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_is_active_with_no_pending_clarification() {
        let state = ConversationState::new("c1", None);
        assert_eq!(state.status, ConversationStatus::Active);
        assert!(state.pending_clarification.is_none());
    }
}

//! Conversation and workflow domain types.

mod conversation;
mod message;
mod templates;
mod workflow;

pub use conversation::{ClarificationState, ConversationState, ConversationStatus};
pub use message::{Attachment, ChatMessage, MessageRole, ToolCall, UserInfo};
pub use templates::{
    ai_block_template, apply_discovery_snapshot_defaults, is_custom_action_code,
    manual_block_template, normalize_custom_action_code, AI_ACTION_CODE,
    DISCOVERY_SNAPSHOT_ACTION_CODE, MANUAL_ACTION_CODE,
};
pub use workflow::{next_edge_id, numeric_suffix, Block, Edge, Input, Output, Workflow, START_ACTION_CODE};

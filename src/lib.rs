//! # Reasoning Workflow Engine
//!
//! A conversational workflow-planning engine: an LLM tool-calling
//! orchestrator that turns natural-language requests into validated
//! automation-block graphs (directed graphs of `Block`s and `Edge`s).
//!
//! ## Architecture
//!
//! - **domain**: conversation and workflow types — the wire format both the
//!   Planner and the Validation Pipeline read and write.
//! - **llm**: the LLM Gateway capability, an OpenAI-compatible chat-completions
//!   client over HTTP/SSE.
//! - **tools**: the Tool Registry and its built-in executors (web search,
//!   task-block search, clarify).
//! - **planner**: the bounded tool-calling loop that turns conversation
//!   history into a candidate workflow or a clarification request.
//! - **validate**: the three-stage Validation Pipeline (structural check,
//!   edge-connection repair, LLM-backed per-block correction).
//! - **referencing**: a post-validation pass that reconciles cross-block
//!   output references against the full conversation.
//! - **summarizer**: conversation history compaction once a token budget is
//!   exceeded.
//! - **preprocess**: the three query-preprocessing strategies (passthrough,
//!   inline augmentation, separate-call refinement).
//! - **few_shot**: example workflows injected into the Planner's system
//!   prompt.
//! - **job_name**: human-readable job name generation for a validated
//!   workflow.
//! - **store**: the Conversation Store capability, with in-memory and
//!   (feature-gated) Redis-backed implementations.
//! - **orchestrator**: the public entry point wiring every capability above
//!   into the conversation lifecycle state machine.

mod context;
mod error;
mod wire;

pub mod config;
pub mod domain;
pub mod events;
pub mod few_shot;
pub mod job_name;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod preprocess;
pub mod referencing;
pub mod retry;
pub mod search;
pub mod store;
pub mod summarizer;
pub mod tools;
pub mod validate;

pub use config::init_tracing;
pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};
pub use error::{Error, Result};
pub use orchestrator::{ConversationLocks, Orchestrator, OrchestratorConfig};

/// Convenience module for the types most embedders need: construct a
/// [`Config`](config::Config), assemble an [`Orchestrator`], and drive it
/// through the conversation lifecycle.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::{ChatMessage, ConversationState, ConversationStatus, UserInfo, Workflow};
    pub use crate::error::{Error, Result};
    pub use crate::events::{Event, EventKind, EventSink};
    pub use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    pub use crate::store::ConversationStore;
}

//! Error taxonomy for the reasoning engine.
//!
//! The enum is closed deliberately: every kind that can reach a client has a
//! fixed, sanitized `(code, message)` pair via [`Error::client_mapping`], so a
//! raw error never leaks provider URLs, API keys, or stack traces to a user.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The taxonomy of failures the core can surface.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport, decode, or API failure talking to an LLM provider.
    #[error("LLM provider '{provider}' failed: {message}")]
    LlmProvider { provider: String, message: String },

    /// A tool executor raised rather than returning a result the LLM can read.
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Conversation store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A structural invariant was violated at pipeline entry.
    #[error("workflow validation failed: {0:?}")]
    Validation(Vec<String>),

    /// Planner output could not be coerced into a workflow at all.
    #[error("could not parse a workflow from model output: {0}")]
    WorkflowParse(String),

    /// Operation targeted an absent or expired conversation.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// Control-flow signal: the planner needs the user to answer questions
    /// before it can continue. Not logged as an error by the orchestrator.
    #[error("clarification required: {clarification_id}")]
    ClarificationRequired {
        clarification_id: String,
        questions: Vec<String>,
    },

    /// A clarification response was supplied but didn't match the pending
    /// clarification id, or there was no pending clarification at all.
    #[error("clarification mismatch: {0}")]
    ClarificationMismatch(String),

    /// Transport-layer connection cap exceeded.
    #[error("maximum concurrent connections ({0}) exceeded")]
    MaxConnectionsExceeded(usize),

    /// HTTP transport failure underlying an LLM or search call.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Everything else.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn llm_provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::LlmProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn validation(errors: Vec<String>) -> Self {
        Error::Validation(errors)
    }

    pub fn workflow_parse(msg: impl Into<String>) -> Self {
        Error::WorkflowParse(msg.into())
    }

    pub fn conversation_not_found(conversation_id: impl Into<String>) -> Self {
        Error::ConversationNotFound(conversation_id.into())
    }

    pub fn clarification_required(
        clarification_id: impl Into<String>,
        questions: Vec<String>,
    ) -> Self {
        Error::ClarificationRequired {
            clarification_id: clarification_id.into(),
            questions,
        }
    }

    pub fn clarification_mismatch(msg: impl Into<String>) -> Self {
        Error::ClarificationMismatch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True for the one kind that is a control-flow signal rather than a
    /// failure; callers must not log this as an error or mark state ERROR.
    pub fn is_clarification_required(&self) -> bool {
        matches!(self, Error::ClarificationRequired { .. })
    }

    /// Sanitized (code, message) pair safe to forward to a client.
    pub fn client_mapping(&self) -> (&'static str, &'static str) {
        match self {
            Error::LlmProvider { .. } => (
                "LLM_UNAVAILABLE",
                "The AI service is temporarily unavailable. Please try again.",
            ),
            Error::ToolExecution { .. } => (
                "TOOL_ERROR",
                "A search service is temporarily unavailable.",
            ),
            Error::Storage(_) => (
                "STORAGE_ERROR",
                "A temporary storage issue occurred. Please try again.",
            ),
            Error::Validation(_) => (
                "VALIDATION_ERROR",
                "We encountered an issue processing your workflow.",
            ),
            Error::WorkflowParse(_) => (
                "PARSE_ERROR",
                "We had trouble generating the workflow. Please try rephrasing your request.",
            ),
            Error::ConversationNotFound(_) => ("NOT_FOUND", "Conversation not found."),
            Error::ClarificationRequired { .. } => (
                "CLARIFICATION_REQUIRED",
                "Additional information is needed to proceed.",
            ),
            Error::ClarificationMismatch(_) => (
                "VALIDATION_ERROR",
                "We encountered an issue processing your workflow.",
            ),
            Error::MaxConnectionsExceeded(_) => (
                "MAX_CONNECTIONS",
                "Server is at capacity. Please try again later.",
            ),
            Error::Http(_) | Error::Json(_) | Error::Config(_) | Error::Other(_) => (
                "INTERNAL_ERROR",
                "An unexpected error occurred. Please try again.",
            ),
        }
    }
}

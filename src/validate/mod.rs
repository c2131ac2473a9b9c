//! Validation Pipeline: an ordered list of stages, each either
//! blocking (aborts the pipeline on error) or non-blocking/repairing
//! (produces a corrected workflow and continues).

mod edge_connection;
mod llm_block;
mod pipeline;
mod structural;

pub use edge_connection::EdgeConnectionStage;
pub use llm_block::{LlmBlockValidatorStage, LlmBlockValidatorConfig};
pub use pipeline::{ValidationPipeline, ValidationStrategy};
pub use structural::StructuralStage;

use crate::domain::Workflow;
use crate::error::Result;
use async_trait::async_trait;

/// Ambient context a stage may need beyond the workflow itself: the
/// originating user query and whether strict mode is active (warnings
/// promoted to errors in the Structural stage).
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub conversation_id: String,
    pub user_query: String,
    pub strict: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub corrected_workflow: Option<Workflow>,
}

impl ValidationResult {
    pub fn ok(corrected_workflow: Workflow) -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            corrected_workflow: Some(corrected_workflow),
        }
    }

    pub fn with_errors(errors: Vec<String>) -> Self {
        Self {
            errors,
            warnings: Vec::new(),
            corrected_workflow: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn merge_from(&mut self, other: &ValidationResult) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }
}

#[async_trait]
pub trait ValidationStage: Send + Sync {
    fn name(&self) -> &str;

    fn is_blocking(&self) -> bool;

    async fn validate(&self, workflow: &Workflow, context: &ValidationContext) -> Result<ValidationResult>;
}

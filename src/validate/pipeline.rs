//! Pipeline assembly and execution. The Orchestrator is constructed
//! with a [`ValidationStrategy`], converted once into a uniform
//! [`ValidationPipeline`] — call sites never branch on which variant was
//! supplied.

use super::{ValidationContext, ValidationResult, ValidationStage};
use crate::domain::Workflow;
use crate::error::Result;
use std::sync::Arc;

pub enum ValidationStrategy {
    Single(Arc<dyn ValidationStage>),
    Pipeline(ValidationPipeline),
}

impl ValidationStrategy {
    pub fn into_pipeline(self) -> ValidationPipeline {
        match self {
            ValidationStrategy::Single(stage) => ValidationPipeline::new(vec![stage]),
            ValidationStrategy::Pipeline(pipeline) => pipeline,
        }
    }
}

pub struct ValidationPipeline {
    stages: Vec<Arc<dyn ValidationStage>>,
}

impl ValidationPipeline {
    pub fn new(stages: Vec<Arc<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    pub async fn run(&self, workflow: &Workflow, context: &ValidationContext) -> Result<ValidationResult> {
        let mut combined = ValidationResult::default();
        let mut current = workflow.clone();

        for stage in &self.stages {
            let result = stage.validate(&current, context).await?;
            combined.merge_from(&result);

            if let Some(corrected) = &result.corrected_workflow {
                current = corrected.clone();
            }

            if stage.is_blocking() && !result.errors.is_empty() {
                return Ok(combined);
            }
        }

        combined.corrected_workflow = Some(current);
        Ok(combined)
    }
}

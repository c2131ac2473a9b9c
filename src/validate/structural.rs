//! Structural stage: purely local, no I/O, no LLM. Blocking — a
//! reported error here halts the pipeline before Edge Connection even runs.

use super::{ValidationContext, ValidationResult, ValidationStage};
use crate::domain::Workflow;
use crate::error::Result;
use crate::events::{Event, EventKind, EventSink};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Small built-in table of ActionCode -> required input names, used for the
/// known-action input heuristic. Not exhaustive; unknown action codes are
/// skipped entirely rather than penalized.
fn known_action_required_inputs() -> HashMap<&'static str, Vec<&'static str>> {
    HashMap::from([
        ("AskWilfred", vec!["Prompt"]),
        ("HumanDependent", vec!["Task"]),
        ("CreateDiscoverySnapshot", vec!["Application"]),
    ])
}

pub struct StructuralStage {
    events: Option<Arc<dyn EventSink>>,
}

impl StructuralStage {
    pub fn new() -> Self {
        Self { events: None }
    }

    pub fn with_events(events: Arc<dyn EventSink>) -> Self {
        Self { events: Some(events) }
    }

    async fn emit_progress(&self, conversation_id: &str, phase: &str) {
        if let Some(events) = &self.events {
            events
                .emit(Event::new(
                    EventKind::ValidatorProgressUpdate,
                    conversation_id,
                    serde_json::json!({ "stage": "structural", "phase": phase }),
                ))
                .await;
        }
    }
}

impl Default for StructuralStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValidationStage for StructuralStage {
    fn name(&self) -> &str {
        "structural"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    async fn validate(&self, workflow: &Workflow, context: &ValidationContext) -> Result<ValidationResult> {
        let block_id_pattern = Regex::new(r"^B\d{3}$").unwrap();
        let edge_id_pattern = Regex::new(r"^E\d{3}$").unwrap();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.emit_progress(&context.conversation_id, "structure").await;
        if workflow.blocks.is_empty() {
            errors.push("workflow must contain at least one block".to_string());
            return Ok(finish(&self.events, context, errors, warnings).await);
        }
        if workflow.blocks.len() > 1 && workflow.edges.is_empty() {
            warnings.push("multiple blocks present but no edges connect them".to_string());
        }

        self.emit_progress(&context.conversation_id, "blocks").await;
        let mut seen_block_ids = HashSet::new();
        let required_inputs = known_action_required_inputs();
        for block in &workflow.blocks {
            if !seen_block_ids.insert(block.block_id.as_str()) {
                errors.push(format!("duplicate BlockId: {}", block.block_id));
            }
            if !block_id_pattern.is_match(&block.block_id) {
                warnings.push(format!("BlockId {} does not match pattern B###", block.block_id));
            }
            if block.name.trim().is_empty() {
                errors.push(format!("block {} has an empty Name", block.block_id));
            }
            if block.action_code.trim().is_empty() {
                errors.push(format!("block {} has an empty ActionCode", block.block_id));
            }
            if let Some(required) = required_inputs.get(block.action_code.as_str()) {
                let have: HashSet<&str> = block.inputs.iter().map(|i| i.name.as_str()).collect();
                for name in required {
                    if !have.contains(name) {
                        warnings.push(format!(
                            "block {} ({}) is missing expected input {}",
                            block.block_id, block.action_code, name
                        ));
                    }
                }
            }
        }

        let start_blocks: Vec<_> = workflow.blocks.iter().filter(|b| b.is_start()).collect();
        if start_blocks.len() != 1 {
            errors.push(format!(
                "workflow must have exactly one Start block, found {}",
                start_blocks.len()
            ));
        }

        self.emit_progress(&context.conversation_id, "edges").await;
        let mut seen_edge_ids = HashSet::new();
        let block_ids: HashSet<&str> = workflow.blocks.iter().map(|b| b.block_id.as_str()).collect();
        for edge in &workflow.edges {
            if !seen_edge_ids.insert(edge.edge_id.as_str()) {
                errors.push(format!("duplicate EdgeID: {}", edge.edge_id));
            }
            if !edge_id_pattern.is_match(&edge.edge_id) {
                warnings.push(format!("EdgeID {} does not match pattern E###", edge.edge_id));
            }
            if !block_ids.contains(edge.from.as_str()) {
                errors.push(format!("edge {} references unknown From block {}", edge.edge_id, edge.from));
            }
            if !block_ids.contains(edge.to.as_str()) {
                errors.push(format!("edge {} references unknown To block {}", edge.edge_id, edge.to));
            }
            if edge.is_self_loop() {
                warnings.push(format!("edge {} is a self-loop on {}", edge.edge_id, edge.from));
            }
            if let Some(condition) = &edge.edge_condition {
                if condition != "true" && condition != "false" {
                    warnings.push(format!(
                        "edge {} has non-boolean EdgeCondition {:?}",
                        edge.edge_id, condition
                    ));
                }
            }
        }

        if start_blocks.len() == 1 {
            let start_id = &start_blocks[0].block_id;
            if workflow.edges.iter().any(|e| &e.to == start_id) {
                errors.push("Start block must have no incoming edges".to_string());
            }
        }

        self.emit_progress(&context.conversation_id, "references").await;
        let output_vars = workflow.all_output_variable_names();
        for block in &workflow.blocks {
            for input in &block.inputs {
                if let Some(reference) = &input.referenced_output_variable_name {
                    if !output_vars.contains(reference.as_str()) {
                        errors.push(format!(
                            "block {} input {} references unknown output variable {}",
                            block.block_id, input.name, reference
                        ));
                    }
                }
            }
        }

        self.emit_progress(&context.conversation_id, "flow").await;
        if let Some(start) = start_blocks.first() {
            let reachable = bfs_reachable(workflow, &start.block_id);
            for block in &workflow.blocks {
                if block.is_start() {
                    continue;
                }
                if !reachable.contains(block.block_id.as_str()) {
                    warnings.push(format!("block {} is unreachable from Start", block.block_id));
                }
                let participates = workflow
                    .edges
                    .iter()
                    .any(|e| e.from == block.block_id || e.to == block.block_id);
                if !participates {
                    warnings.push(format!("block {} is isolated (no edges at all)", block.block_id));
                }
            }
        }

        if context.strict {
            errors.extend(warnings.drain(..));
        }

        self.emit_progress(&context.conversation_id, "complete").await;
        Ok(finish(&self.events, context, errors, warnings).await)
    }
}

async fn finish(
    _events: &Option<Arc<dyn EventSink>>,
    _context: &ValidationContext,
    errors: Vec<String>,
    warnings: Vec<String>,
) -> ValidationResult {
    ValidationResult {
        errors,
        warnings,
        corrected_workflow: None,
    }
}

fn bfs_reachable<'a>(workflow: &'a Workflow, start_id: &str) -> HashSet<&'a str> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(start_id.to_string());
    visited.insert(start_id.to_string());

    let mut result = HashSet::new();
    while let Some(current) = queue.pop_front() {
        for block in &workflow.blocks {
            if block.block_id == current {
                result.insert(block.block_id.as_str());
            }
        }
        for edge in &workflow.edges {
            if edge.from == current && visited.insert(edge.to.clone()) {
                queue.push_back(edge.to.clone());
            }
        }
    }
    workflow
        .blocks
        .iter()
        .filter(|b| visited.contains(&b.block_id))
        .map(|b| b.block_id.as_str())
        .collect()
}

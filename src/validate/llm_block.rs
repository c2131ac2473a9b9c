//! LLM Block Validator stage: per-block correction against the task
//! block catalog, run with bounded concurrency. Blocking — a failure here
//! does abort the pipeline, but an individual block's failure is captured as
//! a warning rather than propagated.

use super::edge_connection::max_edge_suffix;
use super::{ValidationContext, ValidationResult, ValidationStage};
use crate::domain::{
    ai_block_template, apply_discovery_snapshot_defaults, is_custom_action_code,
    manual_block_template, normalize_custom_action_code, Block, Edge, Input, Output, Workflow,
};
use crate::error::Result;
use crate::events::{Event, EventKind, EventSink};
use crate::llm::LlmProvider;
use crate::search::{TaskBlockResultItem, TaskBlockSearchService};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

const VALIDATOR_TEMPERATURE: f32 = 0.3;
const SENTINEL_CUSTOM: &str = "NO MATCH - CUSTOM BLOCK";
const SENTINEL_NO_CHANGE: &str = "NO_CHANGES_NEEDED";

pub struct LlmBlockValidatorConfig {
    pub max_parallel: usize,
}

impl Default for LlmBlockValidatorConfig {
    fn default() -> Self {
        Self { max_parallel: 5 }
    }
}

pub struct LlmBlockValidatorStage {
    llm: Arc<dyn LlmProvider>,
    task_block_search: Arc<dyn TaskBlockSearchService>,
    events: Option<Arc<dyn EventSink>>,
    config: LlmBlockValidatorConfig,
}

impl LlmBlockValidatorStage {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        task_block_search: Arc<dyn TaskBlockSearchService>,
        config: LlmBlockValidatorConfig,
    ) -> Self {
        Self {
            llm,
            task_block_search,
            events: None,
            config,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    async fn validate_one_block(
        &self,
        block: &Block,
        workflow: &Workflow,
        context: &ValidationContext,
    ) -> BlockOutcome {
        let search_query = if !block.name.trim().is_empty() {
            &block.name
        } else {
            &block.action_code
        };

        let candidates = match self.task_block_search.search(search_query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                return BlockOutcome {
                    corrected_block: block.clone(),
                    add_edges: Vec::new(),
                    remove_edges: Vec::new(),
                    warning: Some(format!(
                        "block {} task-block search failed: {e}",
                        block.block_id
                    )),
                }
            }
        };

        let fast_path = candidates.iter().find(|c| c.action_code == block.action_code);

        let prompt = build_validation_prompt(block, &candidates, workflow, &context.user_query);
        let messages = vec![
            crate::domain::ChatMessage::system(
                "You validate a single workflow block against a catalog of known task blocks.",
            ),
            crate::domain::ChatMessage::user(prompt),
        ];

        let response = match self.llm.generate(&messages, None, VALIDATOR_TEMPERATURE, None).await {
            Ok(message) => message.content.unwrap_or_default(),
            Err(e) => {
                return BlockOutcome {
                    corrected_block: block.clone(),
                    add_edges: Vec::new(),
                    remove_edges: Vec::new(),
                    warning: Some(format!("block {} validator LLM call failed: {e}", block.block_id)),
                }
            }
        };

        let (add_edges, remove_edges) = parse_edge_instructions(&response);
        let mut corrected_block = route_response(block, &candidates, fast_path, &response);
        apply_discovery_snapshot_defaults(&mut corrected_block, chrono::Utc::now());

        BlockOutcome {
            corrected_block,
            add_edges,
            remove_edges,
            warning: None,
        }
    }
}

struct BlockOutcome {
    corrected_block: Block,
    add_edges: Vec<(String, String)>,
    remove_edges: Vec<(String, String)>,
    warning: Option<String>,
}

#[async_trait]
impl ValidationStage for LlmBlockValidatorStage {
    fn name(&self) -> &str {
        "llm_block_validator"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    async fn validate(&self, workflow: &Workflow, context: &ValidationContext) -> Result<ValidationResult> {
        if let Some(events) = &self.events {
            events
                .emit(Event::new(
                    EventKind::ValidatorProgressUpdate,
                    &context.conversation_id,
                    serde_json::json!({ "stage": "llm_block_validator", "phase": "start" }),
                ))
                .await;
        }

        let non_start: Vec<(usize, Block)> = workflow
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_start())
            .map(|(idx, b)| (idx, b.clone()))
            .collect();

        let outcomes: Vec<(usize, BlockOutcome)> = stream::iter(non_start.into_iter())
            .map(|(idx, block)| async move { (idx, self.validate_one_block(&block, workflow, context).await) })
            .buffer_unordered(self.config.max_parallel.max(1))
            .collect()
            .await;

        let mut warnings = Vec::new();
        let mut corrected_by_index: std::collections::HashMap<usize, Block> = std::collections::HashMap::new();
        let mut aggregated_add: Vec<(String, String)> = Vec::new();
        let mut aggregated_remove: HashSet<(String, String)> = HashSet::new();

        for (idx, outcome) in outcomes {
            if let Some(warning) = outcome.warning {
                warnings.push(warning);
            }
            corrected_by_index.insert(idx, outcome.corrected_block);
            aggregated_add.extend(outcome.add_edges);
            aggregated_remove.extend(outcome.remove_edges);
        }

        let mut blocks = Vec::with_capacity(workflow.blocks.len());
        for (idx, block) in workflow.blocks.iter().enumerate() {
            if block.is_start() {
                blocks.push(block.clone());
            } else {
                blocks.push(corrected_by_index.remove(&idx).unwrap_or_else(|| block.clone()));
            }
        }

        let mut edges: Vec<Edge> = workflow
            .edges
            .iter()
            .filter(|e| !e.is_self_loop())
            .filter(|e| !aggregated_remove.contains(&(e.from.clone(), e.to.clone())))
            .cloned()
            .collect();

        edges = dedup_by_pair(edges);
        let mut seen_pairs: HashSet<(String, String)> =
            edges.iter().map(|e| (e.from.clone(), e.to.clone())).collect();

        let mut next_suffix = max_edge_suffix(&edges) + 1;
        for (from, to) in aggregated_add {
            let pair = (from.clone(), to.clone());
            if from == to || seen_pairs.contains(&pair) {
                continue;
            }
            seen_pairs.insert(pair);
            edges.push(Edge {
                edge_id: format!("E{next_suffix:03}"),
                from,
                to,
                edge_condition: None,
            });
            next_suffix += 1;
        }

        let mut corrected = Workflow::new(blocks, edges);
        corrected.job_name = workflow.job_name.clone();

        if let Some(events) = &self.events {
            events
                .emit(Event::new(
                    EventKind::ValidatorProgressUpdate,
                    &context.conversation_id,
                    serde_json::json!({ "stage": "llm_block_validator", "phase": "complete" }),
                ))
                .await;
        }

        Ok(ValidationResult {
            errors: Vec::new(),
            warnings,
            corrected_workflow: Some(corrected),
        })
    }
}

fn dedup_by_pair(edges: Vec<Edge>) -> Vec<Edge> {
    let mut seen = HashSet::new();
    edges
        .into_iter()
        .filter(|e| seen.insert((e.from.clone(), e.to.clone())))
        .collect()
}

fn build_validation_prompt(
    block: &Block,
    candidates: &[TaskBlockResultItem],
    workflow: &Workflow,
    user_query: &str,
) -> String {
    let block_json = serde_json::to_string_pretty(block).unwrap_or_default();
    let candidates_json = serde_json::to_string_pretty(candidates).unwrap_or_default();
    let workflow_json = serde_json::to_string_pretty(workflow).unwrap_or_default();
    format!(
        "User query: {user_query}\n\nBlock under review:\n{block_json}\n\nCandidate task blocks:\n{candidates_json}\n\nFull workflow:\n{workflow_json}\n\nRespond with {SENTINEL_NO_CHANGE} if the block is correct against a matching candidate, {SENTINEL_CUSTOM} if the block is intentionally a custom (non-catalog) action, or a fenced json block with a corrected block definition. Optionally include lines `Add: [...]` and `Remove: [...]` listing edge changes as {{\"From\":...,\"To\":...}} objects."
    )
}

fn route_response(
    original: &Block,
    candidates: &[TaskBlockResultItem],
    fast_path: Option<&TaskBlockResultItem>,
    response: &str,
) -> Block {
    if response.contains(SENTINEL_CUSTOM) && is_custom_action_code(&original.action_code) {
        return materialize_custom(original);
    }

    if response.contains(SENTINEL_NO_CHANGE) {
        if let Some(candidate) = fast_path {
            return materialize_task_block(original, candidate);
        }
        return original.clone();
    }

    match extract_last_fenced_json(response) {
        Some(corrected) => {
            if corrected.action_code == original.action_code
                && serde_json::to_string(&corrected).ok() == serde_json::to_string(original).ok()
            {
                return original.clone();
            }
            if let Some(candidate) = candidates.iter().find(|c| c.action_code == corrected.action_code) {
                materialize_task_block(&corrected, candidate)
            } else if is_custom_action_code(&corrected.action_code) {
                materialize_custom(&corrected)
            } else if let Some(candidate) = fast_path {
                materialize_task_block(original, candidate)
            } else {
                corrected
            }
        }
        None => original.clone(),
    }
}

fn materialize_custom(block: &Block) -> Block {
    let normalized = normalize_custom_action_code(&block.action_code);
    let mut template = if normalized == crate::domain::AI_ACTION_CODE {
        ai_block_template(&block.block_id)
    } else {
        manual_block_template(&block.block_id)
    };
    transplant_values(block, &mut template);
    template
}

fn materialize_task_block(block: &Block, candidate: &TaskBlockResultItem) -> Block {
    let inputs = candidate
        .input_names
        .iter()
        .map(|name| {
            block
                .inputs
                .iter()
                .find(|i| &i.name == name)
                .cloned()
                .unwrap_or_else(|| Input::unfilled(name))
        })
        .collect();
    let outputs = candidate
        .output_names
        .iter()
        .map(|name| {
            block
                .outputs
                .iter()
                .find(|o| &o.name == name)
                .cloned()
                .unwrap_or_else(|| Output {
                    name: name.clone(),
                    output_variable_name: Output::default_variable_name(&block.block_id, name),
                    description: None,
                })
        })
        .collect();

    Block {
        block_id: block.block_id.clone(),
        name: candidate.name.clone(),
        action_code: candidate.action_code.clone(),
        inputs,
        outputs,
    }
}

/// Copies the planner's provided input values onto a freshly instantiated
/// template by matching input names, preserving StaticValue and
/// ReferencedOutputVariableName where the planner supplied them.
fn transplant_values(source: &Block, template: &mut Block) {
    for input in &mut template.inputs {
        if let Some(provided) = source.inputs.iter().find(|i| i.name == input.name) {
            input.static_value = provided.static_value.clone();
            input.referenced_output_variable_name = provided.referenced_output_variable_name.clone();
        }
    }
}

fn extract_last_fenced_json(text: &str) -> Option<Block> {
    let fence = Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap();
    fence
        .captures_iter(text)
        .filter_map(|c| serde_json::from_str::<Block>(c.get(1)?.as_str()).ok())
        .last()
}

fn parse_edge_instructions(text: &str) -> (Vec<(String, String)>, Vec<(String, String)>) {
    (
        parse_edge_array(text, "Add"),
        parse_edge_array(text, "Remove"),
    )
}

fn parse_edge_array(text: &str, label: &str) -> Vec<(String, String)> {
    let pattern = format!(r"{label}:\s*(\[[\s\S]*?\])");
    let regex = Regex::new(&pattern).unwrap();
    let Some(captures) = regex.captures(text) else {
        return Vec::new();
    };
    let Some(raw) = captures.get(1) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.as_str()) else {
        return Vec::new();
    };
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let from = item.get("From")?.as_str()?.to_string();
                    let to = item.get("To")?.as_str()?.to_string();
                    Some((from, to))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_and_remove_edge_arrays() {
        let text = "Add: [{\"From\":\"B001\",\"To\":\"B002\"}]\nRemove: [{\"From\":\"B002\",\"To\":\"B003\"}]";
        let (add, remove) = parse_edge_instructions(text);
        assert_eq!(add, vec![("B001".to_string(), "B002".to_string())]);
        assert_eq!(remove, vec![("B002".to_string(), "B003".to_string())]);
    }

    #[test]
    fn missing_edge_instructions_default_to_empty() {
        let (add, remove) = parse_edge_instructions("NO_CHANGES_NEEDED");
        assert!(add.is_empty());
        assert!(remove.is_empty());
    }

    #[test]
    fn routes_no_change_with_fast_path_to_task_block_template() {
        let original = Block {
            block_id: "B002".into(),
            name: "Export".into(),
            action_code: "ExportConfigurations".into(),
            inputs: vec![],
            outputs: vec![],
        };
        let candidate = TaskBlockResultItem {
            block_id: "cat-1".into(),
            name: "Export Configurations".into(),
            description: "".into(),
            relevance_score: 1.0,
            action_code: "ExportConfigurations".into(),
            input_names: vec!["Module".into()],
            output_names: vec!["Output".into()],
        };
        let corrected = route_response(&original, &[candidate.clone()], Some(&candidate), SENTINEL_NO_CHANGE);
        assert_eq!(corrected.name, "Export Configurations");
        assert_eq!(corrected.inputs.len(), 1);
    }

    #[test]
    fn routes_custom_sentinel_to_custom_template() {
        let original = Block {
            block_id: "B003".into(),
            name: "Ask AI".into(),
            action_code: "AskWilfred".into(),
            inputs: vec![],
            outputs: vec![],
        };
        let corrected = route_response(&original, &[], None, SENTINEL_CUSTOM);
        assert_eq!(corrected.action_code, crate::domain::AI_ACTION_CODE);
    }
}

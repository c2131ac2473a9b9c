//! Edge Connection stage: non-blocking and repairing. Produces a
//! corrected workflow rather than merely reporting on the input.

use super::{ValidationContext, ValidationResult, ValidationStage};
use crate::domain::{next_edge_id, numeric_suffix, Block, Edge, Workflow};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;

pub struct EdgeConnectionStage;

impl EdgeConnectionStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EdgeConnectionStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValidationStage for EdgeConnectionStage {
    fn name(&self) -> &str {
        "edge_connection"
    }

    fn is_blocking(&self) -> bool {
        false
    }

    async fn validate(&self, workflow: &Workflow, _context: &ValidationContext) -> Result<ValidationResult> {
        let mut warnings = Vec::new();
        let mut blocks = workflow.blocks.clone();
        let mut edges = workflow.edges.clone();

        // Step 1: insert a Start block if missing, then wire every
        // previously-disconnected block to it.
        if !blocks.iter().any(|b| b.is_start()) {
            let has_b000 = blocks.iter().any(|b| b.block_id == "B000");
            let has_b999 = blocks.iter().any(|b| b.block_id == "B999");
            if has_b000 && has_b999 {
                return Err(Error::validation(vec![format!(
                    "cannot insert a synthetic Start block: both B000 and B999 are already taken by non-Start blocks"
                )]));
            }
            let start_id = if has_b000 { "B999" } else { "B000" };
            blocks.insert(0, Block::start(start_id));
            warnings.push(format!("no Start block present; inserted {start_id}"));

            let has_incoming: HashSet<String> = edges.iter().map(|e| e.to.clone()).collect();
            for block in blocks.iter().filter(|b| !b.is_start()) {
                if !has_incoming.contains(block.block_id.as_str()) {
                    let edge_id = next_edge_id(&edges);
                    edges.push(Edge {
                        edge_id,
                        from: start_id.to_string(),
                        to: block.block_id.clone(),
                        edge_condition: None,
                    });
                }
            }
        }

        // Step 2: dedup edges by (From, To), keeping the first occurrence.
        let mut seen_pairs = HashSet::new();
        let mut deduped = Vec::new();
        for edge in edges {
            let pair = (edge.from.clone(), edge.to.clone());
            if seen_pairs.insert(pair) {
                deduped.push(edge);
            } else {
                warnings.push(format!("removed duplicate edge {} -> {}", edge.from, edge.to));
            }
        }
        edges = deduped;

        // Step 3: remove self-loops.
        let mut no_self_loops = Vec::new();
        for edge in edges {
            if edge.is_self_loop() {
                warnings.push(format!("removed self-loop on {}", edge.from));
            } else {
                no_self_loops.push(edge);
            }
        }
        edges = no_self_loops;

        // Step 4: warn about non-Start blocks with no edges at all.
        for block in &blocks {
            if block.is_start() {
                continue;
            }
            let participates = edges.iter().any(|e| e.from == block.block_id || e.to == block.block_id);
            if !participates {
                warnings.push(format!("block {} participates in no edge", block.block_id));
            }
        }

        let mut corrected = Workflow::new(blocks, edges);
        corrected.job_name = workflow.job_name.clone();

        Ok(ValidationResult {
            errors: Vec::new(),
            warnings,
            corrected_workflow: Some(corrected),
        })
    }
}

/// Exposed for the LLM Block Validator stage, which continues edge id
/// numbering from whatever Edge Connection left behind.
pub fn max_edge_suffix(edges: &[Edge]) -> u32 {
    edges.iter().filter_map(|e| numeric_suffix(&e.edge_id)).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Output;

    fn block(id: &str, action: &str) -> Block {
        Block {
            block_id: id.into(),
            name: id.into(),
            action_code: action.into(),
            inputs: vec![],
            outputs: vec![Output {
                name: "Output".into(),
                output_variable_name: format!("op-{id}-Output"),
                description: None,
            }],
        }
    }

    #[tokio::test]
    async fn inserts_start_block_and_wires_disconnected_blocks() {
        let wf = Workflow::new(vec![block("B001", "Export")], vec![]);
        let stage = EdgeConnectionStage::new();
        let result = stage.validate(&wf, &ValidationContext::default()).await.unwrap();
        let corrected = result.corrected_workflow.unwrap();
        assert!(corrected.blocks.iter().any(|b| b.is_start()));
        assert_eq!(corrected.edges.len(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("inserted B000")));
    }

    #[tokio::test]
    async fn start_id_falls_back_to_b999_on_collision() {
        let wf = Workflow::new(vec![block("B000", "Export")], vec![]);
        let stage = EdgeConnectionStage::new();
        let result = stage.validate(&wf, &ValidationContext::default()).await.unwrap();
        let corrected = result.corrected_workflow.unwrap();
        assert!(corrected.blocks.iter().any(|b| b.block_id == "B999" && b.is_start()));
    }

    #[tokio::test]
    async fn errors_when_both_b000_and_b999_are_taken() {
        let wf = Workflow::new(vec![block("B000", "Export"), block("B999", "Export")], vec![]);
        let stage = EdgeConnectionStage::new();
        let result = stage.validate(&wf, &ValidationContext::default()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn dedups_edges_and_removes_self_loops() {
        let wf = Workflow::new(
            vec![Block::start("B000"), block("B001", "Export")],
            vec![
                Edge {
                    edge_id: "E001".into(),
                    from: "B000".into(),
                    to: "B001".into(),
                    edge_condition: None,
                },
                Edge {
                    edge_id: "E002".into(),
                    from: "B000".into(),
                    to: "B001".into(),
                    edge_condition: None,
                },
                Edge {
                    edge_id: "E003".into(),
                    from: "B001".into(),
                    to: "B001".into(),
                    edge_condition: None,
                },
            ],
        );
        let stage = EdgeConnectionStage::new();
        let result = stage.validate(&wf, &ValidationContext::default()).await.unwrap();
        let corrected = result.corrected_workflow.unwrap();
        assert_eq!(corrected.edges.len(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("duplicate edge")));
        assert!(result.warnings.iter().any(|w| w.contains("self-loop")));
    }
}

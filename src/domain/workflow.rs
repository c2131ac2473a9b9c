//! The workflow graph: blocks, edges, and the inputs/outputs that wire them
//! together.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const START_ACTION_CODE: &str = "Start";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "StaticValue", default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<String>,
    #[serde(
        rename = "ReferencedOutputVariableName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub referenced_output_variable_name: Option<String>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Input {
    pub fn unfilled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            static_value: None,
            referenced_output_variable_name: None,
            description: None,
        }
    }

    pub fn is_unfilled(&self) -> bool {
        self.static_value.is_none() && self.referenced_output_variable_name.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "OutputVariableName")]
    pub output_variable_name: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Output {
    /// The canonical `op-{block_id}-{output_name}` form used whenever a fresh
    /// output variable name must be synthesized for a block instantiation.
    pub fn default_variable_name(block_id: &str, output_name: &str) -> String {
        format!("op-{block_id}-{output_name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "BlockId")]
    pub block_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ActionCode")]
    pub action_code: String,
    #[serde(rename = "Inputs", default)]
    pub inputs: Vec<Input>,
    #[serde(rename = "Outputs", default)]
    pub outputs: Vec<Output>,
}

impl Block {
    pub fn is_start(&self) -> bool {
        self.action_code == START_ACTION_CODE
    }

    pub fn start(block_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            name: "Start".to_string(),
            action_code: START_ACTION_CODE.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "EdgeID")]
    pub edge_id: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "EdgeCondition", default, skip_serializing_if = "Option::is_none")]
    pub edge_condition: Option<String>,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Parses the numeric suffix of an id like `E003` or `B012`; used to keep
/// newly minted ids continuing past the highest one already present.
pub fn numeric_suffix(id: &str) -> Option<u32> {
    let digits: String = id.chars().skip_while(|c| !c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

pub fn next_edge_id(existing: &[Edge]) -> String {
    let max = existing
        .iter()
        .filter_map(|e| numeric_suffix(&e.edge_id))
        .max()
        .unwrap_or(0);
    format!("E{:03}", max + 1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(rename = "workflow_json")]
    pub blocks: Vec<Block>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
}

impl Workflow {
    pub fn new(blocks: Vec<Block>, edges: Vec<Edge>) -> Self {
        Self {
            blocks,
            edges,
            job_name: None,
        }
    }

    pub fn start_block(&self) -> Option<&Block> {
        self.blocks.iter().find(|b| b.is_start())
    }

    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_id == block_id)
    }

    pub fn all_output_variable_names(&self) -> HashSet<&str> {
        self.blocks
            .iter()
            .flat_map(|b| b.outputs.iter().map(|o| o.output_variable_name.as_str()))
            .collect()
    }

    /// The structural checks, exactly what `submit_workflow` runs
    /// before accepting a planner-produced workflow. The fuller
    /// heuristic pass with warnings lives in [`crate::validate::structural`].
    pub fn validate_structure(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.blocks.is_empty() {
            errors.push("workflow must contain at least one block".to_string());
            return errors;
        }

        let mut seen_block_ids = HashSet::new();
        for block in &self.blocks {
            if !seen_block_ids.insert(block.block_id.as_str()) {
                errors.push(format!("duplicate BlockId: {}", block.block_id));
            }
        }

        let mut seen_edge_ids = HashSet::new();
        for edge in &self.edges {
            if !seen_edge_ids.insert(edge.edge_id.as_str()) {
                errors.push(format!("duplicate EdgeID: {}", edge.edge_id));
            }
        }

        let start_blocks: Vec<&Block> = self.blocks.iter().filter(|b| b.is_start()).collect();
        if start_blocks.len() != 1 {
            errors.push(format!(
                "workflow must have exactly one Start block, found {}",
                start_blocks.len()
            ));
        } else {
            let start_id = &start_blocks[0].block_id;
            if self.edges.iter().any(|e| &e.to == start_id) {
                errors.push("Start block must have no incoming edges".to_string());
            }
        }

        let block_ids: HashSet<&str> = self.blocks.iter().map(|b| b.block_id.as_str()).collect();
        for edge in &self.edges {
            if !block_ids.contains(edge.from.as_str()) {
                errors.push(format!(
                    "edge {} references unknown From block {}",
                    edge.edge_id, edge.from
                ));
            }
            if !block_ids.contains(edge.to.as_str()) {
                errors.push(format!(
                    "edge {} references unknown To block {}",
                    edge.edge_id, edge.to
                ));
            }
        }

        let output_vars = self.all_output_variable_names();
        for block in &self.blocks {
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

        errors
    }

    pub fn is_structurally_valid(&self) -> bool {
        self.validate_structure().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_valid() -> Workflow {
        Workflow::new(
            vec![
                Block::start("B001"),
                Block {
                    block_id: "B002".into(),
                    name: "Export".into(),
                    action_code: "ExportConfigurations".into(),
                    inputs: vec![],
                    outputs: vec![Output {
                        name: "Output".into(),
                        output_variable_name: "op-B002-Output".into(),
                        description: None,
                    }],
                },
            ],
            vec![Edge {
                edge_id: "E001".into(),
                from: "B001".into(),
                to: "B002".into(),
                edge_condition: None,
            }],
        )
    }

    #[test]
    fn valid_workflow_has_no_errors() {
        assert!(sample_valid().validate_structure().is_empty());
    }

    #[test]
    fn rejects_empty_workflow() {
        let wf = Workflow::new(vec![], vec![]);
        assert!(!wf.validate_structure().is_empty());
    }

    #[test]
    fn rejects_missing_start() {
        let mut wf = sample_valid();
        wf.blocks.retain(|b| !b.is_start());
        let errors = wf.validate_structure();
        assert!(errors.iter().any(|e| e.contains("Start block")));
    }

    #[test]
    fn rejects_incoming_edge_to_start() {
        let mut wf = sample_valid();
        wf.edges.push(Edge {
            edge_id: "E002".into(),
            from: "B002".into(),
            to: "B001".into(),
            edge_condition: None,
        });
        let errors = wf.validate_structure();
        assert!(errors.iter().any(|e| e.contains("no incoming edges")));
    }

    #[test]
    fn rejects_dangling_edge_reference() {
        let mut wf = sample_valid();
        wf.edges.push(Edge {
            edge_id: "E002".into(),
            from: "B002".into(),
            to: "B999".into(),
            edge_condition: None,
        });
        let errors = wf.validate_structure();
        assert!(errors.iter().any(|e| e.contains("unknown To block")));
    }

    #[test]
    fn rejects_unresolved_output_reference() {
        let mut wf = sample_valid();
        wf.blocks[1]
            .inputs
            .push(Input::unfilled("Module").tap_reference("op-BXXX-Nothing"));
        let errors = wf.validate_structure();
        assert!(
            errors
                .iter()
                .any(|e| e.contains("unknown output variable"))
        );
    }

    #[test]
    fn next_edge_id_continues_past_max() {
        let edges = vec![
            Edge {
                edge_id: "E001".into(),
                from: "a".into(),
                to: "b".into(),
                edge_condition: None,
            },
            Edge {
                edge_id: "E007".into(),
                from: "b".into(),
                to: "c".into(),
                edge_condition: None,
            },
        ];
        assert_eq!(next_edge_id(&edges), "E008");
    }

    trait TapReference {
        fn tap_reference(self, reference: &str) -> Self;
    }

    impl TapReference for Input {
        fn tap_reference(mut self, reference: &str) -> Self {
            self.referenced_output_variable_name = Some(reference.to_string());
            self
        }
    }
}

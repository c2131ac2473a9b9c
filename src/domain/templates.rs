//! Default block shapes, instantiated per block id during LLM block
//! validation and custom-block materialization.

use super::workflow::{Block, Input, Output};

pub const AI_ACTION_CODE: &str = "AskWilfred";
pub const MANUAL_ACTION_CODE: &str = "HumanDependent";
pub const DISCOVERY_SNAPSHOT_ACTION_CODE: &str = "CreateDiscoverySnapshot";

fn output_variable(block_id: &str, name: &str, template_var: &str) -> String {
    if template_var == "null" {
        Output::default_variable_name(block_id, name)
    } else {
        template_var.to_string()
    }
}

/// The `AskWilfred` AI block: prompt in, one free-form output.
pub fn ai_block_template(block_id: &str) -> Block {
    Block {
        block_id: block_id.to_string(),
        name: "Ask AI".to_string(),
        action_code: AI_ACTION_CODE.to_string(),
        inputs: vec![
            Input::unfilled("Prompt"),
            Input::unfilled("Attachment"),
            Input::unfilled("Output Format"),
        ],
        outputs: vec![Output {
            name: "Output".to_string(),
            output_variable_name: output_variable(block_id, "Output", "null"),
            description: None,
        }],
    }
}

/// The `HumanDependent` manual block: a task handed to a human recipient.
pub fn manual_block_template(block_id: &str) -> Block {
    Block {
        block_id: block_id.to_string(),
        name: "Human Task".to_string(),
        action_code: MANUAL_ACTION_CODE.to_string(),
        inputs: vec![
            Input::unfilled("Task Recipients"),
            Input::unfilled("Task"),
            Input::unfilled("Attachment"),
        ],
        outputs: vec![Output {
            name: "IsHumanDepenedable".to_string(),
            output_variable_name: output_variable(block_id, "IsHumanDepenedable", "null"),
            description: None,
        }],
    }
}

/// True for the three original action codes that short-circuit task-block
/// search and are materialized from a fixed template instead.
pub fn is_custom_action_code(action_code: &str) -> bool {
    matches!(
        action_code,
        "HumanDependent" | "AskWilfred" | "HumanDependable"
    )
}

/// `HumanDependable` is a normalized alias for `HumanDependent`.
pub fn normalize_custom_action_code(action_code: &str) -> &'static str {
    match action_code {
        "AskWilfred" => AI_ACTION_CODE,
        _ => MANUAL_ACTION_CODE,
    }
}

/// Applies `CreateDiscoverySnapshot` defaults to a materialized block:
/// fixed application/timezone/client-utility values, and a 30-day window
/// ending now for any Start/End Date left unfilled. Dates are formatted
/// `M/D/YYYY 11:59:59 PM` with no zero-padding (no leading zero on month
/// or day).
pub fn apply_discovery_snapshot_defaults(block: &mut Block, now: chrono::DateTime<chrono::Utc>) {
    if block.action_code != DISCOVERY_SNAPSHOT_ACTION_CODE {
        return;
    }

    set_static(block, "Application", "OracleFusion");
    set_static(block, "Timezone", "UTC");
    set_static(block, "Should use client utility", "False");

    let end = now;
    let start = now - chrono::Duration::days(30);

    fill_if_empty(block, "Start Date", &format_discovery_date(start));
    fill_if_empty(block, "End Date", &format_discovery_date(end));
}

fn format_discovery_date(dt: chrono::DateTime<chrono::Utc>) -> String {
    use chrono::Datelike;
    format!(
        "{}/{}/{} 11:59:59 PM",
        dt.month(),
        dt.day(),
        dt.year()
    )
}

fn set_static(block: &mut Block, name: &str, value: &str) {
    if let Some(input) = block.inputs.iter_mut().find(|i| i.name == name) {
        input.static_value = Some(value.to_string());
        input.referenced_output_variable_name = None;
    } else {
        let mut input = Input::unfilled(name);
        input.static_value = Some(value.to_string());
        block.inputs.push(input);
    }
}

fn fill_if_empty(block: &mut Block, name: &str, value: &str) {
    match block.inputs.iter_mut().find(|i| i.name == name) {
        Some(input) if input.is_unfilled() => {
            input.static_value = Some(value.to_string());
        }
        None => {
            let mut input = Input::unfilled(name);
            input.static_value = Some(value.to_string());
            block.inputs.push(input);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_template_has_one_output() {
        let block = ai_block_template("B005");
        assert_eq!(block.outputs.len(), 1);
        assert_eq!(block.outputs[0].output_variable_name, "op-B005-Output");
    }

    #[test]
    fn manual_template_has_three_inputs() {
        let block = manual_block_template("B002");
        assert_eq!(block.inputs.len(), 3);
        assert_eq!(block.action_code, MANUAL_ACTION_CODE);
    }

    #[test]
    fn recognizes_custom_action_codes() {
        assert!(is_custom_action_code("HumanDependent"));
        assert!(is_custom_action_code("AskWilfred"));
        assert!(is_custom_action_code("HumanDependable"));
        assert!(!is_custom_action_code("ExportConfigurations"));
    }

    #[test]
    fn normalizes_human_dependable_alias() {
        assert_eq!(normalize_custom_action_code("HumanDependable"), "HumanDependent");
        assert_eq!(normalize_custom_action_code("AskWilfred"), "AskWilfred");
    }

    #[test]
    fn discovery_snapshot_fills_window_and_defaults() {
        let mut block = Block {
            block_id: "B003".into(),
            name: "Snapshot".into(),
            action_code: DISCOVERY_SNAPSHOT_ACTION_CODE.into(),
            inputs: vec![Input::unfilled("Start Date"), Input::unfilled("End Date")],
            outputs: vec![],
        };
        let now = chrono::DateTime::parse_from_rfc3339("2026-03-15T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        apply_discovery_snapshot_defaults(&mut block, now);

        let app = block.inputs.iter().find(|i| i.name == "Application").unwrap();
        assert_eq!(app.static_value.as_deref(), Some("OracleFusion"));
        let end = block.inputs.iter().find(|i| i.name == "End Date").unwrap();
        assert_eq!(end.static_value.as_deref(), Some("3/15/2026 11:59:59 PM"));
        let start = block.inputs.iter().find(|i| i.name == "Start Date").unwrap();
        assert_eq!(start.static_value.as_deref(), Some("2/13/2026 11:59:59 PM"));
    }

    #[test]
    fn discovery_snapshot_ignores_non_matching_action_code() {
        let mut block = Block {
            block_id: "B003".into(),
            name: "Export".into(),
            action_code: "ExportConfigurations".into(),
            inputs: vec![],
            outputs: vec![],
        };
        apply_discovery_snapshot_defaults(&mut block, chrono::Utc::now());
        assert!(block.inputs.is_empty());
    }
}

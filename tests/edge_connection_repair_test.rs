use reasoning_engine::domain::{Block, Edge, Workflow};
use reasoning_engine::validate::{EdgeConnectionStage, ValidationContext, ValidationStage};

fn export_block() -> Block {
    Block {
        block_id: "B002".to_string(),
        name: "Export".to_string(),
        action_code: "ExportConfigurations".to_string(),
        inputs: vec![],
        outputs: vec![],
    }
}

fn notify_block() -> Block {
    Block {
        block_id: "B003".to_string(),
        name: "Notify".to_string(),
        action_code: "NotifyUser".to_string(),
        inputs: vec![],
        outputs: vec![],
    }
}

#[tokio::test]
async fn duplicate_edges_and_self_loops_are_removed() {
    let workflow = Workflow::new(
        vec![Block::start("B001"), export_block()],
        vec![
            Edge { edge_id: "E001".into(), from: "B001".into(), to: "B002".into(), edge_condition: None },
            Edge { edge_id: "E002".into(), from: "B001".into(), to: "B002".into(), edge_condition: None },
            Edge { edge_id: "E003".into(), from: "B002".into(), to: "B002".into(), edge_condition: None },
        ],
    );

    let stage = EdgeConnectionStage::new();
    let result = stage
        .validate(&workflow, &ValidationContext::default())
        .await
        .unwrap();

    let corrected = result.corrected_workflow.expect("edge connection always corrects");
    assert_eq!(corrected.edges.len(), 1);
    assert_eq!(corrected.edges[0].edge_id, "E001");
    assert!(result.warnings.iter().any(|w| w.contains("Duplicate edge removed: B001 -> B002")));
    assert!(result.warnings.iter().any(|w| w.contains("Self-loop removed: E003")));
}

#[tokio::test]
async fn missing_start_block_is_inserted_and_wired_to_the_first_disconnected_block() {
    let workflow = Workflow::new(
        vec![export_block(), notify_block()],
        vec![Edge { edge_id: "E001".into(), from: "B002".into(), to: "B003".into(), edge_condition: None }],
    );

    let stage = EdgeConnectionStage::new();
    let result = stage
        .validate(&workflow, &ValidationContext::default())
        .await
        .unwrap();

    let corrected = result.corrected_workflow.expect("edge connection always corrects");
    assert!(corrected.blocks.iter().any(|b| b.block_id == "B000" && b.is_start()));
    assert!(corrected
        .edges
        .iter()
        .any(|e| e.from == "B000" && e.to == "B002"));
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Start block was missing")));
}

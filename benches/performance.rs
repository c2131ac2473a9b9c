use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reasoning_engine::domain::{Block, Edge, Input, Output, Workflow};
use reasoning_engine::validate::{EdgeConnectionStage, StructuralStage, ValidationContext, ValidationStage};
use reasoning_engine::{estimate_tokens, is_approaching_limit, truncate_messages};
use reasoning_engine::domain::ChatMessage;

fn create_messages(count: usize, text_size: usize) -> Vec<ChatMessage> {
    let text = "a".repeat(text_size);
    (0..count)
        .map(|i| {
            if i == 0 {
                ChatMessage::system(text.clone())
            } else if i % 2 == 0 {
                ChatMessage::user(text.clone())
            } else {
                ChatMessage::assistant(text.clone())
            }
        })
        .collect()
}

/// A synthetic linear chain of `count` blocks, each with one unfilled input
/// and one output, wired edge-to-edge with no gaps or duplicates.
fn create_linear_workflow(count: usize) -> Workflow {
    let mut blocks = vec![Block::start("B000")];
    let mut edges = Vec::new();
    let mut previous = "B000".to_string();

    for i in 1..=count {
        let block_id = format!("B{i:03}");
        blocks.push(Block {
            block_id: block_id.clone(),
            name: format!("Step {i}"),
            action_code: "TransformData".to_string(),
            inputs: vec![Input::unfilled("Payload")],
            outputs: vec![Output {
                name: "Result".to_string(),
                output_variable_name: Output::default_variable_name(&block_id, "Result"),
                description: None,
            }],
        });
        edges.push(Edge {
            edge_id: format!("E{i:03}"),
            from: previous.clone(),
            to: block_id.clone(),
            edge_condition: None,
        });
        previous = block_id;
    }

    Workflow::new(blocks, edges)
}

/// Same shape as `create_linear_workflow`, but every block is left
/// disconnected (no edges at all), forcing Edge Connection to rewire the
/// entire graph from scratch.
fn create_disconnected_workflow(count: usize) -> Workflow {
    let mut workflow = create_linear_workflow(count);
    workflow.edges.clear();
    workflow
}

fn bench_estimate_tokens_by_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate_tokens_by_count");
    for count in [0, 1, 5, 10, 20, 50, 100].iter() {
        let messages = create_messages(*count, 100);
        group.bench_with_input(BenchmarkId::from_parameter(count), &messages, |b, msgs| {
            b.iter(|| estimate_tokens(black_box(msgs)));
        });
    }
    group.finish();
}

fn bench_estimate_tokens_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate_tokens_by_size");
    for size in [10, 100, 1000, 10000].iter() {
        let messages = create_messages(10, *size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &messages, |b, msgs| {
            b.iter(|| estimate_tokens(black_box(msgs)));
        });
    }
    group.finish();
}

fn bench_truncate_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncate_messages");
    let test_cases = vec![
        ("small_keep_5", create_messages(20, 100), 5, true),
        ("medium_keep_10", create_messages(50, 100), 10, true),
        ("large_keep_20", create_messages(100, 100), 20, true),
        ("no_preserve_system", create_messages(50, 100), 10, false),
    ];

    for (name, messages, keep, preserve) in test_cases {
        group.bench_with_input(
            BenchmarkId::new(name, format!("{}/{}", messages.len(), keep)),
            &(messages, keep, preserve),
            |b, (msgs, k, p)| {
                b.iter(|| truncate_messages(black_box(msgs), black_box(*k), black_box(*p)));
            },
        );
    }
    group.finish();
}

fn bench_is_approaching_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_approaching_limit");
    for count in [10, 50, 100].iter() {
        let messages = create_messages(*count, 500);
        group.bench_with_input(BenchmarkId::from_parameter(count), &messages, |b, msgs| {
            b.iter(|| is_approaching_limit(black_box(msgs), black_box(32000), black_box(0.9)));
        });
    }
    group.finish();
}

fn bench_structural_validation(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("structural_validation");
    let stage = StructuralStage::new();
    let context = ValidationContext::default();

    for count in [10, 50, 200, 500].iter() {
        let workflow = create_linear_workflow(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &workflow, |b, wf| {
            b.iter(|| runtime.block_on(stage.validate(black_box(wf), black_box(&context))));
        });
    }
    group.finish();
}

fn bench_edge_connection_repair(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("edge_connection_repair");
    let stage = EdgeConnectionStage::new();
    let context = ValidationContext::default();

    for count in [10, 50, 200].iter() {
        let workflow = create_disconnected_workflow(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &workflow, |b, wf| {
            b.iter(|| runtime.block_on(stage.validate(black_box(wf), black_box(&context))));
        });
    }
    group.finish();
}

fn bench_realistic_preflight(c: &mut Criterion) {
    let mut group = c.benchmark_group("realistic_preflight");
    let messages = create_messages(50, 200);

    group.bench_function("check_and_truncate", |b| {
        b.iter(|| {
            let msgs = black_box(&messages);
            let tokens = estimate_tokens(msgs);
            if tokens > black_box(10000) {
                truncate_messages(msgs, black_box(10), black_box(true))
            } else {
                msgs.to_vec()
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_estimate_tokens_by_count,
    bench_estimate_tokens_by_size,
    bench_truncate_messages,
    bench_is_approaching_limit,
    bench_structural_validation,
    bench_edge_connection_repair,
    bench_realistic_preflight,
);
criterion_main!(benches);

//! Tool Registry and Executors: the set of capabilities the Planner
//! can invoke mid-turn, grounded on `tools/registry.py` and
//! `tools/definitions.py` but lifted out of the singleton pattern — the
//! registry is an owned value threaded through construction, not a static.

use crate::domain::Workflow;
use crate::error::Result;
use crate::search::{TaskBlockSearchService, WebSearchService};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The three tools the Planner intercepts before registry dispatch never
/// implement this trait — they're handled directly in `planner.rs`. This
/// trait is only for the three tools actually routed through the registry.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema "parameters" object, passed to the LLM as part of the
    /// tool's function definition.
    fn input_schema(&self) -> Value;

    fn requires_user_response(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value) -> Result<Value>;
}

/// The fixed list of tool names and JSON-schema function definitions handed
/// to the LLM gateway on every Planner turn — the three registry-backed
/// tools plus the three output-signalling tools the Planner intercepts
/// directly, since the LLM must see all six to choose among them.
pub fn tool_definitions(registry: &ToolRegistry) -> Vec<Value> {
    let mut defs: Vec<Value> = registry
        .list_tools()
        .into_iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.input_schema(),
                }
            })
        })
        .collect();

    defs.push(json!({
        "type": "function",
        "function": {
            "name": "think_approach",
            "description": "Share a brief reasoning summary of the approach being taken before acting.",
            "parameters": {
                "type": "object",
                "properties": { "reasoning": { "type": "string" } },
                "required": ["reasoning"]
            }
        }
    }));
    defs.push(json!({
        "type": "function",
        "function": {
            "name": "present_answer",
            "description": "Deliver the final markdown answer to the user.",
            "parameters": {
                "type": "object",
                "properties": { "content": { "type": "string" } },
                "required": ["content"]
            }
        }
    }));
    defs.push(json!({
        "type": "function",
        "function": {
            "name": "submit_workflow",
            "description": "Submit a completed workflow graph for structural validation.",
            "parameters": {
                "type": "object",
                "properties": {
                    "workflow_json": { "type": "array" },
                    "edges": { "type": "array" }
                },
                "required": ["workflow_json", "edges"]
            }
        }
    }));

    defs
}

/// Plain owned name→executor map, built once at startup from a fixed list.
pub struct ToolRegistry {
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// The standard registry: web search, task-block search, clarify.
    pub fn with_defaults(
        web_search: Arc<dyn WebSearchService>,
        task_block_search: Arc<dyn TaskBlockSearchService>,
        max_web_results: usize,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WebSearchExecutor {
            service: web_search,
            max_results: max_web_results,
        }));
        registry.register(Arc::new(TaskBlockSearchExecutor {
            service: task_block_search,
        }));
        registry.register(Arc::new(ClarifyExecutor));
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) {
        self.executors.insert(executor.name().to_string(), executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.executors.get(name).cloned()
    }

    pub fn list_tools(&self) -> Vec<Arc<dyn ToolExecutor>> {
        let mut tools: Vec<_> = self.executors.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fans out 1-10 query strings to the configured web search service, with
/// no deduplication — every query's results are kept independently.
pub struct WebSearchExecutor {
    service: Arc<dyn WebSearchService>,
    max_results: usize,
}

#[async_trait]
impl ToolExecutor for WebSearchExecutor {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for up to 10 queries and return relevant results."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": 10
                }
            },
            "required": ["queries"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let queries = extract_queries(&input);
        let mut results = Vec::new();
        for query in &queries {
            let mut items = self.service.search(query).await?;
            items.truncate(self.max_results);
            results.extend(items);
        }
        Ok(json!({
            "query_count": queries.len(),
            "results": results,
        }))
    }
}

/// Fans out 1-10 query strings to the task-block search service and
/// deduplicates by block id, keeping the highest relevance score seen,
/// sorted descending by that score.
pub struct TaskBlockSearchExecutor {
    service: Arc<dyn TaskBlockSearchService>,
}

#[async_trait]
impl ToolExecutor for TaskBlockSearchExecutor {
    fn name(&self) -> &str {
        "task_block_search"
    }

    fn description(&self) -> &str {
        "Search the task block catalog for up to 10 queries and return matching block descriptors."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": 10
                }
            },
            "required": ["queries"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let queries = extract_queries(&input);
        let mut best: HashMap<String, crate::search::TaskBlockResultItem> = HashMap::new();
        for query in &queries {
            for item in self.service.search(query).await? {
                best.entry(item.block_id.clone())
                    .and_modify(|existing| {
                        if item.relevance_score > existing.relevance_score {
                            *existing = item.clone();
                        }
                    })
                    .or_insert(item);
            }
        }
        let mut results: Vec<_> = best.into_values().collect();
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
        Ok(json!({
            "query_count": queries.len(),
            "results": results,
        }))
    }
}

/// Generates a fresh clarification id and returns the suspension trigger;
/// the Planner raises `ClarificationRequired` as soon as it sees this
/// executor's output rather than feeding the result back into the loop.
pub struct ClarifyExecutor;

#[async_trait]
impl ToolExecutor for ClarifyExecutor {
    fn name(&self) -> &str {
        "clarify"
    }

    fn description(&self) -> &str {
        "Ask the user 1-5 clarifying questions and suspend processing until they respond."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": 5
                }
            },
            "required": ["questions"]
        })
    }

    fn requires_user_response(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let questions = input
            .get("questions")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let clarification_id = uuid::Uuid::new_v4().to_string();
        Ok(json!({
            "clarification_id": clarification_id,
            "questions": questions,
            "status": "awaiting_response",
        }))
    }
}

fn extract_queries(input: &Value) -> Vec<String> {
    input
        .get("queries")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

/// Structural-only check run by `submit_workflow` before accepting a
/// planner-produced workflow, not the fuller repairing pass in
/// `validate::edge_connection`.
pub fn validate_submitted_workflow(workflow: &Workflow) -> Vec<String> {
    workflow.validate_structure()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{
        FakeTaskBlockSearchService, FakeWebSearchService, TaskBlockResultItem, WebSearchResultItem,
    };

    #[tokio::test]
    async fn web_search_executor_collects_results_across_queries() {
        let service = Arc::new(FakeWebSearchService::new(vec![WebSearchResultItem {
            title: "a".into(),
            url: "https://a".into(),
            snippet: "s".into(),
        }]));
        let executor = WebSearchExecutor {
            service,
            max_results: 3,
        };
        let output = executor
            .execute(json!({ "queries": ["rust", "async"] }))
            .await
            .unwrap();
        assert_eq!(output["query_count"], 2);
        assert_eq!(output["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn task_block_search_dedups_by_block_id_keeping_highest_score() {
        let service = Arc::new(FakeTaskBlockSearchService::new(vec![
            TaskBlockResultItem {
                block_id: "B1".into(),
                name: "Export".into(),
                description: "".into(),
                relevance_score: 0.4,
                action_code: "ExportConfigurations".into(),
                input_names: vec![],
                output_names: vec![],
            },
            TaskBlockResultItem {
                block_id: "B1".into(),
                name: "Export".into(),
                description: "".into(),
                relevance_score: 0.9,
                action_code: "ExportConfigurations".into(),
                input_names: vec![],
                output_names: vec![],
            },
            TaskBlockResultItem {
                block_id: "B2".into(),
                name: "Import".into(),
                description: "".into(),
                relevance_score: 0.6,
                action_code: "ImportConfigurations".into(),
                input_names: vec![],
                output_names: vec![],
            },
        ]));
        let executor = TaskBlockSearchExecutor { service };
        let output = executor.execute(json!({ "queries": ["export"] })).await.unwrap();
        let results = output["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["block_id"], "B1");
        assert_eq!(results[0]["relevance_score"], 0.9);
    }

    #[tokio::test]
    async fn clarify_executor_marks_requires_user_response() {
        let executor = ClarifyExecutor;
        assert!(executor.requires_user_response());
        let output = executor
            .execute(json!({ "questions": ["which environment?"] }))
            .await
            .unwrap();
        assert_eq!(output["status"], "awaiting_response");
        assert!(!output["clarification_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn registry_lists_tools_sorted_by_name() {
        let registry = ToolRegistry::with_defaults(
            Arc::new(FakeWebSearchService::empty()),
            Arc::new(FakeTaskBlockSearchService::empty()),
            5,
        );
        let names: Vec<_> = registry.list_tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["clarify", "task_block_search", "web_search"]);
    }

    #[test]
    fn tool_definitions_include_output_signalling_tools() {
        let registry = ToolRegistry::with_defaults(
            Arc::new(FakeWebSearchService::empty()),
            Arc::new(FakeTaskBlockSearchService::empty()),
            5,
        );
        let defs = tool_definitions(&registry);
        let names: Vec<_> = defs
            .iter()
            .map(|d| d["function"]["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"submit_workflow".to_string()));
        assert!(names.contains(&"web_search".to_string()));
    }
}

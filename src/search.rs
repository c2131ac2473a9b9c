//! Search capability boundaries. Concrete HTTP backends (Perplexity,
//! legacy task-block API, integrated search) are out of scope for the core;
//! only the trait boundary and in-memory fakes for tests live here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchResultItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBlockResultItem {
    pub block_id: String,
    pub name: String,
    pub description: String,
    pub relevance_score: f32,
    /// The catalog action code this candidate materializes to, used by the
    /// LLM Block Validator's fast-path exact-match check.
    #[serde(default)]
    pub action_code: String,
    #[serde(default)]
    pub input_names: Vec<String>,
    #[serde(default)]
    pub output_names: Vec<String>,
}

#[async_trait]
pub trait WebSearchService: Send + Sync {
    async fn search(&self, query: &str) -> crate::error::Result<Vec<WebSearchResultItem>>;
}

#[async_trait]
pub trait TaskBlockSearchService: Send + Sync {
    async fn search(&self, query: &str) -> crate::error::Result<Vec<TaskBlockResultItem>>;
}

/// Returns a fixed, deterministic result set regardless of query — used to
/// exercise the tool executors without a live backend.
pub struct FakeWebSearchService {
    results: Vec<WebSearchResultItem>,
}

impl FakeWebSearchService {
    pub fn new(results: Vec<WebSearchResultItem>) -> Self {
        Self { results }
    }

    pub fn empty() -> Self {
        Self { results: Vec::new() }
    }
}

#[async_trait]
impl WebSearchService for FakeWebSearchService {
    async fn search(&self, _query: &str) -> crate::error::Result<Vec<WebSearchResultItem>> {
        Ok(self.results.clone())
    }
}

pub struct FakeTaskBlockSearchService {
    results: Vec<TaskBlockResultItem>,
}

impl FakeTaskBlockSearchService {
    pub fn new(results: Vec<TaskBlockResultItem>) -> Self {
        Self { results }
    }

    pub fn empty() -> Self {
        Self { results: Vec::new() }
    }
}

#[async_trait]
impl TaskBlockSearchService for FakeTaskBlockSearchService {
    async fn search(&self, _query: &str) -> crate::error::Result<Vec<TaskBlockResultItem>> {
        Ok(self.results.clone())
    }
}

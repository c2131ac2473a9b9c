//! Runtime configuration.
//!
//! Every tunable lives on [`Config`], built once by the embedding binary and
//! passed down by value — there is no process-wide singleton here (see
//! DESIGN.md open question 5 on why the Planner and Validator LLM configs
//! are kept separate rather than shared).

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which family of OpenAI-compatible server the Planner LLM talks to. Both
/// kinds speak the same wire protocol; the kind only selects a
/// sensible default base URL and whether an empty tool list is still sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Vllm,
    OpenAi,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Vllm => "http://localhost:8000/v1",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vllm" => Ok(ProviderKind::Vllm),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(crate::Error::config(format!(
                "unknown provider kind '{other}', expected 'vllm' or 'openai'"
            ))),
        }
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::Vllm
    }
}

/// Config for the planner's own LLM (tool-calling, streaming).
#[derive(Debug, Clone)]
pub struct PlannerLlmConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for PlannerLlmConfig {
    fn default() -> Self {
        let provider = ProviderKind::default();
        Self {
            base_url: provider.default_base_url().to_string(),
            provider,
            api_key: String::new(),
            model: "default-model".to_string(),
        }
    }
}

/// Config for the validator LLM used by the LLM Block Validator and the
/// Referencing Agent. Deliberately separate from the planner's LLM (it is
/// typically a smaller/cheaper model called far more often).
#[derive(Debug, Clone)]
pub struct ValidatorLlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for ValidatorLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: String::new(),
            model: "default-model".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub default_ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            default_ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSearchBackend {
    Perplexity,
    Integrated,
}

#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub backend: WebSearchBackend,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            backend: WebSearchBackend::Perplexity,
            api_url: "https://api.perplexity.ai".to_string(),
            api_key: String::new(),
            model: "llama-3.1-sonar-small-128k-online".to_string(),
            max_tokens: 1024,
            max_results: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskBlockSearchBackend {
    Legacy,
    Integrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskBlockSearchType {
    Llm,
    Elastic,
}

#[derive(Debug, Clone)]
pub struct TaskBlockSearchConfig {
    pub backend: TaskBlockSearchBackend,
    pub api_url: String,
    pub api_key: String,
    pub search_type: TaskBlockSearchType,
    pub size: usize,
    pub is_reason_required: bool,
}

impl Default for TaskBlockSearchConfig {
    fn default() -> Self {
        Self {
            backend: TaskBlockSearchBackend::Legacy,
            api_url: "http://localhost:8000/api/task-blocks".to_string(),
            api_key: String::new(),
            search_type: TaskBlockSearchType::Llm,
            size: 5,
            is_reason_required: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegratedSearchConfig {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for IntegratedSearchConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub max_iterations: u32,
    /// Summarization kicks in once the Planner's own token estimate
    /// (`planner::estimate_prompt_tokens`) exceeds this.
    pub token_summarization_limit: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            token_summarization_limit: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRefinementMode {
    Separate,
    Inline,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct FeaturesConfig {
    pub query_refinement_mode: QueryRefinementMode,
    pub enable_referencing: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            query_refinement_mode: QueryRefinementMode::Disabled,
            enable_referencing: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub max_concurrent_connections: usize,
    pub heartbeat_interval_seconds: u64,
    pub heartbeat_max_missed: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            max_concurrent_connections: 50,
            heartbeat_interval_seconds: 30,
            heartbeat_max_missed: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub langfuse_secret_key: Option<String>,
    pub langfuse_public_key: Option<String>,
    pub langfuse_host: String,
}

impl ObservabilityConfig {
    fn defaults() -> Self {
        Self {
            log_level: "info".to_string(),
            langfuse_secret_key: None,
            langfuse_public_key: None,
            langfuse_host: "https://cloud.langfuse.com".to_string(),
        }
    }
}

/// Everything the core needs, assembled once and threaded through.
#[derive(Debug, Clone)]
pub struct Config {
    pub planner_llm: PlannerLlmConfig,
    pub validator_llm: ValidatorLlmConfig,
    pub redis: RedisConfig,
    pub web_search: WebSearchConfig,
    pub task_block_search: TaskBlockSearchConfig,
    pub integrated_search: IntegratedSearchConfig,
    pub planner: PlannerConfig,
    pub features: FeaturesConfig,
    pub transport: TransportConfig,
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            planner_llm: PlannerLlmConfig::default(),
            validator_llm: ValidatorLlmConfig::default(),
            redis: RedisConfig::default(),
            web_search: WebSearchConfig::default(),
            task_block_search: TaskBlockSearchConfig::default(),
            integrated_search: IntegratedSearchConfig::default(),
            planner: PlannerConfig::default(),
            features: FeaturesConfig::default(),
            transport: TransportConfig::default(),
            observability: ObservabilityConfig::defaults(),
        }
    }
}

/// Env-var priority resolution for the planner's base URL: lets a deployment
/// point the planner at a local gateway without touching the rest of config.
pub fn resolve_planner_base_url(provider: ProviderKind, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("REASONING_ENGINE_PLANNER_BASE_URL") {
        if !url.is_empty() {
            return url;
        }
    }
    fallback
        .map(str::to_string)
        .unwrap_or_else(|| provider.default_base_url().to_string())
}

/// Installs a global `tracing` subscriber at the configured level, JSON-formatted.
/// Call once at process start; safe to skip in embedders that install their own.
pub fn init_tracing(observability: &ObservabilityConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&observability.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_known_aliases() {
        assert_eq!(ProviderKind::from_str("vllm").unwrap(), ProviderKind::Vllm);
        assert_eq!(
            ProviderKind::from_str("OpenAI").unwrap(),
            ProviderKind::OpenAi
        );
        assert!(ProviderKind::from_str("bogus").is_err());
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.planner.max_iterations, 10);
        assert_eq!(config.planner.token_summarization_limit, 100_000);
        assert_eq!(config.redis.default_ttl_seconds, 86_400);
        assert_eq!(config.transport.max_concurrent_connections, 50);
    }

    #[test]
    fn resolve_base_url_falls_back_to_provider_default() {
        // SAFETY: test-only, single-threaded within this test.
        unsafe { env::remove_var("REASONING_ENGINE_PLANNER_BASE_URL") };
        let url = resolve_planner_base_url(ProviderKind::Vllm, None);
        assert_eq!(url, "http://localhost:8000/v1");
    }

    #[test]
    fn resolve_base_url_prefers_explicit_fallback_over_provider_default() {
        unsafe { env::remove_var("REASONING_ENGINE_PLANNER_BASE_URL") };
        let url = resolve_planner_base_url(ProviderKind::Vllm, Some("http://custom:9000/v1"));
        assert_eq!(url, "http://custom:9000/v1");
    }
}

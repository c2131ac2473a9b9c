//! Job name generation: LLM-backed with a regex-based fallback so naming
//! degrades gracefully when the validator LLM is unavailable or disabled.

use crate::domain::Workflow;
use crate::llm::LlmProvider;
use regex::Regex;
use std::sync::Arc;

const MAX_LENGTH: usize = 64;
const JOB_NAME_TEMPERATURE: f32 = 0.2;

const JOB_NAME_SYSTEM_PROMPT: &str = "Generate a short, human-readable, kebab-case job name \
(no more than 6 words) for the given workflow. Respond with the name only, no punctuation \
beyond hyphens, no explanation.";

fn action_descriptions() -> &'static [(&'static str, &'static str)] {
    &[
        ("Start", "start"),
        ("ExportConfigurations", "export-config"),
        ("ImportData", "import-data"),
        ("ValidateData", "validate"),
        ("AskWilfred", "ask-wilfred"),
        ("HumanDependent", "manual-step"),
        ("TransformData", "transform"),
        ("NotifyUser", "notify"),
        ("ConditionalBranch", "condition"),
        ("LoopBlock", "loop"),
        ("EndLoop", "end-loop"),
        ("ErrorHandler", "error-handler"),
    ]
}

pub struct JobNameGenerator {
    llm: Option<Arc<dyn LlmProvider>>,
    max_length: usize,
}

impl JobNameGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm: Some(llm),
            max_length: MAX_LENGTH,
        }
    }

    /// Regex-only mode, used in tests and when no validator LLM is wired.
    pub fn regex_only() -> Self {
        Self {
            llm: None,
            max_length: MAX_LENGTH,
        }
    }

    pub async fn generate(&self, workflow: &Workflow, user_description: Option<&str>) -> String {
        if let Some(llm) = &self.llm {
            if let Some(name) = self.generate_via_llm(llm.as_ref(), workflow, user_description).await {
                return name;
            }
        }
        self.generate_via_regex(workflow, user_description)
    }

    async fn generate_via_llm(
        &self,
        llm: &dyn LlmProvider,
        workflow: &Workflow,
        user_description: Option<&str>,
    ) -> Option<String> {
        let workflow_json = serde_json::to_string(workflow).ok()?;
        let prompt = match user_description {
            Some(desc) => format!("User request: {desc}\n\nWorkflow:\n{workflow_json}"),
            None => format!("Workflow:\n{workflow_json}"),
        };
        let messages = vec![
            crate::domain::ChatMessage::system(JOB_NAME_SYSTEM_PROMPT),
            crate::domain::ChatMessage::user(prompt),
        ];
        let response = llm.generate(&messages, None, JOB_NAME_TEMPERATURE, None).await.ok()?;
        let text = response.content?;
        let name = sanitize(&clean_text(&text));
        if name.is_empty() || name == "workflow" {
            None
        } else {
            Some(truncate(&name, self.max_length))
        }
    }

    fn generate_via_regex(&self, workflow: &Workflow, user_description: Option<&str>) -> String {
        let mut parts = Vec::new();

        if let Some(description) = user_description {
            let cleaned = clean_text(description);
            if !cleaned.is_empty() {
                parts.push(cleaned.chars().take(30).collect::<String>());
            }
        }

        if parts.is_empty() {
            let actions = extract_key_actions(workflow);
            if !actions.is_empty() {
                parts.push(actions.into_iter().take(3).collect::<Vec<_>>().join("-"));
            }
        }

        if parts.is_empty() {
            parts.push("workflow".to_string());
        }

        let name = sanitize(&parts.join("-"));
        truncate(&name, self.max_length)
    }
}

fn extract_key_actions(workflow: &Workflow) -> Vec<String> {
    let descriptions = action_descriptions();
    let mut actions = Vec::new();
    for block in &workflow.blocks {
        if block.is_start() {
            continue;
        }
        let desc = descriptions
            .iter()
            .find(|(code, _)| *code == block.action_code)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| clean_text(&block.action_code));
        if !desc.is_empty() && !actions.contains(&desc) {
            actions.push(desc);
        }
    }
    actions
}

fn clean_text(text: &str) -> String {
    let lower = text.to_lowercase();
    let whitespace = Regex::new(r"[\s_]+").unwrap();
    let spaced = whitespace.replace_all(&lower, "-");
    let non_alnum = Regex::new(r"[^a-z0-9-]").unwrap();
    let stripped = non_alnum.replace_all(&spaced, "");
    let multi_hyphen = Regex::new(r"-+").unwrap();
    multi_hyphen.replace_all(&stripped, "-").trim_matches('-').to_string()
}

fn sanitize(name: &str) -> String {
    let leading = Regex::new(r"^[^a-z0-9]+").unwrap();
    let stripped = leading.replace(name, "");
    let non_alnum = Regex::new(r"[^a-z0-9-]").unwrap();
    let cleaned = non_alnum.replace_all(&stripped, "");
    let multi_hyphen = Regex::new(r"-+").unwrap();
    let result = multi_hyphen.replace_all(&cleaned, "-").to_string();
    if result.is_empty() {
        "workflow".to_string()
    } else {
        result
    }
}

fn truncate(name: &str, max_length: usize) -> String {
    if name.len() <= max_length {
        name.to_string()
    } else {
        format!("{}...", &name[..max_length.saturating_sub(3)])
    }
}

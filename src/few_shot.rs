//! Few-Shot Retriever: supplies example workflows for the Planner's
//! system prompt. Tries a configured HTTP API first, best-effort; any
//! failure falls back silently to a fixed built-in set. Grounded on
//! `agents/few_shot.py`.

use crate::domain::{Block, Edge, Input, Output, Workflow};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewShotExample {
    pub description: String,
    pub workflow: Workflow,
}

pub struct FewShotRetriever {
    api_url: Option<String>,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl FewShotRetriever {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            api_url,
            api_key,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with static config"),
        }
    }

    pub fn without_api() -> Self {
        Self::new(None, None)
    }

    /// Tries the configured API first if both url and key are set; falls
    /// back to the built-in defaults on any failure or if unconfigured.
    pub async fn get_examples(&self, query: Option<&str>, max_examples: usize) -> Vec<FewShotExample> {
        if let (Some(url), Some(key)) = (&self.api_url, &self.api_key) {
            if let Ok(examples) = self.fetch_from_api(url, key, query, max_examples).await {
                return examples;
            }
        }
        default_examples().into_iter().take(max_examples).collect()
    }

    async fn fetch_from_api(
        &self,
        url: &str,
        key: &str,
        query: Option<&str>,
        max_examples: usize,
    ) -> crate::error::Result<Vec<FewShotExample>> {
        #[derive(Deserialize)]
        struct ApiResponse {
            #[serde(default)]
            examples: Vec<FewShotExample>,
        }

        let response = self
            .http
            .post(format!("{}/examples/search", url.trim_end_matches('/')))
            .bearer_auth(key)
            .json(&serde_json::json!({ "query": query, "limit": max_examples }))
            .send()
            .await
            .map_err(crate::error::Error::Http)?;

        let body: ApiResponse = response.json().await.map_err(crate::error::Error::Http)?;
        Ok(body.examples)
    }
}

/// Renders examples as numbered `### Example N: {description}` sections
/// with the workflow as fenced JSON, for inclusion in the Planner's system
/// prompt.
pub fn format_examples(examples: &[FewShotExample]) -> String {
    examples
        .iter()
        .enumerate()
        .map(|(i, example)| {
            let json = serde_json::to_string_pretty(&example.workflow).unwrap_or_default();
            format!("### Example {}: {}\n```json\n{}\n```", i + 1, example.description, json)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn default_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample {
            description: "Export HCM configuration".to_string(),
            workflow: Workflow::new(
                vec![
                    Block::start("B001"),
                    Block {
                        block_id: "B002".to_string(),
                        name: "Export HCM Config".to_string(),
                        action_code: "ExportConfigurations".to_string(),
                        inputs: vec![
                            Input {
                                name: "Module".to_string(),
                                static_value: Some("HCM".to_string()),
                                referenced_output_variable_name: None,
                                description: None,
                            },
                            Input {
                                name: "Format".to_string(),
                                static_value: Some("JSON".to_string()),
                                referenced_output_variable_name: None,
                                description: None,
                            },
                        ],
                        outputs: vec![Output {
                            name: "ConfigFile".to_string(),
                            output_variable_name: "op-B002-ConfigFile".to_string(),
                            description: None,
                        }],
                    },
                ],
                vec![Edge {
                    edge_id: "E001".to_string(),
                    from: "B001".to_string(),
                    to: "B002".to_string(),
                    edge_condition: None,
                }],
            ),
        },
        FewShotExample {
            description: "Import data with validation".to_string(),
            workflow: Workflow::new(
                vec![
                    Block::start("B001"),
                    Block {
                        block_id: "B002".to_string(),
                        name: "Validate Input".to_string(),
                        action_code: "ValidateData".to_string(),
                        inputs: vec![Input {
                            name: "DataFile".to_string(),
                            static_value: Some("input.csv".to_string()),
                            referenced_output_variable_name: None,
                            description: None,
                        }],
                        outputs: vec![
                            Output {
                                name: "ValidationResult".to_string(),
                                output_variable_name: "op-B002-ValidationResult".to_string(),
                                description: None,
                            },
                            Output {
                                name: "IsValid".to_string(),
                                output_variable_name: "op-B002-IsValid".to_string(),
                                description: None,
                            },
                        ],
                    },
                    Block {
                        block_id: "B003".to_string(),
                        name: "Import Data".to_string(),
                        action_code: "ImportData".to_string(),
                        inputs: vec![
                            Input {
                                name: "DataFile".to_string(),
                                static_value: Some("input.csv".to_string()),
                                referenced_output_variable_name: None,
                                description: None,
                            },
                            Input {
                                name: "Validation".to_string(),
                                static_value: None,
                                referenced_output_variable_name: Some("op-B002-ValidationResult".to_string()),
                                description: None,
                            },
                        ],
                        outputs: vec![Output {
                            name: "ImportResult".to_string(),
                            output_variable_name: "op-B003-ImportResult".to_string(),
                            description: None,
                        }],
                    },
                ],
                vec![
                    Edge {
                        edge_id: "E001".to_string(),
                        from: "B001".to_string(),
                        to: "B002".to_string(),
                        edge_condition: None,
                    },
                    Edge {
                        edge_id: "E002".to_string(),
                        from: "B002".to_string(),
                        to: "B003".to_string(),
                        edge_condition: Some("true".to_string()),
                    },
                ],
            ),
        },
    ]
}

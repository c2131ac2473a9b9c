//! Orchestrator: the public entry point. Owns the conversation
//! lifecycle state machine, wires every other capability together, handles
//! the clarification rendezvous, and runs one processing pass per turn.
//! Grounded on `core/orchestrator.py`.

use crate::domain::{ChatMessage, ClarificationState, ConversationState, ConversationStatus, UserInfo, Workflow};
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::few_shot::FewShotRetriever;
use crate::job_name::JobNameGenerator;
use crate::planner::{Planner, PlannerOutcome};
use crate::preprocess::QueryPreprocessor;
use crate::referencing::ReferencingAgent;
use crate::store::ConversationStore;
use crate::validate::{ValidationContext, ValidationPipeline, ValidationStrategy};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const DEFAULT_TTL_SECONDS: u64 = 86_400;
const CLARIFICATION_RESPONSE_PREFIX: &str = "[Clarification Response]\n";
const LOCK_SHARD_COUNT: usize = 32;
const FEW_SHOT_MAX_EXAMPLES: usize = 3;

const PLANNER_BASE_PROMPT: &str = "You are an expert workflow planner for enterprise automation \
systems. Understand the user's automation requirements, search for information with web_search, \
find appropriate task blocks with task_block_search, ask clarifying questions with clarify when \
requirements are ambiguous, and submit a complete workflow with submit_workflow once ready.";

/// A sharded map of conversation id to a per-conversation mutex, acquired for
/// the duration of one processing pass so no two passes for the same
/// conversation ever run concurrently.
pub struct ConversationLocks {
    shards: Vec<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(LOCK_SHARD_COUNT);
        for _ in 0..LOCK_SHARD_COUNT {
            shards.push(Mutex::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_for(&self, conversation_id: &str) -> &Mutex<HashMap<String, Arc<Mutex<()>>>> {
        let mut hasher = DefaultHasher::new();
        conversation_id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let shard = self.shard_for(conversation_id);
        let lock = {
            let mut map = shard.lock().await;
            map.entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for ConversationLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the Orchestrator needs, assembled once by the embedding
/// binary. Converts a supplied [`ValidationStrategy`] into a uniform
/// pipeline at construction time.
pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    planner: Arc<Planner>,
    validation: ValidationPipeline,
    referencing: Option<Arc<ReferencingAgent>>,
    preprocessor: Option<Arc<dyn QueryPreprocessor>>,
    few_shot: Arc<FewShotRetriever>,
    job_name: Arc<JobNameGenerator>,
    events: Arc<dyn EventSink>,
    locks: ConversationLocks,
    default_ttl_seconds: u64,
}

pub struct OrchestratorConfig {
    pub store: Arc<dyn ConversationStore>,
    pub planner: Arc<Planner>,
    pub validation: ValidationStrategy,
    pub referencing: Option<Arc<ReferencingAgent>>,
    pub preprocessor: Option<Arc<dyn QueryPreprocessor>>,
    pub few_shot: Arc<FewShotRetriever>,
    pub job_name: Arc<JobNameGenerator>,
    pub events: Arc<dyn EventSink>,
    pub default_ttl_seconds: u64,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            store: config.store,
            planner: config.planner,
            validation: config.validation.into_pipeline(),
            referencing: config.referencing,
            preprocessor: config.preprocessor,
            few_shot: config.few_shot,
            job_name: config.job_name,
            events: config.events,
            locks: ConversationLocks::new(),
            default_ttl_seconds: config.default_ttl_seconds,
        }
    }

    pub async fn start_conversation(
        &self,
        conversation_id: &str,
        initial_message: &str,
        user_info: Option<UserInfo>,
    ) -> Result<()> {
        if conversation_id.is_empty() {
            return Err(Error::other("conversation id must not be empty"));
        }

        let _guard = self.locks.acquire(conversation_id).await;
        tracing::info!(conversation_id, "starting conversation");

        let state = ConversationState::new(conversation_id, user_info);
        self.store.save_state(conversation_id, &state).await?;
        self.store
            .save_message(conversation_id, &ChatMessage::user(initial_message))
            .await?;
        self.store.extend_ttl(conversation_id, self.default_ttl_seconds).await?;

        self.events
            .emit(Event::new(EventKind::ProcessingStarted, conversation_id, serde_json::json!({})))
            .await;

        self.run_processing_pass(conversation_id, state).await
    }

    pub async fn handle_clarification_response(
        &self,
        conversation_id: &str,
        clarification_id: &str,
        response: &str,
    ) -> Result<()> {
        let _guard = self.locks.acquire(conversation_id).await;

        let mut state = self
            .store
            .get_state(conversation_id)
            .await?
            .ok_or_else(|| Error::conversation_not_found(conversation_id))?;

        let pending = state
            .pending_clarification
            .clone()
            .ok_or_else(|| Error::clarification_mismatch("no pending clarification"))?;
        if pending.clarification_id != clarification_id {
            return Err(Error::clarification_mismatch("clarification id does not match"));
        }

        self.store
            .save_clarification_response(conversation_id, clarification_id, response)
            .await?;

        let mut updated = pending;
        updated.response = Some(response.to_string());
        updated.responded_at = Some(chrono::Utc::now());
        state.pending_clarification = Some(updated);
        state.status = ConversationStatus::Active;
        state.touch();
        self.store.save_state(conversation_id, &state).await?;

        self.store
            .save_message(
                conversation_id,
                &ChatMessage::user(format!("{CLARIFICATION_RESPONSE_PREFIX}{response}")),
            )
            .await?;
        self.store.extend_ttl(conversation_id, self.default_ttl_seconds).await?;

        self.events
            .emit(Event::new(
                EventKind::ClarificationReceived,
                conversation_id,
                serde_json::json!({ "clarification_id": clarification_id }),
            ))
            .await;

        self.run_processing_pass(conversation_id, state).await
    }

    pub async fn end_conversation(&self, conversation_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(conversation_id).await;

        let Some(mut state) = self.store.get_state(conversation_id).await? else {
            return Ok(());
        };
        state.status = ConversationStatus::Completed;
        state.touch();
        self.store.save_state(conversation_id, &state).await?;

        self.events
            .emit(Event::new(EventKind::ChatEnded, conversation_id, serde_json::json!({})))
            .await;
        Ok(())
    }

    async fn run_processing_pass(&self, conversation_id: &str, mut state: ConversationState) -> Result<()> {
        match self.process_once(conversation_id, &mut state).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_clarification_required() => {
                let Error::ClarificationRequired { clarification_id, questions } = e else {
                    unreachable!()
                };
                state.status = ConversationStatus::AwaitingClarification;
                state.pending_clarification = Some(ClarificationState::new(&clarification_id, questions.clone()));
                state.touch();
                self.store.save_state(conversation_id, &state).await?;
                self.store
                    .save_clarification_request(conversation_id, &clarification_id, &questions)
                    .await?;
                self.events
                    .emit(Event::new(
                        EventKind::ClarificationRequested,
                        conversation_id,
                        serde_json::json!({ "clarification_id": clarification_id, "questions": questions }),
                    ))
                    .await;
                Ok(())
            }
            Err(e) => {
                state.status = ConversationStatus::Error;
                state.touch();
                let _ = self.store.save_state(conversation_id, &state).await;
                let (code, message) = e.client_mapping();
                tracing::error!(conversation_id, code, message, "processing pass failed");
                self.events
                    .emit(Event::new(
                        EventKind::Error,
                        conversation_id,
                        serde_json::json!({ "code": code, "message": message }),
                    ))
                    .await;
                Err(e)
            }
        }
    }

    /// One processing pass. Returns `ClarificationRequired`
    /// to signal the caller to transition into AWAITING_CLARIFICATION rather
    /// than treating it as a failure.
    async fn process_once(&self, conversation_id: &str, state: &mut ConversationState) -> Result<()> {
        let mut history = self.store.get_history(conversation_id, None).await?;

        if let Some(preprocessor) = &self.preprocessor {
            if let Some(position) = history.iter().rposition(|m| m.role == crate::domain::MessageRole::User) {
                let prior = history[..position].to_vec();
                let original = history[position].content.clone().unwrap_or_default();
                let refined = preprocessor.preprocess(conversation_id, &original, &prior, state.user_info.as_ref()).await;
                history[position].content = Some(refined);
            }
        }

        let examples = self.few_shot.get_examples(history.last().and_then(|m| m.content.as_deref()), FEW_SHOT_MAX_EXAMPLES).await;
        let examples_section = crate::few_shot::format_examples(&examples);
        let system_prompt = if examples_section.is_empty() {
            PLANNER_BASE_PROMPT.to_string()
        } else {
            format!("{PLANNER_BASE_PROMPT}\n\n## Example Workflows\n{examples_section}")
        };

        let mut working_messages = vec![ChatMessage::system(system_prompt)];
        working_messages.extend(history.clone());

        let outcome = self.planner.run(conversation_id, working_messages).await?;

        match outcome {
            PlannerOutcome::ClarificationNeeded { clarification_id, questions } => {
                return Err(Error::clarification_required(clarification_id, questions));
            }
            PlannerOutcome::TextOnly { text } => {
                self.store.save_message(conversation_id, &ChatMessage::assistant(&text)).await?;
                state.status = ConversationStatus::Completed;
                state.touch();
                self.store.save_state(conversation_id, state).await?;
                self.store.extend_ttl(conversation_id, self.default_ttl_seconds).await?;
            }
            PlannerOutcome::WorkflowProduced { text, workflow } => {
                self.store.save_message(conversation_id, &ChatMessage::assistant(&text)).await?;
                self.run_validation_and_emit(conversation_id, state, &history, workflow, &text).await?;
            }
        }

        Ok(())
    }

    async fn run_validation_and_emit(
        &self,
        conversation_id: &str,
        state: &mut ConversationState,
        history: &[ChatMessage],
        workflow: Workflow,
        user_text: &str,
    ) -> Result<()> {
        let context = ValidationContext {
            conversation_id: conversation_id.to_string(),
            user_query: user_text.to_string(),
            strict: false,
        };

        let result = self.validation.run(&workflow, &context).await?;

        if result.has_errors() {
            tracing::warn!(conversation_id, errors = ?result.errors, "workflow validation failed, conversation stays active");
            self.events
                .emit(Event::new(
                    EventKind::ValidatorProgressUpdate,
                    conversation_id,
                    serde_json::json!({ "stage": "failed", "errors": result.errors }),
                ))
                .await;
            return Ok(());
        }

        let mut validated = result.corrected_workflow.unwrap_or(workflow);

        if let Some(referencing) = &self.referencing {
            validated = referencing.run(conversation_id, history, &validated).await;
        }

        let job_name = self.job_name.generate(&validated, Some(user_text)).await;
        validated.job_name = Some(job_name);

        self.store.extend_ttl(conversation_id, self.default_ttl_seconds).await?;
        state.status = ConversationStatus::Completed;
        state.touch();
        self.store.save_state(conversation_id, state).await?;

        self.events
            .emit(Event::new(
                EventKind::OpkeyWorkflowJson,
                conversation_id,
                serde_json::to_value(&validated).unwrap_or(serde_json::json!({})),
            ))
            .await;

        Ok(())
    }
}

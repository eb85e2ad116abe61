//! Research execution strategies.
//!
//! A job runs one of two strategies, picked once from its model identifier:
//!
//! - [`ResearchStrategy::Direct`]: one long completion call.
//! - [`ResearchStrategy::Polling`]: submit a background interaction to a
//!   hosted research agent, then poll it until it ends.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::errors::JobExecutionError;
use super::types::ResearchOutcome;
use crate::config::ProviderCredential;
use crate::inference::{
    ChatMessage, CompletionBackend, CompletionRequest, InteractionRequest, InteractionStatus,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Upper bound on a single direct research call.
const DIRECT_RESEARCH_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default delay between interaction status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const GEMINI_RESEARCH_PREFIX: &str = "gemini/deep-research";

// ─── Strategy ────────────────────────────────────────────────────────────────

/// What to research, and with which key.
#[derive(Debug, Clone)]
pub struct ResearchTask {
    pub model: String,
    pub query: String,
    pub credential: ProviderCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchStrategy {
    Direct,
    Polling { poll_interval: Duration },
}

impl ResearchStrategy {
    pub fn for_model(model: &str) -> Self {
        if model.starts_with(GEMINI_RESEARCH_PREFIX) {
            ResearchStrategy::Polling {
                poll_interval: DEFAULT_POLL_INTERVAL,
            }
        } else {
            ResearchStrategy::Direct
        }
    }

    /// Run the task to completion, or until `cancel` fires.
    pub async fn run(
        self,
        backend: Arc<dyn CompletionBackend>,
        task: ResearchTask,
        cancel: CancellationToken,
    ) -> Result<ResearchOutcome, JobExecutionError> {
        match self {
            ResearchStrategy::Direct => run_direct(backend.as_ref(), task).await,
            ResearchStrategy::Polling { poll_interval } => {
                run_polling(backend.as_ref(), task, poll_interval, &cancel).await
            }
        }
    }
}

/// OpenAI deep-research models need the hosted web search tool.
pub fn is_openai_research(model: &str) -> bool {
    model.starts_with("openai/") && model.contains("deep-research")
}

async fn run_direct(
    backend: &dyn CompletionBackend,
    task: ResearchTask,
) -> Result<ResearchOutcome, JobExecutionError> {
    let web_search = is_openai_research(&task.model);
    let request = CompletionRequest {
        model: task.model,
        credential: task.credential,
        messages: vec![ChatMessage::user(task.query)],
        temperature: None,
        timeout: DIRECT_RESEARCH_TIMEOUT,
        web_search,
    };

    let completion = backend.complete(request).await?;
    Ok(ResearchOutcome {
        report: completion.text,
        citations: completion.citations,
    })
}

async fn run_polling(
    backend: &dyn CompletionBackend,
    task: ResearchTask,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<ResearchOutcome, JobExecutionError> {
    let agent = task
        .model
        .strip_prefix("gemini/")
        .unwrap_or(&task.model)
        .to_string();
    let api_key = task.credential.api_key().to_string();

    let interaction_id = backend
        .create_interaction(InteractionRequest {
            agent,
            input: task.query,
            api_key: api_key.clone(),
        })
        .await?;
    tracing::info!(model = %task.model, interaction_id = %interaction_id, "research interaction submitted");

    loop {
        let interaction = backend.get_interaction(&interaction_id, &api_key).await?;
        match interaction.status {
            InteractionStatus::Completed => {
                let output = interaction.final_output();
                return Ok(ResearchOutcome {
                    report: output.text,
                    citations: output.citations,
                });
            }
            InteractionStatus::Failed | InteractionStatus::Cancelled => {
                return Err(JobExecutionError::Remote(
                    interaction
                        .error_message()
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ));
            }
            InteractionStatus::InProgress | InteractionStatus::Unknown => {
                tracing::debug!(interaction_id = %interaction_id, "research interaction still running");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(interaction_id = %interaction_id, "stopped polling research interaction");
                return Err(JobExecutionError::Cancelled);
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

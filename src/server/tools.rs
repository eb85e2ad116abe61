//! The gateway's tool surface.
//!
//! [`GatewayState`] holds everything a tool call needs: the current
//! configuration snapshot, model discovery, the research job store and the
//! completion backend. Each tool is one method returning the text sent back
//! to the caller.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::errors::ToolError;
use super::types::McpToolDefinition;
use crate::config::{family, ConfigError, GatewayConfig};
use crate::feedback::{self, FeedbackEntry};
use crate::inference::{ChatMessage, CompletionBackend, CompletionRequest};
use crate::jobs::{
    CancelOutcome, Job, JobId, JobStatus, JobStore, ResearchStrategy, ResearchTask,
    WaitInterrupted, WaitOutcome,
};
use crate::models::{resolve, ModelDiscovery, ModelSource};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for a synchronous `completion` call.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bounded wait for `start_research`, in seconds.
const DEFAULT_RESEARCH_WAIT_SECS: u64 = 300;

const MAX_SUGGESTIONS: usize = 5;

/// Queries longer than this are cut in the job table.
const QUERY_PREVIEW_CHARS: usize = 50;

const FEEDBACK_THANKS: &str = "Feedback recorded. Thank you.";

// ─── Arguments ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct SearchFamiliesArgs {
    search: Option<String>,
    zdr: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchModelsArgs {
    search: Option<String>,
    zdr: Option<bool>,
    favourites_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CompletionArgs {
    model: String,
    prompt: String,
    system: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct FeedbackArgs {
    issue: String,
    tool_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartResearchArgs {
    model: String,
    query: String,
    #[serde(default = "default_research_wait")]
    timeout: u64,
}

fn default_research_wait() -> u64 {
    DEFAULT_RESEARCH_WAIT_SECS
}

#[derive(Debug, Default, Deserialize)]
struct CheckResearchArgs {
    job_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CancelResearchArgs {
    job_id: u64,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: serde_json::Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| ToolError::InvalidArgument(format!("Invalid arguments for {tool}: {e}")))
}

// ─── GatewayState ────────────────────────────────────────────────────────────

/// Shared server state.
pub struct GatewayState {
    config: RwLock<Arc<GatewayConfig>>,
    discovery: ModelDiscovery,
    jobs: JobStore,
    backend: Arc<dyn CompletionBackend>,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        source: Arc<dyn ModelSource>,
        backend: Arc<dyn CompletionBackend>,
        jobs: JobStore,
    ) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            discovery: ModelDiscovery::new(source),
            jobs,
            backend,
        }
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<GatewayConfig> {
        Arc::clone(&*self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Re-read the environment and swap the new configuration in.
    ///
    /// On error the previous configuration stays active.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = GatewayConfig::from_env()?;
        self.replace_config(config);
        Ok(())
    }

    /// Install `config` and drop every cached model list.
    pub fn replace_config(&self, config: GatewayConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
        self.discovery.cache().clear();
        tracing::info!("configuration reloaded, model cache cleared");
    }

    /// Text returned as `instructions` from `initialize`.
    pub fn instructions(&self) -> String {
        build_instructions(&self.config())
    }

    /// Dispatch one `tools/call`.
    ///
    /// `cancel` is the calling request's own token; it never cancels a job.
    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        match name {
            "search_families" => self.search_families(parse_args(name, args)?).await,
            "search_models" => self.search_models(parse_args(name, args)?).await,
            "completion" => self.completion(parse_args(name, args)?, cancel).await,
            "feedback" => self.feedback(parse_args(name, args)?),
            "start_research" => self.start_research(parse_args(name, args)?, cancel).await,
            "check_research" => Ok(self.check_research(parse_args(name, args)?)),
            "cancel_research" => Ok(self.cancel_research(parse_args(name, args)?)),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    // ─── Discovery tools ─────────────────────────────────────────────────

    async fn search_families(&self, args: SearchFamiliesArgs) -> Result<String, ToolError> {
        let config = self.config();
        let models = self.discovery.get_models(&config, None, args.zdr).await;

        let mut families: Vec<&str> = models.iter().map(|m| family(m)).collect();
        families.sort_unstable();
        families.dedup();
        if let Some(search) = non_empty(args.search.as_deref()) {
            let needle = search.to_lowercase();
            families.retain(|f| f.to_lowercase().contains(&needle));
        }

        Ok(zdr_warning(
            config.zero_data_retention,
            args.zdr,
            families.join("\n"),
        ))
    }

    async fn search_models(&self, args: SearchModelsArgs) -> Result<String, ToolError> {
        let config = self.config();
        let mut models = if args.favourites_only.unwrap_or(false) {
            config.favourites.clone()
        } else {
            self.discovery.get_models(&config, None, args.zdr).await
        };

        if let Some(search) = non_empty(args.search.as_deref()) {
            let needle = search.to_lowercase();
            models.retain(|m| m.to_lowercase().contains(&needle));
        }

        let lines: Vec<String> = models
            .iter()
            .map(|m| match config.catalog.description(m) {
                Some(description) => format!("{m} — {description}"),
                None => m.clone(),
            })
            .collect();

        Ok(zdr_warning(
            config.zero_data_retention,
            args.zdr,
            lines.join("\n"),
        ))
    }

    // ─── Completion ──────────────────────────────────────────────────────

    async fn completion(
        &self,
        args: CompletionArgs,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let config = self.config();
        let resolved = resolve(&config, &args.model)?;

        if let Some(temperature) = args.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ToolError::InvalidArgument(
                    "Temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        let provider = resolved.provider().to_string();
        let known = self
            .discovery
            .get_models(&config, Some(&provider), None)
            .await;
        if !known.is_empty() && !known.contains(&resolved.model) {
            return Err(ToolError::UnknownModel {
                suggestions: suggest_similar(&resolved.model, &known),
                model: resolved.model,
                provider,
            });
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = non_empty(args.system.as_deref()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(args.prompt));

        tracing::info!(model = %resolved.model, provider = %provider, "completion requested");
        let request = CompletionRequest {
            model: resolved.model,
            credential: resolved.credential,
            messages,
            temperature: args.temperature,
            timeout: COMPLETION_TIMEOUT,
            web_search: false,
        };

        let completion = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::Interrupted),
            result = self.backend.complete(request) => result?,
        };
        Ok(completion.text)
    }

    // ─── Feedback ────────────────────────────────────────────────────────

    fn feedback(&self, args: FeedbackArgs) -> Result<String, ToolError> {
        let config = self.config();
        let entry = FeedbackEntry::new(args.issue, args.tool_name.as_deref());
        feedback::record(&config.feedback_log, &entry)?;
        Ok(FEEDBACK_THANKS.to_string())
    }

    // ─── Research ────────────────────────────────────────────────────────

    async fn start_research(
        &self,
        args: StartResearchArgs,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let config = self.config();
        let resolved = resolve(&config, &args.model)?;

        let job = self.jobs.create_job(resolved.model.clone(), args.query.clone());
        let strategy = ResearchStrategy::for_model(&resolved.model);
        let task = ResearchTask {
            model: resolved.model,
            query: args.query,
            credential: resolved.credential,
        };
        let backend = Arc::clone(&self.backend);
        self.jobs
            .schedule(job.id, move |token| strategy.run(backend, task, token));

        let outcome = self
            .jobs
            .wait(job.id, Duration::from_secs(args.timeout), cancel)
            .await
            .map_err(|WaitInterrupted| ToolError::Interrupted)?;

        Ok(match outcome {
            WaitOutcome::Finished(job) => match job.status {
                JobStatus::Completed => render_report(&job),
                JobStatus::Cancelled => format!("Research cancelled (job_id={}).", job.id),
                _ => format!(
                    "Research failed (job_id={}): {}",
                    job.id,
                    job.error.as_deref().unwrap_or("Unknown error")
                ),
            },
            WaitOutcome::StillRunning(job) => format!(
                "Research is still running (job_id={}). Use check_research to retrieve \
                 results later, or cancel_research to stop it.",
                job.id
            ),
            WaitOutcome::NotFound => not_found(job.id),
        })
    }

    fn check_research(&self, args: CheckResearchArgs) -> String {
        let Some(id) = args.job_id else {
            return render_job_table(&self.jobs.list());
        };
        let id = JobId(id);
        let Some(job) = self.jobs.get(id) else {
            return format!(
                "No job found with job_id={id}. Use check_research with no arguments to list all jobs."
            );
        };

        match (job.status, job.error.as_deref()) {
            (JobStatus::InProgress, _) => format!(
                "Job {id} is still in progress (started {}).",
                job.started_at.format("%H:%M")
            ),
            (JobStatus::Completed, _) => render_report(&job),
            (status, Some(error)) if !error.is_empty() => format!("Job {id} {status}: {error}"),
            (status, _) => format!("Job {id} {status}."),
        }
    }

    fn cancel_research(&self, args: CancelResearchArgs) -> String {
        let id = JobId(args.job_id);
        match self.jobs.cancel(id) {
            CancelOutcome::Cancelled => format!("Job {id} cancelled."),
            CancelOutcome::AlreadyTerminal(status) => format!("Job {id} is already {status}."),
            CancelOutcome::NotFound => not_found(id),
        }
    }
}

// ─── Rendering ───────────────────────────────────────────────────────────────

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn not_found(id: JobId) -> String {
    format!("No job found with job_id={id}.")
}

/// Prefix a warning when the caller overrides the configured ZDR default.
pub fn zdr_warning(default: bool, zdr: Option<bool>, result: String) -> String {
    match zdr {
        Some(z) if z != default && z => format!(
            "⚠️ ZDR filter enabled (overriding server default of off).\n\n{result}"
        ),
        Some(z) if z != default => format!(
            "⚠️ ZDR filter disabled (overriding server default of on). Some models listed \
             may reject requests due to your provider's data retention policy.\n\n{result}"
        ),
        _ => result,
    }
}

/// Up to five known models containing the first `-` token of the model name.
fn suggest_similar(model: &str, known: &[String]) -> Vec<String> {
    let name = model.split_once('/').map(|(_, n)| n).unwrap_or(model);
    let token = name.split('-').next().unwrap_or(name);
    known
        .iter()
        .filter(|m| m.to_lowercase().contains(token))
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect()
}

/// `{"report": ..., "citations": [...]}`, citations omitted when empty.
fn render_report(job: &Job) -> String {
    let mut body = serde_json::json!({ "report": job.result.as_deref().unwrap_or_default() });
    if !job.citations.is_empty() {
        body["citations"] = serde_json::json!(job.citations);
    }
    body.to_string()
}

fn render_job_table(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No research tasks found.".to_string();
    }

    let mut lines = vec![
        "| job_id | model | status | query | started | ended |".to_string(),
        "|--------|-------|--------|-------|---------|-------|".to_string(),
    ];
    for job in jobs {
        let query = if job.query.chars().count() > QUERY_PREVIEW_CHARS {
            let cut: String = job.query.chars().take(QUERY_PREVIEW_CHARS).collect();
            format!("{cut}…")
        } else {
            job.query.clone()
        };
        let ended = job
            .ended_at
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} |",
            job.id,
            job.model,
            job.status,
            query,
            job.started_at.format("%H:%M"),
            ended
        ));
    }
    lines.join("\n")
}

/// Purpose, usage guidance and favourites for `initialize`.
pub fn build_instructions(config: &GatewayConfig) -> String {
    let mut lines: Vec<String> = [
        "Purpose:",
        "  - Ask another LLM for a second opinion.",
        "  - Provide access to other models across the configured providers.",
        "Howto:",
        "  - For a quick query, use completion with a favourite shorthand (see below).",
        "  - To find any model, use search_models — results include descriptions",
        "    from the model catalog when available.",
        "  - For deep research tasks, use start_research. If it is interrupted or",
        "    times out, the task continues in the background — use check_research",
        "    to retrieve results later, or cancel_research to stop a running task.",
        "  - Never guess model IDs.",
        "Feedback:",
        "  - We'd love to hear how ask-another is working for you. Call",
        "    feedback to share issues, suggestions, or anything that felt",
        "    harder than it should be.",
        "  - Call feedback before retrying if you receive confusing output",
        "    or a tool call fails — it helps us improve.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if !config.favourites.is_empty() {
        lines.push("Favourite Models:".to_string());
        for fav in &config.favourites {
            match config.catalog.description(fav) {
                Some(description) => lines.push(format!("  - {fav} — {description}")),
                None => lines.push(format!("  - {fav}")),
            }
        }
    }
    lines.join("\n")
}

// ─── Tool definitions ────────────────────────────────────────────────────────

/// Everything advertised by `tools/list`.
pub fn tool_definitions() -> Vec<McpToolDefinition> {
    use serde_json::json;

    let zdr = json!({
        "type": "boolean",
        "description": "Filter OpenRouter models to ZDR-compatible only. Defaults to the \
                        server's ZERO_DATA_RETENTION setting. Set explicitly to override."
    });

    vec![
        McpToolDefinition {
            name: "search_families",
            description: "Browse available provider groupings (e.g. 'openai', \
                          'openrouter/deepseek'). Use this to explore what's available \
                          before drilling into specific models with search_models.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "search": {"type": "string", "description": "Substring filter applied to family names"},
                    "zdr": zdr.clone(),
                }
            }),
        },
        McpToolDefinition {
            name: "search_models",
            description: "Find exact model identifiers. Always call this to verify a model \
                          ID before passing it to completion or start_research — do not \
                          guess IDs.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "search": {"type": "string", "description": "Substring filter applied to full model identifiers"},
                    "zdr": zdr,
                    "favourites_only": {"type": "boolean", "description": "List only the configured favourites"},
                }
            }),
        },
        McpToolDefinition {
            name: "completion",
            description: "Call a model for a quick completion. Use this for standard prompts \
                          that return in seconds — use start_research instead for deep \
                          research tasks. Use a favourite shorthand (e.g. 'openai') or an \
                          exact model ID verified via search_models. Do not set temperature \
                          unless you have a specific reason — some models reject non-default \
                          values.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {"type": "string", "description": "Full model identifier (e.g. 'openai/gpt-4o') or favourite shorthand (e.g. 'openai')"},
                    "prompt": {"type": "string", "description": "The user prompt to send to the model"},
                    "system": {"type": "string", "description": "Optional system prompt"},
                    "temperature": {"type": "number", "minimum": 0.0, "maximum": 2.0, "description": "Sampling temperature (0.0-2.0). Omit to use model default."},
                },
                "required": ["model", "prompt"]
            }),
        },
        McpToolDefinition {
            name: "feedback",
            description: "Help us improve ask-another by sharing your experience. Call this \
                          whenever you're unsure how to proceed, receive confusing output, or \
                          a tool doesn't behave as expected. Lightweight and safe to call at \
                          any time.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "issue": {"type": "string", "description": "What happened and what you expected, or what could work better"},
                    "tool_name": {"type": "string", "description": "Which tool was involved, if applicable"},
                },
                "required": ["issue"]
            }),
        },
        McpToolDefinition {
            name: "start_research",
            description: "Start a deep research task. The model searches the web, reads \
                          sources, and synthesizes a cited report. Waits for results up to \
                          `timeout` seconds; if interrupted or timed out, the research \
                          continues in the background — use check_research to retrieve \
                          results later.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {"type": "string", "description": "Model to use (e.g. 'openrouter/perplexity/sonar-deep-research'). Use search_models with 'deep-research' to find available models."},
                    "query": {"type": "string", "description": "The research question or topic to investigate"},
                    "timeout": {"type": "integer", "minimum": 0, "default": DEFAULT_RESEARCH_WAIT_SECS, "description": "Max seconds to wait for results. If exceeded, the task continues in the background."},
                },
                "required": ["model", "query"]
            }),
        },
        McpToolDefinition {
            name: "check_research",
            description: "Check on research tasks started with start_research. With no \
                          arguments, returns a table of all tasks. With a job_id, returns \
                          the full results of a completed task.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_id": {"type": "integer", "description": "A specific job to retrieve. Omit to list all jobs."},
                }
            }),
        },
        McpToolDefinition {
            name: "cancel_research",
            description: "Cancel a running research task. Use check_research first to find \
                          the job_id of the task you want to cancel.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_id": {"type": "integer", "description": "The job to cancel"},
                },
                "required": ["job_id"]
            }),
        },
    ]
}

// ─── Tests ───────────────────────────────────────────────────────────────────

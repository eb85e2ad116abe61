//! Shared types for the inference backend.
//!
//! The wire types mirror the OpenAI Chat Completions API, the OpenAI
//! Responses API and Google's Interactions API, used for both request
//! building and response parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ProviderCredential;

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

/// A completion to run against a resolved model.
///
/// `model` is the full `provider/model-name` identifier; the backend strips
/// the provider segment before sending.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub credential: ProviderCredential,
    pub messages: Vec<ChatMessage>,
    /// `None` leaves the provider default in place.
    pub temperature: Option<f32>,
    pub timeout: Duration,
    /// Ask for the provider's hosted web search tool (OpenAI deep research).
    pub web_search: bool,
}

/// Start a background interaction with a hosted research agent.
#[derive(Debug, Clone)]
pub struct InteractionRequest {
    /// Agent name without the provider prefix, e.g. `deep-research-pro-preview`.
    pub agent: String,
    pub input: String,
    pub api_key: String,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// A finished completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub citations: Vec<String>,
}

/// Lifecycle state reported by the Interactions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
    /// Anything the API adds later is treated as still running.
    #[serde(other)]
    Unknown,
}

/// One output item of an interaction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionOutput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub annotations: Vec<InteractionAnnotation>,
}

/// A citation attached to an interaction output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionAnnotation {
    #[serde(default)]
    pub source: Option<String>,
}

/// Snapshot of an interaction as returned by `GET /interactions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub status: InteractionStatus,
    #[serde(default)]
    pub outputs: Vec<InteractionOutput>,
    /// Free-form error payload (string or object, depending on the failure).
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl Interaction {
    /// Text and citation sources of the latest output item.
    pub fn final_output(&self) -> Completion {
        let Some(last) = self.outputs.last() else {
            return Completion::default();
        };
        Completion {
            text: last.text.clone().unwrap_or_default(),
            citations: last
                .annotations
                .iter()
                .filter_map(|a| a.source.clone())
                .collect(),
        }
    }

    /// Human-readable error text, if the interaction reported one.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(
                other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| other.to_string()),
            ),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

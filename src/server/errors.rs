//! Tool and transport error types.

use thiserror::Error;

use crate::feedback::FeedbackError;
use crate::inference::InferenceError;
use crate::models::ResolveError;

/// Errors surfaced by a tool call.
///
/// All but [`ToolError::Interrupted`] and [`ToolError::UnknownTool`] are
/// rendered back to the caller as an `isError` tool result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArgument(String),

    /// The model resolved but is missing from its provider's listing.
    #[error(
        "Model '{model}' not found in {provider}'s model list.{} \
         Use search_models to find valid identifiers. \
         If this seems like a bug, call the feedback tool to report it.",
        render_suggestions(.suggestions)
    )]
    UnknownModel {
        model: String,
        provider: String,
        suggestions: Vec<String>,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Completion failed: {0}")]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    /// No tool with this name.
    #[error("Unknown tool: '{0}'")]
    UnknownTool(String),

    /// The client cancelled the request; no response is sent.
    #[error("request cancelled by client")]
    Interrupted,
}

/// Failures of the stdio transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to read from stdin: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write to stdout: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn render_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" Similar models: {}", suggestions.join(", "))
    }
}

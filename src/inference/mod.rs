//! Inference backend, the boundary to the providers' completion APIs.
//!
//! This module handles all communication with remote model endpoints:
//! - Non-streaming chat completions (OpenAI-compatible dialect)
//! - The OpenAI Responses API for deep-research models with web search
//! - Google's Interactions API for background research agents
//!
//! Model identifiers are `provider/model-name`; the provider segment selects
//! a row of the endpoint table and the rest is sent as the model name.

pub mod client;
pub mod endpoints;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{CompletionBackend, HttpBackend};
pub use errors::InferenceError;
pub use types::{
    ChatMessage, Completion, CompletionRequest, Interaction, InteractionRequest,
    InteractionStatus, Role,
};

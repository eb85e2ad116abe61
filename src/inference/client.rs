//! Provider completion backend.
//!
//! [`CompletionBackend`] is the seam between the gateway and the outside
//! world: tools and research jobs only ever talk to this trait, and tests
//! swap in fakes. [`HttpBackend`] is the production implementation on top of
//! `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::endpoints::{route, GEMINI_API_BASE, GOOGLE_API_KEY_HEADER};
use super::errors::InferenceError;
use super::types::{
    ChatCompletionRequest, ChatMessage, Completion, CompletionRequest, Interaction,
    InteractionRequest, Role,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for interaction create/status calls (the work itself runs remotely).
const INTERACTION_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Backend trait ───────────────────────────────────────────────────────────

/// Everything the gateway needs from a provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion to the end.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, InferenceError>;

    /// Submit a background interaction; returns its id.
    async fn create_interaction(&self, request: InteractionRequest)
        -> Result<String, InferenceError>;

    /// Fetch the current state of an interaction.
    async fn get_interaction(
        &self,
        interaction_id: &str,
        api_key: &str,
    ) -> Result<Interaction, InferenceError>;
}

// ─── HttpBackend ─────────────────────────────────────────────────────────────

/// `reqwest`-based backend for all providers in the endpoint table.
#[derive(Clone)]
pub struct HttpBackend {
    http: HttpClient,
}

impl HttpBackend {
    pub fn new() -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: "(client)".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        timeout: Duration,
    ) -> Result<String, InferenceError> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| InferenceError::from_request(url, timeout, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::from_request(url, timeout, &e))?;

        if !status.is_success() {
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn chat_completion(&self, request: &CompletionRequest) -> Result<Completion, InferenceError> {
        let (endpoint, model_name) = route(&request.model)?;
        let url = endpoint.url("chat/completions");

        let body = ChatCompletionRequest {
            model: model_name.to_string(),
            messages: request.messages.clone(),
            temperature: request.temperature,
            stream: false,
        };

        tracing::info!(
            url = %url,
            model = %request.model,
            message_count = body.messages.len(),
            timeout_secs = request.timeout.as_secs(),
            "=== LLM REQUEST ==="
        );

        let builder = endpoint.authorize(self.http.post(&url), request.credential.api_key());
        let text = self.send(builder.json(&body), &url, request.timeout).await?;
        parse_chat_completion(&text)
    }

    /// OpenAI deep-research models only accept the Responses API with a
    /// hosted web search tool.
    async fn responses_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, InferenceError> {
        let (endpoint, model_name) = route(&request.model)?;
        let url = endpoint.url("responses");

        let instructions: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let input: Vec<&ChatMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();

        let mut body = serde_json::json!({
            "model": model_name,
            "input": input,
            "tools": [{"type": "web_search_preview"}],
        });
        if !instructions.is_empty() {
            body["instructions"] = serde_json::Value::String(instructions.join("\n\n"));
        }

        tracing::info!(
            url = %url,
            model = %request.model,
            timeout_secs = request.timeout.as_secs(),
            "=== LLM REQUEST (responses) ==="
        );

        let builder = endpoint.authorize(self.http.post(&url), request.credential.api_key());
        let text = self.send(builder.json(&body), &url, request.timeout).await?;
        parse_responses_output(&text)
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, InferenceError> {
        if request.web_search && request.credential.provider() == "openai" {
            self.responses_completion(&request).await
        } else {
            self.chat_completion(&request).await
        }
    }

    async fn create_interaction(
        &self,
        request: InteractionRequest,
    ) -> Result<String, InferenceError> {
        let url = format!("{GEMINI_API_BASE}/interactions");
        let body = serde_json::json!({
            "agent": request.agent,
            "input": request.input,
            "background": true,
        });

        tracing::info!(url = %url, agent = %request.agent, "creating background interaction");

        let builder = self
            .http
            .post(&url)
            .header(GOOGLE_API_KEY_HEADER, &request.api_key)
            .json(&body);
        let text = self.send(builder, &url, INTERACTION_REQUEST_TIMEOUT).await?;

        #[derive(Deserialize)]
        struct Created {
            id: String,
        }
        let created: Created = serde_json::from_str(&text).map_err(|e| InferenceError::ParseError {
            reason: format!("interaction create response: {e}"),
        })?;
        Ok(created.id)
    }

    async fn get_interaction(
        &self,
        interaction_id: &str,
        api_key: &str,
    ) -> Result<Interaction, InferenceError> {
        let url = format!("{GEMINI_API_BASE}/interactions/{interaction_id}");
        let builder = self.http.get(&url).header(GOOGLE_API_KEY_HEADER, api_key);
        let text = self.send(builder, &url, INTERACTION_REQUEST_TIMEOUT).await?;

        serde_json::from_str(&text).map_err(|e| InferenceError::ParseError {
            reason: format!("interaction status response: {e}"),
        })
    }
}

// ─── Response parsing ────────────────────────────────────────────────────────

/// Parse a non-streaming Chat Completions response.
///
/// Citations come from either the top-level `citations` array (Perplexity
/// models) or `url_citation` annotations on the message (OpenRouter web
/// search). Duplicates are dropped, first occurrence wins.
pub fn parse_chat_completion(body: &str) -> Result<Completion, InferenceError> {
    #[derive(Deserialize)]
    struct Response {
        choices: Vec<Choice>,
        #[serde(default)]
        citations: Vec<String>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: Message,
    }

    #[derive(Deserialize)]
    struct Message {
        content: Option<String>,
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    }

    let resp: Response = serde_json::from_str(body).map_err(|e| InferenceError::ParseError {
        reason: format!("chat completion: {e}"),
    })?;

    let choice = resp.choices.into_iter().next().ok_or(InferenceError::ParseError {
        reason: "empty choices array".into(),
    })?;

    let mut citations = resp.citations;
    citations.extend(
        choice
            .message
            .annotations
            .iter()
            .filter_map(|a| a.pointer("/url_citation/url").and_then(|u| u.as_str()))
            .map(String::from),
    );

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        citations: dedup_preserving_order(citations),
    })
}

/// Parse an OpenAI Responses API body: concatenated `output_text` parts and
/// their `url_citation` annotations.
pub fn parse_responses_output(body: &str) -> Result<Completion, InferenceError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| InferenceError::ParseError {
            reason: format!("responses output: {e}"),
        })?;

    let output = value
        .get("output")
        .and_then(|o| o.as_array())
        .ok_or(InferenceError::ParseError {
            reason: "responses output missing 'output' array".into(),
        })?;

    let mut texts = Vec::new();
    let mut citations = Vec::new();

    let parts = output
        .iter()
        .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("message"))
        .filter_map(|item| item.get("content").and_then(|c| c.as_array()))
        .flatten()
        .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("output_text"));

    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            texts.push(text.to_string());
        }
        if let Some(annotations) = part.get("annotations").and_then(|a| a.as_array()) {
            citations.extend(
                annotations
                    .iter()
                    .filter(|a| a.get("type").and_then(|t| t.as_str()) == Some("url_citation"))
                    .filter_map(|a| a.get("url").and_then(|u| u.as_str()))
                    .map(String::from),
            );
        }
    }

    Ok(Completion {
        text: texts.join("\n\n"),
        citations: dedup_preserving_order(citations),
    })
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_completion_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let completion = parse_chat_completion(body).unwrap();
        assert_eq!(completion.text, "hello");
        assert!(completion.citations.is_empty());
    }

    #[test]
    fn test_parse_chat_completion_citations() {
        let body = r#"{
            "citations": ["https://a.test", "https://b.test"],
            "choices": [{"message": {
                "content": "report",
                "annotations": [
                    {"type": "url_citation", "url_citation": {"url": "https://b.test"}},
                    {"type": "url_citation", "url_citation": {"url": "https://c.test"}}
                ]
            }}]
        }"#;
        let completion = parse_chat_completion(body).unwrap();
        assert_eq!(
            completion.citations,
            vec!["https://a.test", "https://b.test", "https://c.test"]
        );
    }

    #[test]
    fn test_parse_chat_completion_null_content() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(parse_chat_completion(body).unwrap().text, "");
    }

    #[test]
    fn test_parse_chat_completion_empty_choices() {
        let err = parse_chat_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, InferenceError::ParseError { .. }));
    }

    #[test]
    fn test_parse_responses_output() {
        let body = r#"{
            "output": [
                {"type": "web_search_call", "status": "completed"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Findings.",
                     "annotations": [{"type": "url_citation", "url": "https://src.test"}]}
                ]}
            ]
        }"#;
        let completion = parse_responses_output(body).unwrap();
        assert_eq!(completion.text, "Findings.");
        assert_eq!(completion.citations, vec!["https://src.test"]);
    }

    #[test]
    fn test_parse_responses_missing_output() {
        assert!(parse_responses_output(r#"{"id":"resp_1"}"#).is_err());
    }
}

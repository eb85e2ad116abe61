//! Provider endpoint table.
//!
//! Every supported provider speaks the OpenAI Chat Completions dialect at
//! some base URL. Model identifiers are `provider/model-name`; the provider
//! segment picks the row, and the remainder is sent as the `model` field.

use reqwest::RequestBuilder;

use super::errors::InferenceError;

/// Base URL of Google's native Generative Language API (Interactions live here).
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Header used by Google's native API for the key.
pub const GOOGLE_API_KEY_HEADER: &str = "x-goog-api-key";

/// How the API key is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `x-api-key: <key>` plus `anthropic-version`.
    Anthropic,
}

/// One provider's OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ProviderEndpoint {
    pub provider: &'static str,
    pub base_url: &'static str,
    pub auth: AuthStyle,
}

const ENDPOINTS: &[ProviderEndpoint] = &[
    ProviderEndpoint {
        provider: "openai",
        base_url: "https://api.openai.com/v1",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "anthropic",
        base_url: "https://api.anthropic.com/v1",
        auth: AuthStyle::Anthropic,
    },
    ProviderEndpoint {
        provider: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "groq",
        base_url: "https://api.groq.com/openai/v1",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "mistral",
        base_url: "https://api.mistral.ai/v1",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "xai",
        base_url: "https://api.x.ai/v1",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "together",
        base_url: "https://api.together.xyz/v1",
        auth: AuthStyle::Bearer,
    },
    ProviderEndpoint {
        provider: "perplexity",
        base_url: "https://api.perplexity.ai",
        auth: AuthStyle::Bearer,
    },
];

/// Look up the endpoint for a provider name.
pub fn endpoint_for(provider: &str) -> Option<&'static ProviderEndpoint> {
    ENDPOINTS.iter().find(|e| e.provider == provider)
}

impl ProviderEndpoint {
    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Attach the provider's credentials to a request.
    pub fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        match self.auth {
            AuthStyle::Bearer => request.bearer_auth(api_key),
            AuthStyle::Anthropic => request
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01"),
        }
    }
}

/// Split `provider/model-name` into its two halves.
pub fn split_model_id(model_id: &str) -> Result<(&str, &str), InferenceError> {
    model_id
        .split_once('/')
        .filter(|(provider, name)| !provider.is_empty() && !name.is_empty())
        .ok_or_else(|| InferenceError::MissingProvider {
            model: model_id.to_string(),
        })
}

/// Resolve the endpoint and provider-local model name for a full identifier.
pub fn route(model_id: &str) -> Result<(&'static ProviderEndpoint, &str), InferenceError> {
    let (provider, name) = split_model_id(model_id)?;
    let endpoint = endpoint_for(provider).ok_or_else(|| InferenceError::UnsupportedProvider {
        provider: provider.to_string(),
    })?;
    Ok((endpoint, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_keeps_nested_model_name() {
        let (endpoint, name) = route("openrouter/perplexity/sonar-deep-research").unwrap();
        assert_eq!(endpoint.provider, "openrouter");
        assert_eq!(name, "perplexity/sonar-deep-research");
    }

    #[test]
    fn test_route_unknown_provider() {
        let err = route("acme/model-1").unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedProvider { provider } if provider == "acme"));
    }

    #[test]
    fn test_split_requires_both_halves() {
        assert!(split_model_id("gpt-4o").is_err());
        assert!(split_model_id("/gpt-4o").is_err());
        assert!(split_model_id("openai/").is_err());
    }

    #[test]
    fn test_url_join() {
        let endpoint = endpoint_for("openai").unwrap();
        assert_eq!(endpoint.url("/models"), "https://api.openai.com/v1/models");
        assert_eq!(
            endpoint.url("chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}

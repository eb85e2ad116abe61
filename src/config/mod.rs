//! Gateway configuration.
//!
//! Everything the gateway knows about providers, favourites and caching comes
//! from the process environment, parsed once at startup into an immutable
//! [`GatewayConfig`] snapshot:
//!
//! - `PROVIDER_*`: `provider-name;api-key` credentials
//! - `FAVOURITES`: comma-separated full model identifiers (one per family)
//! - `CACHE_TTL`: model-list cache lifetime in minutes (default 360)
//! - `ZERO_DATA_RETENTION`: default OpenRouter ZDR filtering (default on)
//! - `MODELS_PSV`: path to the model catalog
//! - `FEEDBACK_LOG`: path to the feedback JSON-lines file
//!
//! A reload builds a fresh snapshot and swaps it in wholesale.

pub mod catalog;
pub mod env;
pub mod errors;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub use catalog::{ModelCatalog, ModelMeta};
pub use errors::ConfigError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// A provider name and its API key.
///
/// `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredential {
    provider: String,
    api_key: String,
}

impl ProviderCredential {
    pub fn new(provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            api_key: api_key.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Provider name → credential.
    pub providers: BTreeMap<String, ProviderCredential>,
    /// Full model identifiers, at most one per family.
    pub favourites: Vec<String>,
    /// How long a discovered model list stays fresh.
    pub cache_ttl: Duration,
    /// Default ZDR filtering for OpenRouter discovery.
    pub zero_data_retention: bool,
    pub catalog: ModelCatalog,
    pub feedback_log: PathBuf,
}

impl GatewayConfig {
    /// Build the configuration from the current process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        env::from_vars(std::env::vars())
    }

    /// Credential for a configured provider.
    pub fn credential(&self, provider: &str) -> Option<&ProviderCredential> {
        self.providers.get(provider)
    }

    /// The provider whose `name/` prefixes `model_id`.
    pub fn provider_for(&self, model_id: &str) -> Option<&ProviderCredential> {
        self.providers
            .values()
            .find(|cred| has_provider_prefix(model_id, cred.provider()))
    }

    /// Configured provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

// ─── Identifier helpers ──────────────────────────────────────────────────────

/// The family of a model identifier: everything before the last `/`.
///
/// `"openrouter/deepseek/deepseek-r1"` → `"openrouter/deepseek"`. An
/// identifier without `/` is its own family.
pub fn family(model_id: &str) -> &str {
    model_id
        .rsplit_once('/')
        .map(|(family, _)| family)
        .unwrap_or(model_id)
}

/// Whether `model_id` starts with `provider/`.
pub fn has_provider_prefix(model_id: &str, provider: &str) -> bool {
    model_id
        .strip_prefix(provider)
        .is_some_and(|rest| rest.starts_with('/'))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

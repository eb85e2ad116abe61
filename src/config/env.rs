//! Environment parsing for [`GatewayConfig`].
//!
//! `from_vars` takes any `(name, value)` iterator so tests never have to
//! touch the real process environment.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use super::catalog::ModelCatalog;
use super::errors::ConfigError;
use super::{family, GatewayConfig, ProviderCredential};

// ─── Constants ───────────────────────────────────────────────────────────────

const PROVIDER_PREFIX: &str = "PROVIDER_";
const FAVOURITES_VAR: &str = "FAVOURITES";
const CACHE_TTL_VAR: &str = "CACHE_TTL";
const ZDR_VAR: &str = "ZERO_DATA_RETENTION";
const CATALOG_VAR: &str = "MODELS_PSV";
const FEEDBACK_LOG_VAR: &str = "FEEDBACK_LOG";

/// Default cache lifetime: six hours.
const DEFAULT_CACHE_TTL_MINUTES: u64 = 360;

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Build a [`GatewayConfig`] from environment-style variables.
pub fn from_vars<I>(vars: I) -> Result<GatewayConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    // Sorted so that provider scanning (and "last one wins") is deterministic.
    let vars: BTreeMap<String, String> = vars.into_iter().collect();

    let providers = parse_providers(&vars)?;

    let mut favourites = parse_favourites(vars.get(FAVOURITES_VAR).map(String::as_str).unwrap_or(""))?;
    let cache_ttl = parse_cache_ttl(vars.get(CACHE_TTL_VAR).map(String::as_str))?;
    let zero_data_retention = parse_retention_flag(vars.get(ZDR_VAR).map(String::as_str));

    let catalog_path = vars
        .get(CATALOG_VAR)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_catalog_path);
    let catalog = ModelCatalog::load(&catalog_path);

    // Fallback, not a merge: explicit FAVOURITES always wins.
    if favourites.is_empty() && !catalog.is_empty() {
        favourites = catalog.favourites();
        validate_families(&favourites)?;
        tracing::debug!(count = favourites.len(), "favourites bootstrapped from catalog");
    }

    let feedback_log = vars
        .get(FEEDBACK_LOG_VAR)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_feedback_log);

    tracing::info!(
        providers = ?providers.keys().collect::<Vec<_>>(),
        favourites = favourites.len(),
        cache_ttl_secs = cache_ttl.as_secs(),
        zero_data_retention,
        catalog_entries = catalog.len(),
        "configuration loaded"
    );

    Ok(GatewayConfig {
        providers,
        favourites,
        cache_ttl,
        zero_data_retention,
        catalog,
        feedback_log,
    })
}

fn parse_providers(
    vars: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, ProviderCredential>, ConfigError> {
    let mut providers = BTreeMap::new();

    for (name, value) in vars {
        if !is_provider_var(name) {
            continue;
        }
        let cred = parse_provider_config(name, value)?;
        if let Some(previous) = providers.insert(cred.provider().to_string(), cred) {
            tracing::warn!(
                var = %name,
                provider = %previous.provider(),
                "provider configured more than once, later variable wins"
            );
        }
    }

    Ok(providers)
}

/// `PROVIDER_` followed by one or more word characters.
fn is_provider_var(name: &str) -> bool {
    name.strip_prefix(PROVIDER_PREFIX).is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_alphanumeric() || c == '_')
    })
}

/// Parse a `provider-name;api-key` value.
pub fn parse_provider_config(var: &str, value: &str) -> Result<ProviderCredential, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidProvider {
        var: var.to_string(),
        reason: reason.to_string(),
    };

    let (provider, api_key) = value
        .split_once(';')
        .ok_or_else(|| invalid("expected 'provider-name;api-key'"))?;

    let provider = provider.trim();
    let api_key = api_key.trim();

    if provider.is_empty() {
        return Err(invalid("provider name is empty"));
    }
    if api_key.is_empty() {
        return Err(invalid("API key is empty"));
    }

    Ok(ProviderCredential::new(provider, api_key))
}

/// Parse the comma-separated favourites list and enforce one per family.
pub fn parse_favourites(value: &str) -> Result<Vec<String>, ConfigError> {
    let favourites: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect();

    validate_families(&favourites)?;
    Ok(favourites)
}

fn validate_families(favourites: &[String]) -> Result<(), ConfigError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();

    for fav in favourites {
        let fam = family(fav);
        if let Some(first) = seen.insert(fam, fav) {
            return Err(ConfigError::DuplicateFamily {
                family: fam.to_string(),
                first: first.to_string(),
                second: fav.clone(),
            });
        }
    }

    Ok(())
}

/// `CACHE_TTL` minutes → duration. Unset means six hours.
pub fn parse_cache_ttl(value: Option<&str>) -> Result<Duration, ConfigError> {
    let Some(raw) = value else {
        return Ok(Duration::from_secs(DEFAULT_CACHE_TTL_MINUTES * 60));
    };

    let minutes: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidCacheTtl {
        value: raw.to_string(),
    })?;

    Ok(Duration::from_secs(minutes.saturating_mul(60)))
}

/// Parse the ZDR flag. Unset, empty or unrecognised values keep filtering on.
pub fn parse_retention_flag(value: Option<&str>) -> bool {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return true;
    };

    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(
                value = %raw,
                "unrecognised {ZDR_VAR} value, keeping zero data retention enabled"
            );
            true
        }
    }
}

// ─── Default paths ───────────────────────────────────────────────────────────

fn default_catalog_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ask-another")
        .join("models.psv")
}

fn default_feedback_log() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ask-another-feedback.jsonl")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

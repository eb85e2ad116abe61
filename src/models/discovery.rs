//! Model discovery across configured providers.
//!
//! Each provider's model list is fetched on demand through a [`ModelSource`]
//! and cached per provider for the configured TTL. Providers are fetched
//! concurrently; one provider failing never affects the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::cache::{ModelCache, ZDR_PROVIDER};
use super::errors::ProviderFetchError;
use crate::config::GatewayConfig;
use crate::inference::endpoints::endpoint_for;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Per-provider listing timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

const OPENROUTER_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";
const OPENROUTER_ZDR_URL: &str = "https://openrouter.ai/api/v1/endpoints/zdr";

// ─── ModelSource ─────────────────────────────────────────────────────────────

/// Fetches one provider's raw model list.
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn fetch_models(
        &self,
        provider: &str,
        api_key: &str,
        zdr: bool,
    ) -> Result<Vec<String>, ProviderFetchError>;
}

/// Lists models over HTTP from each provider's `/models` endpoint.
#[derive(Clone)]
pub struct HttpModelSource {
    http: HttpClient,
}

impl HttpModelSource {
    pub fn new() -> Result<Self, ProviderFetchError> {
        let http = HttpClient::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| ProviderFetchError::Request {
                provider: "(client)".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }

    /// Send `request` and return the body of a successful response.
    async fn get_body(
        &self,
        provider: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, ProviderFetchError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderFetchError::Request {
                provider: provider.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderFetchError::Request {
            provider: provider.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ProviderFetchError::HttpStatus {
                provider: provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ZdrEndpointList {
    #[serde(default)]
    data: Vec<ZdrEndpoint>,
}

#[derive(Deserialize)]
struct ZdrEndpoint {
    #[serde(default)]
    model_id: String,
}

#[async_trait]
impl ModelSource for HttpModelSource {
    async fn fetch_models(
        &self,
        provider: &str,
        api_key: &str,
        zdr: bool,
    ) -> Result<Vec<String>, ProviderFetchError> {
        if provider == ZDR_PROVIDER {
            if zdr {
                let body = self
                    .get_body(provider, self.http.get(OPENROUTER_ZDR_URL).bearer_auth(api_key))
                    .await?;
                return parse_zdr_endpoints(provider, &body);
            }
            let body = self
                .get_body(provider, self.http.get(OPENROUTER_MODELS_URL))
                .await?;
            return parse_model_list(provider, &body);
        }

        let endpoint = endpoint_for(provider).ok_or_else(|| {
            ProviderFetchError::UnsupportedProvider {
                provider: provider.to_string(),
            }
        })?;
        let request = endpoint.authorize(self.http.get(endpoint.url("models")), api_key);
        let body = self.get_body(provider, request).await?;
        parse_model_list(provider, &body)
    }
}

/// Ids from a `{"data": [{"id": ...}]}` listing, in listing order.
pub fn parse_model_list(provider: &str, body: &str) -> Result<Vec<String>, ProviderFetchError> {
    let list: ModelList = serde_json::from_str(body).map_err(|e| ProviderFetchError::Parse {
        provider: provider.to_string(),
        reason: e.to_string(),
    })?;
    Ok(list.data.into_iter().map(|m| m.id).collect())
}

/// Model ids from OpenRouter's ZDR endpoint listing.
///
/// One model is served by many endpoints, so ids are de-duplicated keeping
/// first-seen order. Entries without a `model_id` are dropped.
pub fn parse_zdr_endpoints(provider: &str, body: &str) -> Result<Vec<String>, ProviderFetchError> {
    let list: ZdrEndpointList =
        serde_json::from_str(body).map_err(|e| ProviderFetchError::Parse {
            provider: provider.to_string(),
            reason: e.to_string(),
        })?;
    let mut seen = HashSet::new();
    Ok(list
        .data
        .into_iter()
        .map(|e| e.model_id)
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect())
}

// ─── ModelDiscovery ──────────────────────────────────────────────────────────

/// Normalise a raw listing id to `provider/model-name`.
///
/// Gemini lists models as `models/<name>`; that prefix is dropped first.
/// OpenRouter ids are always prefixed: they are namespaced by vendor, and
/// `openrouter/auto` names OpenRouter's own router, not the provider.
pub fn normalise_model_id(provider: &str, raw: &str) -> String {
    let raw = raw.strip_prefix("models/").unwrap_or(raw);
    if provider != ZDR_PROVIDER && crate::config::has_provider_prefix(raw, provider) {
        raw.to_string()
    } else {
        format!("{provider}/{raw}")
    }
}

/// Cache-backed discovery over a [`ModelSource`].
pub struct ModelDiscovery {
    cache: ModelCache,
    source: Arc<dyn ModelSource>,
}

impl ModelDiscovery {
    pub fn new(source: Arc<dyn ModelSource>) -> Self {
        Self {
            cache: ModelCache::new(),
            source,
        }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Discover models for one provider or all configured providers.
    ///
    /// `zdr` overrides the configured retention default for this call.
    /// The result is sorted; failed providers contribute nothing.
    pub async fn get_models(
        &self,
        config: &GatewayConfig,
        provider: Option<&str>,
        zdr: Option<bool>,
    ) -> Vec<String> {
        self.get_models_at(config, provider, zdr, Instant::now()).await
    }

    /// [`get_models`](Self::get_models) with an explicit clock reading.
    pub async fn get_models_at(
        &self,
        config: &GatewayConfig,
        provider: Option<&str>,
        zdr: Option<bool>,
        now: Instant,
    ) -> Vec<String> {
        let effective_zdr = zdr.unwrap_or(config.zero_data_retention);
        let providers: Vec<&str> = match provider {
            Some(p) => vec![p],
            None => config.providers.keys().map(String::as_str).collect(),
        };

        let mut models = Vec::new();
        let mut to_fetch = Vec::new();

        for name in providers {
            let Some(credential) = config.credential(name) else {
                continue;
            };
            let key = ModelCache::key(name, effective_zdr);
            match self.cache.get_fresh(&key, config.cache_ttl, now) {
                Some(cached) => {
                    tracing::debug!(provider = %name, count = cached.len(), "model list served from cache");
                    models.extend(cached);
                }
                None => to_fetch.push((key, credential)),
            }
        }

        let fetches = to_fetch.into_iter().map(|(key, credential)| async move {
            let provider = credential.provider();
            let result = self
                .source
                .fetch_models(provider, credential.api_key(), effective_zdr)
                .await;
            (key, provider, result)
        });

        for (key, provider, result) in join_all(fetches).await {
            match result {
                Ok(raw) => {
                    let fetched: Vec<String> = raw
                        .iter()
                        .map(|id| normalise_model_id(provider, id))
                        .collect();
                    tracing::info!(provider = %provider, count = fetched.len(), "model list fetched");
                    if !fetched.is_empty() {
                        self.cache.store(&key, fetched.clone(), now);
                    }
                    models.extend(fetched);
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "model list fetch failed");
                }
            }
        }

        models.sort();
        models
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::env::from_vars;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fake source: canned lists per provider, counts calls, records the
    /// ZDR flag it was asked for.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub lists: HashMap<String, Vec<String>>,
        pub failing: HashSet<String>,
        pub calls: Mutex<Vec<(String, bool)>>,
    }

    impl FakeSource {
        pub(crate) fn with(lists: &[(&str, &[&str])]) -> Self {
            Self {
                lists: lists
                    .iter()
                    .map(|(p, ms)| (p.to_string(), ms.iter().map(|m| m.to_string()).collect()))
                    .collect(),
                ..Default::default()
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelSource for FakeSource {
        async fn fetch_models(
            &self,
            provider: &str,
            _api_key: &str,
            zdr: bool,
        ) -> Result<Vec<String>, ProviderFetchError> {
            self.calls.lock().unwrap().push((provider.to_string(), zdr));
            if self.failing.contains(provider) {
                return Err(ProviderFetchError::Request {
                    provider: provider.to_string(),
                    reason: "connection refused".into(),
                });
            }
            Ok(self.lists.get(provider).cloned().unwrap_or_default())
        }
    }

    fn config(vars: &[(&str, &str)]) -> GatewayConfig {
        let mut all: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        all.push(("MODELS_PSV".into(), "/nonexistent/models.psv".into()));
        from_vars(all).unwrap()
    }

    #[test]
    fn test_normalise_model_id() {
        assert_eq!(normalise_model_id("openai", "gpt-4o"), "openai/gpt-4o");
        assert_eq!(normalise_model_id("openai", "openai/gpt-4o"), "openai/gpt-4o");
        assert_eq!(
            normalise_model_id("gemini", "models/gemini-2.5-pro"),
            "gemini/gemini-2.5-pro"
        );
        assert_eq!(
            normalise_model_id("openrouter", "deepseek/deepseek-r1"),
            "openrouter/deepseek/deepseek-r1"
        );
        assert_eq!(
            normalise_model_id("openrouter", "openrouter/auto"),
            "openrouter/openrouter/auto"
        );
    }

    #[test]
    fn test_parse_model_list() {
        let body = r#"{"data": [{"id": "gpt-4o", "owned_by": "openai"}, {"id": "o3"}]}"#;
        assert_eq!(parse_model_list("openai", body).unwrap(), vec!["gpt-4o", "o3"]);
        assert!(parse_model_list("openai", "{}").unwrap().is_empty());

        let err = parse_model_list("openai", "<html>").unwrap_err();
        assert!(matches!(err, ProviderFetchError::Parse { ref provider, .. } if provider == "openai"));
    }

    #[test]
    fn test_parse_zdr_endpoints_dedups_in_order() {
        let body = r#"{"data": [
            {"model_id": "qwen/qwen3", "provider_name": "A"},
            {"model_id": "deepseek/deepseek-r1", "provider_name": "A"},
            {"model_id": "qwen/qwen3", "provider_name": "B"},
            {"model_id": ""},
            {"provider_name": "C"},
            {"model_id": "anthropic/claude-sonnet-4"}
        ]}"#;
        assert_eq!(
            parse_zdr_endpoints("openrouter", body).unwrap(),
            vec!["qwen/qwen3", "deepseek/deepseek-r1", "anthropic/claude-sonnet-4"]
        );
    }

    #[tokio::test]
    async fn test_cache_refetches_exactly_once_after_ttl() {
        let cfg = config(&[("PROVIDER_OPENAI", "openai;k"), ("CACHE_TTL", "1")]);
        let source = Arc::new(FakeSource::with(&[("openai", &["gpt-4o"])]));
        let discovery = ModelDiscovery::new(source.clone());
        let t0 = Instant::now();

        let first = discovery.get_models_at(&cfg, None, None, t0).await;
        assert_eq!(first, vec!["openai/gpt-4o"]);
        assert_eq!(source.call_count(), 1);

        discovery
            .get_models_at(&cfg, None, None, t0 + Duration::from_secs(59))
            .await;
        assert_eq!(source.call_count(), 1);

        discovery
            .get_models_at(&cfg, None, None, t0 + Duration::from_secs(60))
            .await;
        assert_eq!(source.call_count(), 2);

        discovery
            .get_models_at(&cfg, None, None, t0 + Duration::from_secs(61))
            .await;
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_provider_is_isolated() {
        let cfg = config(&[
            ("PROVIDER_OPENAI", "openai;k"),
            ("PROVIDER_GEMINI", "gemini;k"),
        ]);
        let mut source = FakeSource::with(&[
            ("openai", &["gpt-4o"]),
            ("gemini", &["models/gemini-2.5-pro"]),
        ]);
        source.failing.insert("openai".into());
        let discovery = ModelDiscovery::new(Arc::new(source));

        let models = discovery.get_models(&cfg, None, None).await;
        assert_eq!(models, vec!["gemini/gemini-2.5-pro"]);
        assert_eq!(discovery.cache().len(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_logged_with_provider_and_reason() {
        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let cfg = config(&[("PROVIDER_OPENAI", "openai;k")]);
        let mut source = FakeSource::default();
        source.failing.insert("openai".into());
        let discovery = ModelDiscovery::new(Arc::new(source));
        assert!(discovery.get_models(&cfg, None, None).await.is_empty());

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("model list fetch failed"), "{output}");
        assert!(output.contains("provider=openai"), "{output}");
        assert!(output.contains("connection refused"), "{output}");
    }

    #[tokio::test]
    async fn test_empty_result_not_cached() {
        let cfg = config(&[("PROVIDER_OPENAI", "openai;k")]);
        let source = Arc::new(FakeSource::default());
        let discovery = ModelDiscovery::new(source.clone());

        assert!(discovery.get_models(&cfg, None, None).await.is_empty());
        assert!(discovery.get_models(&cfg, None, None).await.is_empty());
        assert_eq!(source.call_count(), 2);
        assert!(discovery.cache().is_empty());
    }

    #[tokio::test]
    async fn test_results_sorted_across_providers() {
        let cfg = config(&[
            ("PROVIDER_OPENAI", "openai;k"),
            ("PROVIDER_ANTHROPIC", "anthropic;k"),
        ]);
        let source = FakeSource::with(&[
            ("openai", &["o3", "gpt-4o"]),
            ("anthropic", &["claude-sonnet-4"]),
        ]);
        let discovery = ModelDiscovery::new(Arc::new(source));

        let models = discovery.get_models(&cfg, None, None).await;
        assert_eq!(
            models,
            vec!["anthropic/claude-sonnet-4", "openai/gpt-4o", "openai/o3"]
        );
    }

    #[tokio::test]
    async fn test_openrouter_partitioned_by_zdr() {
        let cfg = config(&[
            ("PROVIDER_OPENROUTER", "openrouter;k"),
            ("ZERO_DATA_RETENTION", "false"),
        ]);
        let source = Arc::new(FakeSource::with(&[("openrouter", &["deepseek/deepseek-r1"])]));
        let discovery = ModelDiscovery::new(source.clone());

        discovery.get_models(&cfg, Some("openrouter"), None).await;
        discovery.get_models(&cfg, Some("openrouter"), Some(true)).await;
        discovery.get_models(&cfg, Some("openrouter"), Some(false)).await;

        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![("openrouter".to_string(), false), ("openrouter".to_string(), true)]
        );
        assert_eq!(discovery.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_provider_skipped() {
        let cfg = config(&[("PROVIDER_OPENAI", "openai;k")]);
        let source = Arc::new(FakeSource::with(&[("openai", &["gpt-4o"])]));
        let discovery = ModelDiscovery::new(source.clone());

        assert!(discovery.get_models(&cfg, Some("mistral"), None).await.is_empty());
        assert_eq!(source.call_count(), 0);
    }
}

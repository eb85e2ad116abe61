//! Per-provider model list cache.
//!
//! Keys are provider names, except OpenRouter, whose listing depends on the
//! ZDR flag and therefore gets one partition per flag value. Entries expire
//! after the configured TTL. Concurrent refreshes of one key are
//! last-write-wins; the lock is only held for the map operation itself.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// The one provider with a retention-filtered listing mode.
pub const ZDR_PROVIDER: &str = "openrouter";

#[derive(Debug, Clone)]
struct CacheEntry {
    models: Vec<String>,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
pub struct ModelCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for `provider` under the effective ZDR flag.
    pub fn key(provider: &str, zdr: bool) -> String {
        if provider == ZDR_PROVIDER {
            format!("{provider}:zdr={zdr}")
        } else {
            provider.to_string()
        }
    }

    /// Models cached under `key`, if younger than `ttl` at `now`.
    pub fn get_fresh(&self, key: &str, ttl: Duration, now: Instant) -> Option<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.fetched_at) < ttl {
            Some(entry.models.clone())
        } else {
            None
        }
    }

    pub fn store(&self, key: &str, models: Vec<String>, fetched_at: Instant) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), CacheEntry { models, fetched_at });
    }

    /// Drop every entry (used on config reload).
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_partitions_openrouter_only() {
        assert_eq!(ModelCache::key("openai", true), "openai");
        assert_eq!(ModelCache::key("openai", false), "openai");
        assert_eq!(ModelCache::key("openrouter", true), "openrouter:zdr=true");
        assert_eq!(ModelCache::key("openrouter", false), "openrouter:zdr=false");
    }

    #[test]
    fn test_entry_expires_at_ttl() {
        let cache = ModelCache::new();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(60);
        cache.store("openai", vec!["openai/gpt-4o".into()], t0);

        assert!(cache.get_fresh("openai", ttl, t0).is_some());
        assert!(cache.get_fresh("openai", ttl, t0 + Duration::from_secs(59)).is_some());
        assert!(cache.get_fresh("openai", ttl, t0 + ttl).is_none());
        assert!(cache.get_fresh("gemini", ttl, t0).is_none());
    }

    #[test]
    fn test_zero_ttl_is_always_stale() {
        let cache = ModelCache::new();
        let t0 = Instant::now();
        cache.store("openai", vec!["openai/gpt-4o".into()], t0);
        assert!(cache.get_fresh("openai", Duration::ZERO, t0).is_none());
    }

    #[test]
    fn test_clear() {
        let cache = ModelCache::new();
        cache.store("openai", vec!["openai/a".into()], Instant::now());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}

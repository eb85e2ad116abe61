//! Shorthand and full-identifier model resolution.
//!
//! Resolution order:
//! 1. Shorthand: favourites starting with `input/`.
//! 2. Full identifier: `provider/...` for a configured provider.
//!
//! Shorthand is always tried first, so `openai` picks the `openai/...`
//! favourite rather than failing the literal check.

use super::errors::ResolveError;
use crate::config::{family, has_provider_prefix, GatewayConfig, ProviderCredential};

/// A model identifier and the credential to call it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub model: String,
    pub credential: ProviderCredential,
}

impl ResolvedModel {
    pub fn provider(&self) -> &str {
        self.credential.provider()
    }
}

/// Resolve a shorthand or full identifier against the configuration.
pub fn resolve(config: &GatewayConfig, input: &str) -> Result<ResolvedModel, ResolveError> {
    let prefix = format!("{input}/");
    let matches: Vec<&String> = config
        .favourites
        .iter()
        .filter(|fav| fav.starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => {}
        [only] => {
            if let Some(credential) = config.provider_for(only) {
                return Ok(ResolvedModel {
                    model: (*only).clone(),
                    credential: credential.clone(),
                });
            }
        }
        many => {
            let hint = many
                .iter()
                .map(|m| family(m))
                .max_by_key(|f| f.len())
                .unwrap_or(input)
                .to_string();
            return Err(ResolveError::Ambiguous {
                shorthand: input.to_string(),
                matches: many.iter().map(|m| (*m).clone()).collect(),
                hint,
            });
        }
    }

    if input.contains('/') {
        if let Some(credential) = config
            .providers
            .values()
            .find(|cred| has_provider_prefix(input, cred.provider()))
        {
            return Ok(ResolvedModel {
                model: input.to_string(),
                credential: credential.clone(),
            });
        }
    }

    Err(ResolveError::Unresolved {
        input: input.to_string(),
        favourites: config.favourites.clone(),
        providers: config.provider_names(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::from_vars;

    fn config(vars: &[(&str, &str)]) -> GatewayConfig {
        let mut all: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        all.push(("MODELS_PSV".into(), "/nonexistent/models.psv".into()));
        from_vars(all).unwrap()
    }

    #[test]
    fn test_shorthand_resolves_single_favourite() {
        let cfg = config(&[
            ("PROVIDER_OPENAI", "openai;sk-1"),
            ("FAVOURITES", "openai/gpt-4o"),
        ]);
        let resolved = resolve(&cfg, "openai").unwrap();
        assert_eq!(resolved.model, "openai/gpt-4o");
        assert_eq!(resolved.credential.api_key(), "sk-1");
    }

    #[test]
    fn test_shorthand_ambiguous_lists_both() {
        let cfg = config(&[
            ("PROVIDER_OPENAI", "openai;sk-1"),
            ("FAVOURITES", "openai/gpt-4o,openai/o1/gpt-4o"),
        ]);
        let err = resolve(&cfg, "openai").unwrap_err();
        match err {
            ResolveError::Ambiguous {
                shorthand,
                matches,
                hint,
            } => {
                assert_eq!(shorthand, "openai");
                assert_eq!(matches, vec!["openai/gpt-4o", "openai/o1/gpt-4o"]);
                assert_eq!(hint, "openai/o1");
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_shorthand() {
        let cfg = config(&[
            ("PROVIDER_OPENROUTER", "openrouter;or-1"),
            ("FAVOURITES", "openrouter/deepseek/deepseek-r1,openrouter/qwen/qwen3"),
        ]);
        let resolved = resolve(&cfg, "openrouter/deepseek").unwrap();
        assert_eq!(resolved.model, "openrouter/deepseek/deepseek-r1");
        assert_eq!(resolved.provider(), "openrouter");
    }

    #[test]
    fn test_full_identifier_passes_through() {
        let cfg = config(&[("PROVIDER_OPENAI", "openai;sk-1")]);
        let resolved = resolve(&cfg, "openai/o3-mini").unwrap();
        assert_eq!(resolved.model, "openai/o3-mini");
    }

    #[test]
    fn test_full_identifier_needs_configured_provider() {
        let cfg = config(&[("PROVIDER_OPENAI", "openai;sk-1")]);
        let err = resolve(&cfg, "mistral/large").unwrap_err();
        assert!(matches!(err, ResolveError::Unresolved { .. }));
        assert!(err.to_string().contains("(none configured)"));
    }

    #[test]
    fn test_favourite_without_provider_falls_through() {
        let cfg = config(&[
            ("PROVIDER_OPENAI", "openai;sk-1"),
            ("FAVOURITES", "gemini/gemini-2.5-pro"),
        ]);
        let err = resolve(&cfg, "gemini").unwrap_err();
        match err {
            ResolveError::Unresolved { favourites, .. } => {
                assert_eq!(favourites, vec!["gemini/gemini-2.5-pro"]);
            }
            other => panic!("expected unresolved, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_name_without_favourite_is_unresolved() {
        let cfg = config(&[("PROVIDER_OPENAI", "openai;sk-1")]);
        assert!(resolve(&cfg, "gpt-4o").is_err());
    }
}

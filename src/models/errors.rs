//! Model discovery and resolution errors.

use thiserror::Error;

/// Why a model identifier or shorthand could not be resolved.
///
/// Messages are written for an autonomous caller: they name the input and
/// list what would have worked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The shorthand prefixes more than one favourite.
    #[error(
        "Ambiguous shorthand '{shorthand}' matches multiple favourites: {}. \
         Use a more specific shorthand (e.g. '{hint}')",
        matches.join(", ")
    )]
    Ambiguous {
        shorthand: String,
        matches: Vec<String>,
        hint: String,
    },

    /// Neither a favourite shorthand nor a `provider/model` identifier for a
    /// configured provider.
    #[error(
        "No favourite matches '{input}'. Available favourites: {}. Configured providers: {}",
        render_list(favourites),
        render_list(providers)
    )]
    Unresolved {
        input: String,
        favourites: Vec<String>,
        providers: Vec<String>,
    },
}

fn render_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none configured)".to_string()
    } else {
        items.join(", ")
    }
}

/// A provider's model list could not be fetched.
///
/// Recovered inside discovery: the provider contributes no models for that
/// call and the error is logged.
#[derive(Debug, Error)]
pub enum ProviderFetchError {
    #[error("no model listing endpoint known for provider '{provider}'")]
    UnsupportedProvider { provider: String },

    #[error("request to {provider} failed: {reason}")]
    Request { provider: String, reason: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("failed to parse {provider} model list: {reason}")]
    Parse { provider: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_mentions_none_configured() {
        let err = ResolveError::Unresolved {
            input: "mystery".into(),
            favourites: vec![],
            providers: vec!["openai".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'mystery'"));
        assert!(msg.contains("Available favourites: (none configured)"));
        assert!(msg.contains("Configured providers: openai"));
    }

    #[test]
    fn test_ambiguous_lists_matches_and_hint() {
        let err = ResolveError::Ambiguous {
            shorthand: "openai".into(),
            matches: vec!["openai/gpt-4o".into(), "openai/o1/gpt-4o".into()],
            hint: "openai/o1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("openai/gpt-4o, openai/o1/gpt-4o"));
        assert!(msg.contains("(e.g. 'openai/o1')"));
    }
}

//! Configuration error types.
//!
//! Every variant names the offending input so the operator can fix the
//! environment without reading source. Config errors are fatal at startup
//! and are reported (but not applied) on reload.

use thiserror::Error;

/// Errors raised while turning the environment into a [`GatewayConfig`].
///
/// [`GatewayConfig`]: super::GatewayConfig
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A `PROVIDER_*` variable did not have the `provider-name;api-key` shape.
    #[error("invalid format for {var}: {reason}")]
    InvalidProvider { var: String, reason: String },

    /// Two favourites belong to the same family.
    #[error("multiple favourites for family '{family}': '{first}' and '{second}'")]
    DuplicateFamily {
        family: String,
        first: String,
        second: String,
    },

    /// `CACHE_TTL` was not a whole number of minutes.
    #[error("invalid CACHE_TTL value: '{value}' (expected a whole number of minutes)")]
    InvalidCacheTtl { value: String },
}

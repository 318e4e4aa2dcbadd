//! Error types and retry/fallback classification for source adapters.
//!
//! This module provides:
//! - [`ConnectorError`]: every failure an adapter can report
//! - [`RetryClass`]: whether the failed call is retried with backoff
//! - [`FallbackClass`]: what a fallback chain does after retries are spent

mod retry;

pub use retry::{FallbackClass, RetryClass};

use ledgerlink_core::errors::{Error, ProviderError, ValidationError};
use thiserror::Error;

/// Errors that can occur while talking to an upstream provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectorError {
    /// HTTP 429 or a provider-specific "slow down" code.
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// Rate limiting persisted through every retry.
    #[error("Provider overloaded: {provider}")]
    Overloaded { provider: String },

    /// Connection reset, provider-reported busy state and similar blips.
    #[error("Transient failure from {provider}: {detail}")]
    Transient { provider: String, detail: String },

    #[error("Server error from {provider}: HTTP {status}")]
    Server { provider: String, status: u16 },

    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    #[error("Unauthorized by {provider}: {detail}")]
    Unauthorized { provider: String, detail: String },

    #[error("Missing credentials for {provider}")]
    MissingCredentials { provider: String },

    /// Unexpected response shape. Never retried.
    #[error("Malformed response from {provider}: {detail}")]
    Malformed { provider: String, detail: String },

    /// HTTP 404; some sources read this as "nothing recorded yet".
    #[error("Not found at {provider}")]
    NotFound { provider: String },

    /// The provider understood and refused the request (4xx, API error).
    #[error("Request rejected by {provider}: {detail}")]
    Rejected { provider: String, detail: String },

    /// Source kind, chain or exchange this build cannot serve.
    #[error("Unsupported source: {0}")]
    Unsupported(String),

    /// Account configuration the factory cannot work with.
    #[error("Invalid connector configuration: {0}")]
    Validation(String),
}

impl ConnectorError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::RateLimited { .. }
            | Self::Transient { .. }
            | Self::Server { .. }
            | Self::Timeout { .. } => RetryClass::WithBackoff,

            Self::Overloaded { .. }
            | Self::Unauthorized { .. }
            | Self::MissingCredentials { .. }
            | Self::Malformed { .. }
            | Self::NotFound { .. }
            | Self::Rejected { .. }
            | Self::Unsupported(_)
            | Self::Validation(_) => RetryClass::Never,
        }
    }

    pub fn fallback_class(&self) -> FallbackClass {
        match self {
            Self::RateLimited { .. } | Self::Overloaded { .. } => FallbackClass::SkipCycle,

            Self::Transient { .. }
            | Self::Server { .. }
            | Self::Timeout { .. }
            | Self::Unauthorized { .. }
            | Self::MissingCredentials { .. }
            | Self::Malformed { .. } => FallbackClass::NextProvider,

            Self::NotFound { .. }
            | Self::Rejected { .. }
            | Self::Unsupported(_)
            | Self::Validation(_) => FallbackClass::Fail,
        }
    }

    /// The error a caller sees once the retry budget is spent.
    pub fn exhausted(self) -> Self {
        match self {
            Self::RateLimited { provider } => Self::Overloaded { provider },
            other => other,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider }
            | Self::Overloaded { provider }
            | Self::Transient { provider, .. }
            | Self::Server { provider, .. }
            | Self::Timeout { provider }
            | Self::Unauthorized { provider, .. }
            | Self::MissingCredentials { provider }
            | Self::Malformed { provider, .. }
            | Self::NotFound { provider }
            | Self::Rejected { provider, .. } => Some(provider),
            Self::Unsupported(_) | Self::Validation(_) => None,
        }
    }

    pub(crate) fn malformed(provider: &str, detail: impl std::fmt::Display) -> Self {
        Self::Malformed {
            provider: provider.to_string(),
            detail: detail.to_string(),
        }
    }
}

impl From<ConnectorError> for Error {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Validation(msg) | ConnectorError::Unsupported(msg) => {
                Error::Validation(ValidationError::InvalidInput(msg))
            }
            other => {
                let provider = other.provider().unwrap_or("unknown").to_string();
                Error::Provider(ProviderError::new(provider, other.to_string()))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited() -> ConnectorError {
        ConnectorError::RateLimited {
            provider: "ALCHEMY".to_string(),
        }
    }

    #[test]
    fn test_rate_limited_retries_then_becomes_overloaded() {
        let error = rate_limited();
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);

        let exhausted = error.exhausted();
        assert_eq!(
            exhausted,
            ConnectorError::Overloaded {
                provider: "ALCHEMY".to_string()
            }
        );
        assert_eq!(exhausted.retry_class(), RetryClass::Never);
        assert_eq!(exhausted.fallback_class(), FallbackClass::SkipCycle);
    }

    #[test]
    fn test_server_errors_retry_then_fall_back() {
        let error = ConnectorError::Server {
            provider: "ALCHEMY".to_string(),
            status: 503,
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
        assert_eq!(error.clone().exhausted(), error);
        assert_eq!(error.fallback_class(), FallbackClass::NextProvider);
    }

    #[test]
    fn test_malformed_is_never_retried() {
        let error = ConnectorError::malformed("ETHERSCAN", "missing result");
        assert_eq!(error.retry_class(), RetryClass::Never);
        assert_eq!(error.fallback_class(), FallbackClass::NextProvider);
    }

    #[test]
    fn test_missing_credentials_falls_back() {
        let error = ConnectorError::MissingCredentials {
            provider: "HELIUS".to_string(),
        };
        assert_eq!(error.fallback_class(), FallbackClass::NextProvider);
    }

    #[test]
    fn test_rejected_fails_the_sync() {
        let error = ConnectorError::Rejected {
            provider: "KRAKEN".to_string(),
            detail: "EGeneral:Invalid arguments".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
        assert_eq!(error.fallback_class(), FallbackClass::Fail);
    }

    #[test]
    fn test_conversion_into_core_error() {
        let err: Error = ConnectorError::Validation("unknown chain".to_string()).into();
        assert!(matches!(err, Error::Validation(_)));

        let err: Error = ConnectorError::Timeout {
            provider: "TATUM".to_string(),
        }
        .into();
        match err {
            Error::Provider(e) => assert_eq!(e.provider, "TATUM"),
            other => panic!("unexpected {:?}", other),
        }
    }
}

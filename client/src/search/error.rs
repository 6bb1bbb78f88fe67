use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::credentials::CredentialStoreError;
use crate::transport::TransportError;
use ig_cache_key::CacheKeyError;
use thiserror::Error;

use super::types::OptionsError;

/// Errors from search client operations.
///
/// Paths carried in variants never include the query string or the
/// authenticate account segments.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Client could not be constructed from its configuration
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Per-call options were inconsistent
    #[error(transparent)]
    Options(#[from] OptionsError),

    /// The service rejected the credential and renewal did not help
    #[error("authentication failed for {path}")]
    AuthenticationFailure { path: String },

    /// Non-success status other than 401
    #[error("request to {path} failed with status {status}: {body}")]
    TransportFailure {
        status: u16,
        body: String,
        path: String,
    },

    /// No response at all (connect, TLS, timeout)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 200 response whose body was not valid JSON
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// 200 response that parsed but lacked the expected structure
    #[error("unexpected response from {path}: {reason}")]
    UnexpectedResponse { path: String, reason: String },

    #[error(transparent)]
    CacheKey(#[from] CacheKeyError),

    #[error(transparent)]
    CredentialStore(#[from] CredentialStoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl SearchError {
    /// HTTP status, when the error came from a completed exchange.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::TransportFailure { status, .. } => Some(*status),
            Self::AuthenticationFailure { .. } => Some(401),
            _ => None,
        }
    }
}

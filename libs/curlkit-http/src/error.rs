use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single request attempt below the HTTP status layer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The attempt did not finish within its deadline
    #[error("request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS handshake, protocol or body read failure
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<hyper_util::client::legacy::Error> for TransportError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Errors produced while building transports or executing HTTP calls.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpCallError {
    /// Inconsistent TLS or call parameters, detected before any I/O
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// A certificate, key or CA file could not be read or parsed
    #[error("failed to load TLS material from '{}': {reason}", path.display())]
    TlsLoad { path: PathBuf, reason: String },

    /// The TLS client configuration could not be assembled from valid material
    #[error("failed to configure TLS: {0}")]
    TlsConfig(#[source] rustls::Error),

    /// Malformed URL, method or header
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// Every attempt failed at the transport level
    #[error("request failed after {attempts} attempt(s): {source}")]
    RequestFailed {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The last response carried a status code outside the expected set
    #[error("unexpected response code '{code}' after {attempts} attempt(s): {body}")]
    UnexpectedStatusCode {
        code: String,
        body: String,
        attempts: u32,
    },

    /// The caller canceled the operation
    #[error("operation canceled")]
    Canceled,
}

impl HttpCallError {
    /// Whether the failure came from the remote side and a later call may succeed.
    ///
    /// Configuration failures and cancellation are never retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::UnexpectedStatusCode { .. }
        )
    }

    /// Whether the failure is caused by caller-supplied parameters.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::TlsLoad { .. } | Self::TlsConfig(_) | Self::RequestBuild(_)
        )
    }

    /// Number of attempts made before the error surfaced, if any request was sent.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RequestFailed { attempts, .. } | Self::UnexpectedStatusCode { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    /// Shorthand for [`HttpCallError::TlsLoad`].
    #[must_use]
    pub fn tls_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::TlsLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

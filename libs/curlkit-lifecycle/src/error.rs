use curlkit_http::HttpCallError;
use thiserror::Error;

/// Errors produced by lifecycle phases.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LifecycleError {
    /// Companion settings of a phase are incomplete or inconsistent
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The opaque state handed back by the host is absent, undecodable or
    /// written by an unsupported version
    #[error("missing lifecycle state: {0}")]
    MissingLifecycleState(String),

    /// The opaque state could not be serialized
    #[error("failed to encode lifecycle state: {0}")]
    StateEncoding(#[source] serde_json::Error),

    /// A response body could not be re-serialized during drift detection
    #[error("failed to sanitize response: {0}")]
    Sanitize(#[source] serde_json::Error),

    /// The HTTP call of a phase failed
    #[error(transparent)]
    Call(#[from] HttpCallError),

    /// The close call failed; the host should still drop the resource
    #[error("close call for '{id}' failed, the resource is considered closed: {source}")]
    CloseFailed {
        id: String,
        #[source]
        source: HttpCallError,
    },

    /// The destroy call failed; the host should still drop the resource
    #[error("destroy call for '{id}' failed, the resource is considered deleted: {source}")]
    DeleteFailed {
        id: String,
        #[source]
        source: HttpCallError,
    },
}

impl LifecycleError {
    /// Whether retrying the same phase later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Call(err)
            | Self::CloseFailed { source: err, .. }
            | Self::DeleteFailed { source: err, .. } => err.is_retryable(),
            _ => false,
        }
    }

    /// Whether the failure is caused by host-supplied settings.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::Call(err)
            | Self::CloseFailed { source: err, .. }
            | Self::DeleteFailed { source: err, .. } => err.is_configuration_error(),
            _ => false,
        }
    }

    /// Whether the host should remove the resource from its state despite the error.
    #[must_use]
    pub fn resource_removed(&self) -> bool {
        matches!(self, Self::CloseFailed { .. } | Self::DeleteFailed { .. })
    }
}

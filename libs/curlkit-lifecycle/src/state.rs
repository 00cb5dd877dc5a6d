//! Call settings and the opaque state carried between lifecycle phases.

use std::time::Duration;

use curlkit_http::{
    ExecutionOutcome, HttpCallError, RequestSpec, RetryPolicy, RetryingExecutor, TlsParameters,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;

/// Version written into every encoded state record
pub const STATE_VERSION: u32 = 1;

/// Everything needed to perform one HTTP call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallSettings {
    pub request: RequestSpec,
    pub tls: TlsParameters,
    pub retry: RetryPolicy,
}

impl CallSettings {
    #[must_use]
    pub fn new(request: RequestSpec, retry: RetryPolicy) -> Self {
        Self {
            request,
            tls: TlsParameters::default(),
            retry,
        }
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsParameters) -> Self {
        self.tls = tls;
        self
    }

    /// Check that url, method and expected status codes are all set.
    ///
    /// `what` names the call in the error, e.g. `"renew"`.
    ///
    /// # Errors
    /// Returns `LifecycleError::Configuration` listing the missing settings.
    pub fn require_complete(&self, what: &str) -> Result<(), LifecycleError> {
        let mut missing = Vec::new();
        if self.request.url.trim().is_empty() {
            missing.push("url");
        }
        if self.request.method.trim().is_empty() {
            missing.push("method");
        }
        if self.retry.expected_status_codes.is_empty() {
            missing.push("expected status codes");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Configuration(format!(
                "{what} call is missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Run this call through `executor`.
    ///
    /// # Errors
    /// Propagates the executor's error.
    pub async fn execute(
        &self,
        executor: &RetryingExecutor,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, HttpCallError> {
        executor
            .execute(&self.request, &self.tls, &self.retry, cancel)
            .await
    }
}

/// Phase that produced a state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Open,
    Renewing,
}

/// The record behind the opaque state blob of an ephemeral resource.
///
/// It is the only input of `renew` and `close`, so it carries the complete
/// renew and close calls including their TLS and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivateState {
    pub version: u32,
    pub phase: Phase,
    pub id: String,
    #[serde(with = "curlkit_http::duration_serde")]
    pub renew_interval: Duration,
    pub skip_renew: bool,
    pub skip_close: bool,
    pub renew: CallSettings,
    pub close: CallSettings,
    #[serde(default)]
    pub renewals: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_renew: Option<ExecutionOutcome>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: Option<u32>,
}

impl PrivateState {
    /// # Errors
    /// Returns `LifecycleError::StateEncoding` if serialization fails.
    pub fn encode(&self) -> Result<OpaqueState, LifecycleError> {
        serde_json::to_vec(self)
            .map(OpaqueState)
            .map_err(LifecycleError::StateEncoding)
    }

    /// Decode a blob produced by [`PrivateState::encode`].
    ///
    /// # Errors
    /// Returns `LifecycleError::MissingLifecycleState` for empty or
    /// undecodable bytes and for records of another version.
    pub fn decode(bytes: &[u8]) -> Result<Self, LifecycleError> {
        if bytes.is_empty() {
            return Err(LifecycleError::MissingLifecycleState(
                "state blob is empty".to_owned(),
            ));
        }
        let probe: VersionProbe = serde_json::from_slice(bytes).map_err(|e| {
            LifecycleError::MissingLifecycleState(format!("state blob is not readable: {e}"))
        })?;
        match probe.version {
            Some(STATE_VERSION) => {}
            Some(other) => {
                return Err(LifecycleError::MissingLifecycleState(format!(
                    "unsupported state version {other}, expected {STATE_VERSION}"
                )));
            }
            None => {
                return Err(LifecycleError::MissingLifecycleState(
                    "state blob carries no version".to_owned(),
                ));
            }
        }
        serde_json::from_slice(bytes).map_err(|e| {
            LifecycleError::MissingLifecycleState(format!("state blob is malformed: {e}"))
        })
    }
}

/// Serialized [`PrivateState`], stored by the host between phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueState(Vec<u8>);

impl OpaqueState {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for OpaqueState {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for OpaqueState {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Where an ephemeral resource stands in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Open(OpaqueState),
    Renewing(OpaqueState),
    Closed,
}

impl LifecycleState {
    /// The blob to hand back on the next phase, if the state carries one.
    #[must_use]
    pub fn blob(&self) -> Option<&OpaqueState> {
        match self {
            Self::Open(blob) | Self::Renewing(blob) => Some(blob),
            Self::Created | Self::Closed => None,
        }
    }
}

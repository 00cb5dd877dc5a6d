//! One-shot calls: data source reads and action invocations.

use std::time::Duration;

use curlkit_http::{
    Backoff, DEFAULT_PER_ATTEMPT_TIMEOUT, ExecutionOutcome, ExpectedStatusCodes, RequestSpec,
    RetryPolicy, RetryingExecutor, TlsParameters,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;
use crate::state::CallSettings;

/// Delay between action attempts unless configured otherwise
pub const ACTION_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A read-only call whose result the host exposes as data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSourceConfig {
    pub id: String,
    pub request: RequestSpec,
    pub tls: TlsParameters,
    pub retry: RetryPolicy,
}

impl DataSourceConfig {
    /// # Errors
    /// Returns `LifecycleError::Configuration` when the JSON does not match.
    pub fn from_json(json: &str) -> Result<Self, LifecycleError> {
        serde_json::from_str(json).map_err(|e| {
            LifecycleError::Configuration(format!("malformed data source config: {e}"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceOutcome {
    pub id: String,
    pub outcome: ExecutionOutcome,
    pub request_url: String,
}

/// A fire-once call. Retry settings sit next to the request, and the retry
/// interval defaults to [`ACTION_RETRY_INTERVAL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionConfig {
    pub request: RequestSpec,
    pub tls: TlsParameters,
    pub max_retries: u32,
    #[serde(with = "curlkit_http::duration_serde")]
    pub retry_interval: Duration,
    #[serde(with = "curlkit_http::duration_serde")]
    pub per_attempt_timeout: Duration,
    pub expected_status_codes: ExpectedStatusCodes,
    pub backoff: Backoff,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            request: RequestSpec::default(),
            tls: TlsParameters::default(),
            max_retries: 0,
            retry_interval: ACTION_RETRY_INTERVAL,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
            expected_status_codes: ExpectedStatusCodes::default(),
            backoff: Backoff::Constant,
        }
    }
}

impl ActionConfig {
    /// # Errors
    /// Returns `LifecycleError::Configuration` when the JSON does not match.
    pub fn from_json(json: &str) -> Result<Self, LifecycleError> {
        serde_json::from_str(json)
            .map_err(|e| LifecycleError::Configuration(format!("malformed action config: {e}")))
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_interval: self.retry_interval,
            per_attempt_timeout: self.per_attempt_timeout,
            expected_status_codes: self.expected_status_codes.clone(),
            backoff: self.backoff.clone(),
        }
    }

    fn call(&self) -> CallSettings {
        CallSettings::new(self.request.clone(), self.retry_policy()).with_tls(self.tls.clone())
    }
}

/// Perform a data source read.
///
/// # Errors
/// `Configuration` when url, method or expected codes are missing, `Call`
/// when the request fails.
pub async fn read_data_source(
    executor: &RetryingExecutor,
    config: &DataSourceConfig,
    cancel: &CancellationToken,
) -> Result<DataSourceOutcome, LifecycleError> {
    let call = CallSettings::new(config.request.clone(), config.retry.clone())
        .with_tls(config.tls.clone());
    call.require_complete("data source")?;

    let outcome = call.execute(executor, cancel).await?;
    tracing::debug!(id = %config.id, status = %outcome.status_code, "data source read");
    Ok(DataSourceOutcome {
        id: config.id.clone(),
        request_url: outcome.request_url.clone(),
        outcome,
    })
}

/// Invoke an action once, with retries.
///
/// # Errors
/// `Configuration` when url, method or expected codes are missing, `Call`
/// when the request fails.
pub async fn invoke_action(
    executor: &RetryingExecutor,
    config: &ActionConfig,
    cancel: &CancellationToken,
) -> Result<ExecutionOutcome, LifecycleError> {
    let call = config.call();
    call.require_complete("action")?;

    let outcome = call.execute(executor, cancel).await?;
    tracing::info!(
        url = %outcome.request_url,
        status = %outcome.status_code,
        attempts = outcome.attempts,
        "action invoked"
    );
    Ok(outcome)
}

//! Bounded retry loop around a single HTTP call.

use tokio_util::sync::CancellationToken;

use crate::config::{RequestSpec, RetryPolicy, TlsParameters, TransportConfig};
use crate::error::{HttpCallError, TransportError};
use crate::request;
use crate::response::{ExecutionOutcome, ReceivedResponse, receive};
use crate::transport::{Transport, TransportBuilder};
use crate::validator::is_expected;

/// Why an attempt did not produce an expected response.
enum AttemptFailure {
    Transport(TransportError),
    Status { code: String, body: String },
}

impl AttemptFailure {
    fn into_error(self, attempts: u32) -> HttpCallError {
        match self {
            Self::Transport(source) => HttpCallError::RequestFailed { attempts, source },
            Self::Status { code, body } => HttpCallError::UnexpectedStatusCode {
                code,
                body,
                attempts,
            },
        }
    }
}

/// Executes calls with a fresh transport per attempt.
///
/// Attempt `n` (0-based) is followed by a retry only while
/// `n < max_retries`, so a call makes at most `max_retries + 1` attempts.
/// The first attempt whose status code is expected wins.
#[derive(Debug, Clone, Default)]
pub struct RetryingExecutor {
    transports: TransportBuilder,
}

impl RetryingExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transport_config(config: TransportConfig) -> Self {
        Self {
            transports: TransportBuilder::with_config(config),
        }
    }

    /// Run `spec` until an expected status code is seen or retries run out.
    ///
    /// # Errors
    /// - `Validation`, `TlsLoad`, `TlsConfig`, `RequestBuild`: bad parameters, never retried
    /// - `RequestFailed`: the last attempt failed at the transport level
    /// - `UnexpectedStatusCode`: the last response had an unexpected status
    /// - `Canceled`: `cancel` fired before or during an attempt or a backoff sleep
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        tls: &TlsParameters,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, HttpCallError> {
        tls.validate()?;

        let method = spec.effective_method();
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(HttpCallError::Canceled);
            }

            let transport = self.transports.build(tls)?;
            let assembled = request::assemble(spec)?;
            let url = assembled.url;

            tracing::debug!(
                attempt = attempt + 1,
                max_retries = policy.max_retries,
                method,
                url = %url,
                "sending request"
            );

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HttpCallError::Canceled),
                result = attempt_once(&transport, assembled.request, policy) => result,
            };

            let failure = match result {
                Ok(ReceivedResponse { status_code, body })
                    if is_expected(&status_code, &policy.expected_status_codes) =>
                {
                    tracing::debug!(
                        attempts = attempt + 1,
                        status = %status_code,
                        url = %url,
                        "request succeeded"
                    );
                    return Ok(ExecutionOutcome {
                        status_code,
                        body,
                        request_url: url,
                        attempts: attempt + 1,
                    });
                }
                Ok(ReceivedResponse { status_code, body }) => AttemptFailure::Status {
                    code: status_code,
                    body,
                },
                Err(err) => AttemptFailure::Transport(err),
            };

            if attempt >= policy.max_retries {
                let err = failure.into_error(attempt + 1);
                tracing::debug!(error = %err, url = %url, "giving up");
                return Err(err);
            }

            let delay = policy.backoff.delay(policy.retry_interval, attempt);
            match &failure {
                AttemptFailure::Transport(err) => tracing::warn!(
                    retry = attempt + 1,
                    max_retries = policy.max_retries,
                    method,
                    url = %url,
                    error = %err,
                    backoff_ms = delay.as_millis(),
                    "request failed, retrying"
                ),
                AttemptFailure::Status { code, .. } => tracing::warn!(
                    retry = attempt + 1,
                    max_retries = policy.max_retries,
                    method,
                    url = %url,
                    status = %code,
                    backoff_ms = delay.as_millis(),
                    "unexpected response code, retrying"
                ),
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HttpCallError::Canceled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Send one request and read its body, all under the per-attempt deadline.
async fn attempt_once(
    transport: &Transport,
    request: http::Request<http_body_util::Full<bytes::Bytes>>,
    policy: &RetryPolicy,
) -> Result<ReceivedResponse, TransportError> {
    let deadline = policy.per_attempt_timeout;
    let exchange = async {
        let response = transport.send(request).await?;
        receive(response).await
    };
    tokio::time::timeout(deadline, exchange)
        .await
        .unwrap_or(Err(TransportError::Timeout(deadline)))
}

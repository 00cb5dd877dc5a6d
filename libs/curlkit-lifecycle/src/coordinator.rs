//! Open, renew and close of ephemeral resources.
//!
//! An ephemeral resource (a session, a short lived token) is opened with a
//! primary call. Everything later phases need is packed into a versioned
//! [`PrivateState`] blob that the host stores and hands back; `renew` and
//! `close` read nothing else.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use curlkit_http::{ExecutionOutcome, RetryingExecutor};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;
use crate::state::{CallSettings, LifecycleState, Phase, PrivateState, STATE_VERSION};

/// Host configuration of an ephemeral resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EphemeralConfig {
    pub id: String,
    /// Primary call, run once by `open`
    pub open: CallSettings,
    /// Delay between `open`/`renew` and the next renewal
    #[serde(with = "curlkit_http::duration_serde")]
    pub renew_interval: Duration,
    pub skip_renew: bool,
    pub renew: CallSettings,
    pub skip_close: bool,
    pub close: CallSettings,
}

impl Default for EphemeralConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            open: CallSettings::default(),
            renew_interval: Duration::ZERO,
            skip_renew: true,
            renew: CallSettings::default(),
            skip_close: true,
            close: CallSettings::default(),
        }
    }
}

impl EphemeralConfig {
    /// # Errors
    /// Returns `LifecycleError::Configuration` when the JSON does not match.
    pub fn from_json(json: &str) -> Result<Self, LifecycleError> {
        serde_json::from_str(json)
            .map_err(|e| LifecycleError::Configuration(format!("malformed ephemeral config: {e}")))
    }

    /// Check that every enabled follow-up call is fully described.
    ///
    /// # Errors
    /// Returns `LifecycleError::Configuration` naming the incomplete call.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if !self.skip_renew {
            self.renew.require_complete("renew")?;
        }
        if !self.skip_close {
            self.close.require_complete("close")?;
        }
        Ok(())
    }
}

/// Result of a successful `open`.
#[derive(Debug, Clone)]
pub struct OpenOutcome {
    pub outcome: ExecutionOutcome,
    pub state: LifecycleState,
    /// When the host should call `renew`; `None` with `skip_renew`
    pub renew_at: Option<DateTime<Utc>>,
}

/// Result of a successful `renew`.
#[derive(Debug, Clone)]
pub struct RenewOutcome {
    /// `None` when renewal is skipped
    pub outcome: Option<ExecutionOutcome>,
    pub state: LifecycleState,
    pub renew_at: Option<DateTime<Utc>>,
}

/// Result of a successful `close`.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    /// `None` when closing is skipped
    pub outcome: Option<ExecutionOutcome>,
    pub state: LifecycleState,
}

/// Drives ephemeral resources through open, renew and close.
#[derive(Debug, Clone, Default)]
pub struct LifecycleCoordinator {
    executor: RetryingExecutor,
}

impl LifecycleCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_executor(executor: RetryingExecutor) -> Self {
        Self { executor }
    }

    /// Run the primary call and produce the first state blob.
    ///
    /// A failed primary call is returned as is; nothing is rolled back.
    ///
    /// # Errors
    /// `Configuration` for incomplete renew/close settings, `Call` when the
    /// primary call fails, `StateEncoding` if the blob cannot be written.
    pub async fn open(
        &self,
        config: &EphemeralConfig,
        cancel: &CancellationToken,
    ) -> Result<OpenOutcome, LifecycleError> {
        config.validate()?;

        let outcome = config.open.execute(&self.executor, cancel).await?;
        let renew_at = next_renewal(config.skip_renew, config.renew_interval)?;

        let state = PrivateState {
            version: STATE_VERSION,
            phase: Phase::Open,
            id: config.id.clone(),
            renew_interval: config.renew_interval,
            skip_renew: config.skip_renew,
            skip_close: config.skip_close,
            renew: config.renew.clone(),
            close: config.close.clone(),
            renewals: 0,
            last_renew: None,
        };
        let blob = state.encode()?;

        tracing::info!(
            id = %config.id,
            status = %outcome.status_code,
            attempts = outcome.attempts,
            renew_at = ?renew_at,
            "ephemeral resource opened"
        );
        Ok(OpenOutcome {
            outcome,
            state: LifecycleState::Open(blob),
            renew_at,
        })
    }

    /// Run the renew call stored in `blob`.
    ///
    /// # Errors
    /// `MissingLifecycleState` for an unusable blob, `Configuration` for an
    /// incomplete renew call, `Call` when the renew call fails.
    pub async fn renew(
        &self,
        blob: &[u8],
        cancel: &CancellationToken,
    ) -> Result<RenewOutcome, LifecycleError> {
        let mut state = PrivateState::decode(blob)?;

        if state.skip_renew {
            tracing::debug!(id = %state.id, "renewal skipped");
            return Ok(RenewOutcome {
                outcome: None,
                state: LifecycleState::Renewing(blob.to_vec().into()),
                renew_at: None,
            });
        }

        state.renew.require_complete("renew")?;
        let outcome = state.renew.execute(&self.executor, cancel).await?;
        let renew_at = next_renewal(false, state.renew_interval)?;

        state.phase = Phase::Renewing;
        state.renewals += 1;
        state.last_renew = Some(outcome.clone());
        let blob = state.encode()?;

        tracing::info!(
            id = %state.id,
            status = %outcome.status_code,
            renewals = state.renewals,
            renew_at = ?renew_at,
            "ephemeral resource renewed"
        );
        Ok(RenewOutcome {
            outcome: Some(outcome),
            state: LifecycleState::Renewing(blob),
            renew_at,
        })
    }

    /// Run the close call stored in `blob`.
    ///
    /// The resource counts as closed even when the call fails; the failure is
    /// reported through `CloseFailed` so the host can surface it.
    ///
    /// # Errors
    /// `MissingLifecycleState` when `blob` is absent or unusable,
    /// `Configuration` for an incomplete close call, `CloseFailed` when the
    /// close call fails.
    pub async fn close(
        &self,
        blob: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<CloseOutcome, LifecycleError> {
        let Some(blob) = blob else {
            return Err(LifecycleError::MissingLifecycleState(
                "no state blob was provided to close".to_owned(),
            ));
        };
        let state = PrivateState::decode(blob)?;

        if state.skip_close {
            tracing::debug!(id = %state.id, "close skipped");
            return Ok(CloseOutcome {
                outcome: None,
                state: LifecycleState::Closed,
            });
        }

        state.close.require_complete("close")?;
        match state.close.execute(&self.executor, cancel).await {
            Ok(outcome) => {
                tracing::info!(
                    id = %state.id,
                    status = %outcome.status_code,
                    "ephemeral resource closed"
                );
                Ok(CloseOutcome {
                    outcome: Some(outcome),
                    state: LifecycleState::Closed,
                })
            }
            Err(source) => {
                tracing::warn!(id = %state.id, error = %source, "close call failed");
                Err(LifecycleError::CloseFailed {
                    id: state.id,
                    source,
                })
            }
        }
    }
}

/// Wake time `interval` from now, unless renewal is skipped.
fn next_renewal(skip: bool, interval: Duration) -> Result<Option<DateTime<Utc>>, LifecycleError> {
    if skip {
        return Ok(None);
    }
    let delta = TimeDelta::from_std(interval).map_err(|e| {
        LifecycleError::Configuration(format!(
            "renew interval of {}s is out of range: {e}",
            interval.as_secs()
        ))
    })?;
    Utc::now()
        .checked_add_signed(delta)
        .map(Some)
        .ok_or_else(|| {
            LifecycleError::Configuration(format!(
                "renew interval of {}s overflows the calendar",
                interval.as_secs()
            ))
        })
}

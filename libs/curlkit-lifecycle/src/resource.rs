//! Create, read, update and delete of managed resources.

use curlkit_http::{ExecutionOutcome, RetryingExecutor, request};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::drift::{DriftMarker, has_drifted, next_marker, sanitize};
use crate::error::LifecycleError;
use crate::state::CallSettings;

/// Host plan of a managed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceConfig {
    pub id: String,
    /// Primary call, run once by `create`
    pub create: CallSettings,
    pub skip_read: bool,
    pub read: CallSettings,
    /// Top-level response fields left out of drift comparison
    pub ignored_fields: Vec<String>,
    pub skip_destroy: bool,
    pub destroy: CallSettings,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            create: CallSettings::default(),
            skip_read: true,
            read: CallSettings::default(),
            ignored_fields: Vec::new(),
            skip_destroy: true,
            destroy: CallSettings::default(),
        }
    }
}

impl ResourceConfig {
    /// # Errors
    /// Returns `LifecycleError::Configuration` when the JSON does not match.
    pub fn from_json(json: &str) -> Result<Self, LifecycleError> {
        serde_json::from_str(json)
            .map_err(|e| LifecycleError::Configuration(format!("malformed resource config: {e}")))
    }

    /// # Errors
    /// Returns `LifecycleError::Configuration` naming the incomplete call.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if !self.skip_read {
            self.read.require_complete("read")?;
        }
        if !self.skip_destroy {
            self.destroy.require_complete("destroy")?;
        }
        Ok(())
    }

    /// URL the destroy call will hit, with its query parameters merged.
    ///
    /// Falls back to the raw URL when it cannot be parsed.
    #[must_use]
    pub fn destroy_request_url(&self) -> String {
        let spec = &self.destroy.request;
        if spec.url.is_empty() {
            return String::new();
        }
        request::merge_query(&spec.url, &spec.query_parameters)
            .map_or_else(|_| spec.url.clone(), String::from)
    }
}

/// Persisted state of a managed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub config: ResourceConfig,
    /// Last observed body; sanitized once the resource has been read
    pub response: String,
    pub status_code: String,
    pub request_url: String,
    pub destroy_request_url: String,
    pub drift_marker: DriftMarker,
}

/// Result of a `read`.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub state: ResourceState,
    pub drifted: bool,
}

/// Result of a successful `delete`.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// `None` when destroying is skipped
    pub outcome: Option<ExecutionOutcome>,
}

/// Drives managed resources through create, read, update and delete.
#[derive(Debug, Clone, Default)]
pub struct ManagedResource {
    executor: RetryingExecutor,
}

impl ManagedResource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_executor(executor: RetryingExecutor) -> Self {
        Self { executor }
    }

    /// Run the primary call and record what it returned.
    ///
    /// # Errors
    /// `Configuration` for incomplete read/destroy settings, `Call` when the
    /// primary call fails.
    pub async fn create(
        &self,
        config: ResourceConfig,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, LifecycleError> {
        config.validate()?;
        let outcome = config.create.execute(&self.executor, cancel).await?;

        tracing::info!(
            id = %config.id,
            status = %outcome.status_code,
            attempts = outcome.attempts,
            "resource created"
        );
        Ok(ResourceState {
            id: config.id.clone(),
            destroy_request_url: config.destroy_request_url(),
            config,
            response: outcome.body,
            status_code: outcome.status_code,
            request_url: outcome.request_url,
            drift_marker: DriftMarker::initial(),
        })
    }

    /// Re-read the remote state and compare it with the stored response.
    ///
    /// # Errors
    /// `Configuration` for incomplete read settings, `Call` when the read call
    /// fails, `Sanitize` if a body cannot be canonicalized.
    pub async fn read(
        &self,
        mut state: ResourceState,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome, LifecycleError> {
        if state.config.skip_read {
            return Ok(ReadOutcome {
                state,
                drifted: false,
            });
        }
        state.config.read.require_complete("read")?;

        let outcome = state.config.read.execute(&self.executor, cancel).await?;
        let ignored = state.config.ignored_fields.as_slice();
        let old = sanitize(&state.response, ignored)?;
        let new = sanitize(&outcome.body, ignored)?;

        let drifted = has_drifted(&old, &new);
        state.drift_marker = next_marker(Some(&state.drift_marker), drifted);
        if drifted {
            tracing::warn!(id = %state.id, marker = %state.drift_marker, "drift detected");
        }
        state.response = new;

        Ok(ReadOutcome { state, drifted })
    }

    /// Adopt a new plan without touching the remote side.
    ///
    /// # Errors
    /// Returns `LifecycleError::Configuration` if the plan is incomplete.
    pub fn update(
        mut state: ResourceState,
        plan: ResourceConfig,
    ) -> Result<ResourceState, LifecycleError> {
        plan.validate()?;
        state.id.clone_from(&plan.id);
        state.destroy_request_url = plan.destroy_request_url();
        state.config = plan;
        Ok(state)
    }

    /// Run the destroy call.
    ///
    /// # Errors
    /// `Configuration` for incomplete destroy settings, `DeleteFailed` when the
    /// destroy call fails; the resource is gone from the host either way.
    pub async fn delete(
        &self,
        state: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<DeleteOutcome, LifecycleError> {
        if state.config.skip_destroy {
            tracing::debug!(id = %state.id, "destroy skipped");
            return Ok(DeleteOutcome { outcome: None });
        }
        state.config.destroy.require_complete("destroy")?;

        match state.config.destroy.execute(&self.executor, cancel).await {
            Ok(outcome) => {
                tracing::info!(id = %state.id, status = %outcome.status_code, "resource deleted");
                Ok(DeleteOutcome {
                    outcome: Some(outcome),
                })
            }
            Err(source) => {
                tracing::warn!(id = %state.id, error = %source, "destroy call failed");
                Err(LifecycleError::DeleteFailed {
                    id: state.id.clone(),
                    source,
                })
            }
        }
    }
}

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Lifecycles built on `curlkit-http`
//!
//! - [`LifecycleCoordinator`] opens, renews and closes ephemeral resources.
//!   The renew and close calls travel in a versioned opaque blob the host
//!   stores between phases.
//! - [`ManagedResource`] creates, reads, updates and deletes resources and
//!   detects drift between reads (see [`drift`]).
//! - [`read_data_source`] and [`invoke_action`] run a single call.
//!
//! Every phase goes through one [`curlkit_http::RetryingExecutor`], honours
//! a `CancellationToken` and runs to completion before returning; nothing is
//! scheduled in the background. The host calls `renew` at or after the
//! returned `renew_at`.

mod coordinator;
pub mod drift;
mod error;
mod oneshot;
mod resource;
mod state;

pub use coordinator::{
    CloseOutcome, EphemeralConfig, LifecycleCoordinator, OpenOutcome, RenewOutcome,
};
pub use drift::DriftMarker;
pub use error::LifecycleError;
pub use oneshot::{
    ACTION_RETRY_INTERVAL, ActionConfig, DataSourceConfig, DataSourceOutcome, invoke_action,
    read_data_source,
};
pub use resource::{DeleteOutcome, ManagedResource, ReadOutcome, ResourceConfig, ResourceState};
pub use state::{CallSettings, LifecycleState, OpaqueState, Phase, PrivateState, STATE_VERSION};

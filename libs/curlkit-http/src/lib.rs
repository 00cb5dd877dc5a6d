#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP call execution for `curlkit`
//!
//! This crate turns a declarative call description into network traffic:
//! - [`TransportBuilder`] selects the default transport (OS native roots) or
//!   a custom rustls transport (CA file or directory, client identity, skip-verify)
//! - [`request::assemble`] builds the request and merges query parameters
//! - [`is_expected`] matches status codes against the expected set
//! - [`RetryingExecutor`] drives all of the above through a bounded retry
//!   loop with a per-attempt timeout and cooperative cancellation
//!
//! Every transport follows redirects and transparently decompresses gzip,
//! brotli and deflate bodies.
//!
//! # Example
//!
//! ```ignore
//! use curlkit_http::{RequestSpec, RetryPolicy, RetryingExecutor, TlsParameters};
//! use tokio_util::sync::CancellationToken;
//!
//! let outcome = RetryingExecutor::new()
//!     .execute(
//!         &RequestSpec::new("GET", "https://api.example.com/health"),
//!         &TlsParameters::default(),
//!         &RetryPolicy::expecting(["200"]).max_retries(3),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{} {}", outcome.status_code, outcome.body);
//! ```

mod config;
pub mod duration_serde;
mod error;
mod executor;
mod layers;
pub mod request;
mod response;
pub mod tls;
mod transport;
mod validator;

pub use config::{
    Backoff, DEFAULT_CLIENT_TIMEOUT, DEFAULT_PER_ATTEMPT_TIMEOUT, DEFAULT_RETRY_INTERVAL,
    DEFAULT_USER_AGENT, RequestSpec, RetryPolicy, TlsParameters, TransportConfig, from_json,
};
pub use error::{HttpCallError, TransportError};
pub use executor::RetryingExecutor;
pub use layers::{UserAgentLayer, UserAgentService};
pub use request::{AssembledRequest, assemble};
pub use response::{EMPTY_BODY, ExecutionOutcome, ResponseBody};
pub use transport::{Transport, TransportBuilder, TransportKind};
pub use validator::{ExpectedStatusCodes, is_expected};
pub use tokio_util::sync::CancellationToken;

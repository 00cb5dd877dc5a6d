use http::{HeaderValue, Request, header::USER_AGENT};
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::error::HttpCallError;

/// Fills in the `User-Agent` header when the caller did not set one.
///
/// An empty agent string disables the layer.
#[derive(Debug, Clone)]
pub struct UserAgentLayer {
    user_agent: Option<HeaderValue>,
}

impl UserAgentLayer {
    /// # Errors
    /// Returns `HttpCallError::Validation` if `user_agent` is not a valid header value.
    pub fn try_new(user_agent: &str) -> Result<Self, HttpCallError> {
        if user_agent.is_empty() {
            return Ok(Self { user_agent: None });
        }
        let value = HeaderValue::from_str(user_agent).map_err(|e| {
            HttpCallError::Validation(format!("invalid user agent '{user_agent}': {e}"))
        })?;
        Ok(Self {
            user_agent: Some(value),
        })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserAgentService<S> {
    inner: S,
    user_agent: Option<HeaderValue>,
}

impl<S, B> Service<Request<B>> for UserAgentService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if let Some(agent) = &self.user_agent {
            req.headers_mut()
                .entry(USER_AGENT)
                .or_insert_with(|| agent.clone());
        }
        self.inner.call(req)
    }
}

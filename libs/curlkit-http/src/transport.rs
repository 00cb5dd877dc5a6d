use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;

use crate::config::{TlsParameters, TransportConfig};
use crate::error::{HttpCallError, TransportError};
use crate::layers::UserAgentLayer;
use crate::response::ResponseBody;
use crate::tls;

type TransportService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, TransportError>;

/// Which TLS setup a transport was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// OS native roots, no client identity
    Default,
    /// Native roots plus configured CA material and/or a client identity
    CustomTls { skip_verify: bool },
}

/// A ready-to-use network transport.
///
/// Speaks both `http://` and `https://`, follows redirects and
/// transparently decompresses gzip, brotli and deflate bodies.
#[derive(Clone)]
pub struct Transport {
    service: TransportService,
    kind: TransportKind,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl Transport {
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Send one request and return the response with its body still unread.
    ///
    /// # Errors
    /// `TransportError::Timeout` when the client timeout elapses,
    /// `TransportError::Transport` for connection and protocol failures.
    pub async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let mut service = self.service.clone();
        service.ready().await?.call(request).await
    }
}

/// Builds a fresh [`Transport`] from TLS parameters.
///
/// Nothing is cached between builds except the OS root certificate list, so
/// changed certificate files take effect on the next build.
#[derive(Debug, Clone, Default)]
pub struct TransportBuilder {
    config: TransportConfig,
}

impl TransportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// # Errors
    /// `Validation` for inconsistent parameters (checked before any I/O),
    /// `TlsLoad` for unreadable or unparsable TLS material.
    pub fn build(&self, params: &TlsParameters) -> Result<Transport, HttpCallError> {
        params.validate()?;

        let (connector, kind) = if params.has_custom_material() {
            let client_config = tls::client_config(params)?;
            let connector = hyper_rustls::HttpsConnectorBuilder::new()
                .with_tls_config(client_config)
                .https_or_http()
                .enable_all_versions()
                .build();
            (
                connector,
                TransportKind::CustomTls {
                    skip_verify: params.skip_verify,
                },
            )
        } else {
            if params.skip_verify {
                tracing::warn!(
                    "skip_verify has no effect without certificate or CA files; using the default transport"
                );
            }
            (default_connector()?, TransportKind::Default)
        };

        let timeout = self.config.client_timeout;
        let service = self.stack(connector, timeout)?;

        tracing::debug!(?kind, timeout_ms = timeout.as_millis(), "built transport");
        Ok(Transport { service, kind })
    }

    fn stack(
        &self,
        connector: HttpsConnector<HttpConnector>,
        timeout: Duration,
    ) -> Result<TransportService, HttpCallError> {
        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for idle connections to expire
        client_builder.pool_timer(TokioTimer::new());
        let hyper_client = client_builder.build::<_, Full<Bytes>>(connector);

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;

        // Outer to inner: Timeout -> UserAgent -> Decompression -> FollowRedirect -> hyper
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(ua_layer)
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::new())
            .service(hyper_client);

        Ok(service
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout))
            .boxed_clone())
    }
}

/// OS native roots; the bundled web PKI roots only when the OS store is empty.
fn default_connector() -> Result<HttpsConnector<HttpConnector>, HttpCallError> {
    let builder = if let Some(client_config) = tls::native_roots_client_config()? {
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
    } else {
        tracing::warn!("no usable native root certificates; falling back to bundled web PKI roots");
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::get_crypto_provider())
            .map_err(HttpCallError::TlsConfig)?
    };
    Ok(builder.https_or_http().enable_all_versions().build())
}

fn map_tower_error(err: tower::BoxError, timeout: Duration) -> TransportError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return TransportError::Timeout(timeout);
    }
    match err.downcast::<TransportError>() {
        Ok(transport) => *transport,
        Err(other) => TransportError::Transport(other),
    }
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, body)
}

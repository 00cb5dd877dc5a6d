//! Turns a [`RequestSpec`] into a concrete outbound request.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request};
use http_body_util::Full;
use url::Url;

use crate::config::RequestSpec;
use crate::error::HttpCallError;

/// An outbound request together with the URL it targets.
#[derive(Debug)]
pub struct AssembledRequest {
    pub request: Request<Full<Bytes>>,
    /// Final URL after the query merge
    pub url: String,
}

/// Build method, URL, headers and body of `spec`.
///
/// # Errors
/// Returns `HttpCallError::RequestBuild` for a malformed or non-absolute URL,
/// a scheme other than http/https, an invalid method or an invalid header.
pub fn assemble(spec: &RequestSpec) -> Result<AssembledRequest, HttpCallError> {
    let url = merge_query(&spec.url, &spec.query_parameters)?;

    let method = Method::from_bytes(spec.effective_method().as_bytes()).map_err(|e| {
        HttpCallError::RequestBuild(format!("invalid method '{}': {e}", spec.method))
    })?;

    let body = spec.body.clone().map(Bytes::from).unwrap_or_default();
    let mut request = Request::builder()
        .method(method)
        .uri(url.as_str())
        .body(Full::new(body))
        .map_err(|e| HttpCallError::RequestBuild(e.to_string()))?;

    // Names differing only in case collapse into one header; the later key wins
    for (name, value) in &spec.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            HttpCallError::RequestBuild(format!("invalid header name '{name}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            HttpCallError::RequestBuild(format!("invalid value for header '{name}': {e}"))
        })?;
        request.headers_mut().insert(name, value);
    }

    Ok(AssembledRequest {
        request,
        url: url.into(),
    })
}

/// Parse `raw` and merge `params` into its query string.
///
/// Parameters in `params` replace every same-named parameter already in the
/// URL. When anything is merged the whole query is re-encoded with keys in
/// sorted order (space as `+`); without parameters the URL query is left as
/// written.
///
/// # Errors
/// Returns `HttpCallError::RequestBuild` when `raw` is not an absolute
/// http(s) URL with a host.
pub fn merge_query(raw: &str, params: &BTreeMap<String, String>) -> Result<Url, HttpCallError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| HttpCallError::RequestBuild(format!("invalid URL '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HttpCallError::RequestBuild(format!(
            "unsupported URL scheme '{}' in '{raw}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(HttpCallError::RequestBuild(format!(
            "URL '{raw}' has no host"
        )));
    }

    if params.is_empty() {
        return Ok(url);
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !params.contains_key(key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    // Stable: repeated keys keep their original relative order
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    url.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(url)
}

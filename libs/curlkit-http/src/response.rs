use bytes::Bytes;
use http::Response;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Type-erased response body produced by every transport.
pub type ResponseBody = BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Stand-in for a response that carried no body
pub const EMPTY_BODY: &str = "{}";

/// Result of a successful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Decimal status code, e.g. `"200"`
    pub status_code: String,
    /// Response body, `"{}"` when the server sent none
    pub body: String,
    /// URL that was requested, after the query merge
    pub request_url: String,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Status and fully read body of one attempt.
#[derive(Debug)]
pub struct ReceivedResponse {
    pub status_code: String,
    pub body: String,
}

/// Read the whole body. Non-UTF-8 bytes are replaced rather than rejected.
pub async fn receive(
    response: Response<ResponseBody>,
) -> Result<ReceivedResponse, TransportError> {
    let status_code = response.status().as_str().to_owned();
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(TransportError::Transport)?
        .to_bytes();

    let body = if bytes.is_empty() {
        EMPTY_BODY.to_owned()
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };
    Ok(ReceivedResponse { status_code, body })
}

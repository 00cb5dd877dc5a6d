use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::HttpCallError;
use crate::validator::ExpectedStatusCodes;

/// Default User-Agent string, added only when a request carries none
pub const DEFAULT_USER_AGENT: &str = concat!("curlkit/", env!("CARGO_PKG_VERSION"));

/// Default overall timeout of every built transport
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Default deadline of a single attempt
pub const DEFAULT_PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse any configuration record from host-supplied JSON.
///
/// # Errors
/// Returns `HttpCallError::Validation` when the JSON does not match the record.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, HttpCallError> {
    serde_json::from_str(json)
        .map_err(|e| HttpCallError::Validation(format!("malformed configuration: {e}")))
}

/// Description of one outbound HTTP call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestSpec {
    pub url: String,
    /// HTTP method; empty means `GET`
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// One value per name, set on the request by exact key.
    ///
    /// Header names are case-insensitive in HTTP and are sent in lowercase;
    /// keys that differ only in case end up as a single header carrying the
    /// value of the key that sorts last (`"x-a"` after `"X-A"`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Merged into the URL query; these values win over same-named URL parameters
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub query_parameters: BTreeMap<String, String>,
}

impl RequestSpec {
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_parameters.insert(name.into(), value.into());
        self
    }

    /// The method to send, with the empty string mapped to `GET`.
    #[must_use]
    pub fn effective_method(&self) -> &str {
        if self.method.trim().is_empty() {
            "GET"
        } else {
            &self.method
        }
    }
}

/// TLS material for a call. Empty paths count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_directory: Option<PathBuf>,
    /// Disable server certificate validation
    pub skip_verify: bool,
}

fn present(path: Option<&PathBuf>) -> Option<&Path> {
    path.map(PathBuf::as_path)
        .filter(|p| !p.as_os_str().is_empty())
}

impl TlsParameters {
    #[must_use]
    pub fn cert_file(&self) -> Option<&Path> {
        present(self.cert_file.as_ref())
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        present(self.key_file.as_ref())
    }

    #[must_use]
    pub fn ca_cert_file(&self) -> Option<&Path> {
        present(self.ca_cert_file.as_ref())
    }

    #[must_use]
    pub fn ca_cert_directory(&self) -> Option<&Path> {
        present(self.ca_cert_directory.as_ref())
    }

    /// Whether any certificate, key or CA material is configured.
    ///
    /// Without material the default transport is used, even when
    /// `skip_verify` is set.
    #[must_use]
    pub fn has_custom_material(&self) -> bool {
        self.cert_file().is_some()
            || self.key_file().is_some()
            || self.ca_cert_file().is_some()
            || self.ca_cert_directory().is_some()
    }

    /// Check the field combinations without touching the file system.
    ///
    /// # Errors
    /// Returns `HttpCallError::Validation` when only one of cert/key is set or
    /// when both a CA file and a CA directory are set.
    pub fn validate(&self) -> Result<(), HttpCallError> {
        match (self.cert_file(), self.key_file()) {
            (Some(_), None) => {
                return Err(HttpCallError::Validation(
                    "cert_file requires key_file".to_owned(),
                ));
            }
            (None, Some(_)) => {
                return Err(HttpCallError::Validation(
                    "key_file requires cert_file".to_owned(),
                ));
            }
            _ => {}
        }
        if self.ca_cert_file().is_some() && self.ca_cert_directory().is_some() {
            return Err(HttpCallError::Validation(
                "ca_cert_file and ca_cert_directory are mutually exclusive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Every retry waits `retry_interval`
    #[default]
    Constant,
    /// Retry `n` waits `min(retry_interval * multiplier^n, max)`
    Exponential {
        multiplier: f64,
        #[serde(with = "crate::duration_serde")]
        max: Duration,
    },
}

impl Backoff {
    /// Delay before the retry that follows failed attempt number `retry` (0-based).
    #[must_use]
    pub fn delay(&self, interval: Duration, retry: u32) -> Duration {
        // Anything beyond a day is not a useful retry delay
        const MAX_BACKOFF_SECS: f64 = 86400.0;

        match self {
            Self::Constant => interval,
            Self::Exponential { multiplier, max } => {
                let multiplier = if multiplier.is_finite() && *multiplier >= 0.0 {
                    *multiplier
                } else {
                    1.0
                };
                let max_secs = max.as_secs_f64().min(MAX_BACKOFF_SECS);
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let secs = interval.as_secs_f64() * multiplier.powi(exponent);
                let clamped = if secs.is_finite() {
                    secs.min(max_secs).max(0.0)
                } else {
                    max_secs
                };
                Duration::from_secs_f64(clamped)
            }
        }
    }
}

/// Retry and success criteria of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = 1 + `max_retries`
    pub max_retries: u32,
    #[serde(with = "crate::duration_serde")]
    pub retry_interval: Duration,
    #[serde(with = "crate::duration_serde")]
    pub per_attempt_timeout: Duration,
    pub expected_status_codes: ExpectedStatusCodes,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
            expected_status_codes: ExpectedStatusCodes::default(),
            backoff: Backoff::Constant,
        }
    }
}

impl RetryPolicy {
    /// Policy accepting the given codes, with default timing.
    #[must_use]
    pub fn expecting<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected_status_codes: codes.into_iter().collect(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub fn per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }
}

/// Settings shared by every transport a builder produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    #[serde(with = "crate::duration_serde")]
    pub client_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.retry_interval, Duration::from_secs(10));
        assert_eq!(policy.per_attempt_timeout, Duration::from_secs(10));
        assert!(policy.expected_status_codes.is_empty());
        assert_eq!(policy.backoff, Backoff::Constant);
    }

    #[test]
    fn test_retry_policy_from_json() {
        let policy: RetryPolicy = from_json(
            r#"{"max_retries":3,"retry_interval":"500ms","expected_status_codes":["200","201"]}"#,
        )
        .unwrap();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.retry_interval, Duration::from_millis(500));
        assert_eq!(policy.per_attempt_timeout, Duration::from_secs(10));
        assert!(policy.expected_status_codes.contains("201"));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let err = from_json::<RetryPolicy>(r#"{"max_retry":3}"#).unwrap_err();
        assert!(matches!(err, HttpCallError::Validation(_)));
    }

    #[test]
    fn test_backoff_from_json() {
        let policy: RetryPolicy = from_json(
            r#"{"backoff":{"kind":"exponential","multiplier":2.0,"max":"5s"}}"#,
        )
        .unwrap();
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                multiplier: 2.0,
                max: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_constant_backoff_never_grows() {
        let interval = Duration::from_secs(2);
        for retry in 0..10 {
            assert_eq!(Backoff::Constant.delay(interval, retry), interval);
        }
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let backoff = Backoff::Exponential {
            multiplier: 2.0,
            max: Duration::from_secs(3),
        };
        let interval = Duration::from_secs(1);
        assert_eq!(backoff.delay(interval, 0), Duration::from_secs(1));
        assert_eq!(backoff.delay(interval, 1), Duration::from_secs(2));
        assert_eq!(backoff.delay(interval, 2), Duration::from_secs(3));
        assert_eq!(backoff.delay(interval, u32::MAX), Duration::from_secs(3));
    }

    #[test]
    fn test_exponential_backoff_sanitizes_multiplier() {
        let interval = Duration::from_millis(100);
        for multiplier in [f64::NAN, f64::INFINITY, -2.0] {
            let backoff = Backoff::Exponential {
                multiplier,
                max: Duration::from_secs(1),
            };
            let delay = backoff.delay(interval, 5);
            assert!(delay <= Duration::from_secs(1), "{multiplier}: {delay:?}");
        }
    }

    #[test]
    fn test_tls_validation_cert_without_key() {
        let params = TlsParameters {
            cert_file: Some("a".into()),
            key_file: Some(PathBuf::new()),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(HttpCallError::Validation(_))
        ));

        let params = TlsParameters {
            key_file: Some("b".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(HttpCallError::Validation(_))
        ));
    }

    #[test]
    fn test_tls_validation_ca_file_and_dir_conflict() {
        let params = TlsParameters {
            ca_cert_file: Some("ca.pem".into()),
            ca_cert_directory: Some("certs".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(HttpCallError::Validation(_))
        ));
    }

    #[test]
    fn test_tls_empty_paths_are_absent() {
        let params = TlsParameters {
            cert_file: Some(PathBuf::new()),
            ca_cert_file: Some(PathBuf::new()),
            skip_verify: true,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
        assert!(!params.has_custom_material());
    }

    #[test]
    fn test_request_spec_effective_method() {
        assert_eq!(RequestSpec::new("", "http://x").effective_method(), "GET");
        assert_eq!(
            RequestSpec::new("POST", "http://x").effective_method(),
            "POST"
        );
    }

    #[test]
    fn test_transport_config_default_user_agent() {
        let config = TransportConfig::default();
        assert!(config.user_agent.starts_with("curlkit/"));
        assert_eq!(config.client_timeout, Duration::from_secs(30));
    }
}

//! TLS material loading and rustls client configuration.
//!
//! The OS native root certificates are loaded once and cached for the
//! process. Everything else (CA files, CA directories, client identities) is
//! read from disk each time a transport is built, so rotated files are
//! picked up by the next attempt.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};

use crate::config::TlsParameters;
use crate::error::HttpCallError;

/// File extensions picked up from a CA directory (compared case-insensitively)
const CA_DIRECTORY_EXTENSIONS: [&str; 3] = ["pem", "crt", "cer"];

/// Cached native root certificates.
/// Empty vec means no certs found (warned, not errored).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();

    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }

    result.certs
}

/// Cached native root certificates, loaded on first use.
#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// Crypto provider for TLS connections.
///
/// Uses the process-wide default when one is installed, otherwise a fresh
/// aws-lc-rs provider that is not installed globally.
#[must_use]
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build the rustls client configuration for a custom TLS transport.
///
/// The trust pool starts from the native roots and adds the configured CA
/// file or every certificate file of the CA directory. With `skip_verify`
/// the CA material is still loaded (so broken paths are reported) but the
/// server certificate is not checked.
///
/// # Errors
/// `TlsLoad` for unreadable or unparsable material, `TlsConfig` when rustls
/// rejects the assembled configuration.
pub fn client_config(params: &TlsParameters) -> Result<rustls::ClientConfig, HttpCallError> {
    let provider = get_crypto_provider();
    let roots = root_store(params)?;

    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(HttpCallError::TlsConfig)?;

    let builder = if params.skip_verify {
        tracing::warn!(
            ca_cert_file = ?params.ca_cert_file(),
            ca_cert_directory = ?params.ca_cert_directory(),
            "server certificate verification is disabled for this transport"
        );
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoServerVerification(provider)))
    } else {
        builder.with_root_certificates(roots)
    };

    match (params.cert_file(), params.key_file()) {
        (Some(cert_path), Some(key_path)) => {
            let chain = load_pem_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| HttpCallError::tls_load(cert_path, e))
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Trust store holding the parsable native root certificates.
fn native_root_store() -> RootCertStore {
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(native_root_certs().iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    store
}

/// Client configuration of the default transport: OS native roots, no
/// client identity.
///
/// Returns `Ok(None)` when the OS store yields no usable certificate.
///
/// # Errors
/// `TlsConfig` when rustls rejects the configuration.
pub fn native_roots_client_config() -> Result<Option<rustls::ClientConfig>, HttpCallError> {
    let roots = native_root_store();
    if roots.is_empty() {
        return Ok(None);
    }
    let config = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(HttpCallError::TlsConfig)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Some(config))
}

fn root_store(params: &TlsParameters) -> Result<RootCertStore, HttpCallError> {
    let mut store = native_root_store();
    let added = store.len();

    let mut ca_files: Vec<PathBuf> = Vec::new();
    if let Some(file) = params.ca_cert_file() {
        ca_files.push(file.to_path_buf());
    }
    if let Some(dir) = params.ca_cert_directory() {
        ca_files.extend(ca_directory_files(dir)?);
    }

    for path in &ca_files {
        for cert in load_pem_certs(path)? {
            store
                .add(cert)
                .map_err(|e| HttpCallError::tls_load(path, e))?;
        }
    }

    tracing::debug!(
        native = added,
        custom_files = ca_files.len(),
        total = store.len(),
        "assembled TLS trust pool"
    );
    Ok(store)
}

/// Certificate files directly inside `dir`, sorted by path.
fn ca_directory_files(dir: &Path) -> Result<Vec<PathBuf>, HttpCallError> {
    let entries = std::fs::read_dir(dir).map_err(|e| HttpCallError::tls_load(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| HttpCallError::tls_load(dir, e))?.path();
        if path.is_file() && has_certificate_extension(&path) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        tracing::warn!(directory = %dir.display(), "CA directory contains no certificate files");
    }
    Ok(files)
}

fn has_certificate_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            CA_DIRECTORY_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Read every PEM certificate in `path`; at least one is required.
fn load_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, HttpCallError> {
    let pem = std::fs::read(path).map_err(|e| HttpCallError::tls_load(path, e))?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| HttpCallError::tls_load(path, e))?;
    if certs.is_empty() {
        return Err(HttpCallError::tls_load(path, "no PEM certificates found"));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, HttpCallError> {
    let pem = std::fs::read(path).map_err(|e| HttpCallError::tls_load(path, e))?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|e| HttpCallError::tls_load(path, e))
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct NoServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};
    use tempfile::TempDir;

    struct Generated {
        cert_pem: String,
        key_pem: String,
    }

    fn generate(name: &str) -> Generated {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec![name.to_owned()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        Generated {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        }
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_native_roots_are_cached() {
        let first = native_root_certs().as_ptr();
        let second = native_root_certs().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_native_roots_config_follows_os_store() {
        let config = native_roots_client_config().unwrap();
        assert_eq!(config.is_some(), !native_root_store().is_empty());
    }

    #[test]
    fn test_ca_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let ca = generate("ca.local");
        let params = TlsParameters {
            ca_cert_file: Some(write(&dir, "ca.pem", &ca.cert_pem)),
            ..Default::default()
        };
        let store = root_store(&params).unwrap();
        assert!(store.len() > native_root_certs().len());
        assert!(client_config(&params).is_ok());
    }

    #[test]
    fn test_ca_file_without_certificates_fails() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.pem", "not a certificate\n");
        let params = TlsParameters {
            ca_cert_file: Some(path.clone()),
            ..Default::default()
        };
        match client_config(&params) {
            Err(HttpCallError::TlsLoad { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected TlsLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_ca_file_fails() {
        let params = TlsParameters {
            ca_cert_file: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        assert!(matches!(
            client_config(&params),
            Err(HttpCallError::TlsLoad { .. })
        ));
    }

    #[test]
    fn test_ca_directory_filters_by_extension() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.pem", &generate("a.local").cert_pem);
        write(&dir, "b.CRT", &generate("b.local").cert_pem);
        write(&dir, "c.cer", &generate("c.local").cert_pem);
        write(&dir, "notes.txt", "ignored");
        std::fs::create_dir(dir.path().join("nested.pem")).unwrap();

        let files = ca_directory_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["a.pem", "b.CRT", "c.cer"]);

        let params = TlsParameters {
            ca_cert_directory: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let store = root_store(&params).unwrap();
        assert_eq!(store.len(), native_root_certs().len() + 3);
    }

    #[test]
    fn test_ca_directory_single_bad_file_fails_whole_build() {
        let dir = TempDir::new().unwrap();
        write(&dir, "good.pem", &generate("good.local").cert_pem);
        let bad = write(&dir, "bad.pem", "garbage");
        let params = TlsParameters {
            ca_cert_directory: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        match client_config(&params) {
            Err(HttpCallError::TlsLoad { path, .. }) => assert_eq!(path, bad),
            other => panic!("expected TlsLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_client_identity_is_loaded() {
        let dir = TempDir::new().unwrap();
        let identity = generate("client.local");
        let params = TlsParameters {
            cert_file: Some(write(&dir, "client.pem", &identity.cert_pem)),
            key_file: Some(write(&dir, "client.key", &identity.key_pem)),
            ..Default::default()
        };
        assert!(client_config(&params).is_ok());
    }

    #[test]
    fn test_unparsable_key_fails() {
        let dir = TempDir::new().unwrap();
        let identity = generate("client.local");
        let key_path = write(&dir, "client.key", "-----BEGIN NOTHING-----");
        let params = TlsParameters {
            cert_file: Some(write(&dir, "client.pem", &identity.cert_pem)),
            key_file: Some(key_path.clone()),
            ..Default::default()
        };
        match client_config(&params) {
            Err(HttpCallError::TlsLoad { path, .. }) => assert_eq!(path, key_path),
            other => panic!("expected TlsLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_skip_verify_still_reports_bad_ca_file() {
        let params = TlsParameters {
            ca_cert_file: Some("/nonexistent/ca.pem".into()),
            skip_verify: true,
            ..Default::default()
        };
        assert!(matches!(
            client_config(&params),
            Err(HttpCallError::TlsLoad { .. })
        ));
    }
}

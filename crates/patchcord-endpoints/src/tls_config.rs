//! TLS material loading and client/server configuration assembly.
//!
//! Option values for `ca`, `cert`, and `key` are tried as inline hex first
//! and as a filesystem path second. The resulting bytes are PEM-decoded when
//! a PEM block is present, otherwise treated as raw DER.

use std::sync::Arc;

use patchcord_core::EndpointError;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{self, RootCertStore};

/// Parsed TLS options of one seed, before mode-specific validation.
#[derive(Default)]
pub(crate) struct TlsMaterial {
    pub ca: Option<CertificateDer<'static>>,
    pub cert: Option<CertificateDer<'static>>,
    pub key: Option<PrivateKeyDer<'static>>,
    pub verify: bool,
}

impl TlsMaterial {
    /// Client-mode matrix: `cert` and `key` must come together; without
    /// `verify` the peer is not validated; with `verify` the `ca` (when
    /// given) becomes the sole trust root.
    pub(crate) fn client_config(self) -> Result<rustls::ClientConfig, EndpointError> {
        let TlsMaterial {
            ca,
            cert,
            key,
            verify,
        } = self;

        match (&cert, &key) {
            (Some(_), None) => return Err(EndpointError::MissingKey),
            (None, Some(_)) => return Err(EndpointError::MissingCert),
            _ => {}
        }

        let mut roots = RootCertStore::empty();
        if verify {
            match &ca {
                Some(ca) => {
                    roots
                        .add(ca.clone())
                        .map_err(|err| EndpointError::ParseCert(err.to_string()))?;
                }
                None => {
                    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                }
            }
        }

        let chain = presented_chain(cert, ca);
        let config = if verify {
            let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
            match (chain, key) {
                (Some(chain), Some(key)) => builder
                    .with_client_auth_cert(chain, key)
                    .map_err(tls_error)?,
                _ => builder.with_no_client_auth(),
            }
        } else {
            let builder = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier));
            match (chain, key) {
                (Some(chain), Some(key)) => builder
                    .with_client_auth_cert(chain, key)
                    .map_err(tls_error)?,
                _ => builder.with_no_client_auth(),
            }
        };
        Ok(config)
    }

    /// Server-mode matrix: `cert` and `key` are mandatory; `verify` requires
    /// a `ca` and makes the server demand and validate client certificates
    /// against it.
    pub(crate) fn server_config(self) -> Result<rustls::ServerConfig, EndpointError> {
        let TlsMaterial {
            ca,
            cert,
            key,
            verify,
        } = self;

        let cert = cert.ok_or(EndpointError::MissingCert)?;
        let key = key.ok_or(EndpointError::MissingKey)?;

        let builder = if verify {
            let ca_root = ca.clone().ok_or(EndpointError::MissingCa)?;
            let mut roots = RootCertStore::empty();
            roots
                .add(ca_root)
                .map_err(|err| EndpointError::ParseCert(err.to_string()))?;
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|err| EndpointError::Tls(err.to_string()))?;
            rustls::ServerConfig::builder().with_client_cert_verifier(verifier)
        } else {
            rustls::ServerConfig::builder().with_no_client_auth()
        };

        let chain = presented_chain(Some(cert), ca).unwrap_or_default();
        builder.with_single_cert(chain, key).map_err(tls_error)
    }
}

/// Leaf certificate first, with the CA appended to the presented chain.
fn presented_chain(
    cert: Option<CertificateDer<'static>>,
    ca: Option<CertificateDer<'static>>,
) -> Option<Vec<CertificateDer<'static>>> {
    cert.map(|leaf| {
        let mut chain = vec![leaf];
        if let Some(ca) = ca {
            chain.push(ca);
        }
        chain
    })
}

fn tls_error(err: rustls::Error) -> EndpointError {
    EndpointError::Tls(err.to_string())
}

/// Load a certificate from inline hex or a file, PEM or DER.
pub(crate) fn read_cert(value: &str) -> Result<CertificateDer<'static>, EndpointError> {
    let bytes = read_material(value)?;
    if bytes.is_empty() {
        return Err(EndpointError::ParseCert("empty certificate material".into()));
    }
    if looks_pem(&bytes) {
        let mut reader = std::io::BufReader::new(bytes.as_slice());
        let next_cert = rustls_pemfile::certs(&mut reader).next();
        match next_cert {
            Some(Ok(cert)) => Ok(cert),
            Some(Err(err)) => Err(EndpointError::ParseCert(err.to_string())),
            None => Err(EndpointError::ParseCert(format!(
                "no certificate found in {value}"
            ))),
        }
    } else {
        Ok(CertificateDer::from(bytes))
    }
}

/// Load a private key from inline hex or a file, PEM or DER. PKCS#1, PKCS#8,
/// and SEC1 encodings are accepted.
pub(crate) fn read_key(value: &str) -> Result<PrivateKeyDer<'static>, EndpointError> {
    let bytes = read_material(value)?;
    if bytes.is_empty() {
        return Err(EndpointError::ParseKey("empty key material".into()));
    }
    if looks_pem(&bytes) {
        let mut reader = std::io::BufReader::new(bytes.as_slice());
        loop {
            match rustls_pemfile::read_one(&mut reader)
                .map_err(|err| EndpointError::ParseKey(err.to_string()))?
            {
                Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
                Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
                Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
                Some(_) => continue,
                None => {
                    return Err(EndpointError::ParseKey(format!(
                        "no private key found in {value}"
                    )))
                }
            }
        }
    } else {
        PrivateKeyDer::try_from(bytes).map_err(|err| EndpointError::ParseKey(err.to_string()))
    }
}

/// Hex first, filesystem path second.
fn read_material(value: &str) -> Result<Vec<u8>, EndpointError> {
    if let Ok(bytes) = hex::decode(value) {
        return Ok(bytes);
    }
    std::fs::read(value).map_err(|source| EndpointError::ReadMaterial {
        path: value.to_string(),
        source,
    })
}

fn looks_pem(bytes: &[u8]) -> bool {
    const MARKER: &[u8] = b"-----BEGIN";
    bytes.len() >= MARKER.len() && bytes.windows(MARKER.len()).any(|window| window == MARKER)
}

/// The server name a TLS client presents, derived from the seed address.
pub(crate) fn host_name(addr: &str) -> Result<ServerName<'static>, EndpointError> {
    ServerName::try_from(extract_host(addr))
        .map_err(|err| EndpointError::Tls(format!("invalid server name: {err}")))
}

fn extract_host(addr: &str) -> String {
    if let Some(stripped) = addr.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            return stripped[..end].to_string();
        }
    }
    match addr.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host.to_string(),
        _ => addr.to_string(),
    }
}

/// Certificate verifier that accepts any peer. Installed for clients that
/// did not ask for `verify`.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|provider| {
                provider
                    .signature_verification_algorithms
                    .supported_schemes()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_host_splits_port() {
        assert_eq!(extract_host("example.com:8443"), "example.com");
        assert_eq!(extract_host("127.13.37.1:8443"), "127.13.37.1");
    }

    #[test]
    fn extract_host_handles_bracketed_ipv6() {
        assert_eq!(extract_host("[::1]:8443"), "::1");
    }

    #[test]
    fn missing_material_path_fails() {
        assert!(matches!(
            read_cert("/noexist"),
            Err(EndpointError::ReadMaterial { .. })
        ));
        assert!(matches!(
            read_key("/noexist"),
            Err(EndpointError::ReadMaterial { .. })
        ));
    }
}

//! TLS endpoint: the TCP endpoint wrapped in TLS, with the certificate
//! matrix resolved at construction.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use patchcord_core::{Endpoint, EndpointCore, EndpointError, Seed};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::link::{normalize_addr, Driver, Link, Mode};
use crate::tls_config::{host_name, read_cert, read_key, TlsMaterial};
use crate::transport::{TlsStreamAcceptor, TlsStreamConnector};

/// `tls:` dials out with an optional client certificate and optional peer
/// verification; `tls-listen:` (alias `tls-l`) serves with a mandatory
/// certificate and key, optionally demanding client certificates with
/// `verify`. `ca`, `cert`, and `key` take a path or inline hex, PEM or DER.
pub struct TlsEndpoint {
    link: Link,
}

impl TlsEndpoint {
    /// Build from a raw seed string.
    pub fn from_seed(seed: &str) -> Result<Self, EndpointError> {
        Self::new(Seed::parse(seed))
    }

    pub(crate) fn new(mut seed: Seed) -> Result<Self, EndpointError> {
        let server = match seed.kind() {
            "tls" => false,
            "tls-l" | "tls-listen" => {
                seed.set_kind("tls-listen");
                true
            }
            other => return Err(EndpointError::UnsupportedSeed(other.to_string())),
        };

        let mut addr = String::new();
        let mut echo = false;
        let mut fork = false;
        let mut material = TlsMaterial::default();
        for (key, value) in seed.options() {
            match key {
                "addr" => addr = normalize_addr(value),
                "ca" => material.ca = Some(read_cert(value)?),
                "cert" => material.cert = Some(read_cert(value)?),
                "key" => material.key = Some(read_key(value)?),
                "verify" => material.verify = true,
                "echo" if server => echo = true,
                "fork" if server => fork = true,
                other => {
                    return Err(EndpointError::UnknownOption {
                        kind: seed.kind().to_string(),
                        key: other.to_string(),
                    })
                }
            }
        }
        if addr.is_empty() {
            return Err(EndpointError::MissingAddr(seed.kind().to_string()));
        }

        let driver = if server {
            let config = material.server_config()?;
            Driver::Server(Arc::new(TlsStreamAcceptor {
                acceptor: TlsAcceptor::from(Arc::new(config)),
            }))
        } else {
            let server_name = host_name(&addr)?;
            let config = material.client_config()?;
            Driver::Client(Arc::new(TlsStreamConnector {
                connector: TlsConnector::from(Arc::new(config)),
                server_name,
            }))
        };

        Ok(Self {
            link: Link::new(EndpointCore::new(seed), driver, addr, echo, fork),
        })
    }
}

#[async_trait]
impl Endpoint for TlsEndpoint {
    async fn up(&self) -> Result<(), EndpointError> {
        self.link.up().await
    }

    async fn down(&self) -> Result<(), EndpointError> {
        self.link.down().await
    }

    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.link.read(buf).await
    }

    async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.link.write(buf).await
    }

    fn is_up(&self) -> bool {
        self.link.core().is_up()
    }

    fn keep_alive(&self) -> bool {
        match self.link.mode() {
            Mode::Server => self.link.core().is_up(),
            Mode::Client => false,
        }
    }

    fn kind(&self) -> &str {
        self.link.core().kind()
    }
}

impl fmt::Display for TlsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.link.core().seed().fmt(f)
    }
}

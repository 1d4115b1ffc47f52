//! TCP endpoint: outgoing connections and listeners.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use patchcord_core::{Endpoint, EndpointCore, EndpointError, Seed};

use crate::link::{normalize_addr, Driver, Link, Mode};
use crate::transport::{PlainAcceptor, PlainConnector};

/// `tcp:` dials out and redials whenever the connection drops;
/// `tcp-listen:` (alias `tcp-l`) accepts, serially by default, concurrently
/// with `fork`, and optionally echoes with `echo`.
pub struct TcpEndpoint {
    link: Link,
}

impl TcpEndpoint {
    /// Build from a raw seed string.
    pub fn from_seed(seed: &str) -> Result<Self, EndpointError> {
        Self::new(Seed::parse(seed))
    }

    pub(crate) fn new(mut seed: Seed) -> Result<Self, EndpointError> {
        let driver = match seed.kind() {
            "tcp" => Driver::Client(Arc::new(PlainConnector)),
            "tcp-l" | "tcp-listen" => {
                seed.set_kind("tcp-listen");
                Driver::Server(Arc::new(PlainAcceptor))
            }
            other => return Err(EndpointError::UnsupportedSeed(other.to_string())),
        };
        let server = matches!(driver, Driver::Server(_));

        let mut addr = String::new();
        let mut echo = false;
        let mut fork = false;
        for (key, value) in seed.options() {
            match key {
                "addr" => addr = normalize_addr(value),
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

        Ok(Self {
            link: Link::new(EndpointCore::new(seed), driver, addr, echo, fork),
        })
    }
}

#[async_trait]
impl Endpoint for TcpEndpoint {
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

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.link.core().seed().fmt(f)
    }
}

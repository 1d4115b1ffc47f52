//! Connector/acceptor seams shared by the TCP and TLS endpoints.
//!
//! The link machinery in [`crate::link`] is transport-agnostic: a client-mode
//! endpoint supplies a [`Connector`], a server-mode endpoint supplies an
//! [`Acceptor`], and everything else (dial loop, accept loop, pipe pumps) is
//! identical between plain TCP and TLS.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Marker for streams the link machinery can relay.
pub(crate) trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkStream for T {}

pub(crate) type BoxStream = Box<dyn LinkStream>;

/// Dials the remote side for a client-mode endpoint.
#[async_trait]
pub(crate) trait Connector: Send + Sync + 'static {
    async fn connect(&self, addr: SocketAddr) -> io::Result<BoxStream>;
}

/// Wraps freshly accepted TCP connections for a server-mode endpoint.
#[async_trait]
pub(crate) trait Acceptor: Send + Sync + 'static {
    async fn accept(&self, tcp: TcpStream) -> io::Result<BoxStream>;
}

/// Plain TCP pass-through.
pub(crate) struct PlainConnector;

#[async_trait]
impl Connector for PlainConnector {
    async fn connect(&self, addr: SocketAddr) -> io::Result<BoxStream> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true)?;
        Ok(Box::new(tcp))
    }
}

pub(crate) struct PlainAcceptor;

#[async_trait]
impl Acceptor for PlainAcceptor {
    async fn accept(&self, tcp: TcpStream) -> io::Result<BoxStream> {
        Ok(Box::new(tcp))
    }
}

/// TLS-wrapped dialer carrying a prepared client config and the server name
/// derived from the seed address.
pub(crate) struct TlsStreamConnector {
    pub connector: TlsConnector,
    pub server_name: ServerName<'static>,
}

#[async_trait]
impl Connector for TlsStreamConnector {
    async fn connect(&self, addr: SocketAddr) -> io::Result<BoxStream> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true)?;
        let tls = self.connector.connect(self.server_name.clone(), tcp).await?;
        Ok(Box::new(tls))
    }
}

/// TLS-wrapping acceptor carrying a prepared server config.
pub(crate) struct TlsStreamAcceptor {
    pub acceptor: TlsAcceptor,
}

#[async_trait]
impl Acceptor for TlsStreamAcceptor {
    async fn accept(&self, tcp: TcpStream) -> io::Result<BoxStream> {
        let tls = self.acceptor.accept(tcp).await?;
        Ok(Box::new(tls))
    }
}

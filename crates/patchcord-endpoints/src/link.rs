//! Client/listener machinery shared by the TCP and TLS endpoints.
//!
//! A [`Link`] owns the lifecycle of one stream-oriented endpoint: the dial
//! loop in client mode, the accept loop in server mode, and the pipe pumps
//! wiring each established connection to the endpoint's byte-pipes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use patchcord_core::pipe::TransportEnds;
use patchcord_core::{EndpointCore, EndpointError};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{Acceptor, BoxStream, Connector};

/// Back-off between failed dials.
pub(crate) const DIAL_RETRY: Duration = Duration::from_secs(1);

/// Grace period during teardown in which transport pumps flush whatever the
/// egress pipe still buffers before the connection is dropped.
const DRAIN_GRACE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Client,
    Server,
}

/// What drives the transport: a dialer (client mode) or a connection
/// wrapper (server mode).
pub(crate) enum Driver {
    Client(Arc<dyn Connector>),
    Server(Arc<dyn Acceptor>),
}

pub(crate) struct Link {
    core: EndpointCore,
    driver: Driver,
    addr: String,
    echo: bool,
    fork: bool,
    /// True from `up()` until the first connection has both pumps wired.
    /// Readers and writers wait on this before touching the pipes.
    connecting: watch::Sender<bool>,
    /// Replaced on every `up()`; cancelling it is how `down()` reaches the
    /// transport tasks that own the sockets.
    token: StdMutex<CancellationToken>,
}

impl Link {
    pub(crate) fn new(
        core: EndpointCore,
        driver: Driver,
        addr: String,
        echo: bool,
        fork: bool,
    ) -> Self {
        let (connecting, _) = watch::channel(false);
        Self {
            core,
            driver,
            addr,
            echo,
            fork,
            connecting,
            token: StdMutex::new(CancellationToken::new()),
        }
    }

    pub(crate) fn core(&self) -> &EndpointCore {
        &self.core
    }

    pub(crate) fn mode(&self) -> Mode {
        match self.driver {
            Driver::Client(_) => Mode::Client,
            Driver::Server(_) => Mode::Server,
        }
    }

    /// Normalized dial/bind address.
    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) async fn up(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if self.core.is_up() {
            return Ok(());
        }

        let ends = self.core.open_pipes().await;
        let token = CancellationToken::new();
        *self.token.lock().expect("token lock poisoned") = token.clone();
        self.connecting.send_replace(true);
        self.core.set_up(true);

        let started = match &self.driver {
            Driver::Client(connector) => {
                self.start_client(Arc::clone(connector), ends, token).await
            }
            Driver::Server(acceptor) => self.start_server(Arc::clone(acceptor), ends, token).await,
        };

        if started.is_err() {
            self.core.set_up(false);
            self.connecting.send_replace(false);
            self.core.close_pipes().await;
        }
        started
    }

    pub(crate) async fn down(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if !self.core.is_up() {
            return Ok(());
        }

        self.connecting.send_replace(false);
        self.core.set_up(false);

        // Teardown ordering: release the egress half first so the pumps can
        // flush the buffered tail into the socket, then cancel the transport
        // tasks, then reclaim whatever is left of the pipes. The cancel is
        // what unblocks any still-parked read or write.
        self.core.start_close_pipes().await;
        sleep(DRAIN_GRACE).await;
        self.token.lock().expect("token lock poisoned").cancel();
        self.core.close_pipes().await;
        Ok(())
    }

    pub(crate) async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.wait_connected("read").await;
        if !self.core.is_up() {
            debug!(endpoint = %self.core.seed(), "read: not up");
            return Ok(0);
        }

        match self.core.read_pipe(buf).await {
            Ok(n) => {
                debug!(endpoint = %self.core.seed(), bytes = n, "read");
                if n > 0 && self.echo {
                    self.write(&buf[..n]).await?;
                }
                Ok(n)
            }
            // A listener outlives its clients: per-connection errors read as
            // end-of-stream so the accept loop keeps the endpoint serving.
            Err(err) => {
                if !self.core.is_up() || self.mode() == Mode::Server {
                    Ok(0)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub(crate) async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.wait_connected("write").await;
        if !self.core.is_up() {
            debug!(endpoint = %self.core.seed(), "write: not up");
            return Ok(0);
        }

        match self.core.write_pipe(buf).await {
            Ok(n) => {
                debug!(endpoint = %self.core.seed(), bytes = n, "write");
                Ok(n)
            }
            Err(err) => {
                if !self.core.is_up() {
                    Ok(0)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Block until the first connection is wired (or the endpoint is downed,
    /// which also clears the flag).
    async fn wait_connected(&self, op: &str) {
        let mut rx = self.connecting.subscribe();
        if *rx.borrow_and_update() {
            debug!(endpoint = %self.core.seed(), "{op}: still connecting");
            while *rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    async fn start_client(
        &self,
        connector: Arc<dyn Connector>,
        ends: TransportEnds,
        token: CancellationToken,
    ) -> Result<(), EndpointError> {
        let target = resolve(&self.addr).await?;
        let up = self.core.up_flag();
        let connecting = self.connecting.clone();
        let label = self.core.seed().to_string();

        tokio::spawn(async move {
            client_loop(connector, target, ends, token, up, connecting, label).await;
        });
        Ok(())
    }

    async fn start_server(
        &self,
        acceptor: Arc<dyn Acceptor>,
        ends: TransportEnds,
        token: CancellationToken,
    ) -> Result<(), EndpointError> {
        let bound = resolve(&self.addr).await?;
        let listener = TcpListener::bind(bound)
            .await
            .map_err(|source| EndpointError::Listen {
                addr: self.addr.clone(),
                source,
            })?;
        info!(endpoint = %self.core.seed(), addr = %bound, "listening");

        let up = self.core.up_flag();
        let connecting = self.connecting.clone();
        let fork = self.fork;
        let label = self.core.seed().to_string();

        tokio::spawn(async move {
            accept_loop(listener, acceptor, ends, token, up, connecting, fork, label).await;
        });
        Ok(())
    }
}

/// Dial, relay, and redial until the endpoint is downed.
async fn client_loop(
    connector: Arc<dyn Connector>,
    target: SocketAddr,
    ends: TransportEnds,
    token: CancellationToken,
    up: Arc<AtomicBool>,
    connecting: watch::Sender<bool>,
    label: String,
) {
    while up.load(Ordering::Acquire) {
        let dialed = tokio::select! {
            _ = token.cancelled() => return,
            dialed = connector.connect(target) => dialed,
        };
        let stream = match dialed {
            Ok(stream) => stream,
            Err(err) => {
                if up.load(Ordering::Acquire) {
                    warn!(endpoint = %label, error = %err, "connect failed");
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(DIAL_RETRY) => {}
                }
                continue;
            }
        };
        relay_connection(stream, &ends, &token, &connecting).await;
    }
}

/// Accept connections until the endpoint is downed. Without `fork` each
/// connection is served to completion before the next accept; with `fork`
/// every connection runs detached and concurrency is unbounded.
#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    acceptor: Arc<dyn Acceptor>,
    ends: TransportEnds,
    token: CancellationToken,
    up: Arc<AtomicBool>,
    connecting: watch::Sender<bool>,
    fork: bool,
    label: String,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        let (tcp, peer) = match accepted {
            Ok(conn) => conn,
            Err(err) => {
                if up.load(Ordering::Acquire) {
                    warn!(endpoint = %label, error = %err, "accept failed");
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(Duration::from_millis(1)) => {}
                }
                continue;
            }
        };

        info!("Connection from {peer}");

        let conn = serve_connection(
            Arc::clone(&acceptor),
            tcp,
            peer,
            ends.clone(),
            token.clone(),
            connecting.clone(),
            label.clone(),
        );
        if fork {
            tokio::spawn(conn);
        } else {
            conn.await;
        }
    }
}

/// Handshake one accepted connection and relay it. Handshake failures only
/// cost this connection.
async fn serve_connection(
    acceptor: Arc<dyn Acceptor>,
    tcp: TcpStream,
    peer: SocketAddr,
    ends: TransportEnds,
    token: CancellationToken,
    connecting: watch::Sender<bool>,
    label: String,
) {
    let stream = match acceptor.accept(tcp).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(endpoint = %label, peer = %peer, error = %err, "handshake failed");
            return;
        }
    };
    relay_connection(stream, &ends, &token, &connecting).await;
}

/// Run both pump directions for one established connection.
///
/// `connecting` is cleared only once both pumps are wired, which is the
/// happens-before edge readers and writers rely on. Returns when both pumps
/// finish or the endpoint is downed.
async fn relay_connection(
    stream: BoxStream,
    ends: &TransportEnds,
    token: &CancellationToken,
    connecting: &watch::Sender<bool>,
) {
    let (reader, writer) = tokio::io::split(stream);
    let inbound = ends.feed_from(reader);
    let outbound = ends.drain_into(writer);
    connecting.send_replace(false);

    tokio::select! {
        _ = token.cancelled() => {}
        _ = async {
            let _ = tokio::join!(inbound, outbound);
        } => {}
    }
}

/// Resolve an address, turning empty resolutions into errors.
pub(crate) async fn resolve(addr: &str) -> Result<SocketAddr, EndpointError> {
    let mut addrs = lookup_host(addr)
        .await
        .map_err(|source| EndpointError::Resolve {
            addr: addr.to_string(),
            source,
        })?;
    addrs.next().ok_or_else(|| EndpointError::Resolve {
        addr: addr.to_string(),
        source: std::io::Error::other("no addresses returned"),
    })
}

/// Prefix a bare port with the wildcard address.
pub(crate) fn normalize_addr(addr: &str) -> String {
    if addr.is_empty() || addr.contains(':') {
        addr.to_string()
    } else {
        format!("0.0.0.0:{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_addr;

    #[test]
    fn bare_port_gets_wildcard_ip() {
        assert_eq!(normalize_addr("1234"), "0.0.0.0:1234");
    }

    #[test]
    fn explicit_ip_is_untouched() {
        assert_eq!(normalize_addr("127.0.0.1:1234"), "127.0.0.1:1234");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize_addr(""), "");
    }
}

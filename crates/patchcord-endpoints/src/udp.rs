//! UDP endpoint: outgoing datagram socket or listener.
//!
//! Datagrams have no stream framing, so this endpoint talks to the socket
//! directly instead of going through the byte-pipes. A listener learns its
//! reply target from the most recent datagram's source address.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use patchcord_core::{Endpoint, EndpointCore, EndpointError, Seed};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::{normalize_addr, resolve, DIAL_RETRY};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Client,
    Server,
}

/// `udp:` sends to and receives from one remote address; `udp-listen:`
/// (alias `udp-l`) binds and replies to whichever peer spoke most recently.
/// UDP has no end-of-stream, so the endpoint only stops on `down()`.
pub struct UdpEndpoint {
    core: EndpointCore,
    mode: Mode,
    addr: String,
    /// Shared with the client-mode dial task, which fills it in once the
    /// socket is connected.
    socket: Arc<StdMutex<Option<Arc<UdpSocket>>>>,
    peer: StdMutex<Option<SocketAddr>>,
    /// Peers already greeted, so "Connection from" logs once per peer.
    seen: StdMutex<HashSet<SocketAddr>>,
    /// True from a client `up()` until the dial task has wired the socket.
    connecting: watch::Sender<bool>,
    token: StdMutex<CancellationToken>,
}

impl UdpEndpoint {
    /// Build from a raw seed string.
    pub fn from_seed(seed: &str) -> Result<Self, EndpointError> {
        Self::new(Seed::parse(seed))
    }

    pub(crate) fn new(mut seed: Seed) -> Result<Self, EndpointError> {
        let mode = match seed.kind() {
            "udp" => Mode::Client,
            "udp-l" | "udp-listen" => {
                seed.set_kind("udp-listen");
                Mode::Server
            }
            other => return Err(EndpointError::UnsupportedSeed(other.to_string())),
        };

        let mut addr = String::new();
        for (key, value) in seed.options() {
            match key {
                "addr" => addr = normalize_addr(value),
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

        let (connecting, _) = watch::channel(false);
        Ok(Self {
            core: EndpointCore::new(seed),
            mode,
            addr,
            socket: Arc::new(StdMutex::new(None)),
            peer: StdMutex::new(None),
            seen: StdMutex::new(HashSet::new()),
            connecting,
            token: StdMutex::new(CancellationToken::new()),
        })
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.lock().expect("socket lock poisoned").clone()
    }

    fn cancel_token(&self) -> CancellationToken {
        self.token.lock().expect("token lock poisoned").clone()
    }

    /// Block until the dial task has wired the socket (or the endpoint is
    /// downed, which also clears the flag). A no-op for listeners.
    async fn wait_connected(&self, op: &str) {
        let mut rx = self.connecting.subscribe();
        if *rx.borrow_and_update() {
            debug!(endpoint = %self, "{op}: still connecting");
            while *rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    async fn dial(target: SocketAddr) -> std::io::Result<UdpSocket> {
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;
        Ok(socket)
    }
}

/// Client-mode dial loop, run as a background task so `down()` can always
/// interrupt it. Each iteration re-checks liveness before trying again.
async fn dial_loop(
    target: SocketAddr,
    slot: Arc<StdMutex<Option<Arc<UdpSocket>>>>,
    token: CancellationToken,
    up: Arc<AtomicBool>,
    connecting: watch::Sender<bool>,
    label: String,
) {
    while up.load(Ordering::Acquire) {
        let dialed = tokio::select! {
            _ = token.cancelled() => return,
            dialed = UdpEndpoint::dial(target) => dialed,
        };
        match dialed {
            Ok(socket) => {
                *slot.lock().expect("socket lock poisoned") = Some(Arc::new(socket));
                connecting.send_replace(false);
                return;
            }
            Err(err) => {
                if up.load(Ordering::Acquire) {
                    warn!(endpoint = %label, error = %err, "connect failed");
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(DIAL_RETRY) => {}
                }
            }
        }
    }
}

#[async_trait]
impl Endpoint for UdpEndpoint {
    async fn up(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if self.core.is_up() {
            return Ok(());
        }

        let target = resolve(&self.addr).await?;
        let token = CancellationToken::new();
        *self.token.lock().expect("token lock poisoned") = token.clone();

        match self.mode {
            Mode::Client => {
                self.connecting.send_replace(true);
                self.core.set_up(true);

                let slot = Arc::clone(&self.socket);
                let up = self.core.up_flag();
                let connecting = self.connecting.clone();
                let label = self.core.seed().to_string();
                tokio::spawn(async move {
                    dial_loop(target, slot, token, up, connecting, label).await;
                });
            }
            Mode::Server => {
                let socket =
                    UdpSocket::bind(target)
                        .await
                        .map_err(|source| EndpointError::Listen {
                            addr: self.addr.clone(),
                            source,
                        })?;
                *self.socket.lock().expect("socket lock poisoned") = Some(Arc::new(socket));
                self.core.set_up(true);
            }
        }
        Ok(())
    }

    async fn down(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if !self.core.is_up() {
            return Ok(());
        }

        self.connecting.send_replace(false);
        self.core.set_up(false);
        self.token.lock().expect("token lock poisoned").cancel();
        self.socket.lock().expect("socket lock poisoned").take();
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.wait_connected("read").await;
        let socket = match self.socket() {
            Some(socket) if self.core.is_up() => socket,
            _ => {
                debug!(endpoint = %self, "read: not up");
                return Ok(0);
            }
        };
        let token = self.cancel_token();

        match self.mode {
            Mode::Server => {
                let received = tokio::select! {
                    _ = token.cancelled() => return Ok(0),
                    received = socket.recv_from(buf) => received,
                };
                match received {
                    Ok((n, peer)) => {
                        *self.peer.lock().expect("peer lock poisoned") = Some(peer);
                        if self.seen.lock().expect("seen lock poisoned").insert(peer) {
                            info!("Connection from {peer}");
                        }
                        debug!(endpoint = %self, bytes = n, "read");
                        Ok(n)
                    }
                    // Listeners shrug off per-datagram errors.
                    Err(_) => Ok(0),
                }
            }
            Mode::Client => {
                let received = tokio::select! {
                    _ = token.cancelled() => return Ok(0),
                    received = socket.recv(buf) => received,
                };
                match received {
                    Ok(n) => {
                        debug!(endpoint = %self, bytes = n, "read");
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
        }
    }

    async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.wait_connected("write").await;
        let socket = match self.socket() {
            Some(socket) if self.core.is_up() => socket,
            _ => {
                debug!(endpoint = %self, "write: not up");
                return Ok(0);
            }
        };

        match self.mode {
            Mode::Client => match socket.send(buf).await {
                Ok(n) => {
                    debug!(endpoint = %self, bytes = n, "write");
                    Ok(n)
                }
                Err(err) => {
                    if !self.core.is_up() {
                        Ok(0)
                    } else {
                        Err(err)
                    }
                }
            },
            Mode::Server => {
                let peer = *self.peer.lock().expect("peer lock poisoned");
                match peer {
                    // No one has spoken yet; nowhere to reply.
                    None => {
                        debug!(endpoint = %self, "write: no client connection");
                        Ok(buf.len())
                    }
                    Some(peer) => {
                        let n = socket.send_to(buf, peer).await?;
                        debug!(endpoint = %self, bytes = n, "write");
                        Ok(n)
                    }
                }
            }
        }
    }

    fn is_up(&self) -> bool {
        self.core.is_up()
    }

    fn keep_alive(&self) -> bool {
        self.core.is_up()
    }

    fn kind(&self) -> &str {
        self.core.kind()
    }
}

impl fmt::Display for UdpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.seed().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_collapses_to_canonical_kind() {
        let endpoint = UdpEndpoint::from_seed("udp-l:5353").unwrap();
        assert_eq!(endpoint.kind(), "udp-listen");
    }

    #[test]
    fn bare_port_defaults_to_wildcard_address() {
        let endpoint = UdpEndpoint::from_seed("udp:5353").unwrap();
        assert_eq!(endpoint.addr, "0.0.0.0:5353");
    }

    #[test]
    fn options_are_rejected() {
        assert!(matches!(
            UdpEndpoint::from_seed("udp:5353,asdf"),
            Err(EndpointError::UnknownOption { .. })
        ));
        assert!(matches!(
            UdpEndpoint::from_seed("udp-l:5353,fork"),
            Err(EndpointError::UnknownOption { .. })
        ));
    }

    #[tokio::test]
    async fn server_write_discards_until_a_peer_is_seen() {
        let endpoint = UdpEndpoint::from_seed("udp-l:127.13.37.1:5311").unwrap();
        endpoint.up().await.unwrap();
        assert_eq!(endpoint.write(b"nobody").await.unwrap(), 6);
        endpoint.down().await.unwrap();
    }

    #[tokio::test]
    async fn resolution_failure_surfaces_at_up() {
        let endpoint = UdpEndpoint::from_seed("udp:doesnotexist.invalid:4444").unwrap();
        assert!(matches!(
            endpoint.up().await,
            Err(EndpointError::Resolve { .. })
        ));
        endpoint.down().await.unwrap();
    }

    #[tokio::test]
    async fn client_dials_in_the_background() {
        let endpoint = UdpEndpoint::from_seed("udp:127.13.37.1:5313").unwrap();
        endpoint.up().await.unwrap();
        assert!(endpoint.is_up());

        // The write waits on the readiness signal until the dial task has
        // wired the socket.
        assert_eq!(endpoint.write(b"hello").await.unwrap(), 5);

        endpoint.down().await.unwrap();
        assert!(!endpoint.is_up());
        assert_eq!(endpoint.write(b"gone").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lifecycle_is_idempotent() {
        let endpoint = UdpEndpoint::from_seed("udp-l:127.13.37.1:5312").unwrap();
        endpoint.up().await.unwrap();
        endpoint.up().await.unwrap();
        assert!(endpoint.keep_alive());

        endpoint.down().await.unwrap();
        endpoint.down().await.unwrap();
        assert!(!endpoint.keep_alive());

        let mut buf = [0u8; 4];
        assert_eq!(endpoint.read(&mut buf).await.unwrap(), 0);
        assert_eq!(endpoint.write(b"x").await.unwrap(), 0);
    }
}

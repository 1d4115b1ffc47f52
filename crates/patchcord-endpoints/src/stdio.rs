//! Stdio endpoint: bridges process stdin/stdout to the byte-pipes.

use std::fmt;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use patchcord_core::{Endpoint, EndpointCore, EndpointError, Seed};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Takes no address and no options. `up()` spawns two pumps, stdin into the
/// ingress pipe and the egress pipe onto stdout; stdio never terminates on
/// its own, so it keeps the pairing alive while up.
pub struct StdioEndpoint {
    core: EndpointCore,
    token: StdMutex<CancellationToken>,
}

impl StdioEndpoint {
    /// Build from a raw seed string.
    pub fn from_seed(seed: &str) -> Result<Self, EndpointError> {
        Self::new(Seed::parse(seed))
    }

    pub(crate) fn new(mut seed: Seed) -> Result<Self, EndpointError> {
        match seed.kind() {
            "-" | "stdin" | "stdio" | "stdout" => seed.set_kind("stdio"),
            other => return Err(EndpointError::UnsupportedSeed(other.to_string())),
        }

        for (key, _) in seed.options() {
            if key != "addr" {
                return Err(EndpointError::UnknownOption {
                    kind: seed.kind().to_string(),
                    key: key.to_string(),
                });
            }
        }
        if !seed.addr().is_empty() {
            return Err(EndpointError::UnexpectedAddr(seed.kind().to_string()));
        }

        Ok(Self {
            core: EndpointCore::new(seed),
            token: StdMutex::new(CancellationToken::new()),
        })
    }
}

#[async_trait]
impl Endpoint for StdioEndpoint {
    async fn up(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if self.core.is_up() {
            return Ok(());
        }

        let ends = self.core.open_pipes().await;
        let token = CancellationToken::new();
        *self.token.lock().expect("token lock poisoned") = token.clone();

        let inbound = ends.clone();
        let inbound_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inbound_token.cancelled() => {}
                _ = inbound.feed_from(tokio::io::stdin()) => {}
            }
        });

        let outbound = ends;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = outbound.drain_into(tokio::io::stdout()) => {}
            }
        });

        self.core.set_up(true);
        info!("opened stdio");
        Ok(())
    }

    async fn down(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if !self.core.is_up() {
            return Ok(());
        }

        self.core.set_up(false);
        // Let the stdout pump flush the egress tail before it is cancelled.
        self.core.start_close_pipes().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.token.lock().expect("token lock poisoned").cancel();
        self.core.close_pipes().await;
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.core.is_up() {
            debug!(endpoint = %self, "read: not up");
            return Ok(0);
        }
        match self.core.read_pipe(buf).await {
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

    async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.core.is_up() {
            debug!(endpoint = %self, "write: not up");
            return Ok(0);
        }
        match self.core.write_pipe(buf).await {
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

impl fmt::Display for StdioEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.seed().fmt(f)
    }
}

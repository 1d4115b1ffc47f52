//! State shared by every endpoint variant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::pipe::{PipePair, TransportEnds};
use crate::seed::Seed;

/// The base every endpoint composes: the parsed seed, the readiness flag,
/// the lifecycle lock serializing `up`/`down`, and the byte-pipes.
///
/// Variants that talk to the transport directly (file, udp) simply never
/// open the pipes.
pub struct EndpointCore {
    seed: Seed,
    up: Arc<AtomicBool>,
    lifecycle: Mutex<()>,
    pipes: PipePair,
}

impl EndpointCore {
    pub fn new(seed: Seed) -> Self {
        Self {
            seed,
            up: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(()),
            pipes: PipePair::new(),
        }
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    /// Canonical type token.
    pub fn kind(&self) -> &str {
        self.seed.kind()
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Release);
    }

    /// Shared handle to the readiness flag for transport tasks.
    pub fn up_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.up)
    }

    /// Acquire the lifecycle lock. Held for the whole of `up()`/`down()` so
    /// no two transitions overlap.
    pub async fn begin(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// (Re)create the byte-pipes, handing back the transport-facing ends.
    pub async fn open_pipes(&self) -> TransportEnds {
        self.pipes.open().await
    }

    /// Graceful half of teardown: see [`PipePair::start_close`].
    pub async fn start_close_pipes(&self) {
        self.pipes.start_close().await;
    }

    /// Forced half of teardown: drop whatever remains of both pipes.
    pub async fn close_pipes(&self) {
        self.pipes.close().await;
    }

    pub async fn read_pipe(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.pipes.read(buf).await
    }

    pub async fn write_pipe(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.pipes.write(buf).await
    }
}

//! In-memory byte-pipes decoupling transport I/O from the pairing engine.
//!
//! Each pipe-backed endpoint owns two single-producer single-consumer pipes:
//! `ingress` (transport task writes, `Endpoint::read` drains) and `egress`
//! (`Endpoint::write` feeds, transport task drains). Dropping either half of
//! a pipe makes the opposite half observe end-of-stream, which is the only
//! teardown signal the pumps need.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, SimplexStream, WriteHalf,
};
use tokio::sync::Mutex;

/// Buffered capacity of one internal pipe.
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Chunk size used by the pipe pumps and the pairing engine.
pub const COPY_BUF_SIZE: usize = 32 * 1024;

/// How long a teardown waits for an in-flight writer before leaving the
/// egress half to be reclaimed by the forced close.
const CLOSE_LOCK_WAIT: Duration = Duration::from_millis(10);

/// The endpoint-facing halves of both pipes.
///
/// Halves sit behind async mutexes because `Endpoint::read`/`write` take
/// `&self` while the underlying halves need exclusive access. `None` means
/// the pipe is closed; reads and writes then report end-of-stream.
#[derive(Default)]
pub struct PipePair {
    ingress: Mutex<Option<ReadHalf<SimplexStream>>>,
    egress: Mutex<Option<WriteHalf<SimplexStream>>>,
}

impl PipePair {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)create both pipes, returning the transport-facing ends.
    pub async fn open(&self) -> TransportEnds {
        let (ingress_read, ingress_write) = tokio::io::simplex(PIPE_CAPACITY);
        let (egress_read, egress_write) = tokio::io::simplex(PIPE_CAPACITY);
        *self.ingress.lock().await = Some(ingress_read);
        *self.egress.lock().await = Some(egress_write);
        TransportEnds {
            feed: Arc::new(Mutex::new(ingress_write)),
            drain: Arc::new(Mutex::new(egress_read)),
        }
    }

    /// Drop the egress half so transport pumps observe end-of-stream and can
    /// flush whatever the pipe still buffers. Skipped when a writer is
    /// mid-write; the forced [`close`](Self::close) reclaims it later.
    pub async fn start_close(&self) {
        if let Ok(mut guard) = tokio::time::timeout(CLOSE_LOCK_WAIT, self.egress.lock()).await {
            guard.take();
        }
    }

    /// Drop both endpoint-facing halves. Blocks until in-flight operations
    /// release their half, which the caller bounds by closing the transport
    /// first.
    pub async fn close(&self) {
        self.ingress.lock().await.take();
        self.egress.lock().await.take();
    }

    /// Read relayed bytes out of the ingress pipe. `Ok(0)` once the pipe is
    /// closed or the transport side hung up.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.ingress.lock().await.as_mut() {
            Some(reader) => reader.read(buf).await,
            None => Ok(0),
        }
    }

    /// Push bytes into the egress pipe. `Ok(0)` once the pipe is closed.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        match self.egress.lock().await.as_mut() {
            Some(writer) => {
                writer.write_all(buf).await?;
                Ok(buf.len())
            }
            None => Ok(0),
        }
    }
}

/// The transport-facing ends of an endpoint's pipes.
///
/// Cloned into every transport task; a forking listener shares one set across
/// all accepted connections, interleaving at chunk granularity.
#[derive(Clone)]
pub struct TransportEnds {
    feed: Arc<Mutex<WriteHalf<SimplexStream>>>,
    drain: Arc<Mutex<ReadHalf<SimplexStream>>>,
}

impl TransportEnds {
    /// Pump `src` into the ingress pipe until end-of-stream or error.
    pub async fn feed_from<R>(&self, mut src: R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut total = 0u64;
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.feed.lock().await.write_all(&buf[..n]).await?;
            total += n as u64;
        }
    }

    /// Pump the egress pipe into `dst` until the pipe closes or error.
    pub async fn drain_into<W>(&self, mut dst: W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut total = 0u64;
        loop {
            let n = self.drain.lock().await.read(&mut buf).await?;
            if n == 0 {
                dst.flush().await?;
                return Ok(total);
            }
            dst.write_all(&buf[..n]).await?;
            total += n as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ingress_carries_bytes_to_reader() {
        let pipes = PipePair::new();
        let ends = pipes.open().await;

        ends.feed_from(&b"hello"[..]).await.unwrap();

        let mut buf = [0u8; 16];
        let n = pipes.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn egress_carries_bytes_to_transport() {
        let pipes = PipePair::new();
        let ends = pipes.open().await;

        assert_eq!(pipes.write(b"world").await.unwrap(), 5);
        pipes.close().await;

        let (mut near, far) = tokio::io::duplex(64);
        ends.drain_into(far).await.unwrap();

        let mut buf = [0u8; 16];
        let n = near.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"world");
    }

    #[tokio::test]
    async fn closed_pipes_report_end_of_stream() {
        let pipes = PipePair::new();
        let _ends = pipes.open().await;
        pipes.close().await;

        let mut buf = [0u8; 4];
        assert_eq!(pipes.read(&mut buf).await.unwrap(), 0);
        assert_eq!(pipes.write(b"gone").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropping_transport_feed_unblocks_reader() {
        let pipes = PipePair::new();
        let ends = pipes.open().await;
        drop(ends);

        let mut buf = [0u8; 4];
        assert_eq!(pipes.read(&mut buf).await.unwrap(), 0);
    }
}

//! The endpoint contract.

use std::fmt;

use async_trait::async_trait;

use crate::error::EndpointError;

/// One seed-built endpoint of a bridge.
///
/// Implementations must be thread-safe: the pairing engine drives both
/// directions concurrently and shares the endpoint across tasks.
///
/// `read` and `write` follow the usual convention that `Ok(0)` means
/// end-of-stream; after [`down`](Endpoint::down) both return `Ok(0)`.
#[async_trait]
pub trait Endpoint: fmt::Display + Send + Sync {
    /// Start the endpoint. Idempotent while already up.
    async fn up(&self) -> Result<(), EndpointError>;

    /// Stop the endpoint, closing the transport and the pipes. Idempotent
    /// while already down; a no-op after a failed `up`.
    async fn down(&self) -> Result<(), EndpointError>;

    /// Read relayed bytes into `buf`.
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write `buf` toward the transport. Returns the full length on success.
    async fn write(&self, buf: &[u8]) -> std::io::Result<usize>;

    /// Whether the endpoint is between a successful `up` and a `down`.
    fn is_up(&self) -> bool;

    /// Whether the pairing engine should keep streaming from this endpoint
    /// after an end-of-stream (listeners, stdio, and file sinks say yes).
    fn keep_alive(&self) -> bool;

    /// Canonical seed type token.
    fn kind(&self) -> &str;

    /// Alias for [`up`](Endpoint::up).
    async fn open(&self) -> Result<(), EndpointError> {
        self.up().await
    }

    /// Alias for [`down`](Endpoint::down).
    async fn close(&self) -> Result<(), EndpointError> {
        self.down().await
    }
}

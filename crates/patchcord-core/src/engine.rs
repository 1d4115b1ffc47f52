//! The pairing engine: bidirectional bridging of two endpoints.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::endpoint::Endpoint;
use crate::error::EndpointError;
use crate::pipe::COPY_BUF_SIZE;

/// Settle time between an endpoint coming up or a direction finishing and
/// the next lifecycle action.
const SETTLE: Duration = Duration::from_millis(1);

/// Back-off before restarting an interrupted copy.
const RESTART: Duration = Duration::from_secs(1);

/// Bridge two endpoints until both directions finish.
///
/// Brings both up (first failure propagates), then runs `a → b` and `b → a`
/// concurrently. When one direction ends, the destination of that direction
/// is torn down, which closes the opposite direction's source within a
/// bounded interval and produces a symmetric shutdown.
pub async fn pair(a: Arc<dyn Endpoint>, b: Arc<dyn Endpoint>) -> Result<(), EndpointError> {
    a.up().await?;
    b.up().await?;

    let forward = {
        let (src, dst) = (Arc::clone(&a), Arc::clone(&b));
        tokio::spawn(async move {
            relay(src.as_ref(), dst.as_ref()).await;
            sleep(SETTLE).await;
            let _ = dst.down().await;
        })
    };
    let backward = {
        let (src, dst) = (Arc::clone(&b), Arc::clone(&a));
        tokio::spawn(async move {
            relay(src.as_ref(), dst.as_ref()).await;
            sleep(SETTLE).await;
            let _ = dst.down().await;
        })
    };

    let _ = forward.await;
    let _ = backward.await;
    Ok(())
}

/// One-directional variant: bring both up and run `a → b` to completion.
/// Neither endpoint is torn down.
pub async fn stream(a: Arc<dyn Endpoint>, b: Arc<dyn Endpoint>) -> Result<(), EndpointError> {
    a.up().await?;
    b.up().await?;
    relay(a.as_ref(), b.as_ref()).await;
    Ok(())
}

/// Copy from `src` to `dst`, honoring `src`'s keep-alive policy.
///
/// The restart loop is what lets a forking listener serve subsequent clients
/// through the same pairing.
async fn relay(src: &dyn Endpoint, dst: &dyn Endpoint) {
    while !(src.is_up() && dst.is_up()) {
        sleep(SETTLE).await;
    }
    sleep(SETTLE).await;

    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let result = copy_once(src, dst, &mut buf).await;
        if !src.keep_alive() {
            return;
        }
        if let Err(err) = result {
            warn!(source = %src, sink = %dst, error = %err, "stream interrupted");
        }
        sleep(RESTART).await;
    }
}

/// Copy until either side reports end-of-stream or an error.
async fn copy_once(
    src: &dyn Endpoint,
    dst: &dyn Endpoint,
    buf: &mut [u8],
) -> std::io::Result<u64> {
    let mut total = 0u64;
    loop {
        let n = src.read(buf).await?;
        if n == 0 {
            return Ok(total);
        }
        let written = dst.write(&buf[..n]).await?;
        if written == 0 {
            return Ok(total);
        }
        total += n as u64;
    }
}

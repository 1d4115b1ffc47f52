//! Concrete endpoints for patchcord: file, stdio, TCP, TLS, and UDP.
//!
//! Every endpoint is built from a seed string of the form
//! `TYPE[:ADDR[,OPT(,OPT)*]]`; see [`from_seed`] for the dispatch table.
//! All variants implement [`patchcord_core::Endpoint`], so any two of them
//! can be bridged with [`patchcord_core::pair`].

mod file;
mod link;
mod stdio;
mod tcp;
mod tls;
mod tls_config;
mod transport;
mod udp;

pub use file::FileEndpoint;
pub use stdio::StdioEndpoint;
pub use tcp::TcpEndpoint;
pub use tls::TlsEndpoint;
pub use udp::UdpEndpoint;

use std::sync::Arc;

use patchcord_core::{Endpoint, EndpointError, Seed};

/// Build an endpoint from a seed string.
///
/// Recognized type tokens and their aliases:
///
/// | Canonical    | Aliases                  |
/// |--------------|--------------------------|
/// | `file`       |                          |
/// | `stdio`      | `-`, `stdin`, `stdout`   |
/// | `tcp`        |                          |
/// | `tcp-listen` | `tcp-l`                  |
/// | `tls`        |                          |
/// | `tls-listen` | `tls-l`                  |
/// | `udp`        |                          |
/// | `udp-listen` | `udp-l`                  |
pub fn from_seed(seed: &str) -> Result<Arc<dyn Endpoint>, EndpointError> {
    let parsed = Seed::parse(seed);
    match parsed.kind() {
        "file" => Ok(Arc::new(FileEndpoint::new(parsed)?)),
        "-" | "stdin" | "stdio" | "stdout" => Ok(Arc::new(StdioEndpoint::new(parsed)?)),
        "tcp" | "tcp-l" | "tcp-listen" => Ok(Arc::new(TcpEndpoint::new(parsed)?)),
        "tls" | "tls-l" | "tls-listen" => Ok(Arc::new(TlsEndpoint::new(parsed)?)),
        "udp" | "udp-l" | "udp-listen" => Ok(Arc::new(UdpEndpoint::new(parsed)?)),
        other => Err(EndpointError::UnsupportedSeed(other.to_string())),
    }
}

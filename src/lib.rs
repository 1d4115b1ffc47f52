//! # patchcord
//!
//! A socat-like bidirectional byte-stream bridge. Two seed strings name two
//! endpoints (a file, stdio, a TCP/UDP client or listener, or a TLS client
//! or listener); patchcord instantiates both and relays bytes in both
//! directions until one side terminates.
//!
//! ## Crates
//!
//! - [`patchcord_core`] - The endpoint contract, seed parsing, byte-pipes,
//!   and the pairing engine
//! - [`patchcord_endpoints`] - The file, stdio, TCP, TLS, and UDP endpoints

pub use patchcord_core as core;
pub use patchcord_endpoints as endpoints;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use patchcord_core::{pair, stream, Endpoint, EndpointError, Seed, VERSION};
    pub use patchcord_endpoints::from_seed;
}

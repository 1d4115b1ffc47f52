//! Core types for patchcord: the endpoint contract, seed parsing, the
//! internal byte-pipes, and the bidirectional pairing engine.
//!
//! This crate knows nothing about files or sockets. Concrete endpoints live
//! in `patchcord-endpoints` and compose [`EndpointCore`] for the state every
//! variant shares.

pub mod base;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod pipe;
pub mod seed;

pub use base::EndpointCore;
pub use endpoint::Endpoint;
pub use engine::{pair, stream};
pub use error::EndpointError;
pub use seed::Seed;

/// Package version, surfaced by the CLI's `-V` flag.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

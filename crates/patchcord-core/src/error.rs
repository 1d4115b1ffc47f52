//! Error types shared by all endpoint crates.

use thiserror::Error;

/// Errors raised while constructing or operating an endpoint.
///
/// Construction errors (bad seed, unknown option, missing material) are
/// final. Steady-state transport errors never surface here; they are logged
/// and retried by the endpoint that owns the transport.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The seed's type token matches no known endpoint.
    #[error("unsupported seed type: {0}")]
    UnsupportedSeed(String),

    /// An option key the endpoint does not recognize.
    #[error("unknown {kind} option {key}")]
    UnknownOption { kind: String, key: String },

    /// A mode value outside the endpoint's accepted set.
    #[error("unknown {kind} mode {mode}")]
    UnknownMode { kind: String, mode: String },

    /// A network seed without an address.
    #[error("no {0} addr provided")]
    MissingAddr(String),

    /// A file seed without a path.
    #[error("no {0} name provided")]
    MissingName(String),

    /// An address on a seed type that takes none.
    #[error("{0} does not need address")]
    UnexpectedAddr(String),

    #[error("no cert provided")]
    MissingCert,

    #[error("no key provided")]
    MissingKey,

    #[error("no ca provided")]
    MissingCa,

    /// Certificate material that is neither inline hex nor a readable file.
    #[error("failed to read {path}: {source}")]
    ReadMaterial {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse cert: {0}")]
    ParseCert(String),

    #[error("failed to parse key: {0}")]
    ParseKey(String),

    #[error("tls: {0}")]
    Tls(String),

    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

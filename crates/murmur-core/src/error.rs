//! Error types for the protocol engine.
//!
//! Per-message failures (codec, crypto) are non-fatal inside the receive
//! loop: the offending datagram is dropped and the loop continues. They
//! surface as errors only on the active send path, where the caller
//! initiated the operation.

use thiserror::Error;

/// Errors from engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport failure (fatal to the affected loop only)
    #[error("transport error: {0}")]
    Transport(#[from] murmur_transport::TransportError),

    /// Cryptographic failure (drop the message, continue)
    #[error("crypto error: {0}")]
    Crypto(#[from] murmur_crypto::CryptoError),

    /// Structural decode/encode failure (drop the message, continue)
    #[error("codec error: {0}")]
    Codec(#[from] crate::envelope::CodecError),

    /// Username failed validation
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// `start` was called on an engine that is already running
    #[error("engine is already running")]
    AlreadyRunning,
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

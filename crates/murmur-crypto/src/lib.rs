//! # MURMUR Crypto
//!
//! Cryptographic primitives for the MURMUR group-chat protocol.
//!
//! This crate provides:
//! - `XChaCha20-Poly1305` AEAD encryption under a pre-shared group key
//! - Ed25519 signatures for per-peer message authenticity
//! - [`GroupCrypto`], the provider consumed by the protocol engine
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | AEAD | XChaCha20-Poly1305 | 256-bit key |
//! | Signatures | Ed25519 | 128-bit |
//!
//! The group key is symmetric and shared by every participant out of band;
//! it gates membership of the multicast group. Signatures bind individual
//! messages to individual peers on top of that shared secret.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod group;
pub mod signatures;

pub use error::CryptoError;
pub use group::{GroupCrypto, Sealed};

/// XChaCha20-Poly1305 key size
pub const AEAD_KEY_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce size
pub const AEAD_NONCE_SIZE: usize = 24;

/// Ed25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = 64;

//! # MURMUR Core
//!
//! Core protocol implementation for MURMUR, a decentralized serverless
//! group chat over UDP multicast.
//!
//! This crate provides:
//! - Envelope encoding/decoding for the wire protocol
//! - The peer directory mapping usernames to verified public keys
//! - The protocol engine: receive dispatch, periodic discovery
//!   announcements, the chat send path, and graceful shutdown
//!
//! There is no central coordinator and no delivery guarantee. Peer
//! presence is a soft fact inferred from the most recent JOIN/LEAVE seen;
//! the periodic JOIN rebroadcast is the only loss-recovery mechanism.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod event;
pub mod identity;

pub use directory::PeerDirectory;
pub use engine::{Engine, EngineConfig};
pub use envelope::{CodecError, Envelope, MessageType};
pub use error::{EngineError, Result};
pub use event::ChatEvent;
pub use identity::Username;

/// Wire format version carried in every envelope
pub const WIRE_VERSION: u8 = 1;

/// Default receive buffer size for inbound datagrams
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 2048;

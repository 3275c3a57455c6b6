//! Events surfaced by the protocol engine.
//!
//! The engine never touches the console; it emits these over an mpsc
//! channel and the frontend decides how to render them.

/// Something the engine wants displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A verified chat line from a known peer
    Message {
        /// Peer that signed the line
        sender: String,
        /// Message text, without the sender prefix
        text: String,
    },
    /// A new peer was added to the directory
    PeerJoined(String),
    /// A known peer announced its departure
    PeerLeft(String),
}

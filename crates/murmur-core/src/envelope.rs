//! Envelope encoding and decoding for the MURMUR wire protocol.
//!
//! Every datagram is one envelope: a version byte, a type byte, and four
//! length-prefixed byte fields whose meaning depends on the type. Unused
//! fields are present but empty, keeping the shape fixed across types.
//! All multi-byte values are big-endian (network byte order).
//!
//! Wire layout:
//!
//! ```text
//! [version: u8][type: u8]
//! [body_len: u16][body...]
//! [nonce_len: u16][nonce...]
//! [auth_len: u16][auth...]
//! [auth_nonce_len: u16][auth_nonce...]
//! ```
//!
//! Only structural validation happens here; whether a field decrypts or a
//! signature verifies is the engine's concern.

use crate::WIRE_VERSION;
use thiserror::Error;

/// Envelope codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Datagram ended before the expected structure was complete
    #[error("truncated envelope: expected at least {expected} more bytes, got {actual}")]
    Truncated {
        /// Bytes still required
        expected: usize,
        /// Bytes remaining
        actual: usize,
    },

    /// Version byte does not match [`WIRE_VERSION`]
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// Type byte is not a known message type
    #[error("unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    /// Bytes remained after the last field
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),

    /// A field exceeds the u16 length prefix
    #[error("field of {0} bytes exceeds wire limit")]
    FieldTooLong(usize),
}

/// Message types carried in the envelope type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Identity announcement: encrypted username + encrypted public key
    Join = 0x01,
    /// Signed, encrypted chat line
    Chat = 0x02,
    /// Unsigned, unencrypted departure notice
    Leave = 0x03,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Join),
            0x02 => Ok(Self::Chat),
            0x03 => Ok(Self::Leave),
            _ => Err(CodecError::UnknownMessageType(value)),
        }
    }
}

/// The fixed-shape wire message.
///
/// Field roles by type:
///
/// | type  | body                | nonce      | auth                 | auth_nonce |
/// |-------|---------------------|------------|----------------------|------------|
/// | JOIN  | encrypted username  | body nonce | encrypted public key | key nonce  |
/// | CHAT  | encrypted chat line | body nonce | signature            | (empty)    |
/// | LEAVE | plaintext username  | (empty)    | (empty)              | (empty)    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Message type tag
    pub message_type: MessageType,
    /// Primary payload (see table above)
    pub body: Vec<u8>,
    /// Nonce for the primary payload
    pub nonce: Vec<u8>,
    /// Signature or encrypted key material
    pub auth: Vec<u8>,
    /// Nonce for the auth field when it carries key material
    pub auth_nonce: Vec<u8>,
}

impl Envelope {
    /// Build a JOIN envelope from sealed username and key material
    #[must_use]
    pub fn join(body: Vec<u8>, nonce: Vec<u8>, auth: Vec<u8>, auth_nonce: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::Join,
            body,
            nonce,
            auth,
            auth_nonce,
        }
    }

    /// Build a CHAT envelope; a missing signature encodes as the empty
    /// placeholder and will fail verification at the receiver
    #[must_use]
    pub fn chat(body: Vec<u8>, nonce: Vec<u8>, signature: Option<Vec<u8>>) -> Self {
        Self {
            message_type: MessageType::Chat,
            body,
            nonce,
            auth: signature.unwrap_or_default(),
            auth_nonce: Vec::new(),
        }
    }

    /// Build a LEAVE envelope naming a peer in plaintext
    #[must_use]
    pub fn leave(username: &str) -> Self {
        Self {
            message_type: MessageType::Leave,
            body: username.as_bytes().to_vec(),
            nonce: Vec::new(),
            auth: Vec::new(),
            auth_nonce: Vec::new(),
        }
    }

    /// Encode the envelope into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FieldTooLong`] if any field exceeds the u16
    /// length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let fields = [&self.body, &self.nonce, &self.auth, &self.auth_nonce];
        for field in fields {
            if field.len() > usize::from(u16::MAX) {
                return Err(CodecError::FieldTooLong(field.len()));
            }
        }

        let total = 2 + fields.iter().map(|f| 2 + f.len()).sum::<usize>();
        let mut out = Vec::with_capacity(total);
        out.push(WIRE_VERSION);
        out.push(self.message_type as u8);
        for field in fields {
            out.extend_from_slice(&(field.len() as u16).to_be_bytes());
            out.extend_from_slice(field);
        }
        Ok(out)
    }

    /// Decode an envelope from wire bytes; exact inverse of [`encode`].
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] on truncation, bad version, unknown type,
    /// or trailing bytes. Never panics on arbitrary input.
    ///
    /// [`encode`]: Self::encode
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < 2 {
            return Err(CodecError::Truncated {
                expected: 2,
                actual: data.len(),
            });
        }
        if data[0] != WIRE_VERSION {
            return Err(CodecError::UnsupportedVersion(data[0]));
        }
        let message_type = MessageType::try_from(data[1])?;

        let mut rest = &data[2..];
        let mut fields = [const { Vec::new() }; 4];
        for field in &mut fields {
            *field = take_field(&mut rest)?;
        }
        if !rest.is_empty() {
            return Err(CodecError::TrailingBytes(rest.len()));
        }

        let [body, nonce, auth, auth_nonce] = fields;
        Ok(Self {
            message_type,
            body,
            nonce,
            auth,
            auth_nonce,
        })
    }
}

fn take_field(rest: &mut &[u8]) -> Result<Vec<u8>, CodecError> {
    if rest.len() < 2 {
        return Err(CodecError::Truncated {
            expected: 2,
            actual: rest.len(),
        });
    }
    let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
    let after_len = &rest[2..];
    if after_len.len() < len {
        return Err(CodecError::Truncated {
            expected: len,
            actual: after_len.len(),
        });
    }
    let (field, remaining) = after_len.split_at(len);
    *rest = remaining;
    Ok(field.to_vec())
}

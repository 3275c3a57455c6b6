//! Local identity: the validated username this process chats under.
//!
//! The signing keypair half of the identity lives in
//! [`murmur_crypto::GroupCrypto`]; both are fixed at startup for the
//! lifetime of the process.

use crate::error::EngineError;

/// A validated chat username.
///
/// Trimmed and non-empty, and may not contain `':'` because the sender
/// prefix on the wire is colon-delimited (`"<sender>: <text>"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Validate and construct a username.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidUsername`] if the trimmed input is
    /// empty or contains a colon.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidUsername(
                "username cannot be empty".into(),
            ));
        }
        if trimmed.contains(':') {
            return Err(EngineError::InvalidUsername(
                "username cannot contain ':'".into(),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// The username as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

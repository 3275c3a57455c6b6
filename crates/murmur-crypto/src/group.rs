//! The crypto provider consumed by the protocol engine.
//!
//! [`GroupCrypto`] bundles the pre-shared group AEAD key with the local
//! peer's Ed25519 signing key behind the small surface the engine needs:
//! seal outgoing payloads (optionally signed), open incoming ones, verify
//! peer signatures, and expose the local public key for announcement.

use crate::aead::{AeadKey, Nonce};
use crate::error::CryptoError;
use crate::signatures::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;

/// Output of [`GroupCrypto::seal`]
///
/// `signature` is `None` when signing was not requested (JOIN payloads
/// announce identity and carry no counter-signature).
pub struct Sealed {
    /// Encrypted payload
    pub ciphertext: Vec<u8>,
    /// Nonce used for this payload
    pub nonce: Nonce,
    /// Signature over the plaintext, if requested
    pub signature: Option<Signature>,
}

/// Group encryption + local signing, the engine's crypto collaborator
pub struct GroupCrypto {
    group_key: AeadKey,
    signing_key: SigningKey,
}

impl GroupCrypto {
    /// Create a provider from a pre-shared group key and a local signing key
    #[must_use]
    pub fn new(group_key: AeadKey, signing_key: SigningKey) -> Self {
        Self {
            group_key,
            signing_key,
        }
    }

    /// Create a provider with a freshly generated signing key
    #[must_use]
    pub fn with_fresh_identity(group_key: AeadKey) -> Self {
        Self::new(group_key, SigningKey::generate(&mut OsRng))
    }

    /// Encrypt a plaintext with a fresh random nonce, optionally signing it
    ///
    /// The signature covers the plaintext, not the ciphertext, so a
    /// receiver verifies after decryption against the sender's stored key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if encryption fails.
    pub fn seal(&self, plaintext: &[u8], sign: bool) -> Result<Sealed, CryptoError> {
        let nonce = Nonce::generate(&mut OsRng);
        let ciphertext = self.group_key.encrypt(&nonce, plaintext)?;
        let signature = sign.then(|| self.signing_key.sign(plaintext));
        Ok(Sealed {
            ciphertext,
            nonce,
            signature,
        })
    }

    /// Decrypt a payload received from the group
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] on malformed or tampered
    /// input, including payloads encrypted under a different group key.
    pub fn open(&self, ciphertext: &[u8], nonce: &Nonce) -> Result<Vec<u8>, CryptoError> {
        self.group_key.decrypt(nonce, ciphertext)
    }

    /// Verify a peer's signature over a plaintext
    ///
    /// Returns `false` on mismatch; never errors.
    #[must_use]
    pub fn verify(public_key: &VerifyingKey, signature: &Signature, message: &[u8]) -> bool {
        public_key.verify(message, signature)
    }

    /// The local public key, announced to peers via discovery
    #[must_use]
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

//! `XChaCha20-Poly1305` AEAD encryption under the pre-shared group key.
//!
//! Every chat payload is encrypted with the same symmetric group key but a
//! fresh random 192-bit nonce. The extended nonce makes random generation
//! safe: collisions are negligible even across many peers sending
//! concurrently with no coordination.

use crate::error::CryptoError;
use crate::{AEAD_KEY_SIZE, AEAD_NONCE_SIZE};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{KeyInit, XChaCha20Poly1305};
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AEAD nonce (24 bytes, single-use)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; AEAD_NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; AEAD_NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidNonceLength`] if the slice is not
    /// exactly 24 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != AEAD_NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: AEAD_NONCE_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; AEAD_NONCE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Generate a random nonce
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; AEAD_NONCE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw nonce bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AEAD_NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &chacha20poly1305::XNonce {
        chacha20poly1305::XNonce::from_slice(&self.0)
    }
}

/// Symmetric group key (32 bytes, zeroized on drop)
///
/// All participants share this key; it is distributed out of band and
/// never travels on the wire.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; AEAD_KEY_SIZE]);

impl AeadKey {
    /// Create a key from raw bytes
    #[must_use]
    pub fn new(bytes: [u8; AEAD_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a key from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not
    /// exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != AEAD_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: AEAD_KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; AEAD_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded key (64 hex characters)
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyEncoding`] for non-hex input and
    /// [`CryptoError::InvalidKeyLength`] for the wrong decoded length.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Generate a random key
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; AEAD_KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AEAD_KEY_SIZE] {
        &self.0
    }

    /// Encrypt a plaintext with the given nonce
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if encryption fails.
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.0).into());
        cipher
            .encrypt(nonce.as_generic(), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt a ciphertext with the given nonce
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the ciphertext is
    /// malformed or has been tampered with.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.0).into());
        cipher
            .decrypt(nonce.as_generic(), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = AeadKey::generate(&mut OsRng);
        let nonce = Nonce::generate(&mut OsRng);

        let plaintext = b"alice: hello everyone";
        let ciphertext = key.encrypt(&nonce, plaintext).unwrap();
        assert_ne!(&ciphertext, plaintext);

        let decrypted = key.decrypt(&nonce, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = AeadKey::generate(&mut OsRng);
        let nonce = Nonce::generate(&mut OsRng);

        let mut ciphertext = key.encrypt(&nonce, b"secret").unwrap();
        ciphertext[0] ^= 0xFF;

        assert!(matches!(
            key.decrypt(&nonce, &ciphertext),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let key = AeadKey::generate(&mut OsRng);
        let nonce = Nonce::generate(&mut OsRng);
        let other = Nonce::generate(&mut OsRng);

        let ciphertext = key.encrypt(&nonce, b"secret").unwrap();
        assert!(key.decrypt(&other, &ciphertext).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = AeadKey::generate(&mut OsRng);
        let other = AeadKey::generate(&mut OsRng);
        let nonce = Nonce::generate(&mut OsRng);

        let ciphertext = key.encrypt(&nonce, b"secret").unwrap();
        assert!(other.decrypt(&nonce, &ciphertext).is_err());
    }

    #[test]
    fn test_key_from_hex_roundtrip() {
        let key = AeadKey::generate(&mut OsRng);
        let encoded = hex::encode(key.as_bytes());
        let recovered = AeadKey::from_hex(&encoded).unwrap();
        assert_eq!(key.as_bytes(), recovered.as_bytes());
    }

    #[test]
    fn test_key_from_hex_rejects_garbage() {
        assert!(matches!(
            AeadKey::from_hex("not hex at all"),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
        assert!(matches!(
            AeadKey::from_hex("deadbeef"),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn test_nonce_from_slice_wrong_size() {
        assert!(Nonce::from_slice(&[0u8; 12]).is_err());
        assert!(Nonce::from_slice(&[0u8; 24]).is_ok());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = AeadKey::generate(&mut OsRng);
        let nonce = Nonce::generate(&mut OsRng);

        let ciphertext = key.encrypt(&nonce, b"").unwrap();
        // Poly1305 tag is still present
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(key.decrypt(&nonce, &ciphertext).unwrap(), b"");
    }
}

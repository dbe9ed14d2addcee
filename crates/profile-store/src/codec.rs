//! AES-256-GCM encryption for profile blobs.
//!
//! Encrypted blobs are `MAGIC || nonce || ciphertext`. The key is derived with
//! HKDF-SHA256 from the device identity on every call and is never stored.
//! When no identity is available a fixed fallback identity is used; that
//! obscures the file but does not protect it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use profile_common::{MagicBytes, ProfileError};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::providers::DeviceIdentity;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// 12-byte nonce for AES-GCM.
pub const NONCE_SIZE: usize = 12;

const APP_SALT: &[u8] = b"profile-vault.blob-salt.v1";
const KEY_INFO: &[u8] = b"profile blob encryption";
const FALLBACK_IDENTITY: &str = "profile-vault.fallback-identity";

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Key derivation or cipher setup failed.
    #[error("Key error: {0}")]
    Key(String),
    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encrypt(String),
    /// Payload is not a well-formed encrypted blob, or authentication failed.
    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

impl From<CodecError> for ProfileError {
    fn from(err: CodecError) -> Self {
        ProfileError::Decode(err.to_string())
    }
}

/// Encrypts and decrypts serialized profiles.
pub struct ProfileCodec {
    identity: Box<dyn DeviceIdentity>,
}

impl std::fmt::Debug for ProfileCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCodec").finish_non_exhaustive()
    }
}

impl ProfileCodec {
    /// Creates a codec keyed by `identity`.
    #[must_use]
    pub fn new(identity: Box<dyn DeviceIdentity>) -> Self {
        Self { identity }
    }

    /// Checks whether `data` carries the encryption marker.
    #[must_use]
    pub fn is_encrypted(data: &[u8]) -> bool {
        MagicBytes::ENCRYPTED_PROFILE.prefixes(data)
    }

    fn derive_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>, CodecError> {
        let identity = match self.identity.device_id() {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                warn!("Device identity unavailable, using fallback key");
                FALLBACK_IDENTITY.to_string()
            },
        };

        let hk = Hkdf::<Sha256>::new(Some(APP_SALT), identity.as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        hk.expand(KEY_INFO, &mut key[..])
            .map_err(|e| CodecError::Key(format!("HKDF expand failed: {e}")))?;
        Ok(key)
    }

    fn cipher(&self) -> Result<Aes256Gcm, CodecError> {
        let key = self.derive_key()?;
        Aes256Gcm::new_from_slice(&key[..]).map_err(|e| CodecError::Key(format!("Invalid key: {e}")))
    }

    /// Encrypts `plaintext` into a tagged blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CodecError::Encrypt(e.to_string()))?;

        let magic = MagicBytes::ENCRYPTED_PROFILE;
        let mut out = Vec::with_capacity(magic.as_bytes().len() + NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(magic.as_bytes());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a tagged blob, failing on a missing marker or bad payload.
    pub fn try_decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let magic = MagicBytes::ENCRYPTED_PROFILE;
        if !magic.prefixes(data) {
            return Err(CodecError::Decrypt("missing encryption marker".to_string()));
        }

        let body = &data[magic.as_bytes().len()..];
        if body.len() < NONCE_SIZE {
            return Err(CodecError::Decrypt(format!(
                "payload too short: {} bytes",
                body.len()
            )));
        }

        let (nonce_bytes, ciphertext) = body.split_at(NONCE_SIZE);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CodecError::Decrypt(e.to_string()))
    }

    /// Decrypts a tagged blob.
    ///
    /// Input without the marker is treated as plaintext and returned as-is.
    /// A failed decrypt also returns the input unchanged; the caller's
    /// deserializer then reports it as undecodable.
    #[must_use]
    pub fn decrypt(&self, data: &[u8]) -> Vec<u8> {
        if !Self::is_encrypted(data) {
            debug!("Blob has no encryption marker, reading as plaintext");
            return data.to_vec();
        }

        match self.try_decrypt(data) {
            Ok(plain) => plain,
            Err(e) => {
                warn!("{e}");
                data.to_vec()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FixedIdentity;

    struct NoIdentity;

    impl DeviceIdentity for NoIdentity {
        fn device_id(&self) -> Option<String> {
            None
        }
    }

    fn codec(id: &str) -> ProfileCodec {
        ProfileCodec::new(Box::new(FixedIdentity(id.to_string())))
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let codec = codec("device-a");
        let plaintext = br#"{"coins":100}"#;

        let blob = codec.encrypt(plaintext).expect("encrypt");
        assert!(ProfileCodec::is_encrypted(&blob));
        assert_ne!(&blob[4..], plaintext);

        assert_eq!(codec.decrypt(&blob), plaintext);
    }

    #[test]
    fn test_key_is_stable_per_identity() {
        let blob = codec("device-a").encrypt(b"data").expect("encrypt");
        assert_eq!(codec("device-a").decrypt(&blob), b"data");
    }

    #[test]
    fn test_other_identity_cannot_decrypt() {
        let blob = codec("device-a").encrypt(b"data").expect("encrypt");
        let other = codec("device-b");

        assert!(other.try_decrypt(&blob).is_err());
        // Falls back to returning the input untouched
        assert_eq!(other.decrypt(&blob), blob);
    }

    #[test]
    fn test_plaintext_passes_through() {
        let codec = codec("device-a");
        let plain = br#"{"level":1}"#;
        assert!(!ProfileCodec::is_encrypted(plain));
        assert_eq!(codec.decrypt(plain), plain);
    }

    #[test]
    fn test_truncated_blob_returned_unchanged() {
        let codec = codec("device-a");
        let truncated = b"PVE1abc";
        assert!(matches!(
            codec.try_decrypt(truncated),
            Err(CodecError::Decrypt(_))
        ));
        assert_eq!(codec.decrypt(truncated), truncated);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let codec = codec("device-a");
        let mut blob = codec.encrypt(b"secret").expect("encrypt");
        if let Some(byte) = blob.last_mut() {
            *byte ^= 0xff;
        }
        assert!(codec.try_decrypt(&blob).is_err());
    }

    #[test]
    fn test_fallback_identity_is_deterministic() {
        let a = ProfileCodec::new(Box::new(NoIdentity));
        let b = ProfileCodec::new(Box::new(NoIdentity));
        let blob = a.encrypt(b"data").expect("encrypt");
        assert_eq!(b.decrypt(&blob), b"data");
    }

    #[test]
    fn test_each_encryption_unique_nonce() {
        let codec = codec("device-a");
        let a = codec.encrypt(b"same").expect("encrypt");
        let b = codec.encrypt(b"same").expect("encrypt");
        assert_ne!(a, b);
    }
}

//! The concrete CCM backend: AES-128 block cipher in CCM mode with an
//! 8-byte tag and a 5-byte nonce, matching the wire format's MAC and nonce
//! sizes exactly rather than the crate defaults.

use aes::Aes128;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U5, U8};
use ccm::Ccm;
use zeroize::Zeroize;

use crate::error::SecurityError;
use crate::nonce::Key;

type Aes128Ccm8_5 = Ccm<Aes128, U8, U5>;

/// AES-128-CCM, the one concrete [`crate::envelope`] backend this crate
/// ships. The spec treats the CCM primitive's correctness as assumed; this
/// wraps a real implementation (RustCrypto's `aes`+`ccm`) so the envelope
/// layer above it is exercised end to end rather than left as an
/// unimplemented trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesCcmCipher;

impl AesCcmCipher {
    /// Encrypts `buffer` in place and returns the 8-byte authentication
    /// tag, computed over `buffer` and `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Security`] if the underlying primitive
    /// rejects the call (only possible with a malformed nonce/key length,
    /// which this wrapper's fixed-size types rule out in practice).
    pub fn encrypt_in_place_detached(
        &self,
        key: &Key,
        nonce: &[u8; 5],
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; 8], SecurityError> {
        let cipher = Aes128Ccm8_5::new(key.into());
        let tag = cipher.encrypt_in_place_detached(nonce.into(), aad, buffer).map_err(|_| SecurityError::Security)?;
        Ok(tag.into())
    }

    /// Decrypts `buffer` in place, verifying it against `tag` and `aad`. On
    /// mismatch `buffer` is zeroized rather than left holding unauthenticated
    /// keystream-derived bytes; the caller must discard the whole message
    /// rather than trust any of it regardless.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Security`] on MAC mismatch.
    pub fn decrypt_in_place_detached(
        &self,
        key: &Key,
        nonce: &[u8; 5],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8; 8],
    ) -> Result<(), SecurityError> {
        let cipher = Aes128Ccm8_5::new(key.into());
        match cipher.decrypt_in_place_detached(nonce.into(), aad, buffer, tag.into()) {
            Ok(()) => Ok(()),
            Err(_) => {
                buffer.zeroize();
                Err(SecurityError::Security)
            }
        }
    }
}

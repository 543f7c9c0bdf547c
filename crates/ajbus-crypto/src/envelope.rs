//! Ties the CCM backend to [`ajbus_wire::Message`]: nonce derivation, MAC
//! placement, and the associated-data layout the wire codec already tracks
//! for us via [`ajbus_wire::Message::associated_data`].

use std::time::Duration;

use ajbus_wire::{Message, Transport};
use tracing::debug;

use crate::cipher::AesCcmCipher;
use crate::error::SecurityError;
use crate::nonce::{build_nonce, Key, Role};

/// Size in bytes of the trailing MAC the envelope appends.
pub const MAC_LEN: usize = 8;

/// Encrypts an outbound message's body in place: reserves 8 bytes of TX
/// space for the MAC, computes the nonce from the header's own serial
/// number, and authenticates the header (plus its pad) as associated data.
/// The caller must have already set the `ENCRYPTED` header flag when the
/// message was begun — this function only touches the body.
///
/// # Errors
///
/// Returns [`SecurityError::Wire`] if the TX buffer has no room for the
/// MAC, or [`SecurityError::Security`] if the CCM primitive itself rejects
/// the call.
pub fn encrypt(msg: &mut Message<'_>, cipher: &AesCcmCipher, key: &Key, role: Role) -> Result<(), SecurityError> {
    let serial = msg.header().serial();
    let nonce = build_nonce(role, serial);
    let (aad, region) = msg.reserve_mac_region(MAC_LEN)?;
    let plaintext_len = region.len() - MAC_LEN;
    let (plaintext, tag_slot) = region.split_at_mut(plaintext_len);
    let tag = cipher.encrypt_in_place_detached(key, &nonce, &aad, plaintext)?;
    tag_slot.copy_from_slice(&tag);
    debug!(serial, plaintext_len, "secure envelope: encrypted message body");
    Ok(())
}

/// Decrypts an inbound message's body in place: fills the whole declared
/// body (ciphertext plus trailing MAC), verifies it against the header as
/// associated data, and on success shrinks the message's effective body
/// length so ordinary typed unmarshalling never reads into the stripped
/// MAC bytes.
///
/// `role` must already be the *sender's* role as seen from this side — a
/// receiver reconstructs it from its own locally stored role via
/// [`Role::opposite`] before calling this.
///
/// # Errors
///
/// Returns [`SecurityError::Invalid`] if the message isn't `ENCRYPTED`, or
/// [`SecurityError::Security`] on MAC mismatch (the message must be
/// discarded and the connection treated as faulted, not just this one
/// message).
pub fn decrypt(
    msg: &mut Message<'_>,
    cipher: &AesCcmCipher,
    key: &Key,
    role: Role,
    transport: &mut dyn Transport,
    timeout: Duration,
) -> Result<(), SecurityError> {
    if !msg.header().flags().contains(ajbus_wire::HeaderFlags::ENCRYPTED) {
        return Err(SecurityError::Invalid);
    }
    let serial = msg.header().serial();
    let nonce = build_nonce(role, serial);
    let aad = msg.associated_data();
    let body = msg.fill_whole_body_mut(transport, timeout)?;
    if body.len() < MAC_LEN {
        return Err(SecurityError::Invalid);
    }
    let plaintext_len = body.len() - MAC_LEN;
    let (plaintext, tag_slot) = body.split_at_mut(plaintext_len);
    let tag: [u8; MAC_LEN] = tag_slot.try_into().expect("split_at_mut guarantees exact length");
    cipher.decrypt_in_place_detached(key, &nonce, &aad, plaintext, &tag)?;
    msg.strip_trailing_mac(MAC_LEN)?;
    msg.toggle_auto_start();
    debug!(serial, plaintext_len, "secure envelope: decrypted message body");
    Ok(())
}

//! The collaborator traits the application/platform layer supplies:
//! transport, encryption primitive, session key lookup, and introspection
//! registry. None of these are implemented beyond what's needed to make
//! [`ajbus_crypto::AesCcmCipher`] usable through [`CcmCipher`] — the rest
//! stay as trait definitions the platform adaptation layer fills in, per
//! this library's scope (sockets, router handshake, and interface
//! introspection XML are explicitly out of scope).

use ajbus_crypto::{AesCcmCipher, Key, Role};
use ajbus_wire::{HeaderFields, IoBuf, MsgType};

use crate::error::BusError;

/// Streams bytes to and from a connected router. Re-exported from
/// [`ajbus_wire`] rather than redefined: it's the same seam
/// [`ajbus_wire::IoBuf::fill`]/[`ajbus_wire::IoBuf::drain`] already use, so
/// one implementation serves both the codec and everything built on it.
pub use ajbus_wire::Transport;

/// Brings up and tears down the multicast socket pair the name service
/// codec sends WHO-HAS on and receives IS-AT from. Kept separate from
/// [`Transport`] because discovery happens before (and independently of)
/// any router connection.
pub trait McastTransport {
    /// Opens the multicast group, returning a fresh RX/TX buffer pair sized
    /// for name-service traffic.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the underlying socket can't be opened.
    fn mcast_up(&mut self) -> Result<(IoBuf, IoBuf), BusError>;

    /// Leaves the multicast group and releases any socket resources.
    fn mcast_down(&mut self);
}

/// The CCM encrypt/decrypt primitive the secure envelope drives. The spec
/// treats this primitive's correctness as assumed, but this workspace
/// still ships one real backing ([`AesCcmCipher`]) so [`ajbus_crypto`]'s
/// envelope layer is exercised end to end rather than left as an
/// unimplemented seam.
pub trait CcmCipher {
    /// Encrypts `buffer` in place and returns its authentication tag.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Security`] if the underlying primitive rejects
    /// the call.
    fn encrypt_in_place_detached(
        &self,
        key: &Key,
        nonce: &[u8; 5],
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; 8], BusError>;

    /// Decrypts `buffer` in place, verifying it against `tag` and `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Security`] on MAC mismatch.
    fn decrypt_in_place_detached(
        &self,
        key: &Key,
        nonce: &[u8; 5],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8; 8],
    ) -> Result<(), BusError>;
}

impl CcmCipher for AesCcmCipher {
    fn encrypt_in_place_detached(
        &self,
        key: &Key,
        nonce: &[u8; 5],
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; 8], BusError> {
        Ok(AesCcmCipher::encrypt_in_place_detached(self, key, nonce, aad, buffer)?)
    }

    fn decrypt_in_place_detached(
        &self,
        key: &Key,
        nonce: &[u8; 5],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8; 8],
    ) -> Result<(), BusError> {
        Ok(AesCcmCipher::decrypt_in_place_detached(self, key, nonce, aad, buffer, tag)?)
    }
}

/// Looks up session and group keys by peer name. Session establishment
/// itself (the router handshake that negotiates these keys) is out of
/// scope; this trait only covers the lookup the secure envelope needs at
/// encrypt/decrypt time.
pub trait KeyStore {
    /// The key and local role for a direct session with `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Null`] if no session with `peer` exists.
    fn session_key(&self, peer: &str) -> Result<(Key, Role), BusError>;

    /// The group key for a sessionless signal, optionally scoped to one
    /// sender (`None` for a key usable to verify any sender).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Null`] if no group key is available.
    fn group_key(&self, peer: Option<&str>) -> Result<Key, BusError>;
}

/// True for a signal with no `destination` — a multicast/broadcast signal,
/// which uses the group key rather than a session key, on both the
/// encrypt and decrypt paths.
fn is_group_keyed(msg_type: MsgType, destination: Option<&str>) -> bool {
    msg_type == MsgType::Signal && destination.is_none()
}

/// Picks the key and role an outbound message encrypts under: the group
/// key for a multicast/broadcast signal, the session key with `destination`
/// otherwise. `fields` is read straight off the [`HeaderFields`] being
/// marshalled rather than re-derived, so this is the one place the rule
/// lives rather than being re-decided at every encrypt call site.
///
/// # Errors
///
/// Returns [`BusError::Null`] if the resolved [`KeyStore`] lookup fails.
pub fn select_key_for_encrypt(
    keystore: &dyn KeyStore,
    msg_type: MsgType,
    fields: &HeaderFields,
) -> Result<(Key, Role), BusError> {
    if is_group_keyed(msg_type, fields.destination.as_deref()) {
        let key = keystore.group_key(None)?;
        Ok((key, Role::new(0)))
    } else {
        let peer = fields.destination.as_deref().ok_or(BusError::Null)?;
        keystore.session_key(peer)
    }
}

/// Picks the key and role an inbound message decrypts under, mirroring
/// [`select_key_for_encrypt`] but keyed by `sender` and, for a session
/// message, using [`Role::opposite`] — the locally stored role is always
/// this side's own, so decrypting requires the peer's.
///
/// # Errors
///
/// Returns [`BusError::Null`] if the resolved [`KeyStore`] lookup fails.
pub fn select_key_for_decrypt(
    keystore: &dyn KeyStore,
    msg_type: MsgType,
    fields: &HeaderFields,
) -> Result<(Key, Role), BusError> {
    if is_group_keyed(msg_type, fields.destination.as_deref()) {
        let key = keystore.group_key(fields.sender.as_deref())?;
        Ok((key, Role::new(0)))
    } else {
        let peer = fields.sender.as_deref().ok_or(BusError::Null)?;
        let (key, role) = keystore.session_key(peer)?;
        Ok((key, role.opposite()))
    }
}

/// A 24-bit logical message id the application's introspection registry
/// keys its object path/interface/member metadata by, distinct from the
/// wire-level serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgId(u32);

impl MsgId {
    /// Wraps a raw id, masking to the 24 bits the registry uses.
    #[must_use]
    pub fn new(v: u32) -> Self {
        Self(v & 0x00FF_FFFF)
    }

    /// The raw 24-bit value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// The header-field values an [`Introspection`] registry fills in for a
/// message being marshalled from a logical id, plus whether the registry
/// requires that message to travel through the secure envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInit {
    /// Object path to marshal.
    pub object_path: String,
    /// Interface name to marshal.
    pub interface: String,
    /// Member (method or signal) name to marshal.
    pub member: String,
    /// Body signature to marshal.
    pub signature: String,
    /// Whether the registry requires this message to be encrypted.
    pub secure: bool,
}

/// The application's object/interface registry: maps a 24-bit logical
/// message id to wire metadata, and the reverse lookup used when an
/// incoming message's header fields need to be resolved back to one.
/// Registration and introspection-XML generation themselves are out of
/// scope; only this narrow lookup seam is.
pub trait Introspection {
    /// Header-field metadata for marshalling `msg_id` as `msg_type`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Null`] if `msg_id` is not registered.
    fn init_message(&self, msg_id: MsgId, msg_type: MsgType) -> Result<MessageInit, BusError>;

    /// Resolves an incoming message's header fields back to the logical id
    /// the registry knows it by.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Null`] if no registered id matches.
    fn identify(&self, header_fields: &HeaderFields) -> Result<MsgId, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_id_masks_to_24_bits() {
        assert_eq!(MsgId::new(0xFF00_0001).value(), 0x0000_0001);
    }
}

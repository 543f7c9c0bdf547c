//! Secure Envelope: authenticated encryption layered over the bus wire
//! codec.
//!
//! [`envelope::encrypt`]/[`envelope::decrypt`] drive an
//! [`ajbus_wire::Message`] through AES-128-CCM ([`cipher::AesCcmCipher`]),
//! deriving the nonce from the message's own serial number and a peer role
//! ([`nonce::Role`]) rather than from random bytes — the wire format has no
//! room for a nonce field, so uniqueness comes entirely from the
//! `(role, serial)` pair instead.
//!
//! Key lookup by peer identity is not this crate's concern (that's
//! `ajbus-core::external::KeyStore`); this crate only needs the resolved
//! 16-byte key and role handed to it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod nonce;

pub use cipher::AesCcmCipher;
pub use envelope::{decrypt, encrypt, MAC_LEN};
pub use error::SecurityError;
pub use nonce::{build_nonce, Key, Role};

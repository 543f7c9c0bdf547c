//! In-memory test doubles for the external collaborators
//! [`ajbus_core::external`] defines: a byte-pipe transport, a key store, an
//! introspection registry, and a multicast socket-pair stand-in. None of
//! these are production collaborators — the router handshake, real
//! sockets, and key negotiation stay out of scope per the library's own
//! boundaries — they exist so this workspace's own integration tests can
//! drive a [`ajbus_core::BusAttachment`] end to end without a real
//! transport.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod introspection;
pub mod keystore;
pub mod mcast;
pub mod transport;

pub use introspection::StaticIntrospection;
pub use keystore::InMemoryKeyStore;
pub use mcast::InMemoryMcast;
pub use transport::{DuplexPipe, FlakyTransport};

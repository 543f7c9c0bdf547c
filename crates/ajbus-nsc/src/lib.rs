//! Multicast name service: composes WHO-HAS queries, parses IS-AT answers,
//! and drives the deadline-bounded discover loop on top of an injected
//! transport and clock.
//!
//! This is a standalone packet grammar from the bus wire codec in
//! `ajbus-wire` — four fixed header bytes, then repeating question and
//! answer blocks, with no relationship to the typed D-Bus-style signatures
//! `ajbus-wire` marshals.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod discover;
pub mod error;
pub mod packet;

pub use discover::{discover, Clock, NsTransport, RX_TIMEOUT_MS};
pub use error::NsError;
pub use packet::{compose_who_has, parse_is_at, AddrTypes, DiscoveredService};

//! The `BusAttachment` facade tying the wire codec ([`ajbus_wire`]), secure
//! envelope ([`ajbus_crypto`]), name service ([`ajbus_nsc`]), and NVRAM
//! store ([`ajbus_nvram`]) together, plus the collaborator traits
//! ([`external`]) the platform adaptation layer and application fill in.
//!
//! Router connection handshakes, object/interface registration, and
//! introspection XML generation are not implemented here — `external`
//! defines the seams those would plug into, but building the collaborators
//! themselves is out of scope for this library.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod attachment;
mod config;
mod error;
pub mod external;

pub use attachment::{BusAttachment, TIMEOUT_ERROR_NAME};
pub use config::{BusConfig, RX_TIMEOUT_MS, WHO_HAS_REPEAT};
pub use error::{BusError, StandardErrorReply};

//! Wire-format marshaller/unmarshaller for the bus client.
//!
//! This crate is the codec at the center of the library: [`iobuf`] gives it
//! a reusable, non-reallocating byte buffer; [`types`] gives it the
//! signature grammar; [`header`] and [`message`] implement the bit-exact
//! message envelope (fixed header, header-field block, body) that a foreign
//! router on the other end of the wire must parse identically regardless of
//! which side chose the byte order.
//!
//! Nothing here owns a socket. [`iobuf::Transport`] is the seam the
//! platform adaptation layer (or, in tests, the `ajbus-harness` crate's
//! in-memory doubles) fills in.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod arg;
pub mod args;
pub mod errors;
pub mod header;
pub mod iobuf;
pub mod message;
pub mod types;

pub use arg::{ArgValue, ArgView};
pub use args::{marshal_args, unmarshal_args, BasicSlot, BasicValue};
pub use errors::WireError;
pub use header::{Endian, HeaderFlags, MsgHeader, MsgType, HEADER_SIZE, PROTOCOL_VERSION};
pub use iobuf::{Direction, IoBuf, Transport};
pub use message::{header_field_id, HeaderFields, Message};
pub use types::{complete_type_len, validate_signature, Category, TypeId};

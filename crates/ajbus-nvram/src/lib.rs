//! Flat byte-region NVRAM store: create, read, write, delete, and compact
//! small fixed-capacity records addressed by a 16-bit id.
//!
//! A single backing region (real flash, a battery-backed RAM block, or in
//! tests a plain `Vec<u8>`) is laid out as a magic sentinel followed by a
//! run of `{id, capacity, payload}` records. Deletes tombstone a record's
//! id rather than reclaiming space immediately; [`NvStore::compact`] walks
//! the region once to squeeze tombstones out, matching how constrained
//! flash devices batch erasure instead of doing it per-delete.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod store;

pub use error::NvError;
pub use store::{NoopPersist, NvHandle, NvPersist, NvStore, OpenMode, ENTRY_HEADER_SIZE, SENTINEL};

//! Error taxonomy for the NVRAM store.

use thiserror::Error;

/// Failures from [`crate::store::NvStore`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NvError {
    /// A generic NV failure: the id already exists on `Create`, capacity was
    /// zero, or no room remained even after compaction.
    #[error("NVRAM operation failed")]
    Failure,
    /// An argument violated a store-level constraint: id `0` used where a
    /// real id is required, or a record id not found for a required lookup.
    #[error("invalid NVRAM argument")]
    Invalid,
}

//! Error taxonomy for the wire codec.
//!
//! Mirrors the small, closed set of failure modes a constrained-device
//! marshaller actually needs to distinguish: resource exhaustion, stream
//! desynchronization, and signature/type mismatches. `NoMore` is not a
//! failure — it is the normal way array/struct iteration ends — so call
//! sites match it explicitly rather than logging it.

use thiserror::Error;

/// Failure modes produced by [`crate::iobuf`], [`crate::header`], and
/// [`crate::message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer is too small to hold `needed` more bytes, even after
    /// compaction. The caller must grow the buffer or give up on the
    /// message; this is never recoverable by waiting longer.
    #[error("buffer has no room for {needed} more bytes")]
    Resources {
        /// Bytes that were required when the allocation failed.
        needed: usize,
    },

    /// Bytes arrived that do not parse as a valid header or body for the
    /// declared signature. The connection must be dropped; the stream
    /// position can no longer be trusted.
    #[error("malformed input, stream desynchronized")]
    Read,

    /// A marshal call would write past the body length declared when the
    /// message was opened.
    #[error("marshalled body overran its declared length")]
    Write,

    /// A marshal call's argument type does not match the next type the
    /// message's open signature expects.
    #[error("argument type does not match the signature being marshalled")]
    Marshal,

    /// An unmarshal call's requested type does not match the next type in
    /// the wire signature.
    #[error("argument type does not match the signature being unmarshalled")]
    Unmarshal,

    /// A signature string is not well-formed (unbalanced containers, a
    /// dict-entry with a non-basic key, an unknown type character).
    #[error("malformed type signature")]
    Signature,

    /// The buffer ran out of bytes before a complete value could be read.
    #[error("truncated input")]
    EndOfData,

    /// Iteration over an array or struct's elements is exhausted. Not a
    /// fault: callers use this to know when to stop.
    #[error("no more elements")]
    NoMore,

    /// An argument value violates a wire-level constraint (e.g. a string
    /// missing its NUL terminator, an array length that isn't a multiple
    /// of its element size).
    #[error("invalid argument value")]
    Invalid,

    /// No data arrived before the deadline. Distinct from [`WireError::Read`]
    /// because a timeout before any header bytes have arrived is often
    /// retryable, while one mid-message is not.
    #[error("timed out waiting for data")]
    Timeout,
}

impl WireError {
    /// True for the sentinel that callers use to end array/struct iteration
    /// rather than treat as a connection fault.
    #[must_use]
    pub fn is_no_more(&self) -> bool {
        matches!(self, WireError::NoMore)
    }
}

//! Error taxonomy for the name service codec.

use thiserror::Error;

/// Failure modes from WHO-HAS compose, IS-AT parse, and the discover loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NsError {
    /// `Discover` completed its deadline without finding a matching name.
    #[error("no matching service found before the deadline")]
    NoMatch,
    /// An answer or question block ran past the end of the packet.
    #[error("truncated name service packet")]
    EndOfData,
    /// A question or answer declared a message type other than
    /// `WHO_HAS`/`IS_AT`, or an answer had neither `R4_FLAG` nor `R6_FLAG`.
    #[error("malformed name service packet")]
    Invalid,
    /// The WHO-HAS packet does not fit in the given output buffer.
    #[error("buffer has no room for {needed} more bytes")]
    Resources {
        /// Bytes that were required.
        needed: usize,
    },
    /// No IS-AT reply arrived before the per-attempt receive deadline.
    #[error("timed out waiting for a reply")]
    Timeout,
}

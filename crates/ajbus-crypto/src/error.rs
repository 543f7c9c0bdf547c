//! Error taxonomy for the secure envelope.

use thiserror::Error;

/// Failures from the authenticated-encryption layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityError {
    /// MAC verification failed, or the underlying CCM primitive otherwise
    /// rejected the input. Covers both a tampered message and a wrong key.
    #[error("secure envelope authentication failed")]
    Security,
    /// The message was not marked `ENCRYPTED`, or was already stripped of
    /// its MAC, when an encrypt/decrypt call expected one.
    #[error("message is not in a state an encrypt/decrypt pass can act on")]
    Invalid,
    /// Propagated from the underlying wire codec (buffer full, truncated
    /// body, and so on) while reserving or filling the MAC region.
    #[error("wire codec error during envelope processing: {0}")]
    Wire(#[from] ajbus_wire::WireError),
}

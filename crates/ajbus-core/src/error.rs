//! The bus-level error taxonomy: a superset that every sub-crate's error
//! folds into, plus the mapping from an internal failure to the handful of
//! standard-named error replies an application ever sees on the wire.

use thiserror::Error;

/// Failures surfaced by [`crate::BusAttachment`], folding in every
/// sub-crate's own error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// The wire codec rejected a header, body, or signature.
    #[error("wire codec error: {0}")]
    Wire(#[from] ajbus_wire::WireError),

    /// The secure envelope failed to encrypt or authenticate a body.
    #[error("secure envelope error: {0}")]
    Security(#[from] ajbus_crypto::SecurityError),

    /// The name service codec failed to compose, parse, or discover.
    #[error("name service error: {0}")]
    NameService(#[from] ajbus_nsc::NsError),

    /// The NVRAM store failed a create/read/write/delete/compact.
    #[error("NVRAM error: {0}")]
    Nvram(#[from] ajbus_nvram::NvError),

    /// A required pointer/argument was absent (e.g. no session key found
    /// for a peer the caller claims to have a session with).
    #[error("required value was null")]
    Null,
}

/// The small set of standard-named error replies an application ever sees,
/// regardless of which internal failure produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardErrorReply {
    /// No service matched a discovery prefix.
    ServiceUnknown,
    /// A secure envelope MAC failed, or an encrypted message declared a
    /// non-host endianness.
    SecurityViolation,
    /// Every other failure: malformed input, exhausted resources, a
    /// caller-side signature mismatch, and so on.
    Rejected,
}

impl StandardErrorReply {
    /// The `ERROR_NAME` header field value this reply is marshalled under.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            StandardErrorReply::ServiceUnknown => "org.alljoyn.Bus.ErStatus.ServiceUnknown",
            StandardErrorReply::SecurityViolation => "org.alljoyn.Bus.ErStatus.SecurityViolation",
            StandardErrorReply::Rejected => "org.alljoyn.Bus.ErStatus.Rejected",
        }
    }
}

impl BusError {
    /// Maps an internal failure to the standard-named error reply an
    /// application sends back: `NO_MATCH → ServiceUnknown`, `SECURITY →
    /// SecurityViolation`, anything else → `Rejected`. A `SecurityViolation`
    /// reply is always marshalled with the `ENCRYPTED` flag cleared, since
    /// re-encrypting a reply to a failed decrypt would use a nonce the peer
    /// has no way to reconstruct trust in.
    #[must_use]
    pub fn standard_reply(&self) -> StandardErrorReply {
        match self {
            BusError::NameService(ajbus_nsc::NsError::NoMatch) => StandardErrorReply::ServiceUnknown,
            BusError::Security(_) => StandardErrorReply::SecurityViolation,
            _ => StandardErrorReply::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_maps_to_service_unknown() {
        let err = BusError::NameService(ajbus_nsc::NsError::NoMatch);
        assert_eq!(err.standard_reply(), StandardErrorReply::ServiceUnknown);
    }

    #[test]
    fn security_maps_to_security_violation() {
        let err = BusError::Security(ajbus_crypto::SecurityError::Security);
        assert_eq!(err.standard_reply(), StandardErrorReply::SecurityViolation);
    }

    #[test]
    fn everything_else_maps_to_rejected() {
        let err = BusError::Wire(ajbus_wire::WireError::Invalid);
        assert_eq!(err.standard_reply(), StandardErrorReply::Rejected);
        assert_eq!(BusError::Null.standard_reply(), StandardErrorReply::Rejected);
    }
}

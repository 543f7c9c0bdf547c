//! The `BusAttachment` facade: serial number generation and the two places
//! a message gets synthesized locally rather than read off the wire (an
//! internal timeout notification, and a standard-named error reply).

use ajbus_wire::{Endian, HeaderFields, HeaderFlags, IoBuf, Message, MsgType};
use tracing::info;

use crate::config::BusConfig;
use crate::error::BusError;

/// `ERROR_NAME` a synthesized timeout message carries, matching the
/// original's internal timeout notification.
pub const TIMEOUT_ERROR_NAME: &str = "org.alljoyn.Bus.ErStatus.Timeout";

/// Ties the wire codec, secure envelope, name service, and NVRAM store
/// together: owns the bus's unique name and serial counter, and is where a
/// message gets synthesized locally (a timeout notification, a standard
/// error reply) rather than read off the wire.
///
/// Does not itself hold a [`crate::external::Transport`] or buffers — those
/// are supplied per call, matching how [`ajbus_wire::Message::unmarshal`]
/// and [`ajbus_wire::Message::begin`] take an [`IoBuf`] and transport as
/// arguments rather than owning them.
#[derive(Debug, Clone)]
pub struct BusAttachment {
    config: BusConfig,
    unique_name: String,
    next_serial: u32,
}

impl BusAttachment {
    /// Builds a fresh attachment. `unique_name` is the bus-assigned name
    /// this side uses as `sender`/`destination` on messages it originates
    /// locally (timeout notifications, error replies).
    #[must_use]
    pub fn new(config: BusConfig, unique_name: impl Into<String>) -> Self {
        Self { config, unique_name: unique_name.into(), next_serial: 2 }
    }

    /// The configuration this attachment was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// This bus's own unique name.
    #[must_use]
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Allocates the next outbound serial number. Serials are nonzero, and
    /// `1` is always skipped (reserved, matching the original generator),
    /// so this only ever returns values `>= 2`, wrapping back to `2` rather
    /// than through `0`/`1` if a connection ever lives long enough to
    /// exhaust `u32`.
    pub fn next_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial = match serial.wrapping_add(1) {
            0 | 1 => 2,
            n => n,
        };
        serial
    }

    /// Builds the internal error message a pending method-call reply
    /// escalates to once its own deadline has expired: `error = TIMEOUT`,
    /// `sender = destination = own unique name`, `reply_serial` set to the
    /// call it answers. The caller processes this exactly like any other
    /// received message, so a timed-out call and a genuine error reply
    /// share one code path.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Wire`] if `buf` has no room for the header and
    /// field block.
    pub fn synthesize_timeout_message<'buf>(
        &mut self,
        buf: &'buf mut IoBuf,
        pending_call_serial: u32,
    ) -> Result<Message<'buf>, BusError> {
        info!(pending_call_serial, "synthesizing internal timeout message");
        let fields = HeaderFields::default()
            .with_error_name(TIMEOUT_ERROR_NAME)
            .with_reply_serial(pending_call_serial)
            .with_sender(self.unique_name.clone())
            .with_destination(self.unique_name.clone());
        let serial = self.next_serial();
        Ok(Message::begin(buf, Endian::host(), MsgType::Error, serial, HeaderFlags::default(), fields)?)
    }

    /// Builds a standard-named error reply to `reply_serial`, mapped from
    /// `err` via [`BusError::standard_reply`]. Always marshalled with
    /// `ENCRYPTED` cleared: re-encrypting a reply to a failed decrypt would
    /// use a nonce the peer has no basis to trust, regardless of which
    /// internal failure produced `err`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Wire`] if `buf` has no room for the header and
    /// field block.
    pub fn marshal_error_reply<'buf>(
        &mut self,
        buf: &'buf mut IoBuf,
        destination: Option<&str>,
        reply_serial: u32,
        err: &BusError,
    ) -> Result<Message<'buf>, BusError> {
        let reply = err.standard_reply();
        let mut fields =
            HeaderFields::default().with_error_name(reply.wire_name()).with_reply_serial(reply_serial).with_sender(
                self.unique_name.clone(),
            );
        if let Some(d) = destination {
            fields = fields.with_destination(d);
        }
        let serial = self.next_serial();
        Ok(Message::begin(buf, Endian::host(), MsgType::Error, serial, HeaderFlags::default(), fields)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajbus_wire::Direction;

    #[test]
    fn serial_generator_skips_zero_and_one() {
        let mut bus = BusAttachment::new(BusConfig::default(), "org.alljoyn.Bus.abc123");
        assert_eq!(bus.next_serial(), 2);
        assert_eq!(bus.next_serial(), 3);
        bus.next_serial = u32::MAX;
        assert_eq!(bus.next_serial(), u32::MAX);
        assert_eq!(bus.next_serial(), 2);
    }

    #[test]
    fn timeout_message_carries_own_unique_name_both_ends() {
        let mut bus = BusAttachment::new(BusConfig::default(), "org.alljoyn.Bus.abc123");
        let mut buf = IoBuf::new(256, Direction::Tx);
        let msg = bus.synthesize_timeout_message(&mut buf, 42).expect("synthesize");
        assert_eq!(msg.fields().sender.as_deref(), Some("org.alljoyn.Bus.abc123"));
        assert_eq!(msg.fields().destination.as_deref(), Some("org.alljoyn.Bus.abc123"));
        assert_eq!(msg.fields().reply_serial, Some(42));
        assert_eq!(msg.fields().error_name.as_deref(), Some(TIMEOUT_ERROR_NAME));
    }

    #[test]
    fn security_violation_reply_clears_encrypted_flag() {
        let mut bus = BusAttachment::new(BusConfig::default(), "org.alljoyn.Bus.abc123");
        let mut buf = IoBuf::new(256, Direction::Tx);
        let err = BusError::Security(ajbus_crypto::SecurityError::Security);
        let msg = bus.marshal_error_reply(&mut buf, Some("org.alljoyn.Bus.peer"), 7, &err).expect("marshal reply");
        assert_eq!(msg.fields().error_name.as_deref(), Some("org.alljoyn.Bus.ErStatus.SecurityViolation"));
        assert!(!msg.header().flags().contains(HeaderFlags::ENCRYPTED));
    }
}

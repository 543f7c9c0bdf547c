//! The fixed 16-byte message header and its header-field block.
//!
//! Unlike a fixed-endianness wire format, every message declares its own
//! byte order in the first header byte (`'l'` little, `'B'` big), and the
//! codec swaps in place when the declared order disagrees with the host.
//! The header itself is always written/read in that declared order, which
//! is why every multi-byte field here is stored as a raw `[u8; N]` and
//! decoded through an explicit accessor rather than derived — there's no
//! single fixed layout `zerocopy`-style derives could describe.

use crate::errors::WireError;

/// Size in bytes of the fixed header, before the variable-length header
/// field block.
pub const HEADER_SIZE: usize = 16;

const ENDIAN_LITTLE: u8 = b'l';
const ENDIAN_BIG: u8 = b'B';

/// Protocol version this codec marshals and accepts on unmarshal.
pub const PROTOCOL_VERSION: u8 = 1;

/// Declared byte order of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// `'l'` on the wire.
    Little,
    /// `'B'` on the wire.
    Big,
}

impl Endian {
    /// Parses the first header byte; `None` for anything else.
    #[must_use]
    pub fn from_wire_byte(b: u8) -> Option<Self> {
        match b {
            ENDIAN_LITTLE => Some(Endian::Little),
            ENDIAN_BIG => Some(Endian::Big),
            _ => None,
        }
    }

    /// The byte this order is declared as on the wire.
    #[must_use]
    pub fn to_wire_byte(self) -> u8 {
        match self {
            Endian::Little => ENDIAN_LITTLE,
            Endian::Big => ENDIAN_BIG,
        }
    }

    /// The host's native byte order, as an [`Endian`].
    #[must_use]
    pub fn host() -> Self {
        if cfg!(target_endian = "little") { Endian::Little } else { Endian::Big }
    }

    /// Whether a value declared in `self` order needs swapping to be read
    /// as a host-native value.
    #[must_use]
    pub fn needs_swap(self) -> bool {
        self != Self::host()
    }
}

fn read_u32(bytes: [u8; 4], endian: Endian) -> u32 {
    match endian {
        Endian::Little => u32::from_le_bytes(bytes),
        Endian::Big => u32::from_be_bytes(bytes),
    }
}

fn write_u32(v: u32, endian: Endian) -> [u8; 4] {
    match endian {
        Endian::Little => v.to_le_bytes(),
        Endian::Big => v.to_be_bytes(),
    }
}

/// The four message kinds a header can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// A method call expecting a reply.
    MethodCall = 1,
    /// A successful reply to a method call.
    MethodReturn = 2,
    /// An error reply to a method call.
    Error = 3,
    /// A broadcast/unicast signal with no reply.
    Signal = 4,
}

impl MsgType {
    /// Parses a wire byte; `None` for `0` or anything unrecognized.
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(MsgType::MethodCall),
            2 => Some(MsgType::MethodReturn),
            3 => Some(MsgType::Error),
            4 => Some(MsgType::Signal),
            _ => None,
        }
    }
}

/// The flag byte. Only the bits this codec assigns meaning to are exposed
/// as named constants; unrecognized bits are preserved on round-trip but
/// otherwise ignored, matching how unknown header fields are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    /// Router must not autostart the destination service for this call.
    pub const NO_AUTO_START: u8 = 0x01;
    /// Receiver may reply over a different connection than it was sent on.
    pub const ALLOW_REMOTE_REPLY: u8 = 0x02;
    /// Body is encrypted with the secure envelope.
    pub const ENCRYPTED: u8 = 0x04;
    /// Header field block uses the compressed (short) encoding. Not
    /// produced by this codec; recognized so a peer that sets it is
    /// rejected cleanly rather than silently misparsed.
    pub const COMPRESSED: u8 = 0x08;
    /// Signal is sessionless.
    pub const SESSIONLESS: u8 = 0x10;
    /// Signal is a global broadcast, undeliverable to sessionless peers.
    pub const GLOBAL_BROADCAST: u8 = 0x20;

    /// Wraps a raw flag byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// The raw flag byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// Whether `bit` (one of the associated constants) is set.
    #[must_use]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Sets `bit`.
    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    /// Clears `bit`.
    pub fn clear(&mut self, bit: u8) {
        self.0 &= !bit;
    }

    /// Flips `bit`.
    pub fn toggle(&mut self, bit: u8) {
        self.0 ^= bit;
    }
}

/// The fixed 16-byte prefix of every message: byte order, type, flags,
/// protocol version, body length, serial number, and header-field block
/// length. The header-field block itself (object path, interface, member,
/// signature, ...) lives in [`crate::message::HeaderFields`], parsed
/// separately since its shape depends on which fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    endian: Endian,
    msg_type_raw: u8,
    flags: HeaderFlags,
    version: u8,
    body_len: [u8; 4],
    serial: [u8; 4],
    header_len: [u8; 4],
}

impl MsgHeader {
    /// Builds a fresh header for marshalling, with zero body/header
    /// lengths — those are patched in once the lengths are known.
    #[must_use]
    pub fn new(endian: Endian, msg_type: MsgType, serial: u32) -> Self {
        Self {
            endian,
            msg_type_raw: msg_type as u8,
            flags: HeaderFlags::default(),
            version: PROTOCOL_VERSION,
            body_len: write_u32(0, endian),
            serial: write_u32(serial, endian),
            header_len: write_u32(0, endian),
        }
    }

    /// Parses a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::EndOfData`] if fewer than [`HEADER_SIZE`] bytes
    /// are available, or [`WireError::Read`] if the endian byte or the
    /// message type is not one this codec recognizes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_SIZE {
            return Err(WireError::EndOfData);
        }
        let endian = Endian::from_wire_byte(bytes[0]).ok_or(WireError::Read)?;
        let msg_type_raw = bytes[1];
        if MsgType::from_u8(msg_type_raw).is_none() {
            return Err(WireError::Read);
        }
        let flags = HeaderFlags::from_byte(bytes[2]);
        let version = bytes[3];
        let mut body_len = [0u8; 4];
        body_len.copy_from_slice(&bytes[4..8]);
        let mut serial = [0u8; 4];
        serial.copy_from_slice(&bytes[8..12]);
        let mut header_len = [0u8; 4];
        header_len.copy_from_slice(&bytes[12..16]);
        Ok(Self { endian, msg_type_raw, flags, version, body_len, serial, header_len })
    }

    /// Serializes this header to its 16-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.endian.to_wire_byte();
        out[1] = self.msg_type_raw;
        out[2] = self.flags.to_byte();
        out[3] = self.version;
        out[4..8].copy_from_slice(&self.body_len);
        out[8..12].copy_from_slice(&self.serial);
        out[12..16].copy_from_slice(&self.header_len);
        out
    }

    /// Declared byte order.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Message kind. Always `Some` for a header built via [`Self::from_bytes`]
    /// or [`Self::new`], which both validate the raw byte.
    #[must_use]
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_u8(self.msg_type_raw)
    }

    /// Header flag bits.
    #[must_use]
    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    /// Mutable access to the header flag bits, for setting `NO_AUTO_START`
    /// etc. before marshalling.
    pub fn flags_mut(&mut self) -> &mut HeaderFlags {
        &mut self.flags
    }

    /// Declared protocol version.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Declared body length in bytes, decoded in this header's endianness.
    #[must_use]
    pub fn body_len(&self) -> u32 {
        read_u32(self.body_len, self.endian)
    }

    /// Patches the body length field.
    pub fn set_body_len(&mut self, v: u32) {
        self.body_len = write_u32(v, self.endian);
    }

    /// Message serial number, decoded in this header's endianness.
    #[must_use]
    pub fn serial(&self) -> u32 {
        read_u32(self.serial, self.endian)
    }

    /// Declared header-field block length in bytes (before 8-byte padding
    /// to the body).
    #[must_use]
    pub fn header_len(&self) -> u32 {
        read_u32(self.header_len, self.endian)
    }

    /// Patches the header-field block length.
    pub fn set_header_len(&mut self, v: u32) {
        self.header_len = write_u32(v, self.endian);
    }
}

/// Reverses the byte order of `bytes` in place — the naive, unambiguously
/// correct implementation used as the reference for [`swap_u64_halves`].
pub fn swap_in_place(bytes: &mut [u8]) {
    bytes.reverse();
}

/// Swaps an 8-byte value by swapping its two 4-byte halves and then each
/// half internally, rather than reversing all 8 bytes in one pass. This is
/// the shape the original flash-constrained implementation used (word-at-a-
/// time swaps are cheaper on some 32-bit cores than a byte-at-a-time
/// reversal); [`tests::u64_half_swap_matches_reversal`] pins it as exactly
/// equivalent to [`swap_in_place`].
pub fn swap_u64_halves(bytes: &mut [u8; 8]) {
    bytes.swap(0, 3);
    bytes.swap(1, 2);
    bytes.swap(4, 7);
    bytes.swap(5, 6);
    bytes.swap(0, 4);
    bytes.swap(1, 5);
    bytes.swap(2, 6);
    bytes.swap(3, 7);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_round_trip() {
        let mut h = MsgHeader::new(Endian::Little, MsgType::MethodCall, 42);
        h.set_body_len(17);
        h.set_header_len(9);
        h.flags_mut().set(HeaderFlags::NO_AUTO_START);
        let bytes = h.to_bytes();
        let parsed = MsgHeader::from_bytes(&bytes).expect("valid header parses");
        assert_eq!(parsed, h);
        assert_eq!(parsed.body_len(), 17);
        assert_eq!(parsed.header_len(), 9);
        assert_eq!(parsed.serial(), 42);
        assert!(parsed.flags().contains(HeaderFlags::NO_AUTO_START));
        assert!(!parsed.flags().contains(HeaderFlags::ENCRYPTED));
    }

    #[test]
    fn big_endian_header_round_trips() {
        let h = MsgHeader::new(Endian::Big, MsgType::Signal, 7);
        let bytes = h.to_bytes();
        assert_eq!(bytes[0], b'B');
        let parsed = MsgHeader::from_bytes(&bytes).expect("valid header parses");
        assert_eq!(parsed.serial(), 7);
    }

    #[test]
    fn reject_unknown_endian_byte() {
        let mut bytes = MsgHeader::new(Endian::Little, MsgType::MethodCall, 1).to_bytes();
        bytes[0] = b'x';
        assert_eq!(MsgHeader::from_bytes(&bytes), Err(WireError::Read));
    }

    #[test]
    fn reject_unknown_msg_type() {
        let mut bytes = MsgHeader::new(Endian::Little, MsgType::MethodCall, 1).to_bytes();
        bytes[1] = 0;
        assert_eq!(MsgHeader::from_bytes(&bytes), Err(WireError::Read));
    }

    #[test]
    fn reject_short_buffer() {
        let bytes = [0u8; HEADER_SIZE - 1];
        assert_eq!(MsgHeader::from_bytes(&bytes), Err(WireError::EndOfData));
    }

    proptest! {
        #[test]
        fn u64_half_swap_matches_reversal(v: u64) {
            let mut a = v.to_le_bytes();
            let mut b = a;
            swap_in_place(&mut a);
            swap_u64_halves(&mut b);
            prop_assert_eq!(a, b);
        }
    }
}

//! Nonce derivation for the secure envelope.

/// The 16-byte symmetric key CCM encrypts and decrypts with.
pub type Key = [u8; 16];

/// A peer's 2-bit role within a session, used to keep each direction's
/// nonce space disjoint even when both sides share the same serial number
/// sequence space momentarily (e.g. after a reconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role(u8);

impl Role {
    /// Wraps a raw role value, masking to the 2 bits the wire format uses.
    #[must_use]
    pub fn new(v: u8) -> Self {
        Self(v & 0x3)
    }

    /// The raw 2-bit value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// The peer's role as seen from the other side of the session: `role
    /// XOR 3`. A receiver that stored its own role locally reconstructs the
    /// sender's role this way when decrypting, rather than negotiating and
    /// storing both directions separately.
    #[must_use]
    pub fn opposite(self) -> Self {
        Self(self.0 ^ 0x3)
    }
}

/// Builds the 5-byte CCM nonce: `[role, serial>>24, serial>>16, serial>>8,
/// serial]`. Serial numbers never repeat within a role's lifetime (the bus
/// skips `0` and `1` and never wraps in practice), so `(role, serial)`
/// uniquely identifies a nonce.
#[must_use]
pub fn build_nonce(role: Role, serial: u32) -> [u8; 5] {
    let b = serial.to_be_bytes();
    [role.value(), b[0], b[1], b[2], b[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_involution() {
        let role = Role::new(1);
        assert_eq!(role.opposite().opposite(), role);
    }

    #[test]
    fn nonce_layout_matches_serial_big_endian() {
        let nonce = build_nonce(Role::new(2), 0x0102_0304);
        assert_eq!(nonce, [2, 0x01, 0x02, 0x03, 0x04]);
    }
}

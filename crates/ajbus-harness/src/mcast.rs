//! An in-memory [`ajbus_core::external::McastTransport`], standing in for
//! the platform adaptation layer's real multicast socket pair (out of
//! scope per spec §1).

use ajbus_core::external::McastTransport;
use ajbus_core::BusError;
use ajbus_wire::{Direction, IoBuf};

/// A [`McastTransport`] that hands out fresh, empty RX/TX [`IoBuf`]s sized
/// for name-service traffic, tracking whether the group is currently
/// joined so a double `mcast_down` or a use-after-down is easy to assert
/// against in a test.
#[derive(Debug)]
pub struct InMemoryMcast {
    buffer_size: usize,
    joined: bool,
}

impl InMemoryMcast {
    /// Builds a fresh, not-yet-joined multicast double with `buffer_size`
    /// bytes of capacity per direction.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size, joined: false }
    }

    /// Whether [`McastTransport::mcast_up`] has been called without a
    /// matching [`McastTransport::mcast_down`] since.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined
    }
}

impl McastTransport for InMemoryMcast {
    fn mcast_up(&mut self) -> Result<(IoBuf, IoBuf), BusError> {
        self.joined = true;
        Ok((IoBuf::new(self.buffer_size, Direction::Rx), IoBuf::new(self.buffer_size, Direction::Tx)))
    }

    fn mcast_down(&mut self) {
        self.joined = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcast_up_marks_joined_and_returns_empty_buffers() {
        let mut m = InMemoryMcast::new(512);
        assert!(!m.is_joined());
        let (rx, tx) = m.mcast_up().expect("joins");
        assert!(m.is_joined());
        assert_eq!(rx.available(), 0);
        assert_eq!(tx.available(), 0);
    }

    #[test]
    fn mcast_down_clears_joined() {
        let mut m = InMemoryMcast::new(512);
        m.mcast_up().expect("joins");
        m.mcast_down();
        assert!(!m.is_joined());
    }
}

//! The reusable, fixed-capacity I/O buffer the codec reads and writes
//! against. One `IoBuf` backs a connection's RX side, another its TX side;
//! neither ever reallocates. Marshal/unmarshal code indexes directly into
//! the backing storage, so [`IoBuf::fill`]/[`IoBuf::drain`] are the only
//! places bytes move across the transport boundary.

use std::time::Duration;

use crate::errors::WireError;

/// Which side of a connection an [`IoBuf`] serves. Only used for
/// diagnostics; the buffer's behavior does not otherwise depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes arriving from the peer.
    Rx,
    /// Bytes queued to send to the peer.
    Tx,
}

/// The transport this buffer pulls from and pushes to. Implemented by the
/// platform adaptation layer (sockets, or a test double); this crate only
/// calls through the trait.
pub trait Transport {
    /// Reads up to `dst.len()` bytes into `dst`, waiting at most `timeout`
    /// for the first byte to arrive. Returns the number of bytes read,
    /// which may be less than `dst.len()` and may be zero only via
    /// [`WireError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Timeout`] if no byte arrives before `timeout`
    /// elapses, or [`WireError::Read`] for any other transport failure.
    fn fill(&mut self, dst: &mut [u8], timeout: Duration) -> Result<usize, WireError>;

    /// Writes as many bytes of `src` as the transport will currently
    /// accept without blocking, returning that count.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Write`] on transport failure.
    fn drain(&mut self, src: &[u8]) -> Result<usize, WireError>;
}

/// A fixed-capacity byte buffer with a read cursor and a write cursor,
/// `0 <= read_cursor <= write_cursor <= capacity`. Bytes between the two
/// cursors are valid, unconsumed data; everything else is free space.
pub struct IoBuf {
    storage: Box<[u8]>,
    read_cursor: usize,
    write_cursor: usize,
    direction: Direction,
    in_body: bool,
}

impl IoBuf {
    /// Allocates a buffer of `capacity` bytes, empty.
    #[must_use]
    pub fn new(capacity: usize, direction: Direction) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            read_cursor: 0,
            write_cursor: 0,
            direction,
            in_body: false,
        }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes available to read between the two cursors.
    #[must_use]
    pub fn available(&self) -> usize {
        self.write_cursor - self.read_cursor
    }

    /// Free space after the write cursor, before compaction.
    #[must_use]
    pub fn trailing_space(&self) -> usize {
        self.storage.len() - self.write_cursor
    }

    /// Which side of a connection this buffer serves.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current read cursor, i.e. bytes already consumed from the front.
    #[must_use]
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Current write cursor, i.e. the end of valid data.
    #[must_use]
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Resets both cursors to zero, discarding any buffered data. Used
    /// between unrelated messages, never mid-message.
    pub fn reset(&mut self) {
        self.read_cursor = 0;
        self.write_cursor = 0;
        self.in_body = false;
    }

    /// Marks that header parsing is complete and a body is now being
    /// streamed; a subsequent timeout is then treated as a desync
    /// ([`WireError::Read`]) rather than a retryable wait, since a partial
    /// body cannot be un-consumed.
    pub fn mark_body_in_progress(&mut self) {
        self.in_body = true;
    }

    /// Bytes needed to reach `cursor % alignment == 0`, for the given
    /// cursor value.
    #[must_use]
    pub fn pad_for(alignment: usize, cursor: usize) -> usize {
        let rem = cursor % alignment;
        if rem == 0 { 0 } else { alignment - rem }
    }

    /// Shifts unread bytes down to offset 0, reclaiming space consumed by
    /// the read cursor. A no-op if the read cursor is already at zero.
    pub fn rebase(&mut self) {
        if self.read_cursor == 0 {
            return;
        }
        let avail = self.available();
        self.storage.copy_within(self.read_cursor..self.write_cursor, 0);
        self.read_cursor = 0;
        self.write_cursor = avail;
    }

    /// Ensures at least `min` bytes are available to read, pulling from
    /// `transport` as needed. Rebases first so that, across the lifetime
    /// of the buffer, a caller never sees [`WireError::Resources`] just
    /// because of fragmentation from earlier reads.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Resources`] if `min` exceeds total capacity.
    /// Returns [`WireError::Timeout`] if no header bytes have been
    /// consumed yet in this message and the transport times out; returns
    /// [`WireError::Read`] if the timeout happens after
    /// [`Self::mark_body_in_progress`] was called, since the stream
    /// position is no longer at a message boundary.
    pub fn fill(&mut self, transport: &mut dyn Transport, min: usize, timeout: Duration) -> Result<(), WireError> {
        self.rebase();
        if min > self.storage.len() {
            return Err(WireError::Resources { needed: min });
        }
        while self.available() < min {
            if self.write_cursor >= self.storage.len() {
                return Err(WireError::Resources { needed: min });
            }
            match transport.fill(&mut self.storage[self.write_cursor..], timeout) {
                Ok(n) => self.write_cursor += n,
                Err(WireError::Timeout) if self.in_body => return Err(WireError::Read),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Pushes all currently-buffered, unread bytes to `transport`,
    /// draining what the transport accepts and leaving the rest for a
    /// later call.
    ///
    /// # Errors
    ///
    /// Propagates [`WireError::Write`] from the transport.
    pub fn drain(&mut self, transport: &mut dyn Transport) -> Result<(), WireError> {
        if self.available() == 0 {
            return Ok(());
        }
        let n = transport.drain(&self.storage[self.read_cursor..self.write_cursor])?;
        self.read_cursor += n;
        if self.read_cursor == self.write_cursor {
            self.read_cursor = 0;
            self.write_cursor = 0;
        }
        Ok(())
    }

    /// Borrows the unread region for direct inspection.
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.storage[self.read_cursor..self.write_cursor]
    }

    /// Borrows the entire written region, absolute-indexed from the buffer
    /// start rather than the read cursor. Used by the secure envelope layer,
    /// which needs the on-wire header bytes as associated data even after
    /// they've been logically consumed by the codec.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.storage[..self.write_cursor]
    }

    /// Mutable access to an absolute byte range already written
    /// (`range.end <= write_cursor`). Used by the secure envelope layer for
    /// in-place CCM encrypt/decrypt over the header-plus-body region.
    pub fn written_mut(&mut self, range: std::ops::Range<usize>) -> &mut [u8] {
        debug_assert!(range.end <= self.write_cursor);
        &mut self.storage[range]
    }

    /// Advances the read cursor by `n` bytes. Callers must have already
    /// verified `n <= available()`.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.read_cursor += n;
    }

    /// Appends `bytes` to the write region for marshalling, growing the
    /// write cursor. Callers must have already verified enough
    /// `trailing_space()` remains (after a [`Self::rebase`] if needed).
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Resources`] if `bytes` does not fit.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        if bytes.len() > self.trailing_space() {
            return Err(WireError::Resources { needed: bytes.len() });
        }
        let start = self.write_cursor;
        self.storage[start..start + bytes.len()].copy_from_slice(bytes);
        self.write_cursor += bytes.len();
        Ok(())
    }

    /// Mutable access to a region of the unread bytes, for in-place
    /// endian swaps during unmarshal. `range` is relative to the read
    /// cursor, not absolute.
    pub fn unread_mut(&mut self, range: std::ops::Range<usize>) -> &mut [u8] {
        let base = self.read_cursor;
        &mut self.storage[base + range.start..base + range.end]
    }

    /// Overwrites `bytes.len()` bytes at the absolute buffer offset
    /// `at`, which must already have been written (`at + bytes.len() <=
    /// write_cursor()`). Used to patch an array's length placeholder once
    /// its element count is known, after the elements themselves have
    /// already been written.
    pub fn patch_absolute(&mut self, at: usize, bytes: &[u8]) {
        debug_assert!(at + bytes.len() <= self.write_cursor);
        self.storage[at..at + bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTransport {
        data: Vec<u8>,
        pos: usize,
    }

    impl Transport for FixedTransport {
        fn fill(&mut self, dst: &mut [u8], _timeout: Duration) -> Result<usize, WireError> {
            if self.pos >= self.data.len() {
                return Err(WireError::Timeout);
            }
            let n = dst.len().min(self.data.len() - self.pos);
            dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn drain(&mut self, src: &[u8]) -> Result<usize, WireError> {
            self.data.extend_from_slice(src);
            Ok(src.len())
        }
    }

    #[test]
    fn fill_pulls_until_min_satisfied() {
        let mut t = FixedTransport { data: vec![1, 2, 3, 4, 5], pos: 0 };
        let mut buf = IoBuf::new(16, Direction::Rx);
        buf.fill(&mut t, 5, Duration::from_millis(10)).expect("fills");
        assert_eq!(buf.unread(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn rebase_reclaims_consumed_space() {
        let mut t = FixedTransport { data: vec![0; 10], pos: 0 };
        let mut buf = IoBuf::new(10, Direction::Rx);
        buf.fill(&mut t, 10, Duration::from_millis(10)).expect("fills");
        buf.consume(4);
        buf.rebase();
        assert_eq!(buf.read_cursor(), 0);
        assert_eq!(buf.available(), 6);
        assert_eq!(buf.trailing_space(), 4);
    }

    #[test]
    fn fill_rejects_min_over_capacity() {
        let mut t = FixedTransport { data: vec![0; 4], pos: 0 };
        let mut buf = IoBuf::new(4, Direction::Rx);
        let err = buf.fill(&mut t, 5, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, WireError::Resources { needed: 5 });
    }

    #[test]
    fn timeout_mid_body_becomes_read_error() {
        let mut t = FixedTransport { data: vec![1, 2], pos: 0 };
        let mut buf = IoBuf::new(8, Direction::Rx);
        buf.fill(&mut t, 2, Duration::from_millis(10)).expect("fills header bytes");
        buf.mark_body_in_progress();
        let err = buf.fill(&mut t, 4, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, WireError::Read);
    }

    #[test]
    fn append_then_drain_round_trips() {
        let mut t = FixedTransport { data: Vec::new(), pos: 0 };
        let mut buf = IoBuf::new(16, Direction::Tx);
        buf.append(&[9, 8, 7]).expect("fits");
        buf.drain(&mut t).expect("drains");
        assert_eq!(t.data, vec![9, 8, 7]);
        assert_eq!(buf.available(), 0);
    }
}

//! An in-memory byte pipe implementing [`ajbus_wire::Transport`] on each
//! end, plus a deterministic-jitter wrapper for exercising timeout/retry
//! paths without a real clock.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use ajbus_wire::{Transport, WireError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

type Queue = Rc<RefCell<VecDeque<u8>>>;

/// One end of an in-memory duplex pipe: bytes [`Self::drain`] writes land
/// in the peer's [`Self::fill`] queue and vice versa. Built on `Rc<RefCell>`
/// rather than a channel, matching the library's single-threaded
/// cooperative concurrency model (see spec §5) — there is no cross-thread
/// handoff to synchronize.
pub struct PipeEnd {
    inbound: Queue,
    outbound: Queue,
}

impl Transport for PipeEnd {
    fn fill(&mut self, dst: &mut [u8], _timeout: Duration) -> Result<usize, WireError> {
        let mut q = self.inbound.borrow_mut();
        if q.is_empty() {
            return Err(WireError::Timeout);
        }
        let n = dst.len().min(q.len());
        for slot in dst.iter_mut().take(n) {
            *slot = q.pop_front().expect("checked non-empty above");
        }
        Ok(n)
    }

    fn drain(&mut self, src: &[u8]) -> Result<usize, WireError> {
        self.outbound.borrow_mut().extend(src.iter().copied());
        Ok(src.len())
    }
}

/// A connected pair of [`PipeEnd`]s, one for each side of a loopback bus
/// attachment test.
pub struct DuplexPipe;

impl DuplexPipe {
    /// Builds a fresh, empty pipe and returns its two ends.
    #[must_use]
    pub fn new() -> (PipeEnd, PipeEnd) {
        let a_to_b: Queue = Rc::new(RefCell::new(VecDeque::new()));
        let b_to_a: Queue = Rc::new(RefCell::new(VecDeque::new()));
        (
            PipeEnd { inbound: b_to_a.clone(), outbound: a_to_b.clone() },
            PipeEnd { inbound: a_to_b, outbound: b_to_a },
        )
    }
}

/// Wraps a [`Transport`] and deterministically fails a fraction of
/// [`Transport::fill`] calls with [`WireError::Timeout`], seeded so a test
/// run is reproducible. Used to exercise the codec's timeout-before-header
/// vs. timeout-mid-body distinction (spec §5) without a real clock or
/// flaky socket.
pub struct FlakyTransport<T> {
    inner: T,
    rng: ChaCha8Rng,
    drop_probability: f64,
}

impl<T: Transport> FlakyTransport<T> {
    /// Wraps `inner`, failing `fill` with probability `drop_probability`
    /// (`0.0..=1.0`), reproducibly for a given `seed`.
    #[must_use]
    pub fn new(inner: T, seed: u64, drop_probability: f64) -> Self {
        Self { inner, rng: ChaCha8Rng::seed_from_u64(seed), drop_probability }
    }
}

impl<T: Transport> Transport for FlakyTransport<T> {
    fn fill(&mut self, dst: &mut [u8], timeout: Duration) -> Result<usize, WireError> {
        if self.rng.gen_bool(self.drop_probability) {
            return Err(WireError::Timeout);
        }
        self.inner.fill(dst, timeout)
    }

    fn drain(&mut self, src: &[u8]) -> Result<usize, WireError> {
        self.inner.drain(src)
    }
}

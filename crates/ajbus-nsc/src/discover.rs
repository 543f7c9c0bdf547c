//! The discover loop: send WHO-HAS, wait for a matching IS-AT, repeat until
//! an overall deadline expires. Takes injected transport and clock so it's
//! unit-testable without a real multicast socket.

use tracing::debug;

use crate::error::NsError;
use crate::packet::{compose_who_has, parse_is_at, DiscoveredService};

/// Per-attempt receive timeout: how long [`discover`] waits for an IS-AT
/// reply to one WHO-HAS before sending another.
pub const RX_TIMEOUT_MS: u32 = 1000;

/// The multicast transport [`discover`] needs: send a composed WHO-HAS
/// packet, and receive into a buffer with a per-call timeout.
pub trait NsTransport {
    /// Sends `packet` to the multicast group.
    ///
    /// # Errors
    ///
    /// Returns [`NsError::Resources`] if the transport can't queue it.
    fn send(&mut self, packet: &[u8]) -> Result<(), NsError>;

    /// Waits up to `timeout_ms` for one incoming packet, writing it into
    /// `buf` and returning its length.
    ///
    /// # Errors
    ///
    /// Returns [`NsError::Timeout`] if nothing arrives in time.
    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, NsError>;
}

/// A monotonic millisecond clock, injected so the discover loop's deadline
/// arithmetic is testable without sleeping in real time.
pub trait Clock {
    /// Current time in milliseconds since an arbitrary, caller-consistent
    /// epoch.
    fn now_ms(&self) -> u64;
}

/// Sends WHO-HAS for `prefix` and waits for a matching IS-AT, repeating
/// until `timeout_ms` total has elapsed.
///
/// Mirrors the original two-nested-timeout shape: each WHO-HAS round waits
/// up to [`RX_TIMEOUT_MS`] for a reply before sending another, while the
/// outer loop's remaining budget is decremented by the wall time actually
/// spent each round (not by a fixed increment), so slow receives shrink the
/// number of rounds that fit rather than overrunning the deadline.
///
/// # Errors
///
/// Returns [`NsError::NoMatch`] if `timeout_ms` expires with no match.
/// Propagates [`NsError::Resources`] if `prefix` doesn't fit a WHO-HAS
/// packet, or any parse error from a malformed reply.
pub fn discover(
    transport: &mut dyn NsTransport,
    clock: &dyn Clock,
    prefix: &str,
    mut timeout_ms: u32,
) -> Result<DiscoveredService, NsError> {
    let mut who_has = [0u8; 256];

    while timeout_ms > 0 {
        let round_start = clock.now_ms();
        let n = compose_who_has(&mut who_has, prefix)?;
        transport.send(&who_has[..n])?;
        debug!(prefix, "sent WHO-HAS");

        let mut recv_buf = [0u8; 512];
        loop {
            match transport.recv(&mut recv_buf, RX_TIMEOUT_MS) {
                Ok(len) => {
                    if let Ok(service) = parse_is_at(&recv_buf[..len], prefix) {
                        return Ok(service);
                    }
                }
                Err(NsError::Timeout) => {}
                Err(e) => return Err(e),
            }
            if clock.now_ms().saturating_sub(round_start) > u64::from(RX_TIMEOUT_MS) {
                break;
            }
        }

        let round_elapsed = clock.now_ms().saturating_sub(round_start) as u32;
        timeout_ms = timeout_ms.saturating_sub(round_elapsed);
    }

    Err(NsError::NoMatch)
}

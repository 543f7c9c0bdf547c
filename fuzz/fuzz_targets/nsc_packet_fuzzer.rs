//! Fuzz target for `parse_is_at`, the name-service IS-AT packet parser.
//!
//! The multicast name service trusts packets from any host on the local
//! segment, so `parse_is_at` is the one parser in this crate that
//! adversarial bytes reach without a prior authenticated handshake. It must
//! reject anything malformed with a structured `NsError`, never panic on
//! truncated length-prefixed blocks or an out-of-range answer count.

#![no_main]

use ajbus_nsc::parse_is_at;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    packet: &'a [u8],
    prefix: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let _ = parse_is_at(input.packet, input.prefix);
});

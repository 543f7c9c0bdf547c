//! Fuzz target for `Message::unmarshal`.
//!
//! Feeds arbitrary bytes through a duplex pipe and into the header/body
//! unmarshaller. The codec must never panic on malformed input — bad
//! endian tags, truncated header-field blocks, and signatures that don't
//! match a declared type all have to surface as `WireError`, not a crash.

#![no_main]

use std::time::Duration;

use ajbus_harness::DuplexPipe;
use ajbus_wire::{Direction, IoBuf, Message, Transport};
use libfuzzer_sys::fuzz_target;

const TIMEOUT: Duration = Duration::from_millis(1);

fuzz_target!(|data: &[u8]| {
    let (mut tx, mut rx) = DuplexPipe::new();
    if tx.drain(data).is_err() {
        return;
    }

    let mut rx_buf = IoBuf::new(data.len().max(64), Direction::Rx);
    if let Ok(mut msg) = Message::unmarshal(&mut rx_buf, &mut rx, TIMEOUT) {
        // Draining the body through the declared signature must also
        // never panic, regardless of what bytes follow the header.
        while msg.unmarshal_arg(&mut rx, TIMEOUT).is_ok() {}
    }
});

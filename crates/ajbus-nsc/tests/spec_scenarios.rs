//! Byte-exact check of `compose_who_has` against a fixed prefix, matching
//! the conformance-style fixed inputs a foreign implementation's test
//! suite would also check against.

use ajbus_nsc::compose_who_has;

/// Composing a WHO-HAS query for prefix `"foo"` must start with the fixed
/// version/count/ttl/message-type bytes, a name count of 1, a 4-byte name
/// length (the prefix plus its trailing `*`), then the prefix itself and a
/// trailing `*`.
#[test]
fn compose_who_has_matches_fixed_byte_layout() {
    let mut out = [0u8; 32];
    let n = compose_who_has(&mut out, "foo").expect("composes");
    let expected: &[u8] = &[0x11, 0x01, 0x00, 0x00, 0x80, 0x01, 0x04, b'f', b'o', b'o', b'*'];
    assert_eq!(&out[..n], expected);
}

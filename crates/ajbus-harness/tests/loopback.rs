//! End-to-end loopback tests driving the wire codec and secure envelope
//! together over the in-memory doubles, rather than each crate's own unit
//! tests exercising one layer at a time.

use std::time::Duration;

use ajbus_core::external::{select_key_for_decrypt, select_key_for_encrypt};
use ajbus_crypto::{decrypt, encrypt, AesCcmCipher};
use ajbus_harness::{DuplexPipe, InMemoryKeyStore};
use ajbus_wire::{ArgValue, ArgView, Direction, Endian, HeaderFields, HeaderFlags, IoBuf, Message, MsgType, Role};

const TIMEOUT: Duration = Duration::from_millis(50);

#[test]
fn plaintext_method_call_round_trips_over_duplex_pipe() {
    let (mut client, mut server) = DuplexPipe::new();

    let mut tx_buf = IoBuf::new(256, Direction::Tx);
    let fields = HeaderFields::default()
        .with_object_path("/sample")
        .with_interface("org.example.Sample")
        .with_member("Concat")
        .with_destination("org.example.Service")
        .with_signature("ss");
    let mut msg = Message::begin(&mut tx_buf, Endian::host(), MsgType::MethodCall, 2, HeaderFlags::default(), fields)
        .expect("begin");
    msg.marshal_arg(ArgValue::Str("hello")).expect("marshal hello");
    msg.marshal_arg(ArgValue::Str("world")).expect("marshal world");
    msg.close(&mut client, TIMEOUT).expect("close");
    tx_buf.drain(&mut client).expect("drain");

    let mut rx_buf = IoBuf::new(256, Direction::Rx);
    let mut received = Message::unmarshal(&mut rx_buf, &mut server, TIMEOUT).expect("unmarshal");
    assert_eq!(received.fields().member.as_deref(), Some("Concat"));
    assert_eq!(received.unmarshal_arg(&mut server, TIMEOUT).expect("arg1"), ArgView::Str("hello"));
    assert_eq!(received.unmarshal_arg(&mut server, TIMEOUT).expect("arg2"), ArgView::Str("world"));
    received.close(&mut server, TIMEOUT).expect("close rx");
}

/// Each side of a session holds its own keystore, indexed by the *other*
/// party's name and storing its own locally-known role — exactly like two
/// real bus attachments would, neither one able to see the other's key
/// store. The receiver's stored role is the sender's role XORed with `3`
/// (`Role::opposite`), matching how a real session negotiation would have
/// assigned complementary roles to each side.
#[test]
fn encrypted_signal_round_trips_through_keystore_resolved_keys() {
    let (mut sender_transport, mut receiver_transport) = DuplexPipe::new();
    let key = [0x42u8; 16];
    let sender_role = Role::new(2);
    let sender_keystore = InMemoryKeyStore::new().with_session("org.example.receiver", key, sender_role);
    let receiver_keystore =
        InMemoryKeyStore::new().with_session("org.example.sender", key, sender_role.opposite());
    let cipher = AesCcmCipher;

    let mut tx_buf = IoBuf::new(256, Direction::Tx);
    let fields = HeaderFields::default()
        .with_object_path("/sample")
        .with_interface("org.example.Sample")
        .with_member("Ping")
        .with_destination("org.example.receiver")
        .with_sender("org.example.sender")
        .with_signature("u");
    let mut flags = HeaderFlags::default();
    flags.set(HeaderFlags::ENCRYPTED);
    let mut msg = Message::begin(&mut tx_buf, Endian::host(), MsgType::Signal, 9, flags, fields.clone()).expect("begin");
    msg.marshal_arg(ArgValue::Uint32(99)).expect("marshal arg");
    let (key, role) = select_key_for_encrypt(&sender_keystore, MsgType::Signal, &fields).expect("encrypt key");
    encrypt(&mut msg, &cipher, &key, role).expect("encrypt");
    msg.close(&mut sender_transport, TIMEOUT).expect("close");
    tx_buf.drain(&mut sender_transport).expect("drain");

    let mut rx_buf = IoBuf::new(256, Direction::Rx);
    let mut received = Message::unmarshal(&mut rx_buf, &mut receiver_transport, TIMEOUT).expect("unmarshal header");
    let (key, role) =
        select_key_for_decrypt(&receiver_keystore, MsgType::Signal, received.fields()).expect("decrypt key");
    decrypt(&mut received, &cipher, &key, role, &mut receiver_transport, TIMEOUT).expect("decrypt");
    assert_eq!(received.unmarshal_arg(&mut receiver_transport, TIMEOUT).expect("arg"), ArgView::Uint32(99));
    received.close(&mut receiver_transport, TIMEOUT).expect("close rx");
}

mod common;

use common::Pair;

use timpl::message::{
    ContentType, Finished, HandshakeHeader, MessageType, ProtocolVersion, TlsRecord,
};
use timpl::session::{MemoryCache, MemoryDurable, TieredStore};
use timpl::{Buf, Config, Error, HandshakeState};

#[test]
fn full_handshake_establishes_both_sides() {
    let mut pair = Pair::new();
    pair.shuttle().unwrap();

    assert_eq!(pair.client.state(), HandshakeState::Established);
    assert_eq!(pair.server.state(), HandshakeState::Established);

    // Both sides derived the same session.
    let client_blob = pair.client.session_blob().unwrap();
    let server_blob = pair.server.session_blob().unwrap();
    assert_eq!(*client_blob, *server_blob);

    // The blob is opaque to the store and comes back intact.
    let mut store = TieredStore::new(MemoryCache::default(), MemoryDurable::default());
    assert!(store.set("conn1", &client_blob).unwrap());
    assert_eq!(store.get("conn1").unwrap(), Some(client_blob.to_vec()));
}

#[test]
fn application_data_both_directions() {
    let mut pair = Pair::new();
    pair.shuttle().unwrap();

    pair.client.send_application_data(b"ping").unwrap();
    pair.server.send_application_data(b"pong").unwrap();
    pair.shuttle().unwrap();

    assert_eq!(pair.server_rx, b"ping");
    assert_eq!(pair.client_rx, b"pong");
}

#[test]
fn data_written_before_handshake_flushes_after() {
    let mut pair = Pair::new();

    // Queued before any packet has flowed.
    pair.client.send_application_data(b"early bird").unwrap();
    pair.shuttle().unwrap();

    assert_eq!(pair.client.state(), HandshakeState::Established);
    assert_eq!(pair.server_rx, b"early bird");
}

#[test]
fn byte_at_a_time_delivery_is_equivalent() {
    let mut pair = Pair::new();
    pair.shuttle_chunked(1).unwrap();

    assert_eq!(pair.client.state(), HandshakeState::Established);
    assert_eq!(pair.server.state(), HandshakeState::Established);

    pair.client.send_application_data(b"trickle").unwrap();
    pair.shuttle_chunked(1).unwrap();
    assert_eq!(pair.server_rx, b"trickle");
}

#[test]
fn each_offered_cipher_negotiates() {
    for name in ["rc4", "3des-cbc", "aes128-cbc", "aes256-cbc"] {
        let config = || Config::new().with_offered_ciphers(&[name]);
        let mut pair = Pair::with_configs(config(), config());
        pair.shuttle().unwrap();

        pair.client.send_application_data(b"hello").unwrap();
        pair.shuttle().unwrap();
        assert_eq!(pair.server_rx, b"hello", "cipher {}", name);
    }
}

#[test]
fn no_common_cipher_fails_handshake() {
    let mut pair = Pair::with_configs(
        Config::new().with_offered_ciphers(&["rc4"]),
        Config::new().with_offered_ciphers(&["aes128-cbc"]),
    );

    let err = pair.shuttle().unwrap_err();
    assert!(matches!(err, Error::UnsupportedCipher(_)));
    assert_eq!(pair.server.state(), HandshakeState::Failed);
}

#[test]
fn tampered_record_is_fatal_and_permanent() {
    let mut pair = Pair::new();
    pair.shuttle().unwrap();

    pair.client.send_application_data(b"sensitive").unwrap();

    // Capture the record and corrupt one ciphertext byte.
    let mut buf = [0u8; 32 * 1024];
    let packet = match pair.client.poll_output(&mut buf).unwrap() {
        timpl::Output::Packet(p) => p.to_vec(),
        other => panic!("expected packet, got {:?}", other),
    };
    let mut corrupted = packet.clone();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;

    let err = pair.server.handle_input(&corrupted).unwrap_err();
    assert!(matches!(err, Error::RecordIntegrity(_)));
    assert_eq!(pair.server.state(), HandshakeState::Failed);

    // Failed is terminal: even valid input is refused now.
    let err = pair.server.handle_input(&packet).unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed));
}

#[test]
fn abort_mid_handshake_is_terminal() {
    let mut pair = Pair::new();

    // Exchange the hellos, then cancel before the key exchange.
    let mut buf = [0u8; 32 * 1024];
    let hello_flight = match pair.client.poll_output(&mut buf).unwrap() {
        timpl::Output::Packet(p) => p.to_vec(),
        other => panic!("expected packet, got {:?}", other),
    };
    pair.server.handle_input(&hello_flight).unwrap();
    let reply = match pair.server.poll_output(&mut buf).unwrap() {
        timpl::Output::Packet(p) => p.to_vec(),
        other => panic!("expected packet, got {:?}", other),
    };

    pair.client.abort();
    assert_eq!(pair.client.state(), HandshakeState::Failed);
    assert!(pair.client.session_blob().is_none());

    // Every entry point refuses the dead connection.
    assert!(matches!(
        pair.client.handle_input(&reply),
        Err(Error::ConnectionFailed)
    ));
    assert!(matches!(
        pair.client.poll_output(&mut buf),
        Err(Error::ConnectionFailed)
    ));
    assert!(matches!(
        pair.client.send_application_data(b"x"),
        Err(Error::ConnectionFailed)
    ));
}

#[test]
fn key_change_before_negotiation_is_fatal() {
    let mut pair = Pair::new();

    // A key change with no handshake behind it has no keys to promote.
    let mut rogue = Buf::new();
    TlsRecord {
        content_type: ContentType::ChangeCipherSpec,
        version: ProtocolVersion::TLS1_2,
        length: 1,
        fragment: &[1],
    }
    .serialize(&mut rogue);

    let err = pair.server.handle_input(&rogue).unwrap_err();
    assert!(matches!(err, Error::KeyChangeWithoutPending));
    assert_eq!(pair.server.state(), HandshakeState::Failed);
}

fn raw_handshake_record(msg_type: MessageType, body: &[u8]) -> Vec<u8> {
    let mut msg = Buf::new();
    HandshakeHeader {
        msg_type,
        length: body.len() as u32,
    }
    .serialize(&mut msg);
    msg.extend_from_slice(body);

    let mut out = Buf::new();
    TlsRecord {
        content_type: ContentType::Handshake,
        version: ProtocolVersion::TLS1_2,
        length: msg.len() as u16,
        fragment: &msg,
    }
    .serialize(&mut out);
    out.to_vec()
}

#[test]
fn out_of_order_finished_is_sequence_error() {
    common::init_log();
    let mut pair = Pair::new();

    // Let the hellos flow normally, then inject a Finished where the server
    // expects the key exchange.
    let mut buf = [0u8; 32 * 1024];
    let hello_flight = match pair.client.poll_output(&mut buf).unwrap() {
        timpl::Output::Packet(p) => p.to_vec(),
        other => panic!("expected packet, got {:?}", other),
    };
    pair.server.handle_input(&hello_flight).unwrap();

    let mut body = Buf::new();
    Finished {
        verify_data: [0u8; 32],
    }
    .serialize(&mut body);
    let rogue = raw_handshake_record(MessageType::Finished, &body);

    let err = pair.server.handle_input(&rogue).unwrap_err();
    assert!(matches!(
        err,
        Error::ProtocolSequence {
            expected: MessageType::KeyExchange,
            got: MessageType::Finished,
        }
    ));
    assert_eq!(pair.server.state(), HandshakeState::Failed);

    // Permanently unusable.
    assert!(matches!(
        pair.server.send_application_data(b"x"),
        Err(Error::ConnectionFailed)
    ));
}

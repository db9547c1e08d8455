#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Frame decoder integration tests: fragmentation, limits, dispatch.

mod common;

use common::{
    frame, BlobPacket, Dispatched, Observations, PLAY_CHAT, STATUS_REQUEST, STATUS_RESPONSE,
};
use packet_engine::config::EngineConfig;
use packet_engine::{Connection, ProtocolError, ProtocolState};
use std::sync::Arc;

#[tokio::test]
async fn status_request_over_single_byte_reads() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(1);
    conn.set_state(ProtocolState::Status);

    // Raw id 0x00, one payload byte: VarInt(2) | 0x00 | 0xAB
    let bytes = frame(0x00, &[0xAB]);
    assert_eq!(bytes.len(), 3);

    // Delivered as three separate 1-byte socket reads; the message is
    // complete only after the third byte
    for (i, byte) in bytes.iter().enumerate() {
        engine.ingest(&conn, &[*byte]).unwrap();
        let expected = usize::from(i == bytes.len() - 1);
        assert_eq!(observations.packet_count(), expected, "after byte {i}");
    }

    // Dispatched exactly once; trimming left nothing buffered
    assert_eq!(observations.packet_count(), 1);
    assert_eq!(conn.pending_recv_bytes(), 0);
    assert_eq!(
        observations.packets.lock().unwrap()[0],
        Dispatched {
            kind: STATUS_REQUEST,
            payload: vec![0xAB],
        }
    );
}

#[tokio::test]
async fn empty_payload_request_dispatches_once() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(2);
    conn.set_state(ProtocolState::Status);

    // VarInt(1) | 0x00 — two bytes, fed one at a time
    let bytes = frame(0x00, &[]);
    engine.ingest(&conn, &bytes[..1]).unwrap();
    assert_eq!(observations.packet_count(), 0);
    engine.ingest(&conn, &bytes[1..]).unwrap();

    assert_eq!(observations.packet_count(), 1);
    assert_eq!(conn.pending_recv_bytes(), 0);
}

#[tokio::test]
async fn split_invariance_across_all_boundaries() {
    // Three back-to-back frames with distinct payloads
    let mut stream = Vec::new();
    stream.extend_from_slice(&frame(0x10, b"alpha"));
    stream.extend_from_slice(&frame(0x10, &[]));
    stream.extend_from_slice(&frame(0x10, &vec![0x7E; 300])); // 2-byte length prefix

    // Reference: single delivery
    let reference = {
        let observations = Arc::new(Observations::default());
        let engine = common::recording_engine(&observations);
        let (conn, _rx) = Connection::new(3);
        conn.set_state(ProtocolState::Play);
        engine.ingest(&conn, &stream).unwrap();
        let packets = observations.packets.lock().unwrap().clone();
        packets
    };
    assert_eq!(reference.len(), 3);
    assert!(reference.iter().all(|p| p.kind == PLAY_CHAT));

    // Split at every possible byte boundary
    for split in 1..stream.len() {
        let observations = Arc::new(Observations::default());
        let engine = common::recording_engine(&observations);
        let (conn, _rx) = Connection::new(100 + split as u64);
        conn.set_state(ProtocolState::Play);

        engine.ingest(&conn, &stream[..split]).unwrap();
        engine.ingest(&conn, &stream[split..]).unwrap();

        let packets = observations.packets.lock().unwrap().clone();
        assert_eq!(packets, reference, "split at byte {split}");
        assert_eq!(conn.pending_recv_bytes(), 0, "split at byte {split}");
    }
}

#[tokio::test]
async fn oversized_declared_length_terminates_without_dispatch() {
    let observations = Arc::new(Observations::default());
    let config = EngineConfig::default_with_overrides(|c| {
        c.framing.max_message_size = 1024;
    });
    let engine = common::recording_engine_with(&observations, config);
    let (conn, _rx) = Connection::new(4);
    conn.set_state(ProtocolState::Status);

    // Declares 1025 bytes; only the prefix is ever sent
    let mut bytes = Vec::new();
    packet_engine::core::varint::write_varint(&mut bytes, 1025);
    let result = engine.ingest(&conn, &bytes);

    assert!(matches!(
        result,
        Err(ProtocolError::OversizedMessage {
            declared: 1025,
            max: 1024
        })
    ));
    assert_eq!(observations.packet_count(), 0);
    assert!(!conn.accepts_data());
    assert_eq!(
        engine
            .metrics()
            .protocol_errors
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn negative_declared_length_terminates() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(11);
    conn.set_state(ProtocolState::Status);

    let mut bytes = Vec::new();
    packet_engine::core::varint::write_varint(&mut bytes, -1);
    let result = engine.ingest(&conn, &bytes);

    assert!(matches!(
        result,
        Err(ProtocolError::OversizedMessage { declared: -1, .. })
    ));
    assert!(!conn.accepts_data());
    assert_eq!(observations.packet_count(), 0);
}

#[tokio::test]
async fn unknown_packet_id_is_invalid_data() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(5);
    conn.set_state(ProtocolState::Status);

    let result = engine.ingest(&conn, &frame(0x7A, &[]));
    assert!(matches!(
        result,
        Err(ProtocolError::UnknownPacketId {
            state: ProtocolState::Status,
            raw_id: 0x7A
        })
    ));
    assert!(!conn.accepts_data());
    assert_eq!(observations.packet_count(), 0);
}

#[tokio::test]
async fn malformed_packet_id_is_invalid_data() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(6);
    conn.set_state(ProtocolState::Status);

    // Declared length 6, then six continuation bytes where the id should be
    let bytes = vec![0x06, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80];
    let result = engine.ingest(&conn, &bytes);
    assert!(matches!(result, Err(ProtocolError::MalformedPacketId)));
    assert!(!conn.accepts_data());
}

#[tokio::test]
async fn state_override_selects_dispatch_partition() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(7);
    conn.set_state(ProtocolState::Play);

    // Raw id 0x00 only resolves in the Status partition
    let bytes = frame(0x00, &[]);
    engine
        .ingest_with_override(&conn, &bytes, Some(ProtocolState::Status))
        .unwrap();

    assert_eq!(observations.packet_count(), 1);
    assert_eq!(
        observations.packets.lock().unwrap()[0].kind,
        STATUS_REQUEST
    );
}

#[tokio::test]
async fn state_override_covers_only_the_first_message() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(12);
    conn.set_state(ProtocolState::Play);

    // First frame needs the Status partition; the second (raw id 0x10) only
    // resolves in Play, so a lingering override would reject it
    let mut bytes = frame(0x00, &[]);
    bytes.extend_from_slice(&frame(0x10, b"chat"));
    engine
        .ingest_with_override(&conn, &bytes, Some(ProtocolState::Status))
        .unwrap();

    let packets = observations.packets.lock().unwrap();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].kind, STATUS_REQUEST);
    assert_eq!(packets[1].kind, PLAY_CHAT);
    assert!(conn.accepts_data());
}

#[tokio::test]
async fn handler_overrun_drops_packet_but_not_stream() {
    use packet_engine::protocol::{HandlerRegistry, PacketKind};

    let mut registry = HandlerRegistry::new();
    // Handler asks for more bytes than its frame holds
    registry
        .register(STATUS_REQUEST, |_ctx, payload| {
            payload.read_bytes(64)?;
            Ok(())
        })
        .unwrap();
    let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    registry
        .register(PacketKind(99), move |_ctx, _payload| {
            hits_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    registry.register_legacy(|_, _| Ok(())).unwrap();

    let mut decode = packet_engine::DispatchTable::new();
    decode
        .register(ProtocolState::Status, 0x00, STATUS_REQUEST)
        .unwrap();
    decode
        .register(ProtocolState::Status, 0x05, PacketKind(99))
        .unwrap();

    let engine = packet_engine::ProtocolEngine::new(
        EngineConfig::default(),
        decode,
        common::encode_table(),
        registry,
    )
    .unwrap();

    let (conn, _rx) = Connection::new(8);
    conn.set_state(ProtocolState::Status);

    // Overrunning packet followed by a healthy one: only the first is lost
    let mut stream = frame(0x00, &[0x01]);
    stream.extend_from_slice(&frame(0x05, &[]));
    engine.ingest(&conn, &stream).unwrap();

    assert!(conn.accepts_data());
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(conn.pending_recv_bytes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handler_response_reaches_the_wire() {
    use packet_engine::protocol::HandlerRegistry;

    let mut registry = HandlerRegistry::new();
    registry
        .register(STATUS_REQUEST, |ctx, _payload| {
            ctx.send(Box::new(BlobPacket {
                kind: STATUS_RESPONSE,
                body: b"pong".to_vec(),
            }))
        })
        .unwrap();
    registry.register_legacy(|_, _| Ok(())).unwrap();

    // Only STATUS_REQUEST is decodable here, so the registry is complete
    let mut decode = packet_engine::DispatchTable::new();
    decode
        .register(ProtocolState::Status, 0x00, STATUS_REQUEST)
        .unwrap();

    let engine = packet_engine::ProtocolEngine::new(
        EngineConfig::default(),
        decode,
        common::encode_table(),
        registry,
    )
    .unwrap();
    engine.start();

    let (conn, mut rx) = Connection::new(9);
    conn.set_state(ProtocolState::Status);
    engine.ingest(&conn, &frame(0x00, &[])).unwrap();

    // VarInt(5) | 0x00 | "pong"
    let flushed = rx.recv().await.expect("response should be flushed");
    assert_eq!(flushed.as_ref(), [0x05, 0x00, b'p', b'o', b'n', b'g']);

    engine
        .shutdown(packet_engine::ShutdownMode::Graceful)
        .await
        .unwrap();
}

#[tokio::test]
async fn receive_loop_dispatches_and_stops_at_eof() {
    let observations = Arc::new(Observations::default());
    let engine = common::recording_engine(&observations);
    let (conn, _rx) = Connection::new(10);
    conn.set_state(ProtocolState::Play);

    let mut stream = frame(0x10, b"hello");
    stream.extend_from_slice(&frame(0x10, b"world"));

    let mut reader = std::io::Cursor::new(stream);
    engine.receive_loop(&conn, &mut reader).await.unwrap();

    assert_eq!(observations.packet_count(), 2);
    assert!(!conn.accepts_data());
}

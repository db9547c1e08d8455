//! Shared fixtures for the integration suites.
#![allow(dead_code, clippy::unwrap_used)]

use packet_engine::config::EngineConfig;
use packet_engine::core::frame::PayloadCursor;
use packet_engine::error::Result;
use packet_engine::protocol::{DispatchTable, HandlerRegistry, PacketKind, ProtocolState};
use packet_engine::{OutboundPacket, ProtocolEngine};
use std::sync::{Arc, Mutex};

pub const STATUS_REQUEST: PacketKind = PacketKind(1);
pub const STATUS_RESPONSE: PacketKind = PacketKind(2);
pub const PLAY_CHAT: PacketKind = PacketKind(3);
pub const PLAY_SEQUENCED: PacketKind = PacketKind(4);

/// One dispatched inbound packet as seen by the recording handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub kind: PacketKind,
    pub payload: Vec<u8>,
}

/// Everything the recording handlers observed.
#[derive(Debug, Default)]
pub struct Observations {
    pub packets: Mutex<Vec<Dispatched>>,
    /// Legacy ping invocations, each with the optional sub-packet bytes.
    pub legacy: Mutex<Vec<Option<Vec<u8>>>>,
}

impl Observations {
    pub fn packet_count(&self) -> usize {
        self.packets.lock().unwrap().len()
    }

    pub fn legacy_count(&self) -> usize {
        self.legacy.lock().unwrap().len()
    }
}

fn recording_handler(
    kind: PacketKind,
    observations: &Arc<Observations>,
) -> impl Fn(
    &packet_engine::protocol::HandlerContext<'_>,
    &mut PayloadCursor<'_>,
) -> Result<()>
       + Send
       + Sync
       + 'static {
    let observations = Arc::clone(observations);
    move |_ctx, payload| {
        observations.packets.lock().unwrap().push(Dispatched {
            kind,
            payload: payload.read_rest().to_vec(),
        });
        Ok(())
    }
}

/// Decode table used by most suites: Status 0x00/0x01, Play 0x10/0x11.
pub fn decode_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    table
        .register(ProtocolState::Status, 0x00, STATUS_REQUEST)
        .unwrap();
    table
        .register(ProtocolState::Play, 0x10, PLAY_CHAT)
        .unwrap();
    table
}

/// Encode table: Status 0x00 response, Play 0x40 sequenced payload.
pub fn encode_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    table
        .register(ProtocolState::Status, 0x00, STATUS_RESPONSE)
        .unwrap();
    table
        .register(ProtocolState::Play, 0x40, PLAY_SEQUENCED)
        .unwrap();
    table
}

/// Registry with recording handlers for every decodable kind plus legacy.
pub fn recording_registry(observations: &Arc<Observations>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(STATUS_REQUEST, recording_handler(STATUS_REQUEST, observations))
        .unwrap();
    registry
        .register(PLAY_CHAT, recording_handler(PLAY_CHAT, observations))
        .unwrap();

    let legacy_obs = Arc::clone(observations);
    registry
        .register_legacy(move |_ctx, payload| {
            legacy_obs
                .legacy
                .lock()
                .unwrap()
                .push(payload.map(<[u8]>::to_vec));
            Ok(())
        })
        .unwrap();
    registry
}

/// Engine with default configuration and recording handlers.
pub fn recording_engine(observations: &Arc<Observations>) -> Arc<ProtocolEngine> {
    recording_engine_with(observations, EngineConfig::default())
}

pub fn recording_engine_with(
    observations: &Arc<Observations>,
    config: EngineConfig,
) -> Arc<ProtocolEngine> {
    ProtocolEngine::new(
        config,
        decode_table(),
        encode_table(),
        recording_registry(observations),
    )
    .unwrap()
}

/// Outbound packet carrying an opaque byte body.
pub struct BlobPacket {
    pub kind: PacketKind,
    pub body: Vec<u8>,
}

impl OutboundPacket for BlobPacket {
    fn kind(&self) -> PacketKind {
        self.kind
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.body);
        Ok(())
    }
}

/// Build one uncompressed wire frame: `VarInt(len) | VarInt(id) | payload`.
pub fn frame(raw_id: i32, payload: &[u8]) -> Vec<u8> {
    use packet_engine::core::varint::write_varint;

    let mut body = Vec::new();
    write_varint(&mut body, raw_id);
    body.extend_from_slice(payload);

    let mut out = Vec::new();
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    write_varint(&mut out, body.len() as i32);
    out.extend_from_slice(&body);
    out
}

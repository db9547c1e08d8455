//! Packet encoder and compression pipeline.
//!
//! Serializes an outbound packet into its final wire frame and appends it to
//! the connection's send buffer. The encoder never blocks on I/O; it returns
//! synchronously and leaves delivery to the orchestrator's flush.
//!
//! ## Wire layouts
//!
//! No threshold configured:
//! ```text
//! VarInt totalLength | VarInt rawPacketId | byte[] payload
//! ```
//!
//! Threshold configured, serialized size >= threshold:
//! ```text
//! VarInt totalLength | VarInt dataLength | compressed(rawId|payload)
//! ```
//!
//! Threshold configured, serialized size < threshold:
//! ```text
//! VarInt totalLength | VarInt 0 | rawId | payload
//! ```
//! where `dataLength` is the inflated size of the compressed body and the
//! literal zero marks an uncompressed body.

use crate::config::CompressionConfig;
use crate::connection::Connection;
use crate::core::varint::{varint_len, write_varint};
use crate::error::{ProtocolError, Result};
use crate::outbound::OutboundPacket;
use crate::protocol::{DispatchTable, ProtocolState};
use crate::utils::compression;
use tracing::trace;

/// Byte accounting for one encoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Serialized `rawId|payload` size before compression.
    pub data_len: usize,
    /// Compressed body size, when the threshold was met.
    pub compressed_len: Option<usize>,
    /// Total frame bytes written, length prefix included.
    pub total_written: usize,
}

/// Serialize a packet into a complete wire frame.
///
/// `scratch` holds the intermediate `rawId|payload` bytes; callers reuse it
/// across packets to avoid per-packet allocation.
///
/// # Errors
///
/// - [`ProtocolError::UnregisteredKind`] if `(target_state, kind)` is absent
///   from the encode table; sending an undeclared packet kind is a
///   programming error.
/// - [`ProtocolError::EncodeFailure`] / [`ProtocolError::CompressionFailure`]
///   from the packet's own writer or the compressor, isolated to this packet.
pub fn encode_frame(
    encode_table: &DispatchTable,
    packet: &dyn OutboundPacket,
    target_state: ProtocolState,
    compression: &CompressionConfig,
    scratch: &mut Vec<u8>,
) -> Result<(Vec<u8>, WriteSummary)> {
    let kind = packet.kind();
    let definition = encode_table
        .resolve_kind(target_state, kind)
        .ok_or(ProtocolError::UnregisteredKind {
            state: target_state,
            kind,
        })?;

    scratch.clear();
    write_varint(scratch, definition.raw_id);
    packet.encode_payload(scratch)?;
    let data_len = scratch.len();

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let data_len_i32 = data_len as i32;

    let (frame, compressed_len) = match compression.threshold {
        None => {
            let mut frame = Vec::with_capacity(varint_len(data_len_i32) + data_len);
            write_varint(&mut frame, data_len_i32);
            frame.extend_from_slice(scratch);
            (frame, None)
        }
        Some(threshold) if data_len >= threshold => {
            let compressed = compression::compress(scratch, compression.kind, compression.level)?;

            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let total = (varint_len(data_len_i32) + compressed.len()) as i32;

            let mut frame =
                Vec::with_capacity(varint_len(total) + varint_len(data_len_i32) + compressed.len());
            write_varint(&mut frame, total);
            write_varint(&mut frame, data_len_i32);
            frame.extend_from_slice(&compressed);
            (frame, Some(compressed.len()))
        }
        Some(_) => {
            // Below threshold: zero marker signals an uncompressed body
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let total = (varint_len(0) + data_len) as i32;

            let mut frame = Vec::with_capacity(varint_len(total) + 1 + data_len);
            write_varint(&mut frame, total);
            write_varint(&mut frame, 0);
            frame.extend_from_slice(scratch);
            (frame, None)
        }
    };

    let summary = WriteSummary {
        data_len,
        compressed_len,
        total_written: frame.len(),
    };
    Ok((frame, summary))
}

/// Encode a packet and append the frame to the connection's send buffer.
pub fn write_packet(
    encode_table: &DispatchTable,
    connection: &Connection,
    packet: &dyn OutboundPacket,
    target_state: ProtocolState,
    compression: &CompressionConfig,
    scratch: &mut Vec<u8>,
) -> Result<WriteSummary> {
    let (frame, summary) = encode_frame(encode_table, packet, target_state, compression, scratch)?;
    connection.append_send(&frame);

    trace!(
        connection = connection.id(),
        data_len = summary.data_len,
        compressed_len = ?summary.compressed_len,
        total = summary.total_written,
        "encoded outbound packet"
    );
    Ok(summary)
}

//! Incremental frame decoder.
//!
//! Turns a connection's append-only receive buffer into a sequence of
//! complete, dispatched messages. The decoder is idempotent on short input:
//! until a whole frame is buffered it consumes nothing and reports
//! [`DecodeStatus::NeedMoreData`], so arbitrary TCP fragmentation reassembles
//! into exactly the same packet sequence as a single delivery.
//!
//! A reserved marker byte at the front of the stream switches to the legacy
//! one-shot ping format, which carries no length prefix and always terminates
//! the connection after handling.

use crate::connection::Connection;
use crate::core::varint::{decode_varint, VarIntStatus};
use crate::error::{ProtocolError, Result};
use crate::protocol::{HandlerContext, ProtocolState};
use crate::ProtocolEngine;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Reserved first byte selecting the legacy ping format.
pub const LEGACY_PING_MARKER: u8 = 0xFE;

/// Required second byte of a non-minimal legacy ping.
pub const LEGACY_PING_MAGIC: u8 = 0x01;

/// Read chunk size for [`receive_loop`].
const RECV_CHUNK_SIZE: usize = 8192;

/// Result of one decode attempt over the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// One complete message was consumed and dispatched; trim exactly
    /// `message_len` bytes from the front of the receive buffer.
    Done { message_len: usize },
    /// No complete message is buffered yet; nothing was consumed.
    NeedMoreData,
}

/// Transient view over the unread receive bytes for one decode call.
pub struct ReceiveCursor<'a> {
    buf: &'a [u8],
    /// Forces lookups against a specific dispatch partition for this one
    /// call, regardless of the connection's current state.
    pub state_override: Option<ProtocolState>,
    /// Cancellation signal of the owning receive loop.
    pub cancel: CancellationToken,
}

impl<'a> ReceiveCursor<'a> {
    pub fn new(buf: &'a [u8], cancel: CancellationToken) -> Self {
        Self {
            buf,
            state_override: None,
            cancel,
        }
    }

    pub fn with_state_override(mut self, state: ProtocolState) -> Self {
        self.state_override = Some(state);
        self
    }
}

/// Read-only view restricted to one packet's payload region.
///
/// Every read is bounds-checked against the frame: a handler that asks for
/// more than its packet holds gets [`ProtocolError::HandlerOverrun`] instead
/// of bytes belonging to the next message.
pub struct PayloadCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Bytes still unread in this payload.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn overrun(&self, wanted: usize) -> ProtocolError {
        ProtocolError::HandlerOverrun {
            wanted: self.pos + wanted,
            available: self.data.len(),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| self.overrun(1))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.overrun(n));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume and return everything left in the payload.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    pub fn read_varint(&mut self) -> Result<i32> {
        match decode_varint(&self.data[self.pos..])? {
            VarIntStatus::Complete { value, size } => {
                self.pos += size;
                Ok(value)
            }
            VarIntStatus::Incomplete => Err(self.overrun(self.remaining() + 1)),
        }
    }

    /// Read a length-prefixed UTF-8 string, capped at `max_chars` characters
    /// (four bytes per character worst case).
    pub fn read_string(&mut self, max_chars: usize) -> Result<String> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::MalformedPayload("negative string length".to_string()))?;
        if len > max_chars * 4 {
            return Err(ProtocolError::MalformedPayload(format!(
                "string of {len} bytes exceeds limit"
            )));
        }
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 string: {e}")))
    }
}

/// Attempt to decode and dispatch one message from the receive buffer.
///
/// On `Done` the caller trims `message_len` bytes from the buffer front and
/// calls again; on `NeedMoreData` nothing was consumed. Protocol violations
/// return an error and the caller terminates the connection.
pub fn decode_message(
    engine: &ProtocolEngine,
    connection: &Arc<Connection>,
    cursor: ReceiveCursor<'_>,
) -> Result<DecodeStatus> {
    let buf = cursor.buf;
    if buf.is_empty() {
        return Ok(DecodeStatus::NeedMoreData);
    }

    if buf[0] == LEGACY_PING_MARKER {
        return decode_legacy_ping(engine, connection, buf);
    }

    // Length prefix
    let (declared, prefix_len) = match decode_varint(buf)? {
        VarIntStatus::Incomplete => return Ok(DecodeStatus::NeedMoreData),
        VarIntStatus::Complete { value, size } => (value, size),
    };

    let max = engine.config().framing.max_message_size;
    let declared = match usize::try_from(declared) {
        Ok(len) if len <= max => len,
        // A negative or over-limit claim can never be satisfied safely;
        // terminate before touching any payload.
        _ => {
            return Err(ProtocolError::OversizedMessage {
                declared: i64::from(declared),
                max,
            })
        }
    };

    let total_message_length = prefix_len + declared;
    if buf.len() < total_message_length {
        return Ok(DecodeStatus::NeedMoreData);
    }

    // Packet id sits right after the length prefix, inside the frame
    let frame = &buf[prefix_len..total_message_length];
    let (raw_id, id_len) = match decode_varint(frame) {
        Ok(VarIntStatus::Complete { value, size }) => (value, size),
        Ok(VarIntStatus::Incomplete) | Err(_) => return Err(ProtocolError::MalformedPacketId),
    };

    let state = cursor.state_override.unwrap_or_else(|| connection.state());
    let definition = engine
        .decode_table()
        .resolve_id(state, raw_id)
        .copied()
        .ok_or(ProtocolError::UnknownPacketId { state, raw_id })?;

    // Registration was validated at startup; absence here means the engine
    // was built without that check and the configuration is incomplete.
    let handler = engine
        .registry()
        .resolve(definition.kind)
        .ok_or(ProtocolError::MissingHandler(definition.kind))?;

    let context = HandlerContext {
        engine,
        connection,
    };
    let mut payload = PayloadCursor::new(&frame[id_len..]);

    match handler(&context, &mut payload) {
        Ok(()) => {
            trace!(
                connection = connection.id(),
                kind = ?definition.kind,
                bytes = total_message_length,
                "dispatched packet"
            );
            engine.metrics().message_received();
        }
        // The frame boundary is intact, so a failing handler costs only its
        // own packet; the stream continues at the next frame.
        Err(e) if e.is_isolated() => {
            error!(
                connection = connection.id(),
                kind = ?definition.kind,
                error = %e,
                "handler failed; dropping packet"
            );
            engine.metrics().packet_dropped();
        }
        Err(e) => return Err(e),
    }

    Ok(DecodeStatus::Done {
        message_len: total_message_length,
    })
}

/// Handle the legacy one-shot ping. Always terminal: the connection is
/// signalled to close whether or not a sub-packet was present.
fn decode_legacy_ping(
    engine: &ProtocolEngine,
    connection: &Arc<Connection>,
    buf: &[u8],
) -> Result<DecodeStatus> {
    let handler = engine.registry().resolve_legacy().ok_or_else(|| {
        ProtocolError::ConfigError("no legacy ping handler registered".to_string())
    })?;

    let context = HandlerContext {
        engine,
        connection,
    };

    let payload = if buf.len() == 1 {
        // Bare marker: minimal ping with no payload
        None
    } else {
        let second = buf[1];
        if second != LEGACY_PING_MAGIC {
            return Err(ProtocolError::MalformedLegacyPing {
                found: second,
                expected: LEGACY_PING_MAGIC,
            });
        }
        if buf.len() > 2 {
            // Embedded sub-packet; its parsing belongs to the application
            Some(&buf[2..])
        } else {
            None
        }
    };

    debug!(
        connection = connection.id(),
        payload = payload.map_or(0, |p| p.len()),
        "legacy ping"
    );

    if let Err(e) = handler(&context, payload) {
        error!(connection = connection.id(), error = %e, "legacy ping handler failed");
    }
    engine.metrics().message_received();

    connection.close(false);
    Ok(DecodeStatus::Done {
        message_len: buf.len(),
    })
}

/// Append freshly received bytes and extract every complete message already
/// buffered, trimming the buffer as frames are dispatched.
///
/// # Errors
///
/// Any protocol violation terminates the connection (the kick has already
/// happened) and is returned to the caller for logging.
pub fn ingest(engine: &ProtocolEngine, connection: &Arc<Connection>, bytes: &[u8]) -> Result<()> {
    ingest_with_override(engine, connection, bytes, None)
}

/// [`ingest`] with a protocol-state override scoped to the first message
/// decoded in this read cycle. If that message's handler transitions the
/// connection, later buffered frames resolve against the new state.
pub fn ingest_with_override(
    engine: &ProtocolEngine,
    connection: &Arc<Connection>,
    bytes: &[u8],
    mut state_override: Option<ProtocolState>,
) -> Result<()> {
    let mut recv = connection
        .recv
        .lock()
        .expect("connection receive lock poisoned");
    recv.append(bytes);
    engine.metrics().bytes_received(bytes.len());

    while connection.accepts_data() && !recv.is_empty() {
        let mut cursor = ReceiveCursor::new(recv.unread(), connection.cancel_token().clone());
        cursor.state_override = state_override;

        match decode_message(engine, connection, cursor) {
            Ok(DecodeStatus::Done { message_len }) => {
                recv.consume(message_len);
                state_override = None;
            }
            Ok(DecodeStatus::NeedMoreData) => break,
            Err(e) => {
                engine.metrics().protocol_error();
                connection.kick(&e.to_string());
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Drive [`ingest`] from an async byte stream until EOF, cancellation, or a
/// protocol violation. Socket ownership stays with the caller.
pub async fn receive_loop<R>(
    engine: &ProtocolEngine,
    connection: &Arc<Connection>,
    reader: &mut R,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; RECV_CHUNK_SIZE];

    while connection.accepts_data() {
        tokio::select! {
            () = connection.cancel_token().cancelled() => {
                debug!(connection = connection.id(), "receive loop cancelled");
                break;
            }
            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => {
                        debug!(connection = connection.id(), "peer closed the stream");
                        connection.close(false);
                        break;
                    }
                    Ok(n) => ingest(engine, connection, &chunk[..n])?,
                    Err(e) => {
                        connection.close(true);
                        return Err(e.into());
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_cursor_reads() {
        let data = [0x05, 0xdd, 0xc7, 0x01, 0xAA, 0xBB];
        let mut cursor = PayloadCursor::new(&data);

        assert_eq!(cursor.read_u8().unwrap(), 0x05);
        assert_eq!(cursor.read_varint().unwrap(), 25565);
        assert_eq!(cursor.read_bytes(2).unwrap(), &[0xAA, 0xBB]);
        assert!(cursor.is_empty());
        assert_eq!(cursor.consumed(), 6);
    }

    #[test]
    fn test_payload_cursor_overrun() {
        let mut cursor = PayloadCursor::new(&[0x01, 0x02]);
        cursor.read_u8().unwrap();

        let result = cursor.read_bytes(2);
        assert!(matches!(
            result,
            Err(ProtocolError::HandlerOverrun {
                wanted: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_payload_cursor_string() {
        let mut data = vec![0x05];
        data.extend_from_slice(b"hello");
        let mut cursor = PayloadCursor::new(&data);
        assert_eq!(cursor.read_string(16).unwrap(), "hello");
    }

    #[test]
    fn test_payload_cursor_rest() {
        let mut cursor = PayloadCursor::new(&[1, 2, 3]);
        cursor.read_u8().unwrap();
        assert_eq!(cursor.read_rest(), &[2, 3]);
        assert_eq!(cursor.remaining(), 0);
    }
}

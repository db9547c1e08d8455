//! # Error Types
//!
//! Error handling for the protocol engine.
//!
//! This module defines every failure mode the engine distinguishes, from
//! low-level I/O errors to protocol violations and startup misconfiguration.
//!
//! ## Error Categories
//! - **I/O Errors**: transport read/write failures; close the connection.
//! - **Protocol Violations**: malformed VarInts, unknown packet ids, oversized
//!   declared lengths, bad legacy pings; always terminate the connection.
//! - **Configuration Errors**: duplicate or missing registrations; fatal at
//!   startup, never tolerated at request time.
//! - **Isolated Packet Errors**: encode failures and handler overruns; logged
//!   and confined to the one packet being processed.
//!
//! Note that "need more data" is deliberately *not* an error: incremental
//! decoding reports it through [`DecodeStatus`](crate::core::frame::DecodeStatus)
//! and the caller simply waits for more input.

use crate::protocol::{PacketKind, ProtocolState};
use std::io;
use thiserror::Error;

/// Primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// More than five continuation bytes before termination.
    #[error("VarInt exceeds 5 bytes")]
    VarIntTooLong,

    /// A VarInt that is well-terminated but not minimal-length.
    #[error("VarInt is not canonically encoded")]
    NonCanonicalVarInt,

    /// The packet id after the length prefix could not be decoded.
    #[error("malformed packet id")]
    MalformedPacketId,

    /// A raw id with no entry in the active dispatch table partition.
    #[error("unknown packet id {raw_id:#04x} in state {state:?}")]
    UnknownPacketId { state: ProtocolState, raw_id: i32 },

    /// Declared frame length that is negative or above the configured maximum.
    #[error("declared message length {declared} exceeds maximum {max}")]
    OversizedMessage { declared: i64, max: usize },

    /// Legacy ping whose second byte is not the expected magic value.
    #[error("malformed legacy ping (byte {found:#04x}, expected {expected:#04x})")]
    MalformedLegacyPing { found: u8, expected: u8 },

    /// Startup registration problem: duplicate id, duplicate kind, and so on.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A resolvable packet kind with no registered handler.
    #[error("no handler registered for packet kind {0:?}")]
    MissingHandler(PacketKind),

    /// Attempt to encode a packet kind absent from the encode table.
    #[error("packet kind {kind:?} is not registered for state {state:?}")]
    UnregisteredKind { state: ProtocolState, kind: PacketKind },

    /// A handler read past the payload region of its own frame.
    #[error("handler overran its frame: wanted {wanted} of {available} payload bytes")]
    HandlerOverrun { wanted: usize, available: usize },

    /// A handler could not make sense of its payload bytes.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A single outbound packet failed to serialize.
    #[error("packet encode failed: {0}")]
    EncodeFailure(String),

    #[error("compression failed")]
    CompressionFailure,

    #[error("decompression failed")]
    DecompressionFailure,

    /// Bounded outbound queue overflowed; the connection is kicked.
    #[error("outbound queue overflow at depth {depth}")]
    QueueOverflow { depth: usize },

    #[error("connection closed")]
    ConnectionClosed,

    /// Graceful shutdown found connections with undrained outbound queues.
    #[error("shutdown left {connections} connection(s) with pending packets")]
    ShutdownPending { connections: usize },
}

/// Type alias for Results using [`ProtocolError`].
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl ProtocolError {
    /// Whether this error is confined to a single packet rather than
    /// poisoning the whole connection.
    pub fn is_isolated(&self) -> bool {
        matches!(
            self,
            Self::HandlerOverrun { .. }
                | Self::MalformedPayload(_)
                | Self::EncodeFailure(_)
                | Self::CompressionFailure
        )
    }
}

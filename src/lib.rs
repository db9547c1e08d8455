//! # packet-engine
//!
//! Server-side engine for a stateful, length-prefixed binary protocol.
//!
//! The engine reassembles messages from arbitrary TCP fragmentation,
//! dispatches them through per-protocol-state id tables to registered
//! handlers, encodes responses with optional threshold-based compression,
//! and drains per-connection outbound queues through a bounded worker pool
//! with single-writer ordering.
//!
//! ## Components
//! - [`core::varint`]: VarInt codec, the foundation of all framing
//! - [`core::frame`]: incremental frame decoder and receive loop
//! - [`protocol::dispatch`]: per-state id↔kind tables, one per direction
//! - [`protocol::registry`]: packet-kind → handler mapping
//! - [`protocol::encoder`]: packet serialization + compression pipeline
//! - [`outbound`]: per-connection queues and the drain worker pool
//!
//! ## Setup
//! Dispatch tables and the handler registry are built once at startup and
//! immutable afterwards; [`ProtocolEngine::new`] refuses incomplete or
//! duplicated registrations so configuration mistakes surface before the
//! first byte arrives.
//!
//! ```rust,no_run
//! use packet_engine::{
//!     config::EngineConfig,
//!     protocol::{DispatchTable, HandlerRegistry, PacketKind, ProtocolState},
//!     ProtocolEngine,
//! };
//!
//! const STATUS_REQUEST: PacketKind = PacketKind(1);
//!
//! # fn main() -> packet_engine::error::Result<()> {
//! let mut decode = DispatchTable::new();
//! decode.register(ProtocolState::Status, 0x00, STATUS_REQUEST)?;
//! let encode = DispatchTable::new();
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(STATUS_REQUEST, |ctx, _payload| {
//!     // build and ctx.send(...) a response here
//!     Ok(())
//! })?;
//! registry.register_legacy(|_ctx, _payload| Ok(()))?;
//!
//! let engine = ProtocolEngine::new(EngineConfig::default(), decode, encode, registry)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod outbound;
pub mod protocol;
pub mod utils;

pub use connection::Connection;
pub use error::{ProtocolError, Result};
pub use outbound::{OutboundPacket, ShutdownMode};
pub use protocol::{DispatchTable, HandlerRegistry, PacketKind, ProtocolState};

use config::EngineConfig;
use outbound::Orchestrator;
use protocol::dispatch;
use std::sync::Arc;
use tokio::io::AsyncRead;
use utils::Metrics;

/// The protocol engine: immutable dispatch tables and handler registry, the
/// outbound orchestrator, and engine-wide configuration and metrics.
///
/// Cheap to share (`Arc`); all hot-path lookups are lock-free.
pub struct ProtocolEngine {
    config: EngineConfig,
    decode_table: Arc<DispatchTable>,
    encode_table: Arc<DispatchTable>,
    registry: HandlerRegistry,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<Metrics>,
}

impl ProtocolEngine {
    /// Assemble an engine from its startup-built parts.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::ConfigError`] if the configuration fails validation.
    /// - [`ProtocolError::MissingHandler`] if the decode table resolves a
    ///   kind the registry cannot handle.
    pub fn new(
        config: EngineConfig,
        decode_table: DispatchTable,
        encode_table: DispatchTable,
        registry: HandlerRegistry,
    ) -> Result<Arc<Self>> {
        config.validate_strict()?;
        registry.validate_against(&decode_table)?;

        let decode_table = Arc::new(decode_table);
        let encode_table = Arc::new(encode_table);
        let metrics = Arc::new(Metrics::new());
        let orchestrator = Orchestrator::new(
            Arc::clone(&encode_table),
            config.compression.clone(),
            config.outbound.clone(),
            Arc::clone(&metrics),
        );

        Ok(Arc::new(Self {
            config,
            decode_table,
            encode_table,
            registry,
            orchestrator,
            metrics,
        }))
    }

    /// Spawn the outbound worker pool. Must run inside a tokio runtime.
    pub fn start(&self) {
        self.orchestrator.start();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn decode_table(&self) -> &dispatch::DispatchTable {
        &self.decode_table
    }

    pub fn encode_table(&self) -> &dispatch::DispatchTable {
        &self.encode_table
    }

    pub(crate) fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Enqueue an outbound packet targeting the connection's current state.
    pub fn send(&self, connection: &Arc<Connection>, packet: Box<dyn OutboundPacket>) -> Result<()> {
        self.orchestrator
            .enqueue(connection, packet, connection.state())
    }

    /// Enqueue an outbound packet with an explicit target state for the
    /// encode-table lookup.
    pub fn send_in_state(
        &self,
        connection: &Arc<Connection>,
        packet: Box<dyn OutboundPacket>,
        state: ProtocolState,
    ) -> Result<()> {
        self.orchestrator.enqueue(connection, packet, state)
    }

    /// Feed received bytes into the connection's frame decoder. See
    /// [`core::frame::ingest`].
    pub fn ingest(&self, connection: &Arc<Connection>, bytes: &[u8]) -> Result<()> {
        core::frame::ingest(self, connection, bytes)
    }

    /// [`Self::ingest`] with a protocol-state override scoped to the first
    /// message decoded in this read cycle.
    pub fn ingest_with_override(
        &self,
        connection: &Arc<Connection>,
        bytes: &[u8],
        state_override: Option<ProtocolState>,
    ) -> Result<()> {
        core::frame::ingest_with_override(self, connection, bytes, state_override)
    }

    /// Run the connection's receive loop over an async byte stream.
    pub async fn receive_loop<R>(&self, connection: &Arc<Connection>, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        core::frame::receive_loop(self, connection, reader).await
    }

    /// Stop the outbound worker pool.
    ///
    /// # Errors
    ///
    /// See [`outbound::Orchestrator::shutdown`].
    pub async fn shutdown(&self, mode: ShutdownMode) -> Result<()> {
        self.orchestrator.shutdown(mode).await
    }
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("decode_table", &self.decode_table.len())
            .field("encode_table", &self.encode_table.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

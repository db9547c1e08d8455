//! Handler registry: packet kind → application logic.
//!
//! Handlers are registered once at process start, exactly one per decodable
//! packet kind, and the registry is immutable afterwards. A kind the decode
//! table can resolve but the registry cannot handle is a startup
//! configuration error; [`HandlerRegistry::validate_against`] surfaces it
//! before the first byte arrives instead of at request time.

use crate::connection::Connection;
use crate::core::frame::PayloadCursor;
use crate::error::{ProtocolError, Result};
use crate::outbound::OutboundPacket;
use crate::protocol::{DispatchTable, PacketKind, ProtocolState};
use crate::ProtocolEngine;
use std::collections::HashMap;
use std::sync::Arc;

/// Application logic consuming one inbound packet.
pub type HandlerFn =
    dyn Fn(&HandlerContext<'_>, &mut PayloadCursor<'_>) -> Result<()> + Send + Sync + 'static;

/// Application logic for the legacy one-shot ping. Receives the raw embedded
/// sub-packet bytes when present; parsing them is the application's job.
pub type LegacyHandlerFn =
    dyn Fn(&HandlerContext<'_>, Option<&[u8]>) -> Result<()> + Send + Sync + 'static;

/// What a handler sees while processing a packet: the connection the packet
/// arrived on, plus the engine for enqueueing responses.
pub struct HandlerContext<'a> {
    pub(crate) engine: &'a ProtocolEngine,
    pub(crate) connection: &'a Arc<Connection>,
}

impl<'a> HandlerContext<'a> {
    pub fn connection(&self) -> &Arc<Connection> {
        self.connection
    }

    pub fn state(&self) -> ProtocolState {
        self.connection.state()
    }

    /// Transition the connection's protocol state.
    pub fn set_state(&self, state: ProtocolState) {
        self.connection.set_state(state);
    }

    /// Enqueue a response packet for this connection, targeting its current
    /// protocol state for id lookup.
    pub fn send(&self, packet: Box<dyn OutboundPacket>) -> Result<()> {
        self.engine.send(self.connection, packet)
    }

    /// Enqueue a response packet with an explicit target state.
    pub fn send_in_state(
        &self,
        packet: Box<dyn OutboundPacket>,
        state: ProtocolState,
    ) -> Result<()> {
        self.engine.send_in_state(self.connection, packet, state)
    }
}

/// Maps packet kinds to the logic that consumes them.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<PacketKind, Box<HandlerFn>>,
    legacy: Option<Box<LegacyHandlerFn>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for one packet kind.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ConfigError`] on a duplicate registration.
    pub fn register<F>(&mut self, kind: PacketKind, handler: F) -> Result<()>
    where
        F: Fn(&HandlerContext<'_>, &mut PayloadCursor<'_>) -> Result<()> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(&kind) {
            return Err(ProtocolError::ConfigError(format!(
                "handler for packet kind {kind:?} registered twice"
            )));
        }
        self.handlers.insert(kind, Box::new(handler));
        Ok(())
    }

    /// Register the legacy ping handler.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ConfigError`] on a duplicate registration.
    pub fn register_legacy<F>(&mut self, handler: F) -> Result<()>
    where
        F: Fn(&HandlerContext<'_>, Option<&[u8]>) -> Result<()> + Send + Sync + 'static,
    {
        if self.legacy.is_some() {
            return Err(ProtocolError::ConfigError(
                "legacy ping handler registered twice".to_string(),
            ));
        }
        self.legacy = Some(Box::new(handler));
        Ok(())
    }

    pub(crate) fn resolve(&self, kind: PacketKind) -> Option<&HandlerFn> {
        self.handlers.get(&kind).map(AsRef::as_ref)
    }

    pub(crate) fn resolve_legacy(&self) -> Option<&LegacyHandlerFn> {
        self.legacy.as_deref()
    }

    /// Verify every kind the decode table can resolve has a handler.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::MissingHandler`] naming the first uncovered kind.
    pub fn validate_against(&self, decode_table: &DispatchTable) -> Result<()> {
        for definition in decode_table.definitions() {
            if !self.handlers.contains_key(&definition.kind) {
                return Err(ProtocolError::MissingHandler(definition.kind));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .field("legacy", &self.legacy.is_some())
            .finish()
    }
}

//! Per-protocol-state packet id dispatch tables.
//!
//! Two tables exist per engine: a decode table (client→server ids) and an
//! encode table (server→client ids). Within one table and one state the
//! mapping between raw id and packet kind is a bijection; any duplicate is a
//! configuration error raised during startup, never at request time. Once
//! registration completes the table is wrapped in an `Arc` and shared freely:
//! lookups are read-only and need no synchronization.

use crate::error::{ProtocolError, Result};
use crate::protocol::{PacketKind, ProtocolState};
use std::collections::HashMap;

/// Immutable binding of a raw wire id to a packet kind within one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketIdDefinition {
    pub state: ProtocolState,
    pub raw_id: i32,
    pub kind: PacketKind,
}

/// One direction's id↔kind mapping, partitioned by protocol state.
#[derive(Debug, Default)]
pub struct DispatchTable {
    by_id: HashMap<(ProtocolState, i32), PacketIdDefinition>,
    by_kind: HashMap<(ProtocolState, PacketKind), PacketIdDefinition>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one `(state, raw_id) ↔ kind` binding.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ConfigError`] if either the raw id or the kind is
    /// already bound within `state`.
    pub fn register(&mut self, state: ProtocolState, raw_id: i32, kind: PacketKind) -> Result<()> {
        if self.by_id.contains_key(&(state, raw_id)) {
            return Err(ProtocolError::ConfigError(format!(
                "duplicate packet id {raw_id:#04x} in state {state:?}"
            )));
        }
        if self.by_kind.contains_key(&(state, kind)) {
            return Err(ProtocolError::ConfigError(format!(
                "packet kind {kind:?} registered twice in state {state:?}"
            )));
        }

        let definition = PacketIdDefinition { state, raw_id, kind };
        self.by_id.insert((state, raw_id), definition);
        self.by_kind.insert((state, kind), definition);
        Ok(())
    }

    /// Resolve a raw wire id within a state.
    pub fn resolve_id(&self, state: ProtocolState, raw_id: i32) -> Option<&PacketIdDefinition> {
        self.by_id.get(&(state, raw_id))
    }

    /// Resolve a packet kind within a state.
    pub fn resolve_kind(&self, state: ProtocolState, kind: PacketKind) -> Option<&PacketIdDefinition> {
        self.by_kind.get(&(state, kind))
    }

    /// All registered definitions, in no particular order.
    pub fn definitions(&self) -> impl Iterator<Item = &PacketIdDefinition> {
        self.by_id.values()
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut table = DispatchTable::new();
        table
            .register(ProtocolState::Status, 0x00, PacketKind(1))
            .unwrap();
        table
            .register(ProtocolState::Status, 0x01, PacketKind(2))
            .unwrap();
        // Same raw id in a different state is a distinct partition
        table
            .register(ProtocolState::Login, 0x00, PacketKind(3))
            .unwrap();

        let def = table.resolve_id(ProtocolState::Status, 0x00).unwrap();
        assert_eq!(def.kind, PacketKind(1));

        let def = table.resolve_kind(ProtocolState::Login, PacketKind(3)).unwrap();
        assert_eq!(def.raw_id, 0x00);

        assert!(table.resolve_id(ProtocolState::Play, 0x00).is_none());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = DispatchTable::new();
        table
            .register(ProtocolState::Play, 0x10, PacketKind(7))
            .unwrap();

        let result = table.register(ProtocolState::Play, 0x10, PacketKind(8));
        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let mut table = DispatchTable::new();
        table
            .register(ProtocolState::Play, 0x10, PacketKind(7))
            .unwrap();

        let result = table.register(ProtocolState::Play, 0x11, PacketKind(7));
        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
    }
}

//! # Protocol Layer
//!
//! Protocol state, packet identity, dispatch tables, handler registry, and the
//! packet encoder with its compression pipeline.
//!
//! ## Components
//! - **ProtocolState**: connection lifecycle phase selecting the active
//!   dispatch partition.
//! - **DispatchTable**: immutable per-state bijection between raw wire ids and
//!   packet kinds, one per direction.
//! - **HandlerRegistry**: application logic keyed by packet kind.
//! - **Encoder**: serializes packets into length-prefixed frames, applying
//!   threshold-based compression when configured.

pub mod dispatch;
pub mod encoder;
pub mod registry;

pub use dispatch::{DispatchTable, PacketIdDefinition};
pub use registry::{HandlerContext, HandlerRegistry};

/// Phase of a connection's lifecycle.
///
/// The engine only reads this (plus a per-decode override) to select the
/// active dispatch partition; transitions are driven by handler logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    Handshake,
    Status,
    Login,
    Play,
    Closing,
    Disconnected,
}

/// Opaque, application-assigned packet kind.
///
/// The engine is schema-agnostic: a kind is just a stable key connecting a
/// dispatch table entry to a handler (inbound) or an encode function
/// (outbound). Applications typically wrap these in named constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketKind(pub u16);

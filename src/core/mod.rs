//! # Core Framing Components
//!
//! Low-level building blocks of the wire format: the VarInt codec, the
//! receive-side byte queue, and the incremental frame decoder.
//!
//! ## Wire Format
//! ```text
//! [VarInt totalLength] [VarInt rawPacketId] [payload…]
//! ```
//! (see [`crate::protocol::encoder`] for the compressed variant)
//!
//! ## Security
//! - Declared lengths are validated against the configured maximum before
//!   any payload is read
//! - VarInts are capped at five bytes and must be canonically encoded

pub mod buffer;
pub mod frame;
pub mod varint;

//! `VarInt` encoding and decoding, the foundation of all framing.
//!
//! A `VarInt` stores an `i32` in 1–5 bytes: seven value bits per byte,
//! least-significant group first, high bit set while more bytes follow.
//! Decoding is incremental (a partial buffer reports [`VarIntStatus::Incomplete`])
//! and strict: more than five bytes is rejected, as is a well-terminated but
//! non-minimal encoding.

use crate::error::{ProtocolError, Result};

/// Segment bits mask (lower 7 bits).
const SEGMENT_BITS: u8 = 0x7F;

/// Continue bit (high bit).
const CONTINUE_BIT: u8 = 0x80;

/// Maximum encoded size of a `VarInt`.
pub const MAX_VARINT_LEN: usize = 5;

/// Outcome of an incremental decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntStatus {
    /// A full value was present; `size` bytes of input were used.
    Complete { value: i32, size: usize },
    /// The buffer ends mid-encoding; retry once more bytes arrive.
    Incomplete,
}

/// Decode a `VarInt` from the front of `buf` without consuming it.
///
/// # Errors
///
/// - [`ProtocolError::VarIntTooLong`] if a sixth continuation byte is seen.
/// - [`ProtocolError::NonCanonicalVarInt`] if the encoding wastes a byte
///   (final group is zero but the value needed fewer bytes), or if a fifth
///   byte carries segment bits past the top of the 32-bit value.
pub fn decode_varint(buf: &[u8]) -> Result<VarIntStatus> {
    let mut value: i32 = 0;
    let mut position: u32 = 0;

    for (index, &byte) in buf.iter().enumerate() {
        if index >= MAX_VARINT_LEN {
            return Err(ProtocolError::VarIntTooLong);
        }

        // The fifth byte holds bits 28..31: only its low four segment bits
        // may be set, otherwise the encoding aliases a shorter value
        if index == MAX_VARINT_LEN - 1 && byte & 0x70 != 0 {
            return Err(ProtocolError::NonCanonicalVarInt);
        }

        value |= i32::from(byte & SEGMENT_BITS) << position;

        if byte & CONTINUE_BIT == 0 {
            // A trailing zero group can only appear in the one-byte encoding
            // of zero; anything longer should have ended a byte earlier.
            if index > 0 && byte == 0 {
                return Err(ProtocolError::NonCanonicalVarInt);
            }
            return Ok(VarIntStatus::Complete {
                value,
                size: index + 1,
            });
        }

        position += 7;
    }

    if buf.len() >= MAX_VARINT_LEN {
        return Err(ProtocolError::VarIntTooLong);
    }

    Ok(VarIntStatus::Incomplete)
}

/// Write a `VarInt` to a byte buffer, returning the number of bytes written.
///
/// Always produces the minimal encoding for the value.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn write_varint(buf: &mut Vec<u8>, mut value: i32) -> usize {
    let mut bytes_written = 0;

    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (value & i32::from(SEGMENT_BITS)) as u8;
        value = ((value as u32) >> 7) as i32;

        if value != 0 {
            byte |= CONTINUE_BIT;
        }

        buf.push(byte);
        bytes_written += 1;

        if value == 0 {
            break;
        }
    }

    bytes_written
}

/// Calculate the number of bytes needed to encode a `VarInt`.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn varint_len(value: i32) -> usize {
    let value = value as u32;

    if value == 0 {
        return 1;
    }

    let bits_needed = 32 - value.leading_zeros();
    (bits_needed as usize).div_ceil(7)
}

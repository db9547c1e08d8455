//! Compression backends for the packet encoder.
//!
//! The frame format carries the inflated size in its own `dataLength` field,
//! so both backends work on raw blocks with no embedded size header. The
//! decompressor validates the claimed inflate size against the engine's
//! maximum message size before allocating, guarding against decompression
//! bombs.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Compression algorithm selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Lz4,
    Zstd,
}

/// Compresses data using the specified compression algorithm.
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails.
pub fn compress(data: &[u8], kind: CompressionKind, level: i32) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => Ok(lz4_flex::block::compress(data)),
        CompressionKind::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, level)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            Ok(out)
        }
    }
}

/// Decompresses a raw block whose inflated size is known from the frame.
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if:
/// - The claimed size exceeds `max_size` (rejected before any allocation)
/// - Decompression fails
/// - The output does not inflate to exactly `inflated_size` bytes
pub fn decompress(
    data: &[u8],
    kind: CompressionKind,
    inflated_size: usize,
    max_size: usize,
) -> Result<Vec<u8>> {
    // Validate the claimed size before attempting any allocation
    if inflated_size > max_size {
        return Err(ProtocolError::DecompressionFailure);
    }

    let out = match kind {
        CompressionKind::Lz4 => lz4_flex::block::decompress(data, inflated_size)
            .map_err(|_| ProtocolError::DecompressionFailure)?,
        CompressionKind::Zstd => {
            let mut out = Vec::with_capacity(inflated_size);
            let mut reader =
                zstd::stream::Decoder::new(data).map_err(|_| ProtocolError::DecompressionFailure)?;

            // Read in chunks so a lying header cannot blow past the limit
            use std::io::Read;
            let mut buffer = [0u8; 8192];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        out.extend_from_slice(&buffer[..n]);
                        if out.len() > inflated_size {
                            return Err(ProtocolError::DecompressionFailure);
                        }
                    }
                    Err(_) => return Err(ProtocolError::DecompressionFailure),
                }
            }
            out
        }
    };

    if out.len() != inflated_size {
        return Err(ProtocolError::DecompressionFailure);
    }

    Ok(out)
}

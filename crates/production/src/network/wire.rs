//! Wire compression.
//!
//! Payloads are LZ4 block-compressed with the uncompressed length prepended
//! as a little-endian u32, so the receiver can bound its allocation before
//! decompressing.

use thiserror::Error;

/// Largest uncompressed payload a peer may send.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Frame shorter than its length prefix")]
    Truncated,

    #[error("Declared size {size} exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("LZ4 decompression failed: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),
}

/// Compress a payload for the wire.
pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

/// Decompress a frame produced by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, WireError> {
    let prefix: [u8; 4] = data
        .get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(WireError::Truncated)?;
    let size = u32::from_le_bytes(prefix) as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(WireError::TooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(lz4_flex::decompress_size_prepended(data)?)
}

//! LZ4 framing shared by every message on the wire.

use thiserror::Error;

/// Maximum decompressed payload accepted from a peer.
///
/// Guards against a forged size prefix making us allocate unbounded memory.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Declared payload size {0} exceeds limit")]
    TooLarge(usize),

    #[error("Decompression failed: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),
}

/// Compress a payload, prefixing its uncompressed size.
pub fn compress(payload: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(payload)
}

/// Decompress a size-prefixed payload.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, WireError> {
    if let Some(prefix) = data.get(..4) {
        let mut size = [0u8; 4];
        size.copy_from_slice(prefix);
        let declared = u32::from_le_bytes(size) as usize;
        if declared > MAX_PAYLOAD_SIZE {
            return Err(WireError::TooLarge(declared));
        }
    }
    Ok(lz4_flex::decompress_size_prepended(data)?)
}

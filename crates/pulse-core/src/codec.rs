//! Gzip wrapping of payload bytes for the batch transport envelope

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{PulseError, PulseResult};

/// Gzip-compress a payload at the default compression level
pub fn compress(payload: &[u8]) -> PulseResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .map_err(|e| PulseError::io(format!("compress payload: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| PulseError::io(format!("compress payload: {}", e)))
}

/// Decompress a gzip payload
pub fn decompress(payload: &[u8]) -> PulseResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(payload);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PulseError::io(format!("decompress payload: {}", e)))?;
    Ok(out)
}

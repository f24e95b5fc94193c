//! Tile buffer compression.
//!
//! Deflate-family only: zlib framing by default (what tile consumers
//! expect), gzip as an alternative. Decompression sniffs the framing from
//! the first bytes, so either flavor round-trips through the same call.

use std::io::{Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression as Level;

use crate::{Error, Result};

/// Deflate container framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Zlib,
    Gzip,
}

/// True if the buffer starts with a zlib or gzip header.
pub fn is_compressed(data: &[u8]) -> bool {
    is_zlib(data) || is_gzip(data)
}

fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

fn is_zlib(data: &[u8]) -> bool {
    // CMF byte 0x78: deflate with a 32K window, the only flavor encoders
    // emit in practice. The FLG byte must make CMF*256+FLG divisible by 31.
    data.len() >= 2 && data[0] == 0x78 && (data[0] as u16 * 256 + data[1] as u16) % 31 == 0
}

/// Compress with the default zlib framing.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, Format::Zlib)
}

/// Compress with an explicit framing.
pub fn compress_with(data: &[u8], format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        Format::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Level::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Decompress a zlib or gzip framed buffer, detecting the framing from its
/// header bytes.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if is_gzip(data) {
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
    } else {
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(format!("zlib: {}", e)))?;
    }
    Ok(out)
}

//! Fixed 256-byte file header: pixel format, dimensions, format version,
//! tile dimension, and an opaque user area.

use crate::error::{Error, Result};
use crate::geometry::HEADER_SIZE;
use crate::pixel_format::PixelFormat;

/// Current on-disk format version written by [`Header::encode`].
pub const FORMAT_VERSION: i32 = 1;

/// Tile dimension implied by version-0 files, which predate the stored
/// tile-dimension field.
const LEGACY_TILE_DIM: u32 = 128;

const RESERVED_OFFSET: usize = 20;
const USER_HEADER_OFFSET: usize = 32;

/// Parsed header fields. The user header area is carried verbatim so a
/// caller can round-trip arbitrary sidecar bytes through it, but the core
/// never interprets it.
#[derive(Debug, Clone)]
pub struct Header {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub version: i32,
    pub tile_dim: u32,
    pub user_header: [u8; (HEADER_SIZE as usize) - USER_HEADER_OFFSET],
}

impl Header {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32, tile_dim: u32) -> Self {
        Header {
            pixel_format,
            width,
            height,
            version: FORMAT_VERSION,
            tile_dim,
            user_header: [0u8; (HEADER_SIZE as usize) - USER_HEADER_OFFSET],
        }
    }

    /// Serializes into exactly [`HEADER_SIZE`] bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.pixel_format.code().to_le_bytes());
        buf[4..8].copy_from_slice(&(self.width as i32).to_le_bytes());
        buf[8..12].copy_from_slice(&(self.height as i32).to_le_bytes());
        buf[12..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..20].copy_from_slice(&(self.tile_dim as i32).to_le_bytes());
        buf[RESERVED_OFFSET..USER_HEADER_OFFSET].fill(0);
        buf[USER_HEADER_OFFSET..].copy_from_slice(&self.user_header);
        buf
    }

    /// Parses a header from exactly [`HEADER_SIZE`] bytes, as produced by
    /// reading the first 256 bytes of the file.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_SIZE as usize {
            return Err(Error::corrupt(format!(
                "header must be {HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }

        let read_i32 = |off: usize| i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());

        let pixel_format = PixelFormat::from_code(read_i32(0))?;
        let width = read_i32(4);
        let height = read_i32(8);
        let version = read_i32(12);

        if width <= 0 || height <= 0 {
            return Err(Error::corrupt(format!(
                "non-positive dimensions in header: {width}x{height}"
            )));
        }

        let tile_dim = if version >= 1 {
            let td = read_i32(16);
            if td <= 0 || !(td as u32).is_power_of_two() {
                return Err(Error::corrupt(format!("invalid tile dimension {td} in header")));
            }
            td as u32
        } else {
            LEGACY_TILE_DIM
        };

        let mut user_header = [0u8; (HEADER_SIZE as usize) - USER_HEADER_OFFSET];
        user_header.copy_from_slice(&buf[USER_HEADER_OFFSET..]);

        Ok(Header {
            pixel_format,
            width: width as u32,
            height: height as u32,
            version,
            tile_dim,
            user_header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let h = Header::new(PixelFormat::Rgba32, 640, 480, 256);
        let buf = h.encode();
        let h2 = Header::decode(&buf).unwrap();
        assert_eq!(h2.pixel_format.code(), PixelFormat::Rgba32.code());
        assert_eq!(h2.width, 640);
        assert_eq!(h2.height, 480);
        assert_eq!(h2.version, FORMAT_VERSION);
        assert_eq!(h2.tile_dim, 256);
    }

    #[test]
    fn test_wrong_length_is_corrupt() {
        assert!(Header::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_legacy_version_zero_implies_tile_dim_128() {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&PixelFormat::Gray8.code().to_le_bytes());
        buf[4..8].copy_from_slice(&100i32.to_le_bytes());
        buf[8..12].copy_from_slice(&100i32.to_le_bytes());
        buf[12..16].copy_from_slice(&0i32.to_le_bytes());
        let h = Header::decode(&buf).unwrap();
        assert_eq!(h.tile_dim, LEGACY_TILE_DIM);
    }

    #[test]
    fn test_unknown_pixel_format_rejected() {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&123i32.to_le_bytes());
        buf[4..8].copy_from_slice(&10i32.to_le_bytes());
        buf[8..12].copy_from_slice(&10i32.to_le_bytes());
        buf[12..16].copy_from_slice(&1i32.to_le_bytes());
        buf[16..20].copy_from_slice(&256i32.to_le_bytes());
        assert!(Header::decode(&buf).is_err());
    }

    #[test]
    fn test_user_header_preserved() {
        let mut h = Header::new(PixelFormat::Gray8, 10, 10, 256);
        h.user_header[0] = 0xAB;
        let buf = h.encode();
        let h2 = Header::decode(&buf).unwrap();
        assert_eq!(h2.user_header[0], 0xAB);
    }
}

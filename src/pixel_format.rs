//! Pixel format codes, stable across file versions.

use crate::error::{Error, Result};

/// Pixel format stamped in the file header. The core only ever needs the
/// byte size of a pixel; interpretation of those bytes is left to the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray16,
    Gray8,
    Rgb24,
    Rgba32,
    A4R4G4B4_16,
    Generic8,
    Generic16,
    Generic32,
    Generic64,
    Generic128,
}

impl PixelFormat {
    /// The on-disk code for this format. Never renumber these: existing
    /// files depend on the mapping.
    pub fn code(&self) -> i32 {
        match self {
            PixelFormat::Gray16 => 0,
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 2,
            PixelFormat::Rgba32 => 3,
            PixelFormat::A4R4G4B4_16 => 4,
            PixelFormat::Generic8 => 10,
            PixelFormat::Generic16 => 11,
            PixelFormat::Generic32 => 12,
            PixelFormat::Generic64 => 13,
            PixelFormat::Generic128 => 14,
        }
    }

    /// Resolves a format from its on-disk code. Unknown codes are a
    /// corrupt-header condition, not a panic.
    pub fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            0 => PixelFormat::Gray16,
            1 => PixelFormat::Gray8,
            2 => PixelFormat::Rgb24,
            3 => PixelFormat::Rgba32,
            4 => PixelFormat::A4R4G4B4_16,
            10 => PixelFormat::Generic8,
            11 => PixelFormat::Generic16,
            12 => PixelFormat::Generic32,
            13 => PixelFormat::Generic64,
            14 => PixelFormat::Generic128,
            other => return Err(Error::corrupt(format!("unknown pixel format code {other}"))),
        })
    }

    /// Bytes occupied by a single pixel of this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray16 => 2,
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 => 4,
            PixelFormat::A4R4G4B4_16 => 2,
            PixelFormat::Generic8 => 1,
            PixelFormat::Generic16 => 2,
            PixelFormat::Generic32 => 4,
            PixelFormat::Generic64 => 8,
            PixelFormat::Generic128 => 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_codes() {
        let formats = [
            PixelFormat::Gray16,
            PixelFormat::Gray8,
            PixelFormat::Rgb24,
            PixelFormat::Rgba32,
            PixelFormat::A4R4G4B4_16,
            PixelFormat::Generic8,
            PixelFormat::Generic16,
            PixelFormat::Generic32,
            PixelFormat::Generic64,
            PixelFormat::Generic128,
        ];
        for fmt in formats {
            assert_eq!(PixelFormat::from_code(fmt.code()).unwrap().code(), fmt.code());
        }
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::Gray8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Rgba32.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Generic128.bytes_per_pixel(), 16);
    }

    #[test]
    fn test_unknown_code_is_corrupt_header() {
        let err = PixelFormat::from_code(99).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader(_)));
    }
}

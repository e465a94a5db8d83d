//! Error types for the tiled bitmap store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while creating, opening, or operating on a
/// [`crate::store::Store`].
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument was out of range or otherwise invalid
    /// (bad dimensions, unknown pixel format, rectangle outside the image,
    /// destination buffer too small).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A read, write, or seek against the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file's header does not match its declared size or carries an
    /// unknown format version or pixel format code.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// A mutating call was made on a store opened read-only.
    #[error("store was opened read-only")]
    ReadOnly,

    /// Allocating a tile buffer of the given size failed.
    #[error("out of memory allocating a {0}-byte tile buffer")]
    OutOfMemory(usize),

    /// A clamped rectangle read left nothing inside the image bounds.
    #[error("rectangle is empty after clamping to image bounds")]
    EmptyAfterClip,
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptHeader(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid("width must be positive");
        assert_eq!(err.to_string(), "invalid argument: width must be positive");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_corrupt_header_message() {
        let err = Error::corrupt("file length 100 does not match expected 356");
        assert!(err.to_string().contains("356"));
    }

    #[test]
    fn test_read_only_message() {
        let err = Error::ReadOnly;
        assert_eq!(err.to_string(), "store was opened read-only");
    }
}

//! Serializes positioned reads and writes against the backing file.
//!
//! The file has a single shared position, so every access goes through one
//! mutex. This is the lowest layer in the lock ordering (see the store's
//! module docs): no other lock is held while this one is.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use crate::error::Result;

/// A mutex-guarded file handle offering absolute-positioned reads and
/// writes. Does not interpret the bytes it moves.
pub struct FileGate {
    file: Mutex<File>,
}

impl FileGate {
    pub fn new(file: File) -> Self {
        FileGate { file: Mutex::new(file) }
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    pub fn set_len(&self, len: u64) -> Result<()> {
        let file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.set_len(len)?;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        let file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        Ok(file.metadata()?.len())
    }

    pub fn sync_all(&self) -> Result<()> {
        let file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.sync_all()?;
        Ok(())
    }
}

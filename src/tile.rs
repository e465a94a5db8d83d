//! A single tile's resident state: its pixel buffer (if loaded), dirty
//! flag, and actual dimensions, guarded by one reader/writer lock.

use std::sync::RwLock;

/// What a tile holds while it is in memory. `None` means the tile is not
/// currently resident; the invariant `resident iff present in the LRU
/// list` is maintained by the store, not by this type.
#[derive(Debug, Default)]
pub struct TileData {
    pub buffer: Vec<u8>,
    pub dirty: bool,
}

/// One entry in the dense tile grid. `width`/`height` are fixed at
/// construction (they depend only on the tile's position, never on what
/// is loaded); `data` toggles between resident and absent over the
/// tile's lifetime.
pub struct TileRecord {
    pub width: u32,
    pub height: u32,
    pub lock: RwLock<Option<TileData>>,
}

impl TileRecord {
    pub fn new(width: u32, height: u32) -> Self {
        TileRecord { width, height, lock: RwLock::new(None) }
    }

    pub fn byte_len(&self, bytes_per_pixel: usize) -> usize {
        self.width as usize * self.height as usize * bytes_per_pixel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tile_is_absent() {
        let t = TileRecord::new(256, 256);
        assert!(t.lock.read().unwrap().is_none());
    }

    #[test]
    fn test_byte_len() {
        let t = TileRecord::new(64, 32);
        assert_eq!(t.byte_len(4), 64 * 32 * 4);
    }

    #[test]
    fn test_can_become_resident() {
        let t = TileRecord::new(4, 4);
        {
            let mut guard = t.lock.write().unwrap();
            *guard = Some(TileData { buffer: vec![0u8; 16], dirty: false });
        }
        assert!(t.lock.read().unwrap().is_some());
    }
}

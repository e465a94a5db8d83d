//! The tiled bitmap store: file lifecycle, tile residency, and the point
//! pixel API. Bulk rectangle operations live in [`crate::rect`].
//!
//! Lock ordering, strictly enforced top to bottom to avoid deadlock:
//! 1. `global_lock` (shared for every call, exclusive for [`Store::close`]).
//! 2. a tile's own `RwLock` (shared for a cache-hit read, exclusive
//!    otherwise). A single thread holds at most one tile lock for its own
//!    target tile, though the evictor may additionally hold a *candidate*
//!    tile's lock briefly via `try_write` while the caller still holds its
//!    own target tile's lock.
//! 3. `accounting` (LRU + memory counters).
//! 4. the file gate.
//! 5. the process-wide memory counter (inside the accountant).

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::RwLock;

use log::{debug, error, info, warn};

use crate::cache::Accounting;
use crate::error::{Error, Result};
use crate::geometry::{Geometry, DEFAULT_TILE_DIM, HEADER_SIZE};
use crate::header::Header;
use crate::io::FileGate;
use crate::pixel_format::PixelFormat;
use crate::tile::{TileData, TileRecord};

/// Per-instance tunables. The only configuration surface this crate has;
/// there are no environment variables or config files.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Tile edge length, used only by [`Store::create_with_options`] (an
    /// existing file's tile dimension comes from its header).
    pub tile_dim: u32,
    /// Per-instance resident-byte budget.
    pub memory_limit: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions { tile_dim: DEFAULT_TILE_DIM, memory_limit: 32 * 1024 * 1024 }
    }
}

/// An open tiled bitmap file.
pub struct Store {
    geometry: Geometry,
    file: FileGate,
    tiles: Vec<TileRecord>,
    accounting: std::sync::Mutex<Accounting>,
    global_lock: RwLock<()>,
    outstanding_ops: AtomicI32,
    read_only: bool,
}

impl Store {
    /// Creates a new file, truncating any existing contents, with the
    /// default tile dimension and memory budget.
    pub fn create(path: impl AsRef<Path>, format: PixelFormat, width: u32, height: u32) -> Result<Store> {
        Store::create_with_options(path, format, width, height, StoreOptions::default())
    }

    pub fn create_with_options(
        path: impl AsRef<Path>,
        format: PixelFormat,
        width: u32,
        height: u32,
        options: StoreOptions,
    ) -> Result<Store> {
        let geometry = Geometry::new(format, width, height, options.tile_dim)?;

        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let gate = FileGate::new(file);
        gate.set_len(geometry.expected_file_len())?;

        let header = Header::new(format, width, height, options.tile_dim);
        gate.write_at(0, &header.encode())?;

        info!(
            "created store at {:?}: {}x{} tile_dim={} format={:?}",
            path.as_ref(),
            width,
            height,
            options.tile_dim,
            format
        );

        Ok(Store::assemble(gate, geometry, options.memory_limit, false))
    }

    /// Opens an existing file, validating its header and size.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Store> {
        Store::open_with_options(path, read_only, StoreOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, read_only: bool, options: StoreOptions) -> Result<Store> {
        let file = File::options().read(true).write(!read_only).open(path.as_ref())?;
        let gate = FileGate::new(file);

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        gate.read_at(0, &mut header_buf)?;
        let header = Header::decode(&header_buf)?;

        let geometry = Geometry::new(header.pixel_format, header.width, header.height, header.tile_dim)?;

        let actual_len = gate.len()?;
        if actual_len != geometry.expected_file_len() {
            return Err(Error::corrupt(format!(
                "file length {actual_len} does not match expected {}",
                geometry.expected_file_len()
            )));
        }

        debug!(
            "opened store at {:?}: {}x{} tile_dim={} read_only={}",
            path.as_ref(),
            geometry.width,
            geometry.height,
            geometry.tile_dim,
            read_only
        );

        Ok(Store::assemble(gate, geometry, options.memory_limit, read_only))
    }

    fn assemble(file: FileGate, geometry: Geometry, memory_limit: u64, read_only: bool) -> Store {
        let mut tiles = Vec::with_capacity((geometry.tiles_x * geometry.tiles_y) as usize);
        for by in 0..geometry.tiles_y {
            for bx in 0..geometry.tiles_x {
                tiles.push(TileRecord::new(geometry.tile_width(bx), geometry.tile_height(by)));
            }
        }
        Store {
            geometry,
            file,
            tiles,
            accounting: std::sync::Mutex::new(Accounting::new(memory_limit)),
            global_lock: RwLock::new(()),
            outstanding_ops: AtomicI32::new(0),
            read_only,
        }
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.geometry.pixel_format
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn tile_index(&self, bx: u32, by: u32) -> usize {
        by as usize * self.geometry.tiles_x as usize + bx as usize
    }

    /// Flushes and drops every resident tile, then closes the file.
    /// Panics if async rectangle operations are still outstanding: that
    /// indicates a caller bug (a wait handle that was never waited on).
    pub fn close(self) -> Result<()> {
        let outstanding = self.outstanding_ops.load(Ordering::SeqCst);
        assert_eq!(
            outstanding, 0,
            "Store::close called with {outstanding} outstanding async rectangle operations"
        );

        let _global = self.global_lock.write().unwrap_or_else(|e| e.into_inner());

        for by in 0..self.geometry.tiles_y {
            for bx in 0..self.geometry.tiles_x {
                let idx = self.tile_index(bx, by);
                let mut guard = self.tiles[idx].lock.write().unwrap_or_else(|e| e.into_inner());
                if let Err(err) = self.release_tile(bx, by, &mut guard) {
                    error!("failed to flush tile ({bx},{by}) on close: {err}");
                }
            }
        }

        self.file.sync_all()?;
        Ok(())
    }

    /// Evicts resident tiles (oldest first, skipping ones currently locked
    /// elsewhere) until the instance is back under its memory budget, or
    /// until it runs out of evictable candidates.
    fn evict_while_over_budget(&self, protect: (u32, u32)) -> Result<()> {
        let mut tries = 0usize;
        loop {
            let candidate = {
                let acc = self.accounting.lock().unwrap_or_else(|e| e.into_inner());
                if !acc.memory.over_budget() || acc.lru.is_empty() {
                    return Ok(());
                }
                acc.lru.peek_back()
            };
            let Some(candidate) = candidate else { return Ok(()) };

            if candidate == protect {
                let mut acc = self.accounting.lock().unwrap_or_else(|e| e.into_inner());
                acc.lru.rotate_to_front(candidate);
                tries += 1;
                if tries > acc.lru.len().max(1) {
                    debug!("eviction found only the tile being loaded; leaving budget exceeded transiently");
                    return Ok(());
                }
                continue;
            }

            let idx = self.tile_index(candidate.0, candidate.1);
            match self.tiles[idx].lock.try_write() {
                Ok(mut guard) => {
                    self.release_tile(candidate.0, candidate.1, &mut guard)?;
                    tries = 0;
                }
                Err(_) => {
                    let mut acc = self.accounting.lock().unwrap_or_else(|e| e.into_inner());
                    acc.lru.rotate_to_front(candidate);
                    tries += 1;
                    if tries > acc.lru.len().max(1) {
                        debug!("eviction starved on lock contention; leaving budget exceeded transiently");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Materialises tile `(bx, by)` into `slot`, which must be `None`.
    /// Caller must already hold the tile's lock exclusively. May evict
    /// other tiles to stay within budget first.
    pub(crate) fn load_tile(&self, bx: u32, by: u32, slot: &mut Option<TileData>, skip_file_read: bool) -> Result<()> {
        debug_assert!(slot.is_none());
        let id = (bx, by);

        self.evict_while_over_budget(id)?;

        let idx = self.tile_index(bx, by);
        let byte_len = self.tiles[idx].byte_len(self.geometry.bytes_per_pixel());
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(byte_len).map_err(|_| Error::OutOfMemory(byte_len))?;
        buffer.resize(byte_len, 0u8);
        if !skip_file_read {
            self.file.read_at(self.geometry.tile_offset(bx, by), &mut buffer)?;
        }

        *slot = Some(TileData { buffer, dirty: false });

        let mut acc = self.accounting.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(!acc.lru.contains(id));
        acc.lru.push_front(id);
        acc.memory.charge(byte_len as u64);
        Ok(())
    }

    /// Writes `(bx, by)` back to disk if dirty and drops its buffer.
    /// Caller must hold the tile's lock exclusively. A no-op if the slot
    /// is already absent.
    fn release_tile(&self, bx: u32, by: u32, slot: &mut Option<TileData>) -> Result<()> {
        let Some(data) = slot.as_mut() else { return Ok(()) };

        if data.dirty {
            self.file.write_at(self.geometry.tile_offset(bx, by), &data.buffer)?;
            data.dirty = false;
        }

        let byte_len = data.buffer.len() as u64;
        *slot = None;

        let mut acc = self.accounting.lock().unwrap_or_else(|e| e.into_inner());
        acc.memory.discharge(byte_len);
        acc.lru.remove((bx, by));
        Ok(())
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<()> {
        if !self.geometry.contains(x, y) {
            return Err(Error::invalid(format!(
                "pixel ({x},{y}) is out of bounds for a {}x{} image",
                self.geometry.width, self.geometry.height
            )));
        }
        Ok(())
    }

    /// Reads the `bytes_per_pixel` bytes at `(x, y)`, loading the owning
    /// tile if it is not already resident.
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<Vec<u8>> {
        self.check_bounds(x, y)?;
        let _global = self.global_lock.read().unwrap_or_else(|e| e.into_inner());

        let (bx, by, lx, ly) = self.geometry.locate(x, y);
        let idx = self.tile_index(bx, by);
        let bpp = self.geometry.bytes_per_pixel();

        {
            let guard = self.tiles[idx].lock.read().unwrap_or_else(|e| e.into_inner());
            if let Some(data) = guard.as_ref() {
                let off = (self.tiles[idx].width as usize * ly as usize + lx as usize) * bpp;
                return Ok(data.buffer[off..off + bpp].to_vec());
            }
        }

        let mut guard = self.tiles[idx].lock.write().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            self.load_tile(bx, by, &mut guard, false)?;
        }
        let data = guard.as_ref().expect("just loaded");
        let off = (self.tiles[idx].width as usize * ly as usize + lx as usize) * bpp;
        Ok(data.buffer[off..off + bpp].to_vec())
    }

    /// Like [`Store::get_pixel`], but clamps out-of-range coordinates to
    /// the nearest edge pixel instead of failing.
    pub fn get_pixel_clamped(&self, x: i64, y: i64) -> Result<Vec<u8>> {
        let cx = x.clamp(0, self.geometry.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.geometry.height as i64 - 1) as u32;
        self.get_pixel(cx, cy)
    }

    /// Writes `value` (`bytes_per_pixel` bytes) to `(x, y)`, loading the
    /// owning tile if necessary and marking it dirty.
    pub fn set_pixel(&self, x: u32, y: u32, value: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.check_bounds(x, y)?;
        let bpp = self.geometry.bytes_per_pixel();
        if value.len() != bpp {
            return Err(Error::invalid(format!("expected {bpp} bytes per pixel, got {}", value.len())));
        }

        let _global = self.global_lock.read().unwrap_or_else(|e| e.into_inner());
        let (bx, by, lx, ly) = self.geometry.locate(x, y);
        let idx = self.tile_index(bx, by);

        let mut guard = self.tiles[idx].lock.write().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            self.load_tile(bx, by, &mut guard, false)?;
        }
        let data = guard.as_mut().expect("just loaded");
        let off = (self.tiles[idx].width as usize * ly as usize + lx as usize) * bpp;
        data.buffer[off..off + bpp].copy_from_slice(value);
        data.dirty = true;
        Ok(())
    }

    /// Fills every pixel in the image with a repeated copy of `value`,
    /// loading tiles as needed without reading their prior contents.
    pub fn fill(&self, value: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        let bpp = self.geometry.bytes_per_pixel();
        if value.len() != bpp {
            return Err(Error::invalid(format!("expected {bpp} bytes per pixel, got {}", value.len())));
        }

        let _global = self.global_lock.read().unwrap_or_else(|e| e.into_inner());

        for by in 0..self.geometry.tiles_y {
            for bx in 0..self.geometry.tiles_x {
                let idx = self.tile_index(bx, by);
                let mut guard = self.tiles[idx].lock.write().unwrap_or_else(|e| e.into_inner());
                if guard.is_none() {
                    self.load_tile(bx, by, &mut guard, true)?;
                }
                let data = guard.as_mut().expect("just loaded");
                for chunk in data.buffer.chunks_exact_mut(bpp) {
                    chunk.copy_from_slice(value);
                }
                data.dirty = true;
            }
        }
        Ok(())
    }

    // --- internals exposed to the rectangle engine ---

    pub(crate) fn geom(&self) -> &Geometry {
        &self.geometry
    }

    pub(crate) fn tile_at(&self, bx: u32, by: u32) -> &TileRecord {
        &self.tiles[self.tile_index(bx, by)]
    }

    pub(crate) fn global_lock(&self) -> &RwLock<()> {
        &self.global_lock
    }

    pub(crate) fn is_read_only_internal(&self) -> bool {
        self.read_only
    }

    pub(crate) fn begin_async_op(&self) {
        self.outstanding_ops.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_async_op(&self) {
        self.outstanding_ops.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let any_resident = self.tiles.iter().any(|t| {
            t.lock.read().map(|g| g.is_some()).unwrap_or(true)
        });
        if any_resident {
            warn!("Store dropped without calling close(); dirty tiles were not flushed");
        }
    }
}

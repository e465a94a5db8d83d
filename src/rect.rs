//! Rectangle-to-tile decomposition for bulk reads and writes, plus a
//! border-clamping read built on top of it.
//!
//! A rectangle spanning several tiles is split into one copy operation per
//! tile (`plan_rect`), which can then run in the caller's own thread, be
//! handed to an external [`TaskRunner`] and waited on synchronously, or be
//! submitted and waited on later through a [`WaitHandle`].
//!
//! Parallel execution writes into disjoint row ranges of a single caller
//! buffer from multiple threads at once. The borrow checker cannot prove
//! those ranges are disjoint (they depend on where tiles land at runtime),
//! so the parallel and async paths reach for a raw-pointer wrapper with a
//! manually checked safety argument instead of a shared `&mut [u8]`.

use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::store::Store;

/// Executes `op` once for every index in `0..set_size`, across however
/// many threads it chooses, returning only once all of them have run.
/// The external collaborator this core depends on for parallel fan-out;
/// not part of the core's own responsibilities.
pub trait TaskRunner: Send + Sync {
    fn run_range(&self, set_size: usize, op: &(dyn Fn(usize) + Sync));
}

/// Default [`TaskRunner`] for callers that don't supply their own,
/// parallelising over tiles with `rayon`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RayonTaskRunner;

impl TaskRunner for RayonTaskRunner {
    fn run_range(&self, set_size: usize, op: &(dyn Fn(usize) + Sync)) {
        use rayon::prelude::*;
        (0..set_size).into_par_iter().for_each(op);
    }
}

/// A handle to an in-flight asynchronous rectangle operation. Waiting
/// consumes it and returns whatever error the operation ended with.
pub trait WaitHandle: Send {
    fn wait(self: Box<Self>) -> Result<()>;
}

struct ChannelWaitHandle {
    rx: crossbeam::channel::Receiver<Result<()>>,
}

impl WaitHandle for ChannelWaitHandle {
    fn wait(self: Box<Self>) -> Result<()> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(Error::invalid("async rectangle operation's worker thread vanished")),
        }
    }
}

/// Raw pointer into a caller-owned buffer, wrapped so it can cross a
/// thread boundary. Safety: every (bx,by) tile's footprint inside the
/// requested rectangle is disjoint from every other tile's, so distinct
/// worker threads write disjoint byte ranges of the same allocation; no
/// two threads touch the same byte. The caller is responsible for keeping
/// the buffer alive and not otherwise touching it until all outstanding
/// operations against it have completed (checked via `Store`'s
/// outstanding-op counter for the async path). `len` is the original
/// buffer's length, carried across the thread boundary so every copy can
/// `debug_assert!` its computed offsets stay inside it.
#[derive(Clone, Copy)]
struct RawMutBuf {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for RawMutBuf {}
unsafe impl Sync for RawMutBuf {}

#[derive(Clone, Copy)]
struct RawConstBuf {
    ptr: *const u8,
    len: usize,
}

unsafe impl Send for RawConstBuf {}
unsafe impl Sync for RawConstBuf {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

fn validate_rect(geom: &Geometry, rx: u32, ry: u32, rw: u32, rh: u32) -> Result<()> {
    if rw == 0 || rh == 0 {
        return Ok(());
    }
    let x_end = rx.checked_add(rw).ok_or_else(|| Error::invalid("rectangle overflows u32"))?;
    let y_end = ry.checked_add(rh).ok_or_else(|| Error::invalid("rectangle overflows u32"))?;
    if x_end > geom.width || y_end > geom.height {
        return Err(Error::invalid(format!(
            "rectangle ({rx},{ry},{rw}x{rh}) exceeds image bounds {}x{}",
            geom.width, geom.height
        )));
    }
    Ok(())
}

fn plan_rect(
    geom: &Geometry,
    buf_pitch: usize,
    buf_len: usize,
    rx: u32,
    ry: u32,
    rw: u32,
    rh: u32,
    direction: Direction,
) -> Result<Vec<(u32, u32)>> {
    validate_rect(geom, rx, ry, rw, rh)?;
    if rw == 0 || rh == 0 {
        return Ok(Vec::new());
    }

    let bpp = geom.bytes_per_pixel();
    if buf_pitch < rw as usize * bpp {
        return Err(Error::invalid(format!(
            "pitch {buf_pitch} is smaller than {rw} pixels at {bpp} bytes each"
        )));
    }
    let required = (rh as usize - 1) * buf_pitch + rw as usize * bpp;
    if buf_len < required {
        return Err(Error::invalid(format!(
            "{} buffer of {buf_len} bytes is too small, need at least {required}",
            match direction {
                Direction::Read => "destination",
                Direction::Write => "source",
            }
        )));
    }

    let bx_from = rx / geom.tile_dim;
    let by_from = ry / geom.tile_dim;
    let bx_to = (rx + rw - 1) / geom.tile_dim;
    let by_to = (ry + rh - 1) / geom.tile_dim;

    let mut ops = Vec::with_capacity(((bx_to - bx_from + 1) * (by_to - by_from + 1)) as usize);
    for by in by_from..=by_to {
        for bx in bx_from..=bx_to {
            ops.push((bx, by));
        }
    }
    Ok(ops)
}

/// Intersection of tile `(bx, by)`'s footprint with the rectangle
/// `(rx, ry, rw, rh)`, as `(from_x, to_x, from_y, to_y)` in image space.
fn intersect(geom: &Geometry, bx: u32, by: u32, rx: u32, ry: u32, rw: u32, rh: u32) -> (u32, u32, u32, u32) {
    let tile_x0 = bx * geom.tile_dim;
    let tile_y0 = by * geom.tile_dim;
    let bw = geom.tile_width(bx);
    let bh = geom.tile_height(by);
    let from_x = tile_x0.max(rx);
    let to_x = (tile_x0 + bw).min(rx + rw);
    let from_y = tile_y0.max(ry);
    let to_y = (tile_y0 + bh).min(ry + rh);
    (from_x, to_x, from_y, to_y)
}

fn copy_read_tile(
    store: &Store,
    dst: *mut u8,
    dst_len: usize,
    dst_pitch: usize,
    rx: u32,
    ry: u32,
    rw: u32,
    rh: u32,
    bx: u32,
    by: u32,
) -> Result<()> {
    let geom = store.geom();
    let bpp = geom.bytes_per_pixel();
    let (from_x, to_x, from_y, to_y) = intersect(geom, bx, by, rx, ry, rw, rh);
    let tile_x0 = bx * geom.tile_dim;
    let tile_y0 = by * geom.tile_dim;
    let tile = store.tile_at(bx, by);
    let tile_width = tile.width as usize;

    let copy_rows = |buffer: &[u8]| {
        for y in from_y..to_y {
            let src_off = ((y - tile_y0) as usize * tile_width + (from_x - tile_x0) as usize) * bpp;
            let dst_off = (y - ry) as usize * dst_pitch + (from_x - rx) as usize * bpp;
            let len = (to_x - from_x) as usize * bpp;
            debug_assert!(dst_off + len <= dst_len, "tile copy would write past the destination buffer");
            unsafe {
                std::ptr::copy_nonoverlapping(buffer[src_off..src_off + len].as_ptr(), dst.add(dst_off), len);
            }
        }
    };

    {
        let guard = tile.lock.read().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = guard.as_ref() {
            copy_rows(&data.buffer);
            return Ok(());
        }
    }
    let mut guard = tile.lock.write().unwrap_or_else(|e| e.into_inner());
    if guard.is_none() {
        store.load_tile(bx, by, &mut guard, false)?;
    }
    copy_rows(&guard.as_ref().expect("just loaded").buffer);
    Ok(())
}

fn copy_write_tile(
    store: &Store,
    src: *const u8,
    src_len: usize,
    src_pitch: usize,
    rx: u32,
    ry: u32,
    rw: u32,
    rh: u32,
    bx: u32,
    by: u32,
) -> Result<()> {
    let geom = store.geom();
    let bpp = geom.bytes_per_pixel();
    let (from_x, to_x, from_y, to_y) = intersect(geom, bx, by, rx, ry, rw, rh);
    let tile_x0 = bx * geom.tile_dim;
    let tile_y0 = by * geom.tile_dim;
    let tile = store.tile_at(bx, by);
    let tile_width = tile.width as usize;

    let mut guard = tile.lock.write().unwrap_or_else(|e| e.into_inner());
    if guard.is_none() {
        store.load_tile(bx, by, &mut guard, false)?;
    }
    let data = guard.as_mut().expect("just loaded");
    for y in from_y..to_y {
        let dst_off = ((y - tile_y0) as usize * tile_width + (from_x - tile_x0) as usize) * bpp;
        let src_off = (y - ry) as usize * src_pitch + (from_x - rx) as usize * bpp;
        let len = (to_x - from_x) as usize * bpp;
        debug_assert!(src_off + len <= src_len, "tile copy would read past the source buffer");
        unsafe {
            std::ptr::copy_nonoverlapping(src.add(src_off), data.buffer[dst_off..].as_mut_ptr(), len);
        }
    }
    data.dirty = true;
    Ok(())
}

/// Reads `(rx, ry, rw, rh)` into `dst` on the caller's own thread.
pub fn read_rect(store: &Store, dst: &mut [u8], dst_pitch: usize, rx: u32, ry: u32, rw: u32, rh: u32) -> Result<()> {
    let ops = plan_rect(store.geom(), dst_pitch, dst.len(), rx, ry, rw, rh, Direction::Read)?;
    if ops.is_empty() {
        return Ok(());
    }
    let _global = store.global_lock().read().unwrap_or_else(|e| e.into_inner());
    let dst_len = dst.len();
    let ptr = dst.as_mut_ptr();
    for (bx, by) in ops {
        copy_read_tile(store, ptr, dst_len, dst_pitch, rx, ry, rw, rh, bx, by)?;
    }
    Ok(())
}

/// Like [`read_rect`], but fans the per-tile copies out through `runner`
/// and blocks until all of them finish.
pub fn read_rect_with_runner(
    store: &Store,
    dst: &mut [u8],
    dst_pitch: usize,
    rx: u32,
    ry: u32,
    rw: u32,
    rh: u32,
    runner: &dyn TaskRunner,
) -> Result<()> {
    let ops = plan_rect(store.geom(), dst_pitch, dst.len(), rx, ry, rw, rh, Direction::Read)?;
    if ops.is_empty() {
        return Ok(());
    }
    let _global = store.global_lock().read().unwrap_or_else(|e| e.into_inner());
    let raw = RawMutBuf { ptr: dst.as_mut_ptr(), len: dst.len() };
    let first_error: Mutex<Option<Error>> = Mutex::new(None);

    let op = |i: usize| {
        let (bx, by) = ops[i];
        if let Err(e) = copy_read_tile(store, raw.ptr, raw.len, dst_pitch, rx, ry, rw, rh, bx, by) {
            let mut guard = first_error.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_none() {
                *guard = Some(e);
            }
        }
    };
    runner.run_range(ops.len(), &op);

    match first_error.into_inner().unwrap_or(None) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Submits `(rx, ry, rw, rh)` as an asynchronous read against `dst` and
/// returns immediately with a handle to wait on.
///
/// # Safety
/// `dst` must remain allocated and must not be read or written by
/// anything else until the returned [`WaitHandle::wait`] call returns.
pub unsafe fn read_rect_async(
    store: Arc<Store>,
    dst: &mut [u8],
    dst_pitch: usize,
    rx: u32,
    ry: u32,
    rw: u32,
    rh: u32,
    runner: Arc<dyn TaskRunner>,
) -> Result<Box<dyn WaitHandle>> {
    let ops = plan_rect(store.geom(), dst_pitch, dst.len(), rx, ry, rw, rh, Direction::Read)?;
    let (tx, rx_chan) = crossbeam::channel::bounded(1);
    if ops.is_empty() {
        let _ = tx.send(Ok(()));
        return Ok(Box::new(ChannelWaitHandle { rx: rx_chan }));
    }

    let raw = RawMutBuf { ptr: dst.as_mut_ptr(), len: dst.len() };
    store.begin_async_op();

    thread::spawn(move || {
        let _global = store.global_lock().read().unwrap_or_else(|e| e.into_inner());
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let op = |i: usize| {
            let (bx, by) = ops[i];
            if let Err(e) = copy_read_tile(&store, raw.ptr, raw.len, dst_pitch, rx, ry, rw, rh, bx, by) {
                let mut guard = first_error.lock().unwrap_or_else(|e| e.into_inner());
                if guard.is_none() {
                    *guard = Some(e);
                }
            }
        };
        runner.run_range(ops.len(), &op);
        store.end_async_op();
        let _ = tx.send(match first_error.into_inner().unwrap_or(None) {
            Some(e) => Err(e),
            None => Ok(()),
        });
    });

    Ok(Box::new(ChannelWaitHandle { rx: rx_chan }))
}

/// Writes `src` into `(rx, ry, rw, rh)` on the caller's own thread.
pub fn write_rect(store: &Store, src: &[u8], src_pitch: usize, rx: u32, ry: u32, rw: u32, rh: u32) -> Result<()> {
    if store.is_read_only_internal() {
        return Err(Error::ReadOnly);
    }
    let ops = plan_rect(store.geom(), src_pitch, src.len(), rx, ry, rw, rh, Direction::Write)?;
    if ops.is_empty() {
        return Ok(());
    }
    let _global = store.global_lock().read().unwrap_or_else(|e| e.into_inner());
    let src_len = src.len();
    let ptr = src.as_ptr();
    for (bx, by) in ops {
        copy_write_tile(store, ptr, src_len, src_pitch, rx, ry, rw, rh, bx, by)?;
    }
    Ok(())
}

/// Like [`write_rect`], but fans the per-tile copies out through `runner`
/// and blocks until all of them finish.
pub fn write_rect_with_runner(
    store: &Store,
    src: &[u8],
    src_pitch: usize,
    rx: u32,
    ry: u32,
    rw: u32,
    rh: u32,
    runner: &dyn TaskRunner,
) -> Result<()> {
    if store.is_read_only_internal() {
        return Err(Error::ReadOnly);
    }
    let ops = plan_rect(store.geom(), src_pitch, src.len(), rx, ry, rw, rh, Direction::Write)?;
    if ops.is_empty() {
        return Ok(());
    }
    let _global = store.global_lock().read().unwrap_or_else(|e| e.into_inner());
    let raw = RawConstBuf { ptr: src.as_ptr(), len: src.len() };
    let first_error: Mutex<Option<Error>> = Mutex::new(None);

    let op = |i: usize| {
        let (bx, by) = ops[i];
        if let Err(e) = copy_write_tile(store, raw.ptr, raw.len, src_pitch, rx, ry, rw, rh, bx, by) {
            let mut guard = first_error.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_none() {
                *guard = Some(e);
            }
        }
    };
    runner.run_range(ops.len(), &op);

    match first_error.into_inner().unwrap_or(None) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Submits `(rx, ry, rw, rh)` as an asynchronous write of `src` and
/// returns immediately with a handle to wait on.
///
/// # Safety
/// `src` must remain allocated and must not be written to by anything
/// else until the returned [`WaitHandle::wait`] call returns.
pub unsafe fn write_rect_async(
    store: Arc<Store>,
    src: &[u8],
    src_pitch: usize,
    rx: u32,
    ry: u32,
    rw: u32,
    rh: u32,
    runner: Arc<dyn TaskRunner>,
) -> Result<Box<dyn WaitHandle>> {
    if store.is_read_only_internal() {
        return Err(Error::ReadOnly);
    }
    let ops = plan_rect(store.geom(), src_pitch, src.len(), rx, ry, rw, rh, Direction::Write)?;
    let (tx, rx_chan) = crossbeam::channel::bounded(1);
    if ops.is_empty() {
        let _ = tx.send(Ok(()));
        return Ok(Box::new(ChannelWaitHandle { rx: rx_chan }));
    }

    let raw = RawConstBuf { ptr: src.as_ptr(), len: src.len() };
    store.begin_async_op();

    thread::spawn(move || {
        let _global = store.global_lock().read().unwrap_or_else(|e| e.into_inner());
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let op = |i: usize| {
            let (bx, by) = ops[i];
            if let Err(e) = copy_write_tile(&store, raw.ptr, raw.len, src_pitch, rx, ry, rw, rh, bx, by) {
                let mut guard = first_error.lock().unwrap_or_else(|e| e.into_inner());
                if guard.is_none() {
                    *guard = Some(e);
                }
            }
        };
        runner.run_range(ops.len(), &op);
        store.end_async_op();
        let _ = tx.send(match first_error.into_inner().unwrap_or(None) {
            Some(e) => Err(e),
            None => Ok(()),
        });
    });

    Ok(Box::new(ChannelWaitHandle { rx: rx_chan }))
}

fn duplicate_row(dst: &mut [u8], dst_pitch: usize, row_bytes: usize, src_row: u32, dest_row: u32) {
    if src_row == dest_row {
        return;
    }
    let src_off = src_row as usize * dst_pitch;
    let mut tmp = vec![0u8; row_bytes];
    tmp.copy_from_slice(&dst[src_off..src_off + row_bytes]);
    let dst_off = dest_row as usize * dst_pitch;
    dst[dst_off..dst_off + row_bytes].copy_from_slice(&tmp);
}

fn fill_left_margin(dst: &mut [u8], row_off: usize, bpp: usize, off_left: u32) {
    if off_left == 0 {
        return;
    }
    let edge_off = row_off + off_left as usize * bpp;
    let mut edge = [0u8; 16];
    edge[..bpp].copy_from_slice(&dst[edge_off..edge_off + bpp]);
    for i in 0..off_left as usize {
        let o = row_off + i * bpp;
        dst[o..o + bpp].copy_from_slice(&edge[..bpp]);
    }
}

fn fill_right_margin(dst: &mut [u8], row_off: usize, bpp: usize, dw: u32, off_right: u32) {
    if off_right == 0 {
        return;
    }
    let last_valid = dw - off_right - 1;
    let edge_off = row_off + last_valid as usize * bpp;
    let mut edge = [0u8; 16];
    edge[..bpp].copy_from_slice(&dst[edge_off..edge_off + bpp]);
    for i in (dw - off_right)..dw {
        let o = row_off + i as usize * bpp;
        dst[o..o + bpp].copy_from_slice(&edge[..bpp]);
    }
}

fn read_rect_clamped_impl(
    store: &Store,
    dst: &mut [u8],
    dst_pitch: usize,
    dx: i64,
    dy: i64,
    dw: u32,
    dh: u32,
    runner: Option<&dyn TaskRunner>,
) -> Result<()> {
    let bpp = store.geom().bytes_per_pixel();
    if bpp > 16 {
        return Err(Error::invalid("clamped read does not support pixel formats wider than 16 bytes"));
    }
    if dw == 0 || dh == 0 {
        return Err(Error::EmptyAfterClip);
    }

    let width = store.geom().width as i64;
    let height = store.geom().height as i64;

    let off_left = (-dx).max(0) as u32;
    let off_top = (-dy).max(0) as u32;
    let off_right = ((dx + dw as i64) - width).max(0) as u32;
    let off_bottom = ((dy + dh as i64) - height).max(0) as u32;

    let eff_w = dw as i64 - off_left as i64 - off_right as i64;
    let eff_h = dh as i64 - off_top as i64 - off_bottom as i64;
    if eff_w <= 0 || eff_h <= 0 {
        return Err(Error::EmptyAfterClip);
    }
    let eff_w = eff_w as u32;
    let eff_h = eff_h as u32;
    let src_x = (dx + off_left as i64) as u32;
    let src_y = (dy + off_top as i64) as u32;

    let dest_offset = off_top as usize * dst_pitch + off_left as usize * bpp;
    match runner {
        None => read_rect(store, &mut dst[dest_offset..], dst_pitch, src_x, src_y, eff_w, eff_h)?,
        Some(r) => read_rect_with_runner(store, &mut dst[dest_offset..], dst_pitch, src_x, src_y, eff_w, eff_h, r)?,
    }

    for y in off_top..(off_top + eff_h) {
        let row_off = y as usize * dst_pitch;
        fill_left_margin(dst, row_off, bpp, off_left);
        fill_right_margin(dst, row_off, bpp, dw, off_right);
    }

    let row_bytes = dw as usize * bpp;
    for y in 0..off_top {
        duplicate_row(dst, dst_pitch, row_bytes, off_top, y);
    }
    for y in (dh - off_bottom)..dh {
        duplicate_row(dst, dst_pitch, row_bytes, dh - off_bottom - 1, y);
    }

    Ok(())
}

/// Reads `(dx, dy, dw, dh)`, clipping to the image and then replicating
/// edge pixels to fill the parts of the destination that fall outside it.
pub fn read_rect_clamped(store: &Store, dst: &mut [u8], dst_pitch: usize, dx: i64, dy: i64, dw: u32, dh: u32) -> Result<()> {
    read_rect_clamped_impl(store, dst, dst_pitch, dx, dy, dw, dh, None)
}

/// Like [`read_rect_clamped`], fanning the inner rectangle read out
/// through `runner`.
pub fn read_rect_clamped_with_runner(
    store: &Store,
    dst: &mut [u8],
    dst_pitch: usize,
    dx: i64,
    dy: i64,
    dw: u32,
    dh: u32,
    runner: &dyn TaskRunner,
) -> Result<()> {
    read_rect_clamped_impl(store, dst, dst_pitch, dx, dy, dw, dh, Some(runner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_format::PixelFormat;
    use crate::store::{Store, StoreOptions};
    use tempfile::NamedTempFile;

    fn temp_path() -> std::path::PathBuf {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().to_path_buf();
        drop(f);
        path
    }

    #[test]
    fn test_write_then_read_rect_round_trip() {
        let path = temp_path();
        let store = Store::create_with_options(
            &path,
            PixelFormat::Generic32,
            300,
            300,
            StoreOptions { tile_dim: 256, memory_limit: 32 * 1024 * 1024 },
        )
        .unwrap();

        let w = 4u32;
        let h = 4u32;
        let pitch = w as usize * 4;
        let src: Vec<u8> = (0..(pitch * h as usize)).map(|i| i as u8).collect();
        write_rect(&store, &src, pitch, 254, 254, w, h).unwrap();

        let mut dst = vec![0u8; pitch * h as usize];
        read_rect(&store, &mut dst, pitch, 254, 254, w, h).unwrap();
        assert_eq!(dst, src);
        store.close().unwrap();
    }

    #[test]
    fn test_write_rect_with_rayon_runner() {
        let path = temp_path();
        let store = Store::create_with_options(
            &path,
            PixelFormat::Generic8,
            512,
            512,
            StoreOptions { tile_dim: 64, memory_limit: 32 * 1024 * 1024 },
        )
        .unwrap();

        let runner = RayonTaskRunner;
        let pitch = 512usize;
        let src = vec![9u8; pitch * 512];
        write_rect_with_runner(&store, &src, pitch, 0, 0, 512, 512, &runner).unwrap();

        let mut dst = vec![0u8; pitch * 512];
        read_rect_with_runner(&store, &mut dst, pitch, 0, 0, 512, 512, &runner).unwrap();
        assert_eq!(dst, src);
        store.close().unwrap();
    }

    #[test]
    fn test_async_write_then_wait_then_read() {
        let path = temp_path();
        let store = Arc::new(
            Store::create_with_options(
                &path,
                PixelFormat::Generic8,
                64,
                64,
                StoreOptions { tile_dim: 16, memory_limit: 32 * 1024 * 1024 },
            )
            .unwrap(),
        );
        let runner: Arc<dyn TaskRunner> = Arc::new(RayonTaskRunner);

        let mut src = vec![7u8; 64 * 64];
        let handle = unsafe {
            write_rect_async(Arc::clone(&store), &mut src, 64, 0, 0, 64, 64, Arc::clone(&runner)).unwrap()
        };
        handle.wait().unwrap();

        let mut dst = vec![0u8; 64 * 64];
        let handle = unsafe { read_rect_async(Arc::clone(&store), &mut dst, 64, 0, 0, 64, 64, runner).unwrap() };
        handle.wait().unwrap();
        assert_eq!(dst, src);

        Arc::try_unwrap(store).ok().unwrap().close().unwrap();
    }

    #[test]
    fn test_read_rect_clamped_matches_read_rect_when_fully_inside() {
        let path = temp_path();
        let store = Store::create(&path, PixelFormat::Generic8, 32, 32).unwrap();
        store.fill(&[1]).unwrap();
        store.set_pixel(5, 5, &[42]).unwrap();

        let mut a = vec![0u8; 10 * 10];
        read_rect(&store, &mut a, 10, 2, 2, 10, 10).unwrap();
        let mut b = vec![0u8; 10 * 10];
        read_rect_clamped(&store, &mut b, 10, 2, 2, 10, 10).unwrap();
        assert_eq!(a, b);
        store.close().unwrap();
    }

    #[test]
    fn test_read_rect_clamped_corner() {
        let path = temp_path();
        let store = Store::create(&path, PixelFormat::Generic8, 8, 8).unwrap();
        store.fill(&[1]).unwrap();

        let mut dst = vec![0u8; 12 * 12];
        read_rect_clamped(&store, &mut dst, 12, -2, -2, 12, 12).unwrap();
        assert!(dst.iter().all(|&b| b == 1));
        store.close().unwrap();
    }

    #[test]
    fn test_read_rect_clamped_empty_after_clip() {
        let path = temp_path();
        let store = Store::create(&path, PixelFormat::Generic8, 8, 8).unwrap();
        let mut dst = vec![0u8; 4 * 4];
        let err = read_rect_clamped(&store, &mut dst, 4, 100, 100, 4, 4).unwrap_err();
        assert!(matches!(err, Error::EmptyAfterClip));
        store.close().unwrap();
    }

    #[test]
    fn test_zero_area_rect_is_noop() {
        let path = temp_path();
        let store = Store::create(&path, PixelFormat::Generic8, 8, 8).unwrap();
        let mut dst = Vec::new();
        read_rect(&store, &mut dst, 0, 0, 0, 0, 0).unwrap();
        store.close().unwrap();
    }

    #[test]
    fn test_write_rejected_on_read_only() {
        let path = temp_path();
        let store = Store::create(&path, PixelFormat::Generic8, 8, 8).unwrap();
        store.close().unwrap();
        let reopened = Store::open(&path, true).unwrap();
        let src = vec![1u8; 16];
        let err = write_rect(&reopened, &src, 4, 0, 0, 4, 4).unwrap_err();
        assert!(matches!(err, Error::ReadOnly));
        reopened.close().unwrap();
    }
}

//! ltbs - a large tiled bitmap store
//!
//! `ltbs` treats a file on disk as one enormous 2D pixel grid by
//! partitioning it into fixed-size square tiles and paging them through a
//! bounded in-memory cache. Point reads/writes and bulk rectangle
//! operations share one lock-ordered concurrency model, so independent
//! regions of the image can be accessed from multiple threads at once.
//!
//! # Examples
//!
//! ## Create, write, and read back
//!
//! ```no_run
//! use ltbs::{Store, PixelFormat};
//!
//! let store = Store::create("image.lbf", PixelFormat::Rgba32, 4096, 4096)?;
//! store.set_pixel(10, 10, &[255, 0, 0, 255])?;
//! assert_eq!(store.get_pixel(10, 10)?, vec![255, 0, 0, 255]);
//! store.close()?;
//! # Ok::<(), ltbs::Error>(())
//! ```
//!
//! ## Bulk rectangle access
//!
//! ```no_run
//! use ltbs::{Store, PixelFormat, rect};
//!
//! let store = Store::create("image.lbf", PixelFormat::Generic8, 4096, 4096)?;
//! let src = vec![128u8; 64 * 64];
//! rect::write_rect(&store, &src, 64, 0, 0, 64, 64)?;
//!
//! let mut dst = vec![0u8; 64 * 64];
//! rect::read_rect(&store, &mut dst, 64, 0, 0, 64, 64)?;
//! assert_eq!(dst, src);
//! store.close()?;
//! # Ok::<(), ltbs::Error>(())
//! ```

pub mod cache;
pub mod error;
pub mod geometry;
pub mod header;
pub mod io;
pub mod pixel_format;
pub mod rect;
pub mod store;
pub mod tile;

pub use error::{Error, Result};
pub use pixel_format::PixelFormat;
pub use rect::{RayonTaskRunner, TaskRunner, WaitHandle};
pub use store::{Store, StoreOptions};

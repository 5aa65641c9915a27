//! wsi-reader - a read-only library for whole slide images.
//!
//! Slide scanners produce gigapixel microscopy files in a pile of vendor
//! formats, most of them TIFF containers with a pyramid of downsampled
//! levels. This library opens such a file, exposes the level pyramid, and
//! renders arbitrary axis-aligned regions at any level into premultiplied
//! ARGB32 buffers, along with associated thumbnails (label, macro) and a
//! keyed property map (vendor metadata, resolution, objective power).
//!
//! ```no_run
//! use wsi_reader::Slide;
//!
//! let slide = Slide::open("slide.scn")?;
//! let (w, h) = slide.dimensions();
//! println!("{}x{} pixels, {} levels", w, h, slide.level_count());
//!
//! // 512x512 region at level 1, anchored at level-0 coordinates (1024, 1024)
//! let pixels = slide.read_region(1024, 1024, 1, 512, 512)?;
//! # Ok::<(), wsi_reader::Error>(())
//! ```
//!
//! The library is synchronous and creates no threads; a [`Slide`] may be
//! shared across any number of rendering threads. Decoded tiles are kept in
//! a byte-bounded LRU cache which can be shared between slides.

pub mod cache;
pub mod error;
pub mod grid;
pub mod hash;
pub mod io;
pub mod properties;
pub mod slide;
pub mod surface;
pub mod tiff;
pub mod vendor;
pub mod xml;

// Re-export the caller-facing surface.
pub use cache::{TileCache, TileHandle, DEFAULT_TILE_CACHE_CAPACITY};
pub use error::{Context, Error, Result};
pub use properties::{keys, PropertyMap};
pub use slide::{AssociatedImage, LevelInfo, Slide, SlideOptions};

//! Slide façade: the caller-facing handle.
//!
//! [`Slide::open`] probes the file against the vendor registry, builds the
//! level pyramid, property map, associated images and quickhash, and never
//! returns a partially initialized slide. After open, all metadata is
//! immutable; [`Slide::read_region`] may be called from any number of
//! threads concurrently.
//!
//! The error state is sticky: the first render failure is recorded on the
//! slide and every later render call short-circuits with the same message.
//! A slide cannot be repaired; close and reopen instead.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::cache::{TileCache, DEFAULT_TILE_CACHE_CAPACITY};
use crate::error::{Context, Error, Result};
use crate::hash;
use crate::io::FileReader;
use crate::properties::{keys, PropertyMap};
use crate::surface::Surface;
use crate::vendor::{self, OpenContext, SlideOps};

// =============================================================================
// Public geometry types
// =============================================================================

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Level width in pixels
    pub width: i64,

    /// Level height in pixels
    pub height: i64,

    /// Ratio of level-0 size to this level's size; level 0 is exactly 1.0
    pub downsample: f64,

    /// Tile width of the level's first area
    pub tile_width: u32,

    /// Tile height of the level's first area
    pub tile_height: u32,
}

/// A non-pyramidal thumbnail carried alongside the pyramid.
#[derive(Debug, Clone, Copy)]
pub struct AssociatedImage {
    /// Image width in pixels
    pub width: i64,

    /// Image height in pixels
    pub height: i64,

    pub(crate) dir: usize,
}

impl AssociatedImage {
    pub(crate) fn new(width: i64, height: i64, dir: usize) -> Self {
        AssociatedImage { width, height, dir }
    }
}

/// Open-time settings.
#[derive(Clone)]
pub struct SlideOptions {
    /// Byte budget for a newly created tile cache.
    pub tile_cache_bytes: usize,

    /// Existing cache to share between slides; overrides `tile_cache_bytes`.
    pub tile_cache: Option<Arc<TileCache>>,
}

impl Default for SlideOptions {
    fn default() -> Self {
        SlideOptions {
            tile_cache_bytes: DEFAULT_TILE_CACHE_CAPACITY,
            tile_cache: None,
        }
    }
}

// =============================================================================
// Slide
// =============================================================================

/// An open whole-slide image.
pub struct Slide {
    path: PathBuf,
    vendor: &'static str,
    levels: Vec<LevelInfo>,
    properties: PropertyMap,
    associated: IndexMap<String, AssociatedImage>,
    ops: Box<dyn SlideOps>,
    error: Mutex<Option<String>>,
}

impl Slide {
    /// Open a slide with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, SlideOptions::default())
    }

    /// Open a slide, probing the vendor registry.
    pub fn open_with(path: impl AsRef<Path>, options: SlideOptions) -> Result<Self> {
        let path = path.as_ref();
        let reader = Arc::new(FileReader::open(path)?);
        let cache = options
            .tile_cache
            .unwrap_or_else(|| Arc::new(TileCache::with_capacity(options.tile_cache_bytes)));

        let ctx = OpenContext {
            reader: reader.clone(),
            cache,
        };
        let (probed, tiff) = vendor::probe(&ctx)?;

        let quickhash = hash::compute(&reader, tiff.as_deref(), &probed.quickhash)
            .context("Couldn't compute quickhash")?;

        let mut properties = probed.properties;
        properties.set(keys::VENDOR, probed.vendor);
        properties.set(keys::QUICKHASH_1, quickhash);
        properties.set(keys::LEVEL_COUNT, probed.levels.len().to_string());
        for (i, level) in probed.levels.iter().enumerate() {
            properties.set(keys::level_width(i), level.width.to_string());
            properties.set(keys::level_height(i), level.height.to_string());
            properties.set(keys::level_downsample(i), format!("{}", level.downsample));
            properties.set(keys::level_tile_width(i), level.tile_width.to_string());
            properties.set(keys::level_tile_height(i), level.tile_height.to_string());
        }
        properties.sort_keys();

        tracing::debug!(
            path = %path.display(),
            vendor = probed.vendor,
            levels = probed.levels.len(),
            "opened slide"
        );

        Ok(Slide {
            path: path.to_path_buf(),
            vendor: probed.vendor,
            levels: probed.levels,
            properties,
            associated: probed.associated.into_iter().collect(),
            ops: probed.ops,
            error: Mutex::new(None),
        })
    }

    /// Path the slide was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the vendor that claimed the slide.
    pub fn vendor(&self) -> &str {
        self.vendor
    }

    // -------------------------------------------------------------------------
    // Level queries
    // -------------------------------------------------------------------------

    /// Number of pyramid levels; always at least 1.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Dimensions of level 0.
    pub fn dimensions(&self) -> (i64, i64) {
        (self.levels[0].width, self.levels[0].height)
    }

    /// Dimensions of a level, or `None` out of range.
    pub fn level_dimensions(&self, level: usize) -> Option<(i64, i64)> {
        self.levels.get(level).map(|l| (l.width, l.height))
    }

    /// Downsample factor of a level, or `None` out of range.
    pub fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.downsample)
    }

    /// Full geometry of a level, or `None` out of range.
    pub fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.levels.get(level).copied()
    }

    /// Largest level index whose downsample does not exceed `downsample`,
    /// or 0 when none qualifies.
    pub fn best_level_for_downsample(&self, downsample: f64) -> usize {
        let mut best = 0;
        for (i, level) in self.levels.iter().enumerate() {
            if level.downsample <= downsample {
                best = i;
            }
        }
        best
    }

    // -------------------------------------------------------------------------
    // Properties and associated images
    // -------------------------------------------------------------------------

    /// Iterate `(name, value)` property pairs in sorted key order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter()
    }

    /// Look up one property value.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name)
    }

    /// Names of the associated images.
    pub fn associated_image_names(&self) -> impl Iterator<Item = &str> {
        self.associated.keys().map(String::as_str)
    }

    /// Dimensions of an associated image.
    pub fn associated_image_dimensions(&self, name: &str) -> Option<(i64, i64)> {
        self.associated.get(name).map(|a| (a.width, a.height))
    }

    /// Decode an associated image into premultiplied ARGB32.
    pub fn read_associated_image(&self, name: &str) -> Result<Vec<u8>> {
        let image = *self
            .associated
            .get(name)
            .ok_or_else(|| Error::Failed(format!("Unknown associated image: {name}")))?;
        self.run_render(|| self.ops.read_associated_image(image.dir))
    }

    // -------------------------------------------------------------------------
    // Region reads
    // -------------------------------------------------------------------------

    /// Read a region into a fresh buffer of `w * h` premultiplied ARGB32
    /// pixels.
    ///
    /// `(x, y)` are level-0 pixel coordinates of the top-left corner; the
    /// region is sampled at `level`. Parts of the region outside the canvas
    /// (or covered by no area) come back transparent black.
    pub fn read_region(&self, x: i64, y: i64, level: usize, w: i64, h: i64) -> Result<Vec<u8>> {
        let size = self.run_render(|| region_buffer_size(w, h))?;
        let mut buf = vec![0u8; size];
        self.read_region_into(&mut buf, x, y, level, w, h)?;
        Ok(buf)
    }

    /// Read a region into a caller-supplied `w * h * 4` byte buffer.
    ///
    /// On failure the buffer contents are unspecified.
    pub fn read_region_into(
        &self,
        buf: &mut [u8],
        x: i64,
        y: i64,
        level: usize,
        w: i64,
        h: i64,
    ) -> Result<()> {
        self.run_render(|| {
            let expected = region_buffer_size(w, h)?;
            if buf.len() != expected {
                return Err(Error::Failed(format!(
                    "Region buffer is {} bytes, expected {expected}",
                    buf.len()
                )));
            }
            if level >= self.levels.len() {
                return Err(Error::Failed(format!("Invalid level {level}")));
            }

            buf.fill(0);
            if w == 0 || h == 0 {
                return Ok(());
            }

            let mut surface = Surface::new(buf, w as u32, h as u32)?;
            self.ops
                .paint_region(&mut surface, x, y, level, w as u32, h as u32)
        })
    }

    /// The sticky error message, if a render call has failed.
    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    /// Short-circuit on the sticky error, otherwise run `f` and record its
    /// failure as the sticky error.
    fn run_render<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(Error::Failed(message.clone()));
        }
        match f() {
            Ok(value) => Ok(value),
            Err(e) => {
                let mut slot = self.error.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(e.to_string());
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Slide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slide")
            .field("path", &self.path)
            .field("vendor", &self.vendor)
            .field("levels", &self.levels)
            .field("error", &self.error())
            .finish()
    }
}

/// Byte size of a `w * h` ARGB32 region buffer, with overflow checks.
fn region_buffer_size(w: i64, h: i64) -> Result<usize> {
    if w < 0 || h < 0 {
        return Err(Error::Failed(format!("Negative region size {w}x{h}")));
    }
    if w > u32::MAX as i64 || h > u32::MAX as i64 {
        return Err(Error::Failed(format!("Region too large: {w}x{h}")));
    }
    (w as u64)
        .checked_mul(h as u64)
        .and_then(|p| p.checked_mul(4))
        .filter(|p| *p <= usize::MAX as u64)
        .map(|p| p as usize)
        .ok_or_else(|| Error::Failed(format!("Region too large: {w}x{h}")))
}

// =============================================================================
// Tests
// =============================================================================

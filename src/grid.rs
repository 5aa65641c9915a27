//! Tile grid region painter.
//!
//! A [`Grid`] maps a caller's rectangle in level pixel coordinates to the
//! set of intersecting tiles and invokes a read-tile callback for each, in
//! row-major order, with the surface origin translated to the tile's
//! position. The region origin may be fractional; tile coordinates are
//! always integral. The first callback failure stops the walk and
//! propagates.

use crate::error::Result;
use crate::surface::Surface;

/// A uniform grid of `tiles_across x tiles_down` tiles of identical size.
#[derive(Debug, Clone)]
pub struct Grid {
    tiles_across: i64,
    tiles_down: i64,
    tile_w: u32,
    tile_h: u32,
}

impl Grid {
    /// Create a simple grid.
    pub fn simple(tiles_across: i64, tiles_down: i64, tile_w: u32, tile_h: u32) -> Self {
        Grid {
            tiles_across,
            tiles_down,
            tile_w,
            tile_h,
        }
    }

    /// Tile width in pixels.
    pub fn tile_width(&self) -> u32 {
        self.tile_w
    }

    /// Tile height in pixels.
    pub fn tile_height(&self) -> u32 {
        self.tile_h
    }

    /// Paint the region `[x, x+w) x [y, y+h)` in grid pixel coordinates.
    ///
    /// For every intersecting tile, saves the surface state, translates the
    /// origin to `(col * tile_w - x, row * tile_h - y)`, invokes
    /// `read_tile(surface, col, row)`, and restores. Tiles outside the grid
    /// are skipped, so a region hanging off the grid simply paints less.
    pub fn paint_region<F>(
        &self,
        surface: &mut Surface<'_>,
        x: f64,
        y: f64,
        w: u32,
        h: u32,
        mut read_tile: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Surface<'_>, i64, i64) -> Result<()>,
    {
        if w == 0 || h == 0 {
            return Ok(());
        }

        let tw = self.tile_w as f64;
        let th = self.tile_h as f64;

        let col_lo = ((x / tw).floor() as i64).max(0);
        let col_hi = (((x + w as f64) / tw).ceil() as i64).min(self.tiles_across);
        let row_lo = ((y / th).floor() as i64).max(0);
        let row_hi = (((y + h as f64) / th).ceil() as i64).min(self.tiles_down);

        for row in row_lo..row_hi {
            for col in col_lo..col_hi {
                surface.save();
                surface.translate(col as f64 * tw - x, row as f64 * th - y);
                let result = read_tile(surface, col, row);
                surface.restore();
                result?;
            }
        }
        Ok(())
    }
}

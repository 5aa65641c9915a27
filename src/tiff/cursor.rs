//! Per-worker decode cursor.
//!
//! A cursor pairs the shared parsed structure with a current-directory
//! position and a reusable payload buffer. Cursors are never shared between
//! threads; rendering workers borrow one from the slide's handle pool.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::io::FileReader;

use super::decode::{clip_tile_argb, decode_jpeg_argb, decode_raw_argb, prepare_tile_jpeg};
use super::file::{Directory, TiffFile};
use super::tags::{COMPRESSION_JPEG, COMPRESSION_NONE};

/// Positioned reader with private per-directory decode state.
pub struct TiffCursor {
    reader: Arc<FileReader>,
    tiff: Arc<TiffFile>,
    current_dir: Option<usize>,
    scratch: Vec<u8>,
}

impl TiffCursor {
    /// Create a cursor over a parsed TIFF file.
    pub fn new(reader: Arc<FileReader>, tiff: Arc<TiffFile>) -> Self {
        TiffCursor {
            reader,
            tiff,
            current_dir: None,
            scratch: Vec::new(),
        }
    }

    /// Select the directory subsequent tile reads address.
    pub fn set_directory(&mut self, dir: usize) -> Result<()> {
        if dir >= self.tiff.directory_count() {
            return Err(Error::BadData("Cannot set TIFF directory".to_string()));
        }
        self.current_dir = Some(dir);
        Ok(())
    }

    /// The currently selected directory.
    pub fn directory(&self) -> Result<&Directory> {
        let dir = self
            .current_dir
            .ok_or_else(|| Error::Failed("No TIFF directory selected".to_string()))?;
        Ok(&self.tiff.directories[dir])
    }

    /// Decode one tile of the current directory into `dest` as ARGB32.
    ///
    /// `dest` must hold `tile_w * tile_h * 4` bytes. A sparse tile (zero
    /// byte count) decodes fully transparent.
    pub fn read_tile(&mut self, col: i64, row: i64, dest: &mut [u8]) -> Result<()> {
        let dir = self.directory()?;
        let tiling = dir.tiling.as_ref().ok_or_else(|| {
            Error::BadData(format!("TIFF directory {} is not tiled", dir.index))
        })?;

        let expected = tiling.tile_width as usize * tiling.tile_height as usize * 4;
        if dest.len() != expected {
            return Err(Error::Failed(format!(
                "Tile buffer is {} bytes, expected {expected}",
                dest.len()
            )));
        }

        let (offset, byte_count) = tiling
            .tile_location(col, row)
            .ok_or_else(|| Error::Failed(format!("Tile ({col}, {row}) out of range")))?;

        if byte_count == 0 {
            dest.fill(0);
            return Ok(());
        }

        let (tile_w, tile_h) = (tiling.tile_width, tiling.tile_height);
        let compression = dir.compression;
        let samples = dir.samples_per_pixel;
        let jpeg_tables = dir.jpeg_tables.clone();

        self.scratch.resize(byte_count as usize, 0);
        self.reader
            .read_exact_at_into(&mut self.scratch, offset)
            .map_err(|e| e.context("Couldn't read tile data"))?;

        match compression {
            COMPRESSION_NONE => decode_raw_argb(&self.scratch, tile_w, tile_h, samples, dest),
            COMPRESSION_JPEG => {
                let jpeg = prepare_tile_jpeg(jpeg_tables.as_deref(), &self.scratch);
                decode_jpeg_argb(&jpeg, tile_w, tile_h, dest)
            }
            n => Err(Error::BadData(format!("Unsupported TIFF compression: {n}"))),
        }
    }

    /// Clear the parts of a decoded tile beyond the image extent.
    pub fn clip_tile(&self, col: i64, row: i64, dest: &mut [u8]) -> Result<()> {
        let dir = self.directory()?;
        let tiling = dir.tiling()?;
        if let Some((valid_w, valid_h)) = dir.clipped_tile_dimensions(col, row) {
            clip_tile_argb(dest, tiling.tile_width, tiling.tile_height, valid_w, valid_h);
        }
        Ok(())
    }

    /// Decode a whole directory into a fresh ARGB32 buffer.
    ///
    /// Used for associated images (label, macro); tiles are read directly
    /// without going through the tile cache.
    pub fn decode_directory(&mut self, dir: usize) -> Result<Vec<u8>> {
        self.set_directory(dir)?;
        let d = self.directory()?;
        let (width, height) = (d.width as usize, d.height as usize);
        let tiling = d.tiling()?.clone();

        let mut out = vec![0u8; width * height * 4];
        let mut tile = vec![0u8; tiling.tile_width as usize * tiling.tile_height as usize * 4];

        for row in 0..tiling.tiles_down {
            for col in 0..tiling.tiles_across {
                self.read_tile(col, row, &mut tile)?;
                self.clip_tile(col, row, &mut tile)?;

                let dst_x = col as usize * tiling.tile_width as usize;
                let dst_y = row as usize * tiling.tile_height as usize;
                let copy_w = (tiling.tile_width as usize).min(width - dst_x);
                let copy_h = (tiling.tile_height as usize).min(height - dst_y);

                for ty in 0..copy_h {
                    let src_start = ty * tiling.tile_width as usize * 4;
                    let dst_start = ((dst_y + ty) * width + dst_x) * 4;
                    out[dst_start..dst_start + copy_w * 4]
                        .copy_from_slice(&tile[src_start..src_start + copy_w * 4]);
                }
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for TiffCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffCursor")
            .field("current_dir", &self.current_dir)
            .finish()
    }
}

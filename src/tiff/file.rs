//! Directory enumeration and per-directory geometry.
//!
//! [`TiffFile::open`] walks the IFD chain once and summarizes every
//! directory: pixel dimensions, tile geometry and location tables,
//! compression, description string, resolution fields and ICC profile. The
//! result is immutable and shared by all cursors of a slide.

use bytes::Bytes;

use crate::io::FileReader;

use super::parser::{Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{TiffTag, RESUNIT_DEFAULT};
use super::values::ValueReader;
use super::TiffError;

/// Upper bound on entries per IFD; real slide directories carry a few dozen.
const MAX_IFD_ENTRIES: u64 = 4096;

// =============================================================================
// Tiling
// =============================================================================

/// Tile geometry and location tables of one tiled directory.
#[derive(Debug, Clone)]
pub struct Tiling {
    /// Width of each tile in pixels
    pub tile_width: u32,

    /// Height of each tile in pixels
    pub tile_height: u32,

    /// Number of tile columns
    pub tiles_across: i64,

    /// Number of tile rows
    pub tiles_down: i64,

    /// Byte offset of each tile in the file, row-major
    pub offsets: Vec<u64>,

    /// Byte count of each tile; zero marks a sparse (absent) tile
    pub byte_counts: Vec<u64>,
}

impl Tiling {
    /// Row-major tile index for a coordinate, or `None` out of bounds.
    pub fn tile_index(&self, col: i64, row: i64) -> Option<usize> {
        if col < 0 || row < 0 || col >= self.tiles_across || row >= self.tiles_down {
            return None;
        }
        Some((row * self.tiles_across + col) as usize)
    }

    /// File location `(offset, byte_count)` of a tile.
    pub fn tile_location(&self, col: i64, row: i64) -> Option<(u64, u64)> {
        let idx = self.tile_index(col, row)?;
        Some((self.offsets[idx], self.byte_counts[idx]))
    }
}

// =============================================================================
// Directory
// =============================================================================

/// Summary of one TIFF directory.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Position in the IFD chain
    pub index: usize,

    /// Image width in pixels
    pub width: i64,

    /// Image height in pixels
    pub height: i64,

    /// Compression scheme id
    pub compression: u16,

    /// Components per pixel
    pub samples_per_pixel: u16,

    /// ImageDescription string, if present
    pub image_description: Option<String>,

    /// Shared JPEG tables for abbreviated tile streams
    pub jpeg_tables: Option<Bytes>,

    /// Embedded ICC profile bytes
    pub icc_profile: Option<Bytes>,

    /// XResolution in pixels per resolution unit
    pub x_resolution: Option<f64>,

    /// YResolution in pixels per resolution unit
    pub y_resolution: Option<f64>,

    /// ResolutionUnit (1=none, 2=inch, 3=centimeter); defaulted when absent
    pub resolution_unit: u16,

    /// Tile organization, absent for strip-based directories
    pub tiling: Option<Tiling>,
}

impl Directory {
    /// Tile geometry, failing for strip-based directories.
    pub fn tiling(&self) -> Result<&Tiling, TiffError> {
        self.tiling.as_ref().ok_or(TiffError::MissingTag("TileWidth"))
    }

    /// Pixel dimensions of a tile after clipping to the image extent.
    ///
    /// Right-column and bottom-row tiles cover less than a full tile.
    pub fn clipped_tile_dimensions(&self, col: i64, row: i64) -> Option<(u32, u32)> {
        let t = self.tiling.as_ref()?;
        t.tile_index(col, row)?;

        let w = if col == t.tiles_across - 1 {
            let rem = (self.width % t.tile_width as i64) as u32;
            if rem == 0 {
                t.tile_width
            } else {
                rem
            }
        } else {
            t.tile_width
        };
        let h = if row == t.tiles_down - 1 {
            let rem = (self.height % t.tile_height as i64) as u32;
            if rem == 0 {
                t.tile_height
            } else {
                rem
            }
        } else {
            t.tile_height
        };
        Some((w, h))
    }

    fn load(
        reader: &FileReader,
        header: &TiffHeader,
        ifd: &Ifd,
        index: usize,
    ) -> Result<Self, TiffError> {
        let byte_order = header.byte_order;
        let values = ValueReader::new(reader, header);

        let width = match ifd.entry_for(TiffTag::ImageWidth) {
            Some(e) => values.read_u64(e)? as i64,
            None => return Err(TiffError::MissingTag("ImageWidth")),
        };
        let height = match ifd.entry_for(TiffTag::ImageLength) {
            Some(e) => values.read_u64(e)? as i64,
            None => return Err(TiffError::MissingTag("ImageLength")),
        };
        if width <= 0 || height <= 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "ImageWidth",
                message: format!("degenerate image size {width}x{height}"),
            });
        }

        let compression = ifd.get_u16(TiffTag::Compression, byte_order).unwrap_or(1);
        let samples_per_pixel = ifd
            .get_u16(TiffTag::SamplesPerPixel, byte_order)
            .unwrap_or(1);

        let image_description = match ifd.entry_for(TiffTag::ImageDescription) {
            Some(e) => Some(values.read_string(e)?),
            None => None,
        };
        let jpeg_tables = match ifd.entry_for(TiffTag::JpegTables) {
            Some(e) => Some(values.read_bytes(e)?),
            None => None,
        };
        let icc_profile = match ifd.entry_for(TiffTag::IccProfile) {
            Some(e) => Some(values.read_bytes(e)?),
            None => None,
        };

        let x_resolution = match ifd.entry_for(TiffTag::XResolution) {
            Some(e) => values.read_rational(e)?,
            None => None,
        };
        let y_resolution = match ifd.entry_for(TiffTag::YResolution) {
            Some(e) => values.read_rational(e)?,
            None => None,
        };
        let resolution_unit = ifd
            .get_u16(TiffTag::ResolutionUnit, byte_order)
            .unwrap_or(RESUNIT_DEFAULT);

        let tiling = Self::load_tiling(&values, ifd, byte_order, width, height)?;

        Ok(Directory {
            index,
            width,
            height,
            compression,
            samples_per_pixel,
            image_description,
            jpeg_tables,
            icc_profile,
            x_resolution,
            y_resolution,
            resolution_unit,
            tiling,
        })
    }

    fn load_tiling(
        values: &ValueReader<'_>,
        ifd: &Ifd,
        byte_order: super::parser::ByteOrder,
        width: i64,
        height: i64,
    ) -> Result<Option<Tiling>, TiffError> {
        let (tile_width, tile_height) = match (
            ifd.get_u32(TiffTag::TileWidth, byte_order),
            ifd.get_u32(TiffTag::TileLength, byte_order),
        ) {
            (Some(w), Some(h)) => (w, h),
            _ => return Ok(None),
        };
        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "TileWidth",
                message: "zero tile dimension".to_string(),
            });
        }

        let tiles_across = (width + tile_width as i64 - 1) / tile_width as i64;
        let tiles_down = (height + tile_height as i64 - 1) / tile_height as i64;
        let tile_count = (tiles_across * tiles_down) as usize;

        let offsets = match ifd.entry_for(TiffTag::TileOffsets) {
            Some(e) => values.read_u64_array(e)?,
            None => return Err(TiffError::MissingTag("TileOffsets")),
        };
        let byte_counts = match ifd.entry_for(TiffTag::TileByteCounts) {
            Some(e) => values.read_u64_array(e)?,
            None => return Err(TiffError::MissingTag("TileByteCounts")),
        };
        if offsets.len() != tile_count || byte_counts.len() != tile_count {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "expected {} tile locations, found {}/{}",
                    tile_count,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        Ok(Some(Tiling {
            tile_width,
            tile_height,
            tiles_across,
            tiles_down,
            offsets,
            byte_counts,
        }))
    }
}

// =============================================================================
// TiffFile
// =============================================================================

/// Parsed structure of a TIFF or BigTIFF file.
#[derive(Debug)]
pub struct TiffFile {
    /// The file header
    pub header: TiffHeader,

    /// All directories, in chain order
    pub directories: Vec<Directory>,
}

impl TiffFile {
    /// Parse the header and every directory of a TIFF file.
    pub fn open(reader: &FileReader) -> Result<Self, TiffError> {
        let head_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let head = reader.read_exact_at(0, head_len)?;
        let header = TiffHeader::parse(&head, reader.size())?;

        let mut directories = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 {
            if !visited.insert(offset) {
                return Err(TiffError::CircularIfdChain(offset));
            }
            if offset >= reader.size() {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            // Read the count word first, then the exactly sized IFD.
            let count_bytes = reader.read_exact_at(offset, header.entry_count_size())?;
            let entry_count = header.byte_order.read_uint(&count_bytes);
            if entry_count > MAX_IFD_ENTRIES {
                return Err(TiffError::InvalidTagValue {
                    tag: "IFD",
                    message: format!("implausible entry count {entry_count}"),
                });
            }

            let ifd_bytes = reader.read_exact_at(offset, Ifd::byte_len(entry_count, &header))?;
            let ifd = Ifd::parse(&ifd_bytes, &header)?;

            let dir = Directory::load(reader, &header, &ifd, directories.len())?;
            tracing::trace!(
                dir = dir.index,
                width = dir.width,
                height = dir.height,
                tiled = dir.tiling.is_some(),
                "parsed TIFF directory"
            );
            offset = ifd.next_ifd_offset;
            directories.push(dir);
        }

        if directories.is_empty() {
            return Err(TiffError::MissingTag("IFD"));
        }

        Ok(TiffFile { header, directories })
    }

    /// Number of directories in the file.
    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

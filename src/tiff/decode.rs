//! Tile payload decoding into premultiplied ARGB32.
//!
//! Slide TIFFs commonly store "abbreviated" JPEG streams: each tile lacks
//! the quantization (DQT) and Huffman (DHT) tables, which live once in the
//! directory's JPEGTables tag. Merging is: SOI + tables content + tile
//! content + EOI.
//!
//! Decoded tiles are premultiplied ARGB32: little-endian `0xAARRGGBB`, byte
//! order B,G,R,A, with color channels already multiplied by alpha.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// Start Of Image marker
const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// Abbreviated stream handling
// =============================================================================

/// Check whether JPEG data is an abbreviated stream (missing tables).
///
/// An abbreviated stream reaches SOS without passing any DQT or DHT marker.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }
        // skip marker segment: marker + 2-byte length + payload
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }
    false
}

/// Merge shared JPEG tables with an abbreviated tile stream.
///
/// The tables blob is SOI..EOI; the tile is SOI..EOI. The result keeps one
/// SOI, the tables content, the tile content, and one EOI.
pub fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Bytes {
    let tables_content = {
        let mut t = tables;
        if t.len() >= 2 && t[0..2] == SOI {
            t = &t[2..];
        }
        if t.len() >= 2 && t[t.len() - 2..] == EOI {
            t = &t[..t.len() - 2];
        }
        t
    };
    let tile_content = if tile.len() >= 2 && tile[0..2] == SOI {
        &tile[2..]
    } else {
        tile
    };

    let mut merged = BytesMut::with_capacity(2 + tables_content.len() + tile_content.len());
    merged.extend_from_slice(&SOI);
    merged.extend_from_slice(tables_content);
    merged.extend_from_slice(tile_content);
    merged.freeze()
}

/// Produce a decodable JPEG stream for a tile, merging tables when needed.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile: &[u8]) -> Bytes {
    match tables {
        Some(tables) if is_abbreviated_stream(tile) => merge_jpeg_tables(tables, tile),
        _ => Bytes::copy_from_slice(tile),
    }
}

// =============================================================================
// Pixel conversion
// =============================================================================

/// Decode a complete JPEG stream into `dest` as premultiplied ARGB32.
///
/// `dest` must hold `tile_w * tile_h * 4` bytes; the decoded image must
/// match the declared tile size exactly.
pub fn decode_jpeg_argb(data: &[u8], tile_w: u32, tile_h: u32, dest: &mut [u8]) -> Result<()> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| Error::BadData(format!("Couldn't decode JPEG tile: {e}")))?;
    let rgb = decoded.to_rgb8();

    if rgb.width() != tile_w || rgb.height() != tile_h {
        return Err(Error::BadData(format!(
            "JPEG tile is {}x{}, expected {}x{}",
            rgb.width(),
            rgb.height(),
            tile_w,
            tile_h
        )));
    }

    for (src, out) in rgb.as_raw().chunks_exact(3).zip(dest.chunks_exact_mut(4)) {
        out[0] = src[2]; // B
        out[1] = src[1]; // G
        out[2] = src[0]; // R
        out[3] = 0xFF;
    }
    Ok(())
}

/// Convert an uncompressed chunky tile payload into premultiplied ARGB32.
///
/// Supports 8-bit RGB (3 samples) and RGBA (4 samples, premultiplied here).
pub fn decode_raw_argb(
    data: &[u8],
    tile_w: u32,
    tile_h: u32,
    samples_per_pixel: u16,
    dest: &mut [u8],
) -> Result<()> {
    let pixels = tile_w as usize * tile_h as usize;
    let need = pixels * samples_per_pixel as usize;
    if data.len() < need {
        return Err(Error::BadData(format!(
            "Uncompressed tile has {} bytes, expected {}",
            data.len(),
            need
        )));
    }

    match samples_per_pixel {
        3 => {
            for (src, out) in data[..need].chunks_exact(3).zip(dest.chunks_exact_mut(4)) {
                out[0] = src[2];
                out[1] = src[1];
                out[2] = src[0];
                out[3] = 0xFF;
            }
        }
        4 => {
            for (src, out) in data[..need].chunks_exact(4).zip(dest.chunks_exact_mut(4)) {
                let a = src[3] as u32;
                out[0] = ((src[2] as u32 * a + 127) / 255) as u8;
                out[1] = ((src[1] as u32 * a + 127) / 255) as u8;
                out[2] = ((src[0] as u32 * a + 127) / 255) as u8;
                out[3] = src[3];
            }
        }
        n => {
            return Err(Error::BadData(format!(
                "Unsupported raw tile layout: {n} samples per pixel"
            )))
        }
    }
    Ok(())
}

/// Clear tile pixels that fall outside the image extent.
///
/// Right-column and bottom-row tiles are padded to the full tile size in the
/// file; everything beyond `(valid_w, valid_h)` becomes transparent so edge
/// tiles composite cleanly.
pub fn clip_tile_argb(dest: &mut [u8], tile_w: u32, tile_h: u32, valid_w: u32, valid_h: u32) {
    if valid_w >= tile_w && valid_h >= tile_h {
        return;
    }
    let stride = tile_w as usize * 4;
    for y in 0..tile_h as usize {
        let row = &mut dest[y * stride..(y + 1) * stride];
        if y >= valid_h as usize {
            row.fill(0);
        } else if valid_w < tile_w {
            row[valid_w as usize * 4..].fill(0);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Shared helpers: a synthetic tiled-TIFF writer and SCN XML builder.
//!
//! The writer emits classic little-endian TIFFs with uncompressed RGB
//! tiles, which keeps fixtures small and every expected pixel value exact.

use std::io::Write;

use tempfile::NamedTempFile;

pub type FillFn = Box<dyn Fn(i64, i64) -> [u8; 3]>;

/// One tiled directory of a synthetic slide.
pub struct DirSpec {
    pub width: i64,
    pub height: i64,
    pub tile: u32,
    pub compression: u16,
    pub description: Option<String>,
    pub resolution_per_cm: Option<u32>,
    pub fill: FillFn,
}

impl DirSpec {
    /// A directory filled with one solid color.
    pub fn solid(width: i64, height: i64, tile: u32, rgb: [u8; 3]) -> Self {
        DirSpec {
            width,
            height,
            tile,
            compression: 1,
            description: None,
            resolution_per_cm: None,
            fill: Box::new(move |_, _| rgb),
        }
    }

    /// A directory whose pixel color encodes its coordinates.
    pub fn gradient(width: i64, height: i64, tile: u32) -> Self {
        DirSpec {
            width,
            height,
            tile,
            compression: 1,
            description: None,
            resolution_per_cm: None,
            fill: Box::new(|x, y| [(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_resolution_cm(mut self, pixels_per_cm: u32) -> Self {
        self.resolution_per_cm = Some(pixels_per_cm);
        self
    }

    pub fn with_compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }
}

fn entry(out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: [u8; 4]) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&value);
}

fn short(v: u16) -> [u8; 4] {
    let mut b = [0u8; 4];
    b[..2].copy_from_slice(&v.to_le_bytes());
    b
}

fn long(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Write a classic little-endian TIFF with the given directories.
pub fn build_tiff(dirs: &[DirSpec]) -> NamedTempFile {
    // header; first-IFD offset patched when the first IFD is placed
    let mut buf: Vec<u8> = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];
    let mut next_ifd_ptr = 4usize;

    for spec in dirs {
        let t = spec.tile as i64;
        let tiles_across = (spec.width + t - 1) / t;
        let tiles_down = (spec.height + t - 1) / t;

        // tile payloads, row-major, padded to full tile size
        let mut tile_offsets = Vec::new();
        let mut tile_counts = Vec::new();
        for ty in 0..tiles_down {
            for tx in 0..tiles_across {
                tile_offsets.push(buf.len() as u32);
                let mut payload = Vec::with_capacity((t * t * 3) as usize);
                for j in 0..t {
                    for i in 0..t {
                        let x = tx * t + i;
                        let y = ty * t + j;
                        let rgb = if x < spec.width && y < spec.height {
                            (spec.fill)(x, y)
                        } else {
                            [0, 0, 0]
                        };
                        payload.extend_from_slice(&rgb);
                    }
                }
                tile_counts.push(payload.len() as u32);
                buf.extend_from_slice(&payload);
            }
        }

        // out-of-line values
        let n = tile_offsets.len() as u32;
        let offsets_pos = buf.len() as u32;
        if n > 1 {
            for v in &tile_offsets {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        let counts_pos = buf.len() as u32;
        if n > 1 {
            for v in &tile_counts {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        let description = spec.description.as_ref().map(|d| {
            let pos = buf.len() as u32;
            buf.extend_from_slice(d.as_bytes());
            buf.push(0);
            (pos, d.len() as u32 + 1)
        });
        let resolution = spec.resolution_per_cm.map(|per_cm| {
            let pos = buf.len() as u32;
            for _ in 0..2 {
                buf.extend_from_slice(&per_cm.to_le_bytes());
                buf.extend_from_slice(&1u32.to_le_bytes());
            }
            (pos, pos + 8)
        });

        // the IFD itself
        let ifd_pos = buf.len() as u32;
        buf[next_ifd_ptr..next_ifd_ptr + 4].copy_from_slice(&ifd_pos.to_le_bytes());

        let mut entries = Vec::new();
        entry(&mut entries, 256, 4, 1, long(spec.width as u32));
        entry(&mut entries, 257, 4, 1, long(spec.height as u32));
        entry(&mut entries, 259, 3, 1, short(spec.compression));
        if let Some((pos, len)) = description {
            entry(&mut entries, 270, 2, len, long(pos));
        }
        entry(&mut entries, 277, 3, 1, short(3));
        if let Some((x_pos, y_pos)) = resolution {
            entry(&mut entries, 282, 5, 1, long(x_pos));
            entry(&mut entries, 283, 5, 1, long(y_pos));
            entry(&mut entries, 296, 3, 1, short(3)); // centimeters
        }
        entry(&mut entries, 322, 3, 1, short(spec.tile as u16));
        entry(&mut entries, 323, 3, 1, short(spec.tile as u16));
        if n == 1 {
            entry(&mut entries, 324, 4, 1, long(tile_offsets[0]));
            entry(&mut entries, 325, 4, 1, long(tile_counts[0]));
        } else {
            entry(&mut entries, 324, 4, n, long(offsets_pos));
            entry(&mut entries, 325, 4, n, long(counts_pos));
        }

        let entry_count = (entries.len() / 12) as u16;
        buf.extend_from_slice(&entry_count.to_le_bytes());
        buf.extend_from_slice(&entries);
        next_ifd_ptr = buf.len();
        buf.extend_from_slice(&0u32.to_le_bytes());
    }

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&buf).unwrap();
    file.flush().unwrap();
    file
}

// =============================================================================
// SCN XML
// =============================================================================

pub const SCN_NS: &str = "http://www.leica-microsystems.com/scn/2010/10/01";

/// One `<image>` element of a synthetic SCN collection.
pub struct ScnImage {
    pub offset_x: i64,
    pub offset_y: i64,
    pub size_x: i64,
    pub size_y: i64,
    /// (ifd, pixel width, pixel height) per pyramid entry
    pub dims: Vec<(usize, i64, i64)>,
    pub illumination: &'static str,
    pub objective: &'static str,
}

impl ScnImage {
    pub fn brightfield(
        offset_x: i64,
        offset_y: i64,
        size_x: i64,
        size_y: i64,
        dims: Vec<(usize, i64, i64)>,
    ) -> Self {
        ScnImage {
            offset_x,
            offset_y,
            size_x,
            size_y,
            dims,
            illumination: "brightfield",
            objective: "20",
        }
    }
}

/// Render the collection XML that goes into directory 0's ImageDescription.
pub fn scn_description(canvas_x: i64, canvas_y: i64, barcode: &str, images: &[ScnImage]) -> String {
    let mut body = String::new();
    for image in images {
        let mut dims = String::new();
        for (ifd, w, h) in &image.dims {
            dims.push_str(&format!(
                r#"<dimension ifd="{ifd}" sizeX="{w}" sizeY="{h}" z="0"/>"#
            ));
        }
        body.push_str(&format!(
            r#"<image>
  <creationDate>2021-03-01T12:00:00.00Z</creationDate>
  <device model="Versa 8" version="1.0.1"/>
  <scanSettings>
    <illuminationSettings>
      <numericalAperture>0.75</numericalAperture>
      <illuminationSource>{illumination}</illuminationSource>
    </illuminationSettings>
    <objectiveSettings><objective>{objective}</objective></objectiveSettings>
  </scanSettings>
  <view sizeX="{sx}" sizeY="{sy}" offsetX="{ox}" offsetY="{oy}"/>
  <pixels sizeX="{sx}" sizeY="{sy}">{dims}</pixels>
</image>
"#,
            illumination = image.illumination,
            objective = image.objective,
            sx = image.size_x,
            sy = image.size_y,
            ox = image.offset_x,
            oy = image.offset_y,
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<scn xmlns="{SCN_NS}">
  <collection sizeX="{canvas_x}" sizeY="{canvas_y}">
    <barcode>{barcode}</barcode>
    {body}
  </collection>
</scn>"#
    )
}

// =============================================================================
// Pixel helpers
// =============================================================================

/// Fetch one ARGB32 pixel (bytes B,G,R,A) from a region buffer.
pub fn pixel(buf: &[u8], width: i64, x: i64, y: i64) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
}

/// Opaque premultiplied ARGB32 pixel for an RGB color.
pub fn bgra(rgb: [u8; 3]) -> [u8; 4] {
    [rgb[2], rgb[1], rgb[0], 0xFF]
}

pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

//! Region read semantics over a generic pyramidal TIFF.

use tempfile::NamedTempFile;
use wsi_reader::Slide;

use super::common::{bgra, build_tiff, pixel, DirSpec, TRANSPARENT};

/// 3-level gradient pyramid (512x384, 256x192, 128x96) plus a square
/// label-like directory that must not join the pyramid.
fn pyramid_slide() -> NamedTempFile {
    build_tiff(&[
        DirSpec::gradient(512, 384, 64).with_description("Synthetic pyramid"),
        DirSpec::gradient(256, 192, 64),
        DirSpec::gradient(128, 96, 64),
        DirSpec::solid(80, 80, 64, [9, 9, 9]),
    ])
}

fn gradient_pixel(x: i64, y: i64) -> [u8; 4] {
    bgra([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
}

#[test]
fn test_generic_pyramid_geometry() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    assert_eq!(slide.vendor(), "generic-tiff");
    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.dimensions(), (512, 384));
    assert_eq!(slide.level_dimensions(1), Some((256, 192)));
    assert_eq!(slide.level_downsample(0), Some(1.0));
    assert_eq!(slide.level_downsample(1), Some(2.0));
    assert_eq!(slide.level_downsample(2), Some(4.0));
    assert_eq!(slide.best_level_for_downsample(3.0), 1);

    assert_eq!(slide.property("openslide.comment"), Some("Synthetic pyramid"));
    assert_eq!(
        slide.property("tiff.ImageDescription"),
        Some("Synthetic pyramid")
    );
    assert_eq!(slide.property("openslide.level-count"), Some("3"));
    assert_eq!(slide.property("openslide.level[0].height"), Some("384"));
}

#[test]
fn test_read_region_returns_exact_pixels() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    // unaligned region spanning tile boundaries
    let region = slide.read_region(50, 40, 0, 100, 90).unwrap();
    assert_eq!(region.len(), 100 * 90 * 4);
    for y in 0..90 {
        for x in 0..100 {
            assert_eq!(
                pixel(&region, 100, x, y),
                gradient_pixel(50 + x, 40 + y),
                "pixel ({x}, {y})"
            );
        }
    }
}

#[test]
fn test_read_region_is_idempotent() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    let a = slide.read_region(37, 21, 1, 80, 60).unwrap();
    let b = slide.read_region(37, 21, 1, 80, 60).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_whole_level_equals_tiled_subreads() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    let whole = slide.read_region(0, 0, 2, 128, 96).unwrap();

    // cover level 2 with non-overlapping 48x48 subreads (level-0 coords
    // scale by downsample 4)
    for sy in (0..96i64).step_by(48) {
        for sx in (0..128i64).step_by(48) {
            let w = 48.min(128 - sx);
            let h = 48.min(96 - sy);
            let sub = slide.read_region(sx * 4, sy * 4, 2, w, h).unwrap();
            for y in 0..h {
                for x in 0..w {
                    assert_eq!(
                        pixel(&sub, w, x, y),
                        pixel(&whole, 128, sx + x, sy + y),
                        "subread ({sx},{sy}) pixel ({x},{y})"
                    );
                }
            }
        }
    }
}

#[test]
fn test_region_crossing_canvas_edge() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    // hangs off the right/bottom corner of the 512x384 canvas
    let region = slide.read_region(500, 370, 0, 30, 30).unwrap();
    for y in 0..30 {
        for x in 0..30 {
            let expected = if 500 + x < 512 && 370 + y < 384 {
                gradient_pixel(500 + x, 370 + y)
            } else {
                TRANSPARENT
            };
            assert_eq!(pixel(&region, 30, x, y), expected, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn test_negative_origin() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    let region = slide.read_region(-10, -10, 0, 20, 20).unwrap();
    for y in 0..20 {
        for x in 0..20 {
            let expected = if x >= 10 && y >= 10 {
                gradient_pixel(x - 10, y - 10)
            } else {
                TRANSPARENT
            };
            assert_eq!(pixel(&region, 20, x, y), expected, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn test_zero_sized_region() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    assert!(slide.read_region(0, 0, 0, 0, 50).unwrap().is_empty());
    assert!(slide.read_region(0, 0, 0, 50, 0).unwrap().is_empty());
    assert!(slide.error().is_none());
}

#[test]
fn test_read_region_into_reuses_buffer() {
    let file = pyramid_slide();
    let slide = Slide::open(file.path()).unwrap();

    let mut buf = vec![0xAAu8; 64 * 64 * 4];
    slide.read_region_into(&mut buf, 0, 0, 0, 64, 64).unwrap();
    assert_eq!(pixel(&buf, 64, 10, 20), gradient_pixel(10, 20));
}

#[test]
fn test_quickhash_stable_for_generic_tiff() {
    let a = pyramid_slide();
    let b = pyramid_slide();

    let hash_a = Slide::open(a.path())
        .unwrap()
        .property("openslide.quickhash-1")
        .unwrap()
        .to_string();
    let hash_b = Slide::open(b.path())
        .unwrap()
        .property("openslide.quickhash-1")
        .unwrap()
        .to_string();

    assert_eq!(hash_a.len(), 64);
    assert_eq!(hash_a, hash_b);
}

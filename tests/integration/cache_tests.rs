//! Tile cache behavior observed through the public API.

use std::sync::Arc;

use wsi_reader::{Slide, SlideOptions, TileCache};

use super::common::{build_tiff, DirSpec};

fn open_with_cache(cache: Arc<TileCache>) -> (tempfile::NamedTempFile, Slide) {
    // 512x384 gradient, 64px tiles: 8x6 = 48 tiles of 16 KiB decoded
    let file = build_tiff(&[DirSpec::gradient(512, 384, 64)]);
    let slide = Slide::open_with(
        file.path(),
        SlideOptions {
            tile_cache: Some(cache),
            ..Default::default()
        },
    )
    .unwrap();
    (file, slide)
}

#[test]
fn test_cache_stays_within_budget() {
    // room for four decoded 64x64 tiles
    let cache = Arc::new(TileCache::with_capacity(4 * 64 * 64 * 4));
    let (_file, slide) = open_with_cache(cache.clone());

    // touch all 48 tiles
    let _ = slide.read_region(0, 0, 0, 512, 384).unwrap();

    assert!(cache.bytes_used() <= cache.capacity());
    assert!(cache.len() <= 4);
}

#[test]
fn test_eviction_does_not_change_output() {
    // working set far beyond a one-tile budget, read twice
    let tiny = Arc::new(TileCache::with_capacity(64 * 64 * 4));
    let (_f1, constrained) = open_with_cache(tiny.clone());
    let first = constrained.read_region(0, 0, 0, 512, 384).unwrap();
    let second = constrained.read_region(0, 0, 0, 512, 384).unwrap();
    assert_eq!(first, second);
    assert!(tiny.bytes_used() <= tiny.capacity());

    // cache sizing is invisible in the output bytes
    let roomy = Arc::new(TileCache::with_capacity(64 * 1024 * 1024));
    let (_f2, unconstrained) = open_with_cache(roomy);
    let reference = unconstrained.read_region(0, 0, 0, 512, 384).unwrap();
    assert_eq!(first, reference);
}

#[test]
fn test_cache_shared_between_slides() {
    let cache = Arc::new(TileCache::with_capacity(8 * 1024 * 1024));
    let (_f1, a) = open_with_cache(cache.clone());
    let (_f2, b) = open_with_cache(cache.clone());

    let ra = a.read_region(0, 0, 0, 128, 128).unwrap();
    let rb = b.read_region(0, 0, 0, 128, 128).unwrap();

    // same synthetic content, distinct cache owners
    assert_eq!(ra, rb);
    // both slides' tiles are resident: 2 slides x 4 tiles
    assert_eq!(cache.len(), 8);
}

#[test]
fn test_repeated_reads_hit_cache() {
    let cache = Arc::new(TileCache::with_capacity(8 * 1024 * 1024));
    let (_file, slide) = open_with_cache(cache.clone());

    let _ = slide.read_region(0, 0, 0, 128, 128).unwrap();
    let resident = cache.len();
    let _ = slide.read_region(0, 0, 0, 128, 128).unwrap();
    // second pass decodes nothing new
    assert_eq!(cache.len(), resident);
}

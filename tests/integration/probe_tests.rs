//! Format dispatch behavior.

use std::io::Write;

use tempfile::NamedTempFile;
use wsi_reader::{Error, Slide};

use super::common::{build_tiff, scn_description, DirSpec, ScnImage, SCN_NS};

fn file_with(bytes: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

#[test]
fn test_non_tiff_file_is_not_recognized() {
    let file = file_with(b"\x89PNG\r\n\x1a\nnot actually a slide, not even a PNG really");
    let err = Slide::open(file.path()).unwrap_err();
    assert!(err.is_format_not_supported());
    assert!(err.to_string().contains("is not recognized"));
}

#[test]
fn test_tiny_file_is_not_recognized() {
    let file = file_with(b"II");
    let err = Slide::open(file.path()).unwrap_err();
    assert!(err.is_format_not_supported());
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Slide::open("/nonexistent/slide.scn").unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn test_non_leica_tiff_falls_through_to_generic() {
    // a plain tiled TIFF: the Leica probe declines, dispatch moves on
    let file = build_tiff(&[DirSpec::solid(256, 256, 64, [1, 2, 3])]);
    let slide = Slide::open(file.path()).unwrap();
    assert_eq!(slide.vendor(), "generic-tiff");
    assert_eq!(slide.level_count(), 1);
}

#[test]
fn test_leica_with_broken_collection_fails_hard() {
    // claims the SCN namespace but lacks the collection element: the Leica
    // vendor owns the file and its structural error surfaces, rather than
    // the generic driver swallowing it
    let description = format!(r#"<?xml version="1.0"?><scn xmlns="{SCN_NS}"></scn>"#);
    let file = build_tiff(&[DirSpec::solid(256, 256, 64, [1, 2, 3]).with_description(description)]);

    let err = Slide::open(file.path()).unwrap_err();
    assert!(matches!(err, Error::BadData(_)));
    assert_eq!(err.to_string(), "Can't find collection element");
}

#[test]
fn test_leica_probe_accepts_before_generic() {
    let description = scn_description(
        2000,
        2000,
        "PROBE",
        &[
            ScnImage::brightfield(100, 100, 1800, 1800, vec![(0, 180, 180)]),
            ScnImage::brightfield(0, 0, 2000, 2000, vec![(1, 200, 200)]),
        ],
    );
    let file = build_tiff(&[
        DirSpec::solid(180, 180, 64, [7, 7, 7]).with_description(description),
        DirSpec::solid(200, 200, 64, [8, 8, 8]),
    ]);

    let slide = Slide::open(file.path()).unwrap();
    assert_eq!(slide.vendor(), "leica");
    assert_eq!(slide.property("leica.barcode"), Some("PROBE"));
}

//! TIFF adapter: structure parsing, directory enumeration, tile decode.
//!
//! The adapter exposes slide files as a sequence of directories with tile
//! geometry. Parsed metadata ([`TiffFile`]) is immutable and shared; pixel
//! reads go through a per-worker [`TiffCursor`] so no decode state is ever
//! shared between threads.

mod cursor;
mod decode;
mod file;
mod parser;
mod tags;
mod values;

pub use cursor::TiffCursor;
pub use decode::{is_abbreviated_stream, merge_jpeg_tables, prepare_tile_jpeg};
pub use file::{Directory, TiffFile, Tiling};
pub use parser::{
    is_tiff_header, ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use tags::{
    compression_supported, FieldType, TiffTag, COMPRESSION_JPEG, COMPRESSION_NONE,
    RESUNIT_CENTIMETER, RESUNIT_DEFAULT,
};
pub use values::ValueReader;

use thiserror::Error;

/// Structural TIFF parsing failures.
///
/// These convert into [`crate::Error::BadData`] at the vendor boundary,
/// except for I/O failures which keep their original tag.
#[derive(Debug, Error)]
pub enum TiffError {
    /// First two bytes are neither "II" nor "MM"
    #[error("Invalid TIFF magic: {0:#06x}")]
    InvalidMagic(u16),

    /// Version word is neither 42 (TIFF) nor 43 (BigTIFF)
    #[error("Invalid TIFF version: {0}")]
    InvalidVersion(u16),

    /// BigTIFF declared an offset size other than 8
    #[error("Invalid BigTIFF offset size: {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// An IFD offset points outside the file
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// The IFD chain loops back on itself
    #[error("Circular IFD chain at offset {0}")]
    CircularIfdChain(u64),

    /// Not enough bytes to parse a structure
    #[error("File too small: need {required} bytes, have {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// An entry uses a field type this adapter cannot read
    #[error("Unknown TIFF field type: {0}")]
    UnknownFieldType(u16),

    /// A required tag is absent
    #[error("Missing TIFF tag: {0}")]
    MissingTag(&'static str),

    /// A tag value violates its expected shape
    #[error("Invalid value for TIFF tag {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// I/O failure while fetching tag values or tile data
    #[error(transparent)]
    Read(#[from] crate::error::Error),
}

impl From<TiffError> for crate::error::Error {
    fn from(e: TiffError) -> Self {
        match e {
            TiffError::Read(inner) => inner,
            other => crate::error::Error::BadData(other.to_string()),
        }
    }
}

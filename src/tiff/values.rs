//! Fetching tag values out of a TIFF file.
//!
//! An IFD entry either carries its value in the entry record itself or
//! points at it with a file offset. [`ValueReader`] hides that split: every
//! accessor first materializes the raw value bytes (zero or one positioned
//! read), then decodes them by field type. Array tags like TileOffsets come
//! back from a single fetch rather than per-element reads.

use bytes::Bytes;

use crate::io::FileReader;

use super::parser::{IfdEntry, TiffHeader};
use super::tags::FieldType;
use super::TiffError;

/// Decodes entry values against a file's byte order and flavor.
pub struct ValueReader<'a> {
    reader: &'a FileReader,
    header: &'a TiffHeader,
}

impl<'a> ValueReader<'a> {
    /// Pair an open file with its decoded header.
    pub fn new(reader: &'a FileReader, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Materialize an entry's value bytes, wherever they live.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))? as usize;

        if entry.is_inline() {
            Ok(Bytes::copy_from_slice(&entry.value_field()[..size]))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size)?)
        }
    }

    /// A single unsigned integer value, whatever its declared width.
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: "scalar",
                message: format!("{} values where one was expected", entry.count),
            });
        }
        if let Some(value) = entry.inline_value(self.header.byte_order) {
            return Ok(value);
        }

        // stored at an offset: decode the fetched bytes by width
        Self::require_integer(entry, "scalar")?;
        let bytes = self.read_bytes(entry)?;
        Ok(self.header.byte_order.read_uint(&bytes))
    }

    /// All values of an integer array tag, widened to u64.
    ///
    /// The whole array is fetched with one positioned read; this is the
    /// path tile offset and byte-count tables come through.
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = Self::require_integer(entry, "array")?;
        let bytes = self.read_bytes(entry)?;

        let byte_order = self.header.byte_order;
        Ok(bytes
            .chunks_exact(field_type.size_in_bytes())
            .map(|element| byte_order.read_uint(element))
            .collect())
    }

    /// The first RATIONAL of an entry as an f64.
    ///
    /// Resolution tags come through here. A zero denominator reads as
    /// `None`, the same as an absent resolution.
    pub fn read_rational(&self, entry: &IfdEntry) -> Result<Option<f64>, TiffError> {
        if entry.field_type != Some(FieldType::Rational) || entry.count == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "rational",
                message: type_mismatch(entry, "Rational"),
            });
        }

        let bytes = self.read_bytes(entry)?;
        let byte_order = self.header.byte_order;
        let numerator = byte_order.read_u32(&bytes[..4]);
        let denominator = byte_order.read_u32(&bytes[4..8]);
        Ok((denominator != 0).then(|| numerator as f64 / denominator as f64))
    }

    /// An ASCII tag value, cut at the first NUL.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "string",
                message: type_mismatch(entry, "Ascii"),
            });
        }

        let bytes = self.read_bytes(entry)?;
        let text = bytes.split(|&b| b == 0).next().unwrap_or(&[]);
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    fn require_integer(entry: &IfdEntry, tag: &'static str) -> Result<FieldType, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        match field_type {
            FieldType::Short | FieldType::Long | FieldType::Long8 => Ok(field_type),
            other => Err(TiffError::InvalidTagValue {
                tag,
                message: format!("{other:?} is not an unsigned integer type"),
            }),
        }
    }
}

fn type_mismatch(entry: &IfdEntry, wanted: &str) -> String {
    match entry.field_type {
        Some(found) => format!("expected {wanted}, found {found:?}"),
        None => format!("expected {wanted}, found unknown type {}", entry.field_type_raw),
    }
}

//! TIFF header and IFD structure parsing.
//!
//! Only two on-disk layouts exist and they differ in exactly one knob: the
//! width of an offset word. Classic TIFF (version 42) uses 4-byte words and
//! an 8-byte header; BigTIFF (version 43) uses 8-byte words and a 16-byte
//! header that additionally declares its word size. Everything else (entry
//! counts, entry records, the next-IFD link) derives from that width, so
//! [`TiffHeader`] exposes the word size and the layout math follows from it.

use super::tags::{FieldType, TiffTag};
use super::TiffError;

/// Byte length of a classic TIFF header.
pub const TIFF_HEADER_SIZE: usize = 8;

/// Byte length of a BigTIFF header.
pub const BIGTIFF_HEADER_SIZE: usize = 16;

const VERSION_CLASSIC: u16 = 42;
const VERSION_BIG: u16 = 43;

// =============================================================================
// ByteOrder
// =============================================================================

/// Endianness of every multi-byte value in the file.
///
/// Declared by the first two header bytes: `II` for Intel ordering, `MM`
/// for Motorola.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    fn from_magic(magic: [u8; 2]) -> Option<Self> {
        match &magic {
            b"II" => Some(ByteOrder::LittleEndian),
            b"MM" => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }

    /// Decode a u16 from the first two bytes of `bytes`.
    ///
    /// # Panics
    /// If `bytes` is shorter than two bytes.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    /// Decode a u32 from the first four bytes of `bytes`.
    ///
    /// # Panics
    /// If `bytes` is shorter than four bytes.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    /// Decode a u64 from the first eight bytes of `bytes`.
    ///
    /// # Panics
    /// If `bytes` is shorter than eight bytes.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let raw = [
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ];
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }

    /// Decode an unsigned integer whose width is the slice length.
    ///
    /// This is how size-dependent fields (entry counts, offset words, array
    /// elements) are read without branching on the file flavor at every
    /// call site.
    ///
    /// # Panics
    /// If the slice length is not 2, 4, or 8.
    #[inline]
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        match bytes.len() {
            2 => self.read_u16(bytes) as u64,
            4 => self.read_u32(bytes) as u64,
            8 => self.read_u64(bytes),
            n => panic!("no {n}-byte TIFF integer width"),
        }
    }
}

/// Quick sniff for a TIFF or BigTIFF byte prefix.
///
/// The probe layer calls this before any structural parsing to decide
/// whether the TIFF vendor chain applies at all.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }
    match ByteOrder::from_magic([bytes[0], bytes[1]]) {
        Some(byte_order) => {
            let version = byte_order.read_u16(&bytes[2..4]);
            version == VERSION_CLASSIC || version == VERSION_BIG
        }
        None => false,
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Decoded file header: byte order, flavor, and the first IFD's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Endianness of the whole file
    pub byte_order: ByteOrder,

    /// BigTIFF flavor (8-byte offset words)
    pub is_bigtiff: bool,

    /// Where the directory chain starts
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Decode a header from the start of the file.
    ///
    /// `file_size` bounds-checks the first IFD offset so a truncated or
    /// corrupt header is rejected before any chain walking happens.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        let short = |required: usize| TiffError::FileTooSmall {
            required: required as u64,
            actual: bytes.len() as u64,
        };

        let head = bytes.get(..TIFF_HEADER_SIZE).ok_or(short(TIFF_HEADER_SIZE))?;
        let byte_order = ByteOrder::from_magic([head[0], head[1]]).ok_or_else(|| {
            TiffError::InvalidMagic(u16::from_le_bytes([head[0], head[1]]))
        })?;

        let (is_bigtiff, first_ifd_offset) = match byte_order.read_u16(&head[2..4]) {
            VERSION_CLASSIC => (false, byte_order.read_u32(&head[4..8]) as u64),
            VERSION_BIG => {
                let head = bytes
                    .get(..BIGTIFF_HEADER_SIZE)
                    .ok_or(short(BIGTIFF_HEADER_SIZE))?;
                // the declared word size must be 8; bytes 6-7 are reserved
                let declared = byte_order.read_u16(&head[4..6]);
                if declared != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(declared));
                }
                (true, byte_order.read_u64(&head[8..16]))
            }
            other => return Err(TiffError::InvalidVersion(other)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }
        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Width of an offset word: 4 bytes classic, 8 bytes BigTIFF.
    ///
    /// Offsets, the next-IFD link, and an entry's value/offset field are
    /// all one word wide.
    #[inline]
    pub const fn word_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Width of the entry-count field opening each IFD (2 or 8 bytes).
    #[inline]
    pub const fn entry_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Byte length of one IFD entry record.
    ///
    /// Tag and type ids are two bytes each; the count and the value/offset
    /// field are one word each. 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn entry_size(&self) -> usize {
        4 + 2 * self.word_size()
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One metadata record of an IFD.
///
/// The trailing value/offset field holds the value itself when it fits in
/// one word, otherwise the file offset where the value lives. The raw field
/// bytes are kept as written so both interpretations stay available.
#[derive(Debug, Clone)]
pub struct IfdEntry {
    /// Raw tag id; [`IfdEntry::tag`] maps it to a known [`TiffTag`]
    pub tag_id: u16,

    /// Decoded field type; `None` when the type id is unrecognized
    pub field_type: Option<FieldType>,

    /// The undecoded type id, kept for diagnostics
    pub field_type_raw: u16,

    /// Number of values (elements, not bytes)
    pub count: u64,

    value_field: [u8; 8],
    value_field_len: usize,
}

impl IfdEntry {
    /// Build an entry from its components.
    ///
    /// `value` is the raw value/offset field, 4 bytes for classic TIFF or
    /// 8 for BigTIFF.
    pub fn new(tag_id: u16, field_type_raw: u16, count: u64, value: &[u8]) -> Self {
        debug_assert!(value.len() == 4 || value.len() == 8);
        let mut value_field = [0u8; 8];
        value_field[..value.len()].copy_from_slice(value);
        IfdEntry {
            tag_id,
            field_type: FieldType::from_u16(field_type_raw),
            field_type_raw,
            count,
            value_field,
            value_field_len: value.len(),
        }
    }

    fn parse(record: &[u8], header: &TiffHeader) -> Self {
        let byte_order = header.byte_order;
        let word = header.word_size();
        Self::new(
            byte_order.read_u16(&record[..2]),
            byte_order.read_u16(&record[2..4]),
            byte_order.read_uint(&record[4..4 + word]),
            &record[4 + word..4 + 2 * word],
        )
    }

    /// The known tag for this entry, if any.
    pub fn tag(&self) -> Option<TiffTag> {
        TiffTag::from_u16(self.tag_id)
    }

    /// Whether the value is stored in the field itself rather than at an
    /// offset. Entries with unrecognized types are never treated as inline.
    pub fn is_inline(&self) -> bool {
        self.field_type
            .map(|ft| ft.fits_inline(self.count, self.value_field_len == 8))
            .unwrap_or(false)
    }

    /// The raw value/offset field bytes as written in the file.
    pub fn value_field(&self) -> &[u8] {
        &self.value_field[..self.value_field_len]
    }

    /// The value's file offset, for entries that are not inline.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        byte_order.read_uint(self.value_field())
    }

    /// A single inline integer value, widened to u64.
    ///
    /// `None` unless the entry is inline, has count 1, and carries one of
    /// the unsigned integer types.
    pub fn inline_value(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline() || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_field) as u64),
            FieldType::Long => Some(byte_order.read_u32(&self.value_field) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(&self.value_field)),
            _ => None,
        }
    }

    /// Byte length of the value data, or `None` for unknown types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64 * self.count)
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// One Image File Directory.
///
/// Slide files chain many of these: pyramid levels, label and macro images,
/// vendor extras. Entries are re-sorted by tag id at parse time so lookups
/// binary-search; nothing downstream depends on file order.
#[derive(Debug, Clone)]
pub struct Ifd {
    entries: Vec<IfdEntry>,

    /// Offset of the next IFD; zero terminates the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Total bytes an IFD with `entry_count` entries occupies on disk.
    ///
    /// Callers fetch this many bytes starting at the IFD offset before
    /// handing them to [`Ifd::parse`].
    pub fn byte_len(entry_count: u64, header: &TiffHeader) -> usize {
        header.entry_count_size() + entry_count as usize * header.entry_size() + header.word_size()
    }

    /// Decode an IFD from bytes starting at its offset.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let short = |required: usize| TiffError::FileTooSmall {
            required: required as u64,
            actual: bytes.len() as u64,
        };

        let count_len = header.entry_count_size();
        let count_bytes = bytes.get(..count_len).ok_or(short(count_len))?;
        let entry_count = header.byte_order.read_uint(count_bytes);

        let record_len = header.entry_size();
        let total = entry_count
            .checked_mul(record_len as u64)
            .and_then(|n| n.checked_add((count_len + header.word_size()) as u64))
            .ok_or(TiffError::FileTooSmall {
                required: u64::MAX,
                actual: bytes.len() as u64,
            })?;
        if (bytes.len() as u64) < total {
            return Err(TiffError::FileTooSmall {
                required: total,
                actual: bytes.len() as u64,
            });
        }
        let body_end = count_len + entry_count as usize * record_len;
        let total = total as usize;
        let records = &bytes[count_len..body_end];

        let mut entries: Vec<IfdEntry> = records
            .chunks_exact(record_len)
            .map(|record| IfdEntry::parse(record, header))
            .collect();
        entries.sort_by_key(|e| e.tag_id);

        let next_ifd_offset = header.byte_order.read_uint(&bytes[body_end..total]);

        Ok(Ifd {
            entries,
            next_ifd_offset,
        })
    }

    /// Look up an entry by raw tag id.
    pub fn entry(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.entries
            .binary_search_by_key(&tag_id, |e| e.tag_id)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Look up an entry by known tag.
    pub fn entry_for(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entry(tag.as_u16())
    }

    /// Inline integer value of a tag, if it fits a u16.
    pub fn get_u16(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u16> {
        u16::try_from(self.entry_for(tag)?.inline_value(byte_order)?).ok()
    }

    /// Inline integer value of a tag, if it fits a u32.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        u32::try_from(self.entry_for(tag)?.inline_value(byte_order)?).ok()
    }

    /// Inline integer value of a tag.
    pub fn get_u64(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u64> {
        self.entry_for(tag)?.inline_value(byte_order)
    }

    /// Whether this directory stores its pixels as tiles.
    pub fn is_tiled(&self) -> bool {
        self.entry_for(TiffTag::TileWidth).is_some() && self.entry_for(TiffTag::TileLength).is_some()
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

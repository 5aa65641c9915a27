//! Quickhash: a stable per-slide digest.
//!
//! Each vendor designates a fingerprint subset of the file, either a small
//! TIFF directory (its raw tile payloads, in tile order) or a plain byte
//! range. The digest is SHA-256 over a canonical prefix describing the
//! selection followed by the selected bytes, so byte-identical files hash
//! identically and metadata outside the selection cannot perturb it.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::io::FileReader;
use crate::tiff::TiffFile;

const RANGE_CHUNK: usize = 64 * 1024;

/// The fingerprint subset a vendor selected during open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickhashSource {
    /// Raw tile payloads of one TIFF directory.
    Directory(usize),

    /// A plain byte range of the file.
    Range { offset: u64, len: u64 },
}

/// Compute the quickhash as lowercase hex.
pub fn compute(
    reader: &FileReader,
    tiff: Option<&TiffFile>,
    source: &QuickhashSource,
) -> Result<String> {
    let mut hasher = Sha256::new();

    match source {
        QuickhashSource::Directory(dir) => {
            let tiff = tiff.ok_or_else(|| {
                Error::Failed("Quickhash directory selected without a TIFF file".to_string())
            })?;
            let directory = tiff.directories.get(*dir).ok_or_else(|| {
                Error::BadData("Couldn't locate TIFF directory for quickhash".to_string())
            })?;
            let tiling = directory.tiling().map_err(Error::from)?;

            hasher.update(format!("tiff-dir:{dir}\n").as_bytes());
            for (offset, len) in tiling.offsets.iter().zip(tiling.byte_counts.iter()) {
                if *len == 0 {
                    continue;
                }
                let bytes = reader
                    .read_exact_at(*offset, *len as usize)
                    .map_err(|e| e.context("Couldn't hash TIFF tile"))?;
                hasher.update(&bytes);
            }
        }
        QuickhashSource::Range { offset, len } => {
            hasher.update(format!("range:{offset}+{len}\n").as_bytes());
            let mut remaining = *len;
            let mut position = *offset;
            let mut buf = vec![0u8; RANGE_CHUNK];
            while remaining > 0 {
                let chunk = remaining.min(RANGE_CHUNK as u64) as usize;
                reader
                    .read_exact_at_into(&mut buf[..chunk], position)
                    .map_err(|e| e.context("Couldn't hash byte range"))?;
                hasher.update(&buf[..chunk]);
                position += chunk as u64;
                remaining -= chunk as u64;
            }
        }
    }

    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

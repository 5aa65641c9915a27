//! Positioned reads over a local slide file.
//!
//! A [`FileReader`] owns an open file descriptor and serves exact positioned
//! reads from any thread; no seek state is shared between callers. Files are
//! opened with close-on-exec so slide handles never leak into child
//! processes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{Error, Result};

/// Read-only file with positioned exact reads.
#[derive(Debug)]
pub struct FileReader {
    file: File,
    path: PathBuf,
    size: u64,
}

impl FileReader {
    /// Open a file for reading with close-on-exec set atomically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_CLOEXEC);
        }

        let file = options
            .open(&path)
            .map_err(|e| Error::io(format!("Couldn't open {}", path.display()), e))?;

        let size = file
            .metadata()
            .map_err(|e| {
                Error::io(format!("Couldn't stat file {}", path.display()), e)
                    .context("Couldn't get size")
            })?
            .len();

        Ok(FileReader { file, path, size })
    }

    /// Total file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read as many bytes as possible at `offset`, returning the count.
    ///
    /// Stops early only at end of file. OS-level interrupts are retried.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self
                .positioned_read(&mut buf[total..], offset + total as u64)
                .map_err(|e| {
                    Error::io(format!("I/O error reading file {}", self.path.display()), e)
                })?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Read exactly `buf.len()` bytes at `offset` into `buf`.
    ///
    /// Fails `Failed("Short read of file <path>: <got> < <expected>")` when
    /// the file ends before the demanded size.
    pub fn read_exact_at_into(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let got = self.read_at(buf, offset)?;
        if got < buf.len() {
            return Err(Error::Failed(format!(
                "Short read of file {}: {} < {}",
                self.path.display(),
                got,
                buf.len()
            )));
        }
        Ok(())
    }

    /// Read exactly `len` bytes at `offset` into a fresh buffer.
    pub fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; len];
        self.read_exact_at_into(&mut buf, offset)?;
        Ok(Bytes::from(buf))
    }

    #[cfg(unix)]
    fn positioned_read(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        use std::os::unix::fs::FileExt;
        loop {
            match self.file.read_at(buf, offset) {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    #[cfg(windows)]
    fn positioned_read(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }
}

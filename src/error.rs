//! Error model for the whole library.
//!
//! Every failure carries one of four tags:
//!
//! - [`Error::FormatNotSupported`]: the input is not a slide this vendor (or
//!   any vendor) claims. Non-fatal while probing; fatal to the caller when no
//!   vendor accepts the file.
//! - [`Error::BadData`]: the file claims to be a recognized format but
//!   violates its structural expectations.
//! - [`Error::Io`]: a platform I/O operation failed.
//! - [`Error::Failed`]: catch-all for logic failures (short reads, unmet
//!   preconditions).
//!
//! Deeper layers do not wrap errors opaquely. Instead, callers prefix the
//! message with a context string via [`Context`], so the final message reads
//! as a chain:
//!
//! ```text
//! Couldn't get size: Couldn't seek file /x: Invalid argument
//! ```

use thiserror::Error;

/// Library-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Tagged failure reason with a formatted message.
#[derive(Debug, Error)]
pub enum Error {
    /// The file is not recognized by this vendor (or by any vendor).
    #[error("{0}")]
    FormatNotSupported(String),

    /// The file is recognized but structurally invalid.
    #[error("{0}")]
    BadData(String),

    /// A platform I/O operation failed.
    #[error("{message}: {source}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic logic failure.
    #[error("{0}")]
    Failed(String),
}

impl Error {
    /// Build an [`Error::Io`] from an OS error plus a formatted message.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source,
        }
    }

    /// Prepend a context string to the message, keeping the tag.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Error::FormatNotSupported(m) => Error::FormatNotSupported(format!("{prefix}: {m}")),
            Error::BadData(m) => Error::BadData(format!("{prefix}: {m}")),
            Error::Io { message, source } => Error::Io {
                message: format!("{prefix}: {message}"),
                source,
            },
            Error::Failed(m) => Error::Failed(format!("{prefix}: {m}")),
        }
    }

    /// True for probe declines that should be skipped silently.
    pub fn is_format_not_supported(&self) -> bool {
        matches!(self, Error::FormatNotSupported(_))
    }
}

/// Extension trait adding message-prefix chaining to results.
pub trait Context<T> {
    /// Prefix the error message with `prefix` (static context).
    fn context(self, prefix: &str) -> Result<T>;

    /// Prefix the error message with a lazily built context string.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for Result<T> {
    fn context(self, prefix: &str) -> Result<T> {
        self.map_err(|e| e.context(prefix))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(&f()))
    }
}

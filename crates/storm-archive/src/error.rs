//! Error types for archive operations

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Archive operation result type
pub type MpqResult<T> = Result<T, MpqError>;

/// Coarse error category handed to callers that only need to branch on the
/// failure class (for example a scripting binding mapping errors to its own
/// convention)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad signature, header or directory structure
    InvalidFormat,
    /// The byte source could not be opened
    Open,
    /// Name absent from the hash table, or resolved to a hole
    NotFound,
    /// The archive carries no `(listfile)`
    ListingUnavailable,
    /// Decompressed length disagrees with the declared size
    SizeMismatch,
    /// Encryption, unknown codec, unsupported version and similar
    UnsupportedFeature,
    /// Use after `close`
    ArchiveClosed,
    /// Read or write failure on the source or destination
    Io,
    /// A codec rejected its input
    Decompression,
}

impl ErrorKind {
    /// Stable name of the kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidFormat => "InvalidFormat",
            Self::Open => "OpenError",
            Self::NotFound => "NotFound",
            Self::ListingUnavailable => "ListingUnavailable",
            Self::SizeMismatch => "SizeMismatch",
            Self::UnsupportedFeature => "UnsupportedFeature",
            Self::ArchiveClosed => "ArchiveClosed",
            Self::Io => "IoError",
            Self::Decompression => "DecompressionError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the archive engine
#[derive(Debug, Error)]
pub enum MpqError {
    /// No archive signature within the scan window
    #[error("not an MPQ archive: no header found in the first {scanned} bytes")]
    SignatureNotFound {
        /// Number of bytes examined
        scanned: u64,
    },

    /// Structurally invalid archive
    #[error("invalid MPQ format: {0}")]
    InvalidFormat(String),

    /// Hash table size is not a power of two
    #[error("hash table size {0} is not a power of two")]
    HashTableSize(u32),

    /// Opening the archive file failed
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path that was opened
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Name not present in the hash table
    #[error("file not found in archive: {0}")]
    NotFound(String),

    /// Block index out of range or not flagged as existing
    #[error("block {index} does not describe a stored file")]
    MissingBlock {
        /// Block table index
        index: u32,
    },

    /// The archive has no internal name listing
    #[error("archive has no (listfile); files can only be read by exact name")]
    ListingUnavailable,

    /// Decompressed length disagrees with the declared length
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Declared size
        expected: u64,
        /// Produced size
        actual: u64,
    },

    /// Feature the engine does not implement
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// No codec registered for a compression method
    #[error("unsupported compression method: 0x{0:02X}")]
    UnsupportedCompression(u8),

    /// Header declares a format version newer than v4
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u16),

    /// Operation on a closed archive
    #[error("archive is closed")]
    ArchiveClosed,

    /// A codec failed on its input
    #[error("decompression failed (method 0x{method:02X}): {reason}")]
    Decompression {
        /// Compression method id
        method: u8,
        /// Codec-specific failure description
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl MpqError {
    /// Category of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SignatureNotFound { .. }
            | Self::InvalidFormat(_)
            | Self::HashTableSize(_)
            | Self::BinRw(_) => ErrorKind::InvalidFormat,
            Self::Open { .. } => ErrorKind::Open,
            Self::NotFound(_) | Self::MissingBlock { .. } => ErrorKind::NotFound,
            Self::ListingUnavailable => ErrorKind::ListingUnavailable,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::UnsupportedFeature(_)
            | Self::UnsupportedCompression(_)
            | Self::UnsupportedVersion(_) => ErrorKind::UnsupportedFeature,
            Self::ArchiveClosed => ErrorKind::ArchiveClosed,
            Self::Decompression { .. } => ErrorKind::Decompression,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for [`MpqError::InvalidFormat`]
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat(reason.into())
    }

    /// Shorthand for [`MpqError::UnsupportedFeature`]
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature(feature.into())
    }

    /// Shorthand for [`MpqError::Decompression`]
    pub fn decompression(method: u8, reason: impl fmt::Display) -> Self {
        Self::Decompression {
            method,
            reason: reason.to_string(),
        }
    }

    /// Whether the error means the requested name or block does not exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the error points at damaged archive data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidFormat | ErrorKind::SizeMismatch | ErrorKind::Decompression
        )
    }
}

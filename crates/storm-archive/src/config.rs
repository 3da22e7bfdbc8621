//! Configuration for opening archives

use crate::codec::{Codec, CodecRegistry};
use crate::hash_table::{LOCALE_NEUTRAL, PLATFORM_DEFAULT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default header scan window (256 MiB)
pub const DEFAULT_MAX_SCAN_OFFSET: u64 = 256 * 1024 * 1024;

/// Default limit on a single file's uncompressed size (1 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Options applied when an archive is opened and read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Header scanning stops at this offset
    pub max_scan_offset: u64,

    /// Map the archive file instead of reading it into memory
    pub use_mmap: bool,

    /// Files with a larger uncompressed size are refused
    pub max_file_size: u64,

    /// Locale used by lookups that do not name one
    pub default_locale: u16,

    /// Platform used by all lookups
    pub default_platform: u16,

    /// Decompressors by method id
    #[serde(skip)]
    pub codecs: CodecRegistry,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_scan_offset: DEFAULT_MAX_SCAN_OFFSET,
            use_mmap: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_locale: LOCALE_NEUTRAL,
            default_platform: PLATFORM_DEFAULT,
            codecs: CodecRegistry::default(),
        }
    }
}

impl ArchiveConfig {
    /// Configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the header scan window
    #[must_use]
    pub const fn with_max_scan_offset(mut self, offset: u64) -> Self {
        self.max_scan_offset = offset;
        self
    }

    /// Enable or disable memory mapping
    #[must_use]
    pub const fn with_mmap(mut self, enable: bool) -> Self {
        self.use_mmap = enable;
        self
    }

    /// Set the per-file size limit
    #[must_use]
    pub const fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set the default locale
    #[must_use]
    pub const fn with_locale(mut self, locale: u16) -> Self {
        self.default_locale = locale;
        self
    }

    /// Set the platform
    #[must_use]
    pub const fn with_platform(mut self, platform: u16) -> Self {
        self.default_platform = platform;
        self
    }

    /// Replace the codec registry
    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Register an additional codec
    #[must_use]
    pub fn with_codec(mut self, method: u8, codec: Arc<dyn Codec>) -> Self {
        self.codecs.register(method, codec);
        self
    }
}

//! Read-only access to MPQ archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // MPQ-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::missing_errors_doc)] // Every fallible call returns MpqError
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! MPQ is the container format of Blizzard's older games: a header, an
//! encrypted hash table mapping file names to block indices, an encrypted
//! block table describing where and how each file is stored, and the file
//! data itself, optionally split into compressed sectors.
//!
//! This crate locates the archive inside its host file, decrypts the
//! directory tables, resolves names (with locale fallback) and extracts file
//! content through a pluggable codec registry. Writing archives is out of
//! scope.
//!
//! # Examples
//!
//! ```no_run
//! use storm_archive::Archive;
//!
//! let archive = Archive::open("maps/(2)BootyBay.w3m")?;
//! for file in archive.list()? {
//!     println!("{} ({} bytes)", file.name, file.size);
//! }
//! let script = archive.read("war3map.j")?;
//! # let _ = script;
//! # Ok::<(), storm_archive::MpqError>(())
//! ```
//!
//! # Modules
//!
//! - [`source`]: memory-mapped and in-memory byte sources, bounds-checked reader
//! - [`header`]: header scanning and validation
//! - [`hash_table`] and [`block_table`]: the decrypted directory
//! - [`codec`]: method ids and the codec registry
//! - [`extract`]: raw, single-unit and sectored extraction
//! - [`archive`]: the [`Archive`] handle

#![warn(missing_docs)]

pub mod archive;
pub mod block_table;
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod hash_table;
pub mod header;
pub mod listfile;
pub mod source;

pub use archive::{Archive, FileInfo, ResolvedFile};
pub use block_table::{BlockEntry, BlockFlags, BlockTable};
pub use codec::{Codec, CodecRegistry, method};
pub use config::ArchiveConfig;
pub use error::{ErrorKind, MpqError, MpqResult};
pub use extract::FileHandle;
pub use hash_table::{HashEntry, HashTable, LOCALE_NEUTRAL, NameHash};
pub use header::{FormatVersion, MpqHeader};
pub use source::{ByteSource, MappedSource, MemorySource};

//! The archive handle
//!
//! [`Archive`] owns the byte source and the decrypted directory tables.
//! Everything else (locating, resolving, extracting) is driven from here.
//! Reads take `&self` and share no mutable state, so one archive can serve
//! several threads. [`Archive::close`] releases the source early; every later
//! call fails with [`MpqError::ArchiveClosed`].

use crate::block_table::{BlockEntry, BlockTable};
use crate::config::ArchiveConfig;
use crate::error::{MpqError, MpqResult};
use crate::extract::{ExtractContext, FileHandle};
use crate::hash_table::{HashEntry, HashTable, NameHash};
use crate::header::{MpqHeader, locate};
use crate::listfile::{
    INTERNAL_FILES, LISTFILE_NAME, basename, normalized_key, parse_listfile, parse_pseudo_name,
    pseudo_name,
};
use crate::source::{ByteSource, MappedSource, MemorySource};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One entry of an archive listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileInfo {
    /// Full name as stored in the listfile
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Last path component of `name`
    pub basename: String,
}

impl FileInfo {
    fn new(name: String, size: u64) -> Self {
        let base = basename(&name).to_string();
        Self {
            name,
            size,
            basename: base,
        }
    }
}

/// Directory data of a resolved name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Hash table slot that matched
    pub hash_slot: usize,
    /// Locale of the matching entry
    pub locale: u16,
    /// Platform of the matching entry
    pub platform: u16,
    /// Block table index
    pub block_index: u32,
    /// Block table entry
    pub block: BlockEntry,
}

#[derive(Debug)]
struct LoadedArchive {
    source: Box<dyn ByteSource>,
    archive_offset: u64,
    header: MpqHeader,
    hash_table: HashTable,
    block_table: BlockTable,
}

/// An open MPQ archive
#[derive(Debug)]
pub struct Archive {
    path: Option<PathBuf>,
    config: ArchiveConfig,
    inner: Option<LoadedArchive>,
}

impl Archive {
    /// Open an archive file with the default configuration
    pub fn open<P: AsRef<Path>>(path: P) -> MpqResult<Self> {
        Self::open_with_config(path, ArchiveConfig::default())
    }

    /// Open an archive file
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ArchiveConfig) -> MpqResult<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|source| MpqError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        // Empty files cannot be mapped
        let source: Box<dyn ByteSource> = if config.use_mmap && metadata.len() > 0 {
            Box::new(MappedSource::open(path)?)
        } else {
            Box::new(MemorySource::read_file(path)?)
        };

        let mut archive = Self::from_source(source, config)?;
        archive.path = Some(path.to_path_buf());
        info!(
            "Opened {} ({} files in block table)",
            path.display(),
            archive.block_table()?.existing().count()
        );
        Ok(archive)
    }

    /// Open an archive held in memory
    pub fn from_bytes(data: Vec<u8>) -> MpqResult<Self> {
        Self::from_source(Box::new(MemorySource::new(data)), ArchiveConfig::default())
    }

    /// Open an archive over any byte source
    pub fn from_source(source: Box<dyn ByteSource>, config: ArchiveConfig) -> MpqResult<Self> {
        let (archive_offset, header) = locate(source.as_ref(), config.max_scan_offset)?;
        let hash_table = HashTable::load(source.as_ref(), &header, archive_offset)?;
        let block_table = BlockTable::load(source.as_ref(), &header, archive_offset)?;

        debug!(
            "Archive at offset {archive_offset}: {} hash slots, {} blocks, {} byte sectors",
            hash_table.len(),
            block_table.len(),
            header.sector_size()
        );

        Ok(Self {
            path: None,
            config,
            inner: Some(LoadedArchive {
                source,
                archive_offset,
                header,
                hash_table,
                block_table,
            }),
        })
    }

    fn loaded(&self) -> MpqResult<&LoadedArchive> {
        self.inner.as_ref().ok_or(MpqError::ArchiveClosed)
    }

    /// Resolve a name in the default locale
    pub fn file_info(&self, name: &str) -> MpqResult<ResolvedFile> {
        self.resolve(name, self.config.default_locale)
    }

    /// Resolve a name in a specific locale
    ///
    /// Falls back to the neutral locale when no entry for `locale` exists.
    /// Names of the form `FileNNNNNNNN.xxx`, as reported by [`Archive::list`]
    /// for unnamed files, resolve to block `NNNNNNNN` when no stored file
    /// carries that name.
    pub fn resolve(&self, name: &str, locale: u16) -> MpqResult<ResolvedFile> {
        let loaded = self.loaded()?;
        let (hash_slot, entry) = loaded
            .hash_table
            .find(&NameHash::new(name), locale, self.config.default_platform)
            .or_else(|| pseudo_named_slot(&loaded.hash_table, name))
            .ok_or_else(|| MpqError::NotFound(name.to_string()))?;
        let block = *loaded.block_table.get(entry.block_index)?;

        Ok(ResolvedFile {
            hash_slot,
            locale: entry.locale,
            platform: entry.platform,
            block_index: entry.block_index,
            block,
        })
    }

    /// Whether a name resolves to a stored file
    pub fn contains(&self, name: &str) -> bool {
        self.file_info(name).is_ok()
    }

    /// Resolve a name into a handle for reading
    pub fn open_file<'a>(&'a self, name: &'a str, locale: u16) -> MpqResult<FileHandle<'a>> {
        let resolved = self.resolve(name, locale)?;
        let loaded = self.loaded()?;
        let ctx = ExtractContext {
            source: loaded.source.as_ref(),
            archive_offset: loaded.archive_offset,
            sector_size: loaded.header.sector_size(),
            codecs: &self.config.codecs,
            max_file_size: self.config.max_file_size,
        };
        Ok(FileHandle::new(
            name,
            resolved.block_index,
            resolved.block,
            ctx,
        ))
    }

    /// Extract a file in the default locale
    pub fn read(&self, name: &str) -> MpqResult<Vec<u8>> {
        self.read_locale(name, self.config.default_locale)
    }

    /// Extract a file in a specific locale
    pub fn read_locale(&self, name: &str, locale: u16) -> MpqResult<Vec<u8>> {
        self.open_file(name, locale)?.read()
    }

    /// Extract a file to `dest`
    ///
    /// The destination is only created once the content has been extracted.
    /// If writing fails the partial file is removed.
    pub fn extract_to<P: AsRef<Path>>(&self, name: &str, dest: P) -> MpqResult<u64> {
        let data = self.read(name)?;
        let dest = dest.as_ref();

        PartialFile::create(dest)?.commit(&data)?;

        debug!("Extracted '{name}' to {} ({} bytes)", dest.display(), data.len());
        Ok(data.len() as u64)
    }

    /// List every stored file
    ///
    /// Each live hash table entry that points at a stored block is reported
    /// once. Entries are named through the archive's `(listfile)` and the
    /// internal file names, in listfile order; entries no name matches come
    /// last as `FileNNNNNNNN.xxx` (the block index). Listfile names that match
    /// nothing are dropped, duplicates (by normalized name) are ignored.
    pub fn list(&self) -> MpqResult<Vec<FileInfo>> {
        let listing = match self.read(LISTFILE_NAME) {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Err(MpqError::ListingUnavailable),
            Err(e) => return Err(e),
        };
        let loaded = self.loaded()?;

        // Live slots not yet claimed by a name, and slots by name hashes
        let mut unnamed: BTreeMap<usize, (u32, u64)> = BTreeMap::new();
        let mut by_hash: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        for (slot, entry) in loaded.hash_table.live_entries() {
            match loaded.block_table.get(entry.block_index) {
                Ok(block) => {
                    unnamed.insert(slot, (entry.block_index, u64::from(block.uncompressed_size)));
                    by_hash
                        .entry((entry.name_hash_a, entry.name_hash_b))
                        .or_default()
                        .push(slot);
                }
                Err(e) => debug!("Skipping hash slot {slot}: {e}"),
            }
        }

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let names = parse_listfile(&listing)
            .into_iter()
            .chain(INTERNAL_FILES.iter().map(|name| (*name).to_string()));

        for name in names {
            if !seen.insert(normalized_key(&name)) {
                continue;
            }
            let hash = NameHash::new(&name);
            let slots = by_hash
                .get(&(hash.name_a, hash.name_b))
                .map(Vec::as_slice)
                .unwrap_or_default();

            let mut matched = false;
            for slot in slots {
                if let Some((_, size)) = unnamed.remove(slot) {
                    files.push(FileInfo::new(name.clone(), size));
                    matched = true;
                }
            }
            if !matched && !INTERNAL_FILES.contains(&name.as_str()) {
                warn!("Listed name '{name}' is not in the archive");
            }
        }

        if !unnamed.is_empty() {
            debug!("{} stored files are not named by the listfile", unnamed.len());
        }
        for (block_index, size) in unnamed.into_values() {
            files.push(FileInfo::new(pseudo_name(block_index), size));
        }

        debug!("Listed {} files", files.len());
        Ok(files)
    }

    /// Release the byte source and tables
    ///
    /// Closing twice is harmless.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            match &self.path {
                Some(path) => info!("Closed {}", path.display()),
                None => info!("Closed in-memory archive"),
            }
        }
    }

    /// Whether [`Archive::close`] was called
    pub const fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Parsed header
    pub fn header(&self) -> MpqResult<&MpqHeader> {
        Ok(&self.loaded()?.header)
    }

    /// Absolute offset of the archive start within the source
    pub fn archive_offset(&self) -> MpqResult<u64> {
        Ok(self.loaded()?.archive_offset)
    }

    /// Sector size in bytes
    pub fn sector_size(&self) -> MpqResult<usize> {
        Ok(self.loaded()?.header.sector_size())
    }

    /// Decrypted hash table
    pub fn hash_table(&self) -> MpqResult<&HashTable> {
        Ok(&self.loaded()?.hash_table)
    }

    /// Decrypted block table
    pub fn block_table(&self) -> MpqResult<&BlockTable> {
        Ok(&self.loaded()?.block_table)
    }

    /// Path the archive was opened from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Configuration in use
    pub const fn config(&self) -> &ArchiveConfig {
        &self.config
    }
}

fn pseudo_named_slot<'a>(table: &'a HashTable, name: &str) -> Option<(usize, &'a HashEntry)> {
    let block_index = parse_pseudo_name(name)?;
    table
        .live_entries()
        .find(|(_, entry)| entry.block_index == block_index)
}

/// Output file that is closed and removed unless [`PartialFile::commit`]
/// succeeds
struct PartialFile<'a> {
    path: &'a Path,
    file: Option<File>,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn create(path: &'a Path) -> MpqResult<Self> {
        Ok(Self {
            path,
            file: Some(File::create(path)?),
            armed: true,
        })
    }

    /// Write and sync the whole content, then disarm the guard
    fn commit(mut self, data: &[u8]) -> MpqResult<()> {
        if let Some(mut file) = self.file.take() {
            file.write_all(data)?;
            file.sync_all()?;
        }
        self.armed = false;
        Ok(())
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        // The handle has to be closed before the file can be removed everywhere
        drop(self.file.take());
        if self.armed {
            if let Err(e) = fs::remove_file(self.path) {
                warn!("Failed to remove partial file {}: {e}", self.path.display());
            }
        }
    }
}

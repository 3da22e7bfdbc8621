//! Block table: where and how each file is stored
//!
//! Entries are addressed by the block index found in the hash table. The
//! table is encrypted with the key derived from `"(block table)"`. Archives
//! larger than 4 GiB (format v2+) store the upper 16 bits of every file
//! offset in a separate, unencrypted hi-block table.

use crate::error::{MpqError, MpqResult};
use crate::header::MpqHeader;
use crate::source::{ByteReader, ByteSource};
use binrw::BinRead;
use std::fmt;
use storm_crypto::{BLOCK_TABLE_KEY, decrypt_bytes};
use tracing::debug;

/// Size of one serialized entry
pub const BLOCK_ENTRY_SIZE: usize = 16;

/// Storage flags of a block
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[br(little)]
pub struct BlockFlags {
    /// Raw flag value
    pub value: u32,
}

impl BlockFlags {
    /// Compressed with PKWARE DCL implode, no method byte
    pub const IMPLODE: u32 = 0x0000_0100;

    /// Compressed; every unit starts with a method byte
    pub const COMPRESS: u32 = 0x0000_0200;

    /// Encrypted with a key derived from the file name
    pub const ENCRYPTED: u32 = 0x0001_0000;

    /// Encryption key adjusted by block offset and size
    pub const FIX_KEY: u32 = 0x0002_0000;

    /// Patch file for an older archive version
    pub const PATCH_FILE: u32 = 0x0010_0000;

    /// Stored as one unit instead of sectors
    pub const SINGLE_UNIT: u32 = 0x0100_0000;

    /// Marks a deletion in a patch archive
    pub const DELETE_MARKER: u32 = 0x0200_0000;

    /// Sector offset table is followed by sector checksums
    pub const SECTOR_CRC: u32 = 0x0400_0000;

    /// Entry describes a stored file
    pub const EXISTS: u32 = 0x8000_0000;

    const NAMES: [(u32, &'static str); 9] = [
        (Self::IMPLODE, "IMPLODE"),
        (Self::COMPRESS, "COMPRESS"),
        (Self::ENCRYPTED, "ENCRYPTED"),
        (Self::FIX_KEY, "FIX_KEY"),
        (Self::PATCH_FILE, "PATCH_FILE"),
        (Self::SINGLE_UNIT, "SINGLE_UNIT"),
        (Self::DELETE_MARKER, "DELETE_MARKER"),
        (Self::SECTOR_CRC, "SECTOR_CRC"),
        (Self::EXISTS, "EXISTS"),
    ];

    /// Flags from a raw value
    pub const fn new(value: u32) -> Self {
        Self { value }
    }

    /// Check if a flag is set
    pub const fn has(&self, flag: u32) -> bool {
        (self.value & flag) != 0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u32) {
        self.value |= flag;
    }

    /// Clear a flag
    pub fn clear(&mut self, flag: u32) {
        self.value &= !flag;
    }

    /// Entry describes a stored file
    pub const fn exists(&self) -> bool {
        self.has(Self::EXISTS)
    }

    /// Data goes through a codec
    pub const fn is_compressed(&self) -> bool {
        self.has(Self::COMPRESS) || self.has(Self::IMPLODE)
    }

    /// Data is stored as a single unit
    pub const fn is_single_unit(&self) -> bool {
        self.has(Self::SINGLE_UNIT)
    }

    /// Data is encrypted
    pub const fn is_encrypted(&self) -> bool {
        self.has(Self::ENCRYPTED)
    }
}

impl fmt::Display for BlockFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.has(*flag))
            .map(|(_, name)| *name)
            .collect();

        if names.is_empty() {
            write!(f, "NONE (0x{:08X})", self.value)
        } else {
            write!(f, "{} (0x{:08X})", names.join(" | "), self.value)
        }
    }
}

/// One block table entry
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[br(little)]
pub struct BlockEntry {
    /// Offset of the file data relative to the archive start, including the
    /// hi-block bits
    #[br(map = |offset: u32| u64::from(offset))]
    pub file_offset: u64,
    /// Stored size, including any sector offset table
    pub compressed_size: u32,
    /// Size of the file once extracted
    pub uncompressed_size: u32,
    /// Storage flags
    pub flags: BlockFlags,
}

impl BlockEntry {
    /// Number of sectors for a sector-based file
    pub const fn sector_count(&self, sector_size: usize) -> usize {
        (self.uncompressed_size as usize).div_ceil(sector_size)
    }
}

/// Decrypted block table
#[derive(Debug, Clone, Default)]
pub struct BlockTable {
    entries: Vec<BlockEntry>,
}

impl BlockTable {
    /// Build a table from decrypted entries
    pub fn new(entries: Vec<BlockEntry>) -> Self {
        Self { entries }
    }

    /// Read and decrypt the block table described by `header`
    pub fn load(source: &dyn ByteSource, header: &MpqHeader, archive_offset: u64) -> MpqResult<Self> {
        let count = header.block_table_entries as usize;
        let offset = archive_offset
            .checked_add(header.block_table_offset)
            .ok_or_else(|| MpqError::invalid_format("block table offset overflows"))?;
        let byte_len = count
            .checked_mul(BLOCK_ENTRY_SIZE)
            .ok_or_else(|| MpqError::invalid_format("block table size overflows"))?;

        let mut raw = source.read_at(offset, byte_len)?.to_vec();
        decrypt_bytes(&mut raw, BLOCK_TABLE_KEY);

        let mut reader = ByteReader::new(&raw);
        let mut entries = (0..count)
            .map(|_| reader.read_struct::<BlockEntry>())
            .collect::<MpqResult<Vec<_>>>()?;

        if header.hi_block_table_offset != 0 {
            let hi_offset = archive_offset
                .checked_add(header.hi_block_table_offset)
                .ok_or_else(|| MpqError::invalid_format("hi-block table offset overflows"))?;
            let mut hi = source.reader_at(hi_offset)?;
            for entry in &mut entries {
                entry.file_offset |= u64::from(hi.read_u16_le()?) << 32;
            }
            debug!("Merged hi-block table at offset {hi_offset}");
        }

        debug!(
            "Loaded block table: {} entries at offset {offset}, {} existing",
            entries.len(),
            entries.iter().filter(|e| e.flags.exists()).count()
        );

        Ok(Self { entries })
    }

    /// Entry for a block index
    ///
    /// Indices past the end and entries without [`BlockFlags::EXISTS`] are
    /// reported as [`MpqError::MissingBlock`].
    pub fn get(&self, index: u32) -> MpqResult<&BlockEntry> {
        self.entries
            .get(index as usize)
            .filter(|entry| entry.flags.exists())
            .ok_or(MpqError::MissingBlock { index })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw entries, holes included
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Entries describing stored files, with their index
    pub fn existing(&self) -> impl Iterator<Item = (u32, &BlockEntry)> {
        (0u32..)
            .zip(&self.entries)
            .filter(|(_, entry)| entry.flags.exists())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::header::FormatVersion;
    use crate::source::MemorySource;

    fn encode(entries: &[(u32, u32, u32, u32)]) -> Vec<u8> {
        let mut raw = Vec::new();
        for &(offset, csize, usize_, flags) in entries {
            raw.extend_from_slice(&offset.to_le_bytes());
            raw.extend_from_slice(&csize.to_le_bytes());
            raw.extend_from_slice(&usize_.to_le_bytes());
            raw.extend_from_slice(&flags.to_le_bytes());
        }
        storm_crypto::encrypt_bytes(&mut raw, BLOCK_TABLE_KEY);
        raw
    }

    fn header(count: u32, hi_block_table_offset: u64) -> MpqHeader {
        MpqHeader {
            header_size: 0x2C,
            archive_size: 0,
            format_version: FormatVersion::V2,
            sector_size_shift: 3,
            hash_table_offset: 0,
            block_table_offset: 0x10,
            hash_table_entries: 1,
            block_table_entries: count,
            hi_block_table_offset,
            archive_size_64: 0,
            bet_table_offset: 0,
            het_table_offset: 0,
        }
    }

    #[test]
    fn test_flags() {
        let flags = BlockFlags::new(BlockFlags::EXISTS | BlockFlags::COMPRESS);
        assert!(flags.exists());
        assert!(flags.is_compressed());
        assert!(!flags.is_single_unit());
        assert!(!flags.is_encrypted());
        assert_eq!(flags.to_string(), "COMPRESS | EXISTS (0x80000200)");
        assert_eq!(BlockFlags::default().to_string(), "NONE (0x00000000)");

        let mut flags = BlockFlags::new(BlockFlags::IMPLODE);
        assert!(flags.is_compressed());
        flags.clear(BlockFlags::IMPLODE);
        flags.set(BlockFlags::SINGLE_UNIT);
        assert!(!flags.is_compressed());
        assert!(flags.is_single_unit());
    }

    #[test]
    fn test_sector_count() {
        let entry = BlockEntry {
            uncompressed_size: 4097,
            ..BlockEntry::default()
        };
        assert_eq!(entry.sector_count(4096), 2);
        assert_eq!(BlockEntry::default().sector_count(4096), 0);
    }

    #[test]
    fn test_load_and_holes() {
        let mut data = vec![0u8; 0x10];
        data.extend(encode(&[
            (0x20, 5, 5, BlockFlags::EXISTS),
            (0, 0, 0, 0),
            (0x40, 10, 20, BlockFlags::EXISTS | BlockFlags::COMPRESS),
        ]));

        let table = BlockTable::load(&MemorySource::new(data), &header(3, 0), 0).unwrap();
        assert_eq!(table.len(), 3);

        let first = table.get(0).unwrap();
        assert_eq!(first.file_offset, 0x20);
        assert_eq!(first.uncompressed_size, 5);

        assert!(matches!(table.get(1), Err(MpqError::MissingBlock { index: 1 })));
        assert_eq!(table.get(3).unwrap_err().kind(), ErrorKind::NotFound);

        let existing: Vec<u32> = table.existing().map(|(i, _)| i).collect();
        assert_eq!(existing, vec![0, 2]);
    }

    #[test]
    fn test_hi_block_table_merged() {
        let mut data = vec![0u8; 0x10];
        data.extend(encode(&[
            (0x20, 5, 5, BlockFlags::EXISTS),
            (0x30, 5, 5, BlockFlags::EXISTS),
        ]));
        let hi_offset = data.len() as u64;
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());

        let table =
            BlockTable::load(&MemorySource::new(data), &header(2, hi_offset), 0).unwrap();
        assert_eq!(table.get(0).unwrap().file_offset, 0x20);
        assert_eq!(table.get(1).unwrap().file_offset, 0x2_0000_0030);
    }

    #[test]
    fn test_truncated_table() {
        let data = vec![0u8; 0x18];
        let err = BlockTable::load(&MemorySource::new(data), &header(1, 0), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }
}

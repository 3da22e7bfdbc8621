//! Hash table: name to block index resolution
//!
//! The table is an open-addressed array of 16-byte entries whose size is a
//! power of two. A name's home slot is its `TableOffset` hash masked to the
//! table size; collisions are resolved by linear probing. The two stored name
//! hashes identify the file without keeping the name itself.
//!
//! On disk the table is encrypted with the key derived from `"(hash table)"`.

use crate::error::{MpqError, MpqResult};
use crate::header::MpqHeader;
use crate::source::{ByteReader, ByteSource};
use binrw::BinRead;
use storm_crypto::{HASH_TABLE_KEY, HashType, decrypt_bytes, hash_string};
use tracing::{debug, trace};

/// Size of one serialized entry
pub const HASH_ENTRY_SIZE: usize = 16;

/// Locale id of language-neutral files
pub const LOCALE_NEUTRAL: u16 = 0;

/// Default platform id
pub const PLATFORM_DEFAULT: u16 = 0;

/// Block index of a slot that was never used; terminates probing
pub const BLOCK_INDEX_NEVER_USED: u32 = 0xFFFF_FFFF;

/// Block index of a slot whose file was deleted; probing continues past it
pub const BLOCK_INDEX_DELETED: u32 = 0xFFFF_FFFE;

/// One hash table slot
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[br(little)]
pub struct HashEntry {
    /// `NameA` hash of the file name
    pub name_hash_a: u32,
    /// `NameB` hash of the file name
    pub name_hash_b: u32,
    /// Locale id (0 = neutral)
    pub locale: u16,
    /// Platform id
    pub platform: u16,
    /// Index into the block table, or one of the sentinel values
    pub block_index: u32,
}

impl HashEntry {
    /// A slot that was never used
    pub const EMPTY: Self = Self {
        name_hash_a: 0xFFFF_FFFF,
        name_hash_b: 0xFFFF_FFFF,
        locale: 0xFFFF,
        platform: 0xFFFF,
        block_index: BLOCK_INDEX_NEVER_USED,
    };

    /// Slot was never used
    pub const fn is_never_used(&self) -> bool {
        self.block_index == BLOCK_INDEX_NEVER_USED
    }

    /// Slot held a file that was deleted
    pub const fn is_deleted(&self) -> bool {
        self.block_index == BLOCK_INDEX_DELETED
    }

    /// Slot refers to a block
    pub const fn is_live(&self) -> bool {
        self.block_index < BLOCK_INDEX_DELETED
    }
}

/// Precomputed hashes of one file name
///
/// Useful when the same name is looked up repeatedly, for example against
/// several archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameHash {
    /// Home slot hash
    pub table_offset: u32,
    /// First check hash
    pub name_a: u32,
    /// Second check hash
    pub name_b: u32,
}

impl NameHash {
    /// Hash a file name
    pub fn new(name: &str) -> Self {
        Self {
            table_offset: hash_string(name, HashType::TableOffset),
            name_a: hash_string(name, HashType::NameA),
            name_b: hash_string(name, HashType::NameB),
        }
    }
}

/// Decrypted hash table
#[derive(Debug, Clone)]
pub struct HashTable {
    entries: Vec<HashEntry>,
}

impl HashTable {
    /// Build a table from decrypted entries
    ///
    /// The entry count must be a non-zero power of two.
    pub fn new(entries: Vec<HashEntry>) -> MpqResult<Self> {
        let count = u32::try_from(entries.len())
            .map_err(|_| MpqError::invalid_format("hash table has more than 2^32 entries"))?;
        check_size(count)?;
        Ok(Self { entries })
    }

    /// Read and decrypt the hash table described by `header`
    pub fn load(source: &dyn ByteSource, header: &MpqHeader, archive_offset: u64) -> MpqResult<Self> {
        let count = header.hash_table_entries;
        check_size(count)?;

        let offset = archive_offset
            .checked_add(header.hash_table_offset)
            .ok_or_else(|| MpqError::invalid_format("hash table offset overflows"))?;
        let byte_len = (count as usize)
            .checked_mul(HASH_ENTRY_SIZE)
            .ok_or_else(|| MpqError::invalid_format("hash table size overflows"))?;

        // Bounds are checked before anything is allocated
        let mut raw = source.read_at(offset, byte_len)?.to_vec();
        decrypt_bytes(&mut raw, HASH_TABLE_KEY);

        let mut reader = ByteReader::new(&raw);
        let entries = (0..count)
            .map(|_| reader.read_struct::<HashEntry>())
            .collect::<MpqResult<Vec<_>>>()?;

        debug!(
            "Loaded hash table: {} slots at offset {offset}, {} live",
            entries.len(),
            entries.iter().filter(|e| e.is_live()).count()
        );

        Ok(Self { entries })
    }

    /// Resolve a name to its block index
    pub fn lookup(&self, name: &str, locale: u16, platform: u16) -> MpqResult<u32> {
        self.find(&NameHash::new(name), locale, platform)
            .map(|(_, entry)| entry.block_index)
            .ok_or_else(|| MpqError::NotFound(name.to_string()))
    }

    /// Probe for a name, returning the matching slot index and entry
    ///
    /// An entry whose locale equals `locale` wins immediately. Otherwise the
    /// first neutral-locale entry seen on the probe path is returned. Probing
    /// visits at most every slot once and stops at a never-used slot.
    pub fn find(&self, hash: &NameHash, locale: u16, platform: u16) -> Option<(usize, &HashEntry)> {
        let mask = self.entries.len() - 1;
        let start = hash.table_offset as usize & mask;
        let mut neutral = None;

        for step in 0..self.entries.len() {
            let slot = (start + step) & mask;
            let entry = &self.entries[slot];

            if entry.is_never_used() {
                break;
            }
            if !entry.is_live()
                || entry.name_hash_a != hash.name_a
                || entry.name_hash_b != hash.name_b
                || entry.platform != platform
            {
                continue;
            }

            if entry.locale == locale {
                trace!("Name resolved at slot {slot} after {} probes", step + 1);
                return Some((slot, entry));
            }
            if entry.locale == LOCALE_NEUTRAL && neutral.is_none() {
                neutral = Some((slot, entry));
            }
        }

        neutral
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a loaded table
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw slots
    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    /// Slot by index
    pub fn get(&self, slot: usize) -> Option<&HashEntry> {
        self.entries.get(slot)
    }

    /// Slots that refer to a block, with their slot index
    pub fn live_entries(&self) -> impl Iterator<Item = (usize, &HashEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.is_live())
    }
}

fn check_size(count: u32) -> MpqResult<()> {
    if count == 0 || !count.is_power_of_two() {
        return Err(MpqError::HashTableSize(count));
    }
    Ok(())
}

//! MPQ crypt table and seeded name hashing
//!
//! Every MPQ primitive is driven by a single table of 0x500 words. The table
//! is split into five 256-entry segments: segments 0-3 select the hash type,
//! segment 4 feeds the block cipher.
//!
//! File names are hashed case-insensitively with `/` and `\` treated as the
//! same separator, so `Units/Footman.mdx` and `UNITS\FOOTMAN.MDX` resolve to
//! the same slot.

/// Number of words in the crypt table
pub const CRYPT_TABLE_SIZE: usize = 0x500;

/// The crypt table, generated at compile time
pub static CRYPT_TABLE: [u32; CRYPT_TABLE_SIZE] = build_crypt_table();

const fn build_crypt_table() -> [u32; CRYPT_TABLE_SIZE] {
    let mut table = [0u32; CRYPT_TABLE_SIZE];
    let mut seed: u32 = 0x0010_0001;

    let mut index1 = 0;
    while index1 < 0x100 {
        let mut index2 = index1;
        let mut i = 0;
        while i < 5 {
            seed = (seed * 125 + 3) % 0x2A_AAAB;
            let high = (seed & 0xFFFF) << 0x10;
            seed = (seed * 125 + 3) % 0x2A_AAAB;
            let low = seed & 0xFFFF;
            table[index2] = high | low;

            index2 += 0x100;
            i += 1;
        }
        index1 += 1;
    }

    table
}

/// Selects which crypt table segment seeds the hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HashType {
    /// Initial hash table slot
    TableOffset = 0,
    /// First collision-check value stored in a hash entry
    NameA = 1,
    /// Second collision-check value stored in a hash entry
    NameB = 2,
    /// Encryption key derivation
    FileKey = 3,
}

impl HashType {
    const fn segment(self) -> usize {
        (self as usize) << 8
    }
}

/// Normalize a name byte: ASCII upper-case, `/` mapped to `\`
#[inline]
pub const fn normalize_char(byte: u8) -> u8 {
    if byte == b'/' {
        b'\\'
    } else {
        byte.to_ascii_uppercase()
    }
}

/// Hash a file name with the given hash type
///
/// # Examples
///
/// ```
/// use storm_crypto::{HashType, hash_string};
///
/// // Separators and case do not matter
/// assert_eq!(
///     hash_string("war3map.j", HashType::NameA),
///     hash_string("WAR3MAP.J", HashType::NameA),
/// );
/// assert_eq!(
///     hash_string("scripts/war3map.j", HashType::TableOffset),
///     hash_string("Scripts\\War3map.j", HashType::TableOffset),
/// );
/// ```
pub fn hash_string(name: &str, hash_type: HashType) -> u32 {
    hash_bytes(name.as_bytes(), hash_type)
}

/// Hash a raw byte name with the given hash type
pub fn hash_bytes(name: &[u8], hash_type: HashType) -> u32 {
    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;
    let segment = hash_type.segment();

    for &byte in name {
        let ch = normalize_char(byte);
        seed1 = CRYPT_TABLE[segment + usize::from(ch)] ^ seed1.wrapping_add(seed2);
        seed2 = u32::from(ch)
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

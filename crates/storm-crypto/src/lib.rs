//! Cryptographic primitives for MPQ archives
//!
//! This crate provides the hashing and block cipher used by the MPQ
//! container format for its central directory.
//!
//! # Components
//!
//! - **Crypt table**: the 0x500-word table every other primitive indexes into
//! - **Name hashing**: the seeded string hash used for hash table slots,
//!   the two collision-check values and encryption keys
//! - **Block cipher**: in-place decryption (and encryption) of `u32` words,
//!   used for the hash and block tables
//!
//! # Examples
//!
//! ## Hashing a file name
//!
//! ```
//! use storm_crypto::{HashType, hash_string};
//!
//! let slot = hash_string("units\\human\\footman.mdx", HashType::TableOffset);
//! let check_a = hash_string("units\\human\\footman.mdx", HashType::NameA);
//! let check_b = hash_string("units\\human\\footman.mdx", HashType::NameB);
//! assert_ne!(check_a, check_b);
//! # let _ = slot;
//! ```
//!
//! ## Decrypting a table
//!
//! ```
//! use storm_crypto::{decrypt_bytes, encrypt_bytes, HASH_TABLE_KEY};
//!
//! let mut table = vec![0xFFu8; 32];
//! encrypt_bytes(&mut table, HASH_TABLE_KEY);
//! decrypt_bytes(&mut table, HASH_TABLE_KEY);
//! assert!(table.iter().all(|&b| b == 0xFF));
//! ```

#![warn(missing_docs)]

pub mod cipher;
pub mod hash;

pub use cipher::{decrypt_block, decrypt_bytes, encrypt_block, encrypt_bytes};
pub use hash::{CRYPT_TABLE, HashType, hash_string, normalize_char};

/// Encryption key of the hash table, `hash_string("(hash table)", FileKey)`.
pub const HASH_TABLE_KEY: u32 = 0xC3AF_3770;

/// Encryption key of the block table, `hash_string("(block table)", FileKey)`.
pub const BLOCK_TABLE_KEY: u32 = 0xEC83_B3A3;

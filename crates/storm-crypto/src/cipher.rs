//! MPQ block cipher
//!
//! A stream of little-endian `u32` words XORed with a keystream derived from
//! the crypt table. The key evolves after every word and the seed absorbs the
//! plaintext, so decryption must process words in order.
//!
//! Trailing bytes that do not fill a whole word are left untouched, matching
//! how the format stores partially encrypted sectors.

use crate::hash::CRYPT_TABLE;

const SEED_INIT: u32 = 0xEEEE_EEEE;
const CIPHER_SEGMENT: usize = 0x400;

#[inline]
fn next_key(key: u32) -> u32 {
    ((!key << 0x15).wrapping_add(0x1111_1111)) | (key >> 0x0B)
}

#[inline]
fn advance_seed(seed: u32, plain: u32) -> u32 {
    plain
        .wrapping_add(seed)
        .wrapping_add(seed << 5)
        .wrapping_add(3)
}

/// Decrypt `u32` words in place
pub fn decrypt_block(data: &mut [u32], mut key: u32) {
    let mut seed = SEED_INIT;
    for word in data.iter_mut() {
        seed = seed.wrapping_add(CRYPT_TABLE[CIPHER_SEGMENT + (key & 0xFF) as usize]);
        let plain = *word ^ key.wrapping_add(seed);
        key = next_key(key);
        seed = advance_seed(seed, plain);
        *word = plain;
    }
}

/// Encrypt `u32` words in place
pub fn encrypt_block(data: &mut [u32], mut key: u32) {
    let mut seed = SEED_INIT;
    for word in data.iter_mut() {
        seed = seed.wrapping_add(CRYPT_TABLE[CIPHER_SEGMENT + (key & 0xFF) as usize]);
        let plain = *word;
        *word = plain ^ key.wrapping_add(seed);
        key = next_key(key);
        seed = advance_seed(seed, plain);
    }
}

/// Decrypt a byte buffer in place, interpreting it as little-endian words
pub fn decrypt_bytes(data: &mut [u8], mut key: u32) {
    let mut seed = SEED_INIT;
    for chunk in data.chunks_exact_mut(4) {
        seed = seed.wrapping_add(CRYPT_TABLE[CIPHER_SEGMENT + (key & 0xFF) as usize]);
        let cipher = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let plain = cipher ^ key.wrapping_add(seed);
        key = next_key(key);
        seed = advance_seed(seed, plain);
        chunk.copy_from_slice(&plain.to_le_bytes());
    }
}

/// Encrypt a byte buffer in place, interpreting it as little-endian words
pub fn encrypt_bytes(data: &mut [u8], mut key: u32) {
    let mut seed = SEED_INIT;
    for chunk in data.chunks_exact_mut(4) {
        seed = seed.wrapping_add(CRYPT_TABLE[CIPHER_SEGMENT + (key & 0xFF) as usize]);
        let plain = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let cipher = plain ^ key.wrapping_add(seed);
        key = next_key(key);
        seed = advance_seed(seed, plain);
        chunk.copy_from_slice(&cipher.to_le_bytes());
    }
}

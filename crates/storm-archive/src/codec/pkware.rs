//! PKWARE Data Compression Library "explode"
//!
//! A stream starts with two bytes: the literal mode (0 for raw bytes, 1 for
//! Huffman coded literals) and the dictionary size as a bit count (4, 5 or 6,
//! for 1, 2 or 4 KiB windows). Bits follow least significant first. Each item
//! is a flag bit then either a literal or a length/distance pair. The length
//! 519 marks the end of the stream.
//!
//! The Huffman tables are fixed. They are stored as compact code lengths and
//! expanded into canonical codes, whose bits appear inverted in the stream.

use super::{Codec, method};
use crate::error::{MpqError, MpqResult};
use std::sync::LazyLock;

const MAX_CODE_BITS: usize = 13;

const END_OF_STREAM: usize = 519;

// Each byte is `(repeat - 1) << 4 | code_length`
const LITERAL_CODE_LENGTHS: [u8; 98] = [
    11, 124, 8, 7, 28, 7, 188, 13, 76, 4, 10, 8, 12, 10, 12, 10, 8, 23, 8, 9, 7, 6, 7, 8, 7, 6,
    55, 8, 23, 24, 12, 11, 7, 9, 11, 12, 6, 7, 22, 5, 7, 24, 6, 11, 9, 6, 7, 22, 7, 11, 38, 7, 9,
    8, 25, 11, 8, 11, 9, 12, 8, 12, 5, 38, 5, 38, 5, 11, 7, 5, 6, 21, 6, 10, 53, 8, 7, 24, 10, 27,
    44, 253, 253, 253, 252, 252, 252, 13, 12, 45, 12, 45, 12, 61, 12, 45, 44, 173,
];
const LENGTH_CODE_LENGTHS: [u8; 6] = [2, 35, 36, 53, 38, 23];
const DISTANCE_CODE_LENGTHS: [u8; 7] = [2, 20, 53, 230, 247, 151, 248];

const LENGTH_BASE: [u16; 16] = [3, 2, 4, 5, 6, 7, 8, 9, 10, 12, 16, 24, 40, 72, 136, 264];
const LENGTH_EXTRA_BITS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];

struct Tables {
    literals: Huffman,
    lengths: Huffman,
    distances: Huffman,
}

static TABLES: LazyLock<Tables> = LazyLock::new(|| Tables {
    literals: Huffman::from_compact(&LITERAL_CODE_LENGTHS),
    lengths: Huffman::from_compact(&LENGTH_CODE_LENGTHS),
    distances: Huffman::from_compact(&DISTANCE_CODE_LENGTHS),
});

/// Canonical code: symbols counted per code length
struct Huffman {
    count: [u16; MAX_CODE_BITS + 1],
    symbols: Vec<u16>,
}

impl Huffman {
    fn from_compact(compact: &[u8]) -> Self {
        let lengths: Vec<u8> = compact
            .iter()
            .flat_map(|&b| std::iter::repeat_n(b & 0x0F, usize::from(b >> 4) + 1))
            .collect();

        let mut count = [0u16; MAX_CODE_BITS + 1];
        for &len in &lengths {
            count[usize::from(len)] += 1;
        }

        let mut offsets = [0u16; MAX_CODE_BITS + 1];
        for len in 1..MAX_CODE_BITS {
            offsets[len + 1] = offsets[len] + count[len];
        }

        let mut symbols = vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[usize::from(len)];
                symbols[usize::from(*slot)] = symbol as u16;
                *slot += 1;
            }
        }

        Self { count, symbols }
    }

    /// Next symbol, or `None` when the input runs out
    fn decode(&self, bits: &mut BitReader<'_>) -> MpqResult<Option<u16>> {
        let mut code = 0u32;
        let mut first = 0u32;
        let mut index = 0u32;

        for len in 1..=MAX_CODE_BITS {
            let Some(bit) = bits.take(1) else {
                return Ok(None);
            };
            code |= bit ^ 1;
            let count = u32::from(self.count[len]);
            if code < first + count {
                return Ok(Some(self.symbols[(index + code - first) as usize]));
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }

        Err(MpqError::decompression(method::PKWARE, "invalid Huffman code"))
    }
}

struct BitReader<'a> {
    input: &'a [u8],
    pos: usize,
    buffer: u32,
    available: u32,
}

impl<'a> BitReader<'a> {
    const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            buffer: 0,
            available: 0,
        }
    }

    /// Up to 8 bits, least significant first
    fn take(&mut self, count: u32) -> Option<u32> {
        while self.available < count {
            let &byte = self.input.get(self.pos)?;
            self.pos += 1;
            self.buffer |= u32::from(byte) << self.available;
            self.available += 8;
        }
        let value = self.buffer & ((1u32 << count) - 1);
        self.buffer >>= count;
        self.available -= count;
        Some(value)
    }
}

/// PKWARE DCL decompression, implemented in-crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PkwareCodec;

impl Codec for PkwareCodec {
    fn name(&self) -> &'static str {
        "pkware"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
        explode(input, expected_len)
    }
}

/// Decode until the end marker, the end of input or `limit + 1` bytes
fn explode(input: &[u8], limit: usize) -> MpqResult<Vec<u8>> {
    let [literal_mode, dictionary_bits, ref stream @ ..] = *input else {
        return Err(MpqError::decompression(method::PKWARE, "missing stream header"));
    };
    if literal_mode > 1 {
        return Err(MpqError::decompression(
            method::PKWARE,
            format!("invalid literal mode {literal_mode}"),
        ));
    }
    if !(4..=6).contains(&dictionary_bits) {
        return Err(MpqError::decompression(
            method::PKWARE,
            format!("invalid dictionary size {dictionary_bits}"),
        ));
    }

    let tables = &*TABLES;
    let bound = limit.saturating_add(1);
    let mut bits = BitReader::new(stream);
    let mut out = Vec::with_capacity(limit);

    // Running out of input ends decoding; the caller checks the length
    while out.len() < bound {
        let Some(flag) = bits.take(1) else { break };

        if flag == 0 {
            let literal = if literal_mode == 1 {
                tables.literals.decode(&mut bits)?
            } else {
                bits.take(8).map(|b| b as u16)
            };
            let Some(literal) = literal else { break };
            out.push(literal as u8);
            continue;
        }

        let Some(symbol) = tables.lengths.decode(&mut bits)? else {
            break;
        };
        let symbol = usize::from(symbol);
        let Some(extra) = bits.take(u32::from(LENGTH_EXTRA_BITS[symbol])) else {
            break;
        };
        let len = usize::from(LENGTH_BASE[symbol]) + extra as usize;
        if len == END_OF_STREAM {
            break;
        }

        // Two byte matches always use a 2 bit low part
        let shift = if len == 2 { 2 } else { u32::from(dictionary_bits) };
        let Some(high) = tables.distances.decode(&mut bits)? else {
            break;
        };
        let Some(low) = bits.take(shift) else { break };
        let distance = ((usize::from(high) << shift) | low as usize) + 1;
        if distance > out.len() {
            return Err(MpqError::decompression(
                method::PKWARE,
                format!(
                    "match distance {distance} reaches before the start of {} output bytes",
                    out.len()
                ),
            ));
        }

        let start = out.len() - distance;
        for i in 0..len.min(bound - out.len()) {
            out.push(out[start + i]);
        }
    }

    Ok(out)
}

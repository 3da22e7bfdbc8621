//! Minimal MPQ writer for building test archives
//!
//! Produces v1 or v2 archives with stored, single-unit and sectored files.
//! Only what the reader needs to be exercised is supported.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use bzip2::write::BzEncoder;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use storm_archive::{BlockFlags, method};
use storm_crypto::{BLOCK_TABLE_KEY, HASH_TABLE_KEY, HashType, encrypt_bytes, hash_string};
use std::io::{Cursor, Write};

const MPQ_SIGNATURE: u32 = 0x1A51_504D;
const USER_DATA_SIGNATURE: u32 = 0x1B51_504D;

/// How a file is laid out in the archive
#[derive(Debug, Clone)]
pub enum Storage {
    /// Raw bytes, no sector table
    Stored,
    /// One unit compressed with the given method
    SingleUnit(u8),
    /// Sectors compressed with the given method
    Sectored(u8),
    /// Sectors followed by a (zeroed) checksum block
    SectoredCrc(u8),
    /// Caller-supplied stored bytes and flags
    Prebuilt { stored: Vec<u8>, flags: u32 },
}

#[derive(Debug, Clone)]
pub struct TestFile {
    pub name: String,
    pub data: Vec<u8>,
    pub storage: Storage,
    pub locale: u16,
    /// Overrides the uncompressed size written to the block table
    pub declared_size: Option<u32>,
    /// Whether the generated (listfile) names this file
    pub listed: bool,
}

impl TestFile {
    pub fn new(name: &str, data: &[u8], storage: Storage) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            storage,
            locale: 0,
            declared_size: None,
            listed: true,
        }
    }

    pub fn locale(mut self, locale: u16) -> Self {
        self.locale = locale;
        self
    }

    pub fn declared_size(mut self, size: u32) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn unlisted(mut self) -> Self {
        self.listed = false;
        self
    }
}

pub struct ArchiveBuilder {
    files: Vec<TestFile>,
    sector_shift: u16,
    hash_table_size: u32,
    prefix_len: usize,
    v2: bool,
    listfile: bool,
    user_data: bool,
    garbage_hash_slots: bool,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            sector_shift: 0,
            hash_table_size: 16,
            prefix_len: 0,
            v2: false,
            listfile: true,
            user_data: false,
            garbage_hash_slots: false,
        }
    }

    pub fn file(mut self, name: &str, data: &[u8], storage: Storage) -> Self {
        self.files.push(TestFile::new(name, data, storage));
        self
    }

    pub fn test_file(mut self, file: TestFile) -> Self {
        self.files.push(file);
        self
    }

    /// Sector size is `512 << shift`
    pub fn sector_shift(mut self, shift: u16) -> Self {
        self.sector_shift = shift;
        self
    }

    pub fn hash_table_size(mut self, size: u32) -> Self {
        self.hash_table_size = size;
        self
    }

    /// Bytes of junk in front of the archive; must be a multiple of 512
    pub fn prefix(mut self, len: usize) -> Self {
        assert_eq!(len % 512, 0);
        self.prefix_len = len;
        self
    }

    pub fn v2(mut self) -> Self {
        self.v2 = true;
        self
    }

    pub fn without_listfile(mut self) -> Self {
        self.listfile = false;
        self
    }

    /// Put a user data header at offset 0 pointing at the archive
    pub fn user_data(mut self) -> Self {
        self.user_data = true;
        self
    }

    /// Fill every free hash slot with entries that match nothing
    pub fn garbage_hash_slots(mut self) -> Self {
        self.garbage_hash_slots = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let sector_size = 512usize << self.sector_shift;
        let header_size: u32 = if self.v2 { 0x2C } else { 0x20 };

        let mut files = self.files.clone();
        if self.listfile {
            let names: Vec<&str> = files
                .iter()
                .filter(|f| f.listed)
                .map(|f| f.name.as_str())
                .collect();
            let body = names.join("\r\n");
            files.push(TestFile::new(
                "(listfile)",
                body.as_bytes(),
                Storage::Sectored(method::ZLIB),
            ));
        }

        let mut archive = vec![0u8; header_size as usize];
        let mut blocks = Vec::new();
        for file in &files {
            let (stored, flags) = encode(file, sector_size);
            let offset = archive.len() as u32;
            archive.extend_from_slice(&stored);
            let size = file.declared_size.unwrap_or(file.data.len() as u32);
            blocks.push((offset, stored.len() as u32, size, flags | BlockFlags::EXISTS));
        }

        // Hash table
        let size = self.hash_table_size as usize;
        let mut slots: Vec<Option<[u32; 4]>> = vec![None; size];
        for (index, file) in files.iter().enumerate() {
            let mut slot = hash_string(&file.name, HashType::TableOffset) as usize & (size - 1);
            while slots[slot].is_some() {
                slot = (slot + 1) & (size - 1);
            }
            slots[slot] = Some([
                hash_string(&file.name, HashType::NameA),
                hash_string(&file.name, HashType::NameB),
                u32::from(file.locale),
                index as u32,
            ]);
        }
        let mut hash_raw = Vec::with_capacity(size * 16);
        for (i, slot) in slots.iter().enumerate() {
            let words = match slot {
                Some(words) => *words,
                None if self.garbage_hash_slots => {
                    [0xDEAD_0000 | i as u32, 0xBEEF_0000 | i as u32, 0, 0]
                }
                None => [0xFFFF_FFFF; 4],
            };
            for word in words {
                hash_raw.extend_from_slice(&word.to_le_bytes());
            }
        }
        encrypt_bytes(&mut hash_raw, HASH_TABLE_KEY);
        let hash_offset = archive.len() as u32;
        archive.extend_from_slice(&hash_raw);

        // Block table
        let mut block_raw = Vec::with_capacity(blocks.len() * 16);
        for (offset, csize, usize_, flags) in &blocks {
            for word in [*offset, *csize, *usize_, *flags] {
                block_raw.extend_from_slice(&word.to_le_bytes());
            }
        }
        encrypt_bytes(&mut block_raw, BLOCK_TABLE_KEY);
        let block_offset = archive.len() as u32;
        archive.extend_from_slice(&block_raw);

        let hi_block_offset = if self.v2 {
            let offset = archive.len() as u64;
            archive.extend(std::iter::repeat_n(0u8, blocks.len() * 2));
            offset
        } else {
            0
        };

        // Header
        let mut header = Vec::with_capacity(header_size as usize);
        header.extend_from_slice(&MPQ_SIGNATURE.to_le_bytes());
        header.extend_from_slice(&header_size.to_le_bytes());
        header.extend_from_slice(&(archive.len() as u32).to_le_bytes());
        header.extend_from_slice(&u16::from(self.v2).to_le_bytes());
        header.extend_from_slice(&self.sector_shift.to_le_bytes());
        header.extend_from_slice(&hash_offset.to_le_bytes());
        header.extend_from_slice(&block_offset.to_le_bytes());
        header.extend_from_slice(&self.hash_table_size.to_le_bytes());
        header.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
        if self.v2 {
            header.extend_from_slice(&hi_block_offset.to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes());
        }
        archive[..header.len()].copy_from_slice(&header);

        let mut out = vec![0x90u8; self.prefix_len];
        if self.user_data {
            assert!(self.prefix_len >= 512, "user data needs a prefix");
            let mut user = Vec::new();
            user.extend_from_slice(&USER_DATA_SIGNATURE.to_le_bytes());
            user.extend_from_slice(&0x100u32.to_le_bytes());
            user.extend_from_slice(&(self.prefix_len as u32).to_le_bytes());
            user.extend_from_slice(&0x10u32.to_le_bytes());
            out[..user.len()].copy_from_slice(&user);
        }
        out.extend_from_slice(&archive);
        out
    }
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn lzma(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8];
    lzma_rs::lzma_compress(&mut Cursor::new(data), &mut out).unwrap();
    out
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Method byte plus payload, or the raw unit when compression does not help
fn compress_unit(method_id: u8, data: &[u8]) -> Vec<u8> {
    let payload = match method_id {
        method::ZLIB => zlib(data),
        method::LZMA => lzma(data),
        method::BZIP2 => bzip2(data),
        other => panic!("test writer cannot compress with 0x{other:02X}"),
    };
    if payload.len() + 1 >= data.len() {
        return data.to_vec();
    }
    let mut unit = vec![method_id];
    unit.extend(payload);
    unit
}

fn encode(file: &TestFile, sector_size: usize) -> (Vec<u8>, u32) {
    match &file.storage {
        Storage::Stored => (file.data.clone(), 0),
        Storage::SingleUnit(m) => (
            compress_unit(*m, &file.data),
            BlockFlags::COMPRESS | BlockFlags::SINGLE_UNIT,
        ),
        Storage::Sectored(m) => (
            sectored(*m, &file.data, sector_size, false),
            BlockFlags::COMPRESS,
        ),
        Storage::SectoredCrc(m) => (
            sectored(*m, &file.data, sector_size, true),
            BlockFlags::COMPRESS | BlockFlags::SECTOR_CRC,
        ),
        Storage::Prebuilt { stored, flags } => (stored.clone(), *flags),
    }
}

fn sectored(method_id: u8, data: &[u8], sector_size: usize, crc: bool) -> Vec<u8> {
    let units: Vec<Vec<u8>> = data
        .chunks(sector_size)
        .map(|chunk| compress_unit(method_id, chunk))
        .collect();

    let entries = units.len() + 1 + usize::from(crc);
    let mut offsets = vec![(entries * 4) as u32];
    for unit in &units {
        let last = offsets[offsets.len() - 1];
        offsets.push(last + unit.len() as u32);
    }
    if crc {
        let last = offsets[offsets.len() - 1];
        offsets.push(last + (units.len() * 4) as u32);
    }

    let mut out: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
    for unit in &units {
        out.extend_from_slice(unit);
    }
    if crc {
        out.extend(std::iter::repeat_n(0u8, units.len() * 4));
    }
    out
}

/// Deterministic bytes that zlib cannot shrink
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 8) as u8
        })
        .collect()
}

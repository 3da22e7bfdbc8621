//! Byte sources and the bounds-checked reader used by every parser
//!
//! An archive is read through a [`ByteSource`]: either a read-only memory map
//! of the archive file or an owned buffer. Both expose the whole content as a
//! slice, so reads are position independent and need no locking when several
//! threads share one archive.
//!
//! [`ByteReader`] is a cursor over such a slice. Every read is checked against
//! the end of the slice and reported as [`MpqError::InvalidFormat`] instead of
//! panicking, which is what a truncated or lying archive produces.

use crate::error::{MpqError, MpqResult};
use binrw::BinRead;
use binrw::io::Cursor;
use memmap2::{Mmap, MmapOptions};
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Random-access, read-only byte source backing an archive
pub trait ByteSource: Send + Sync + fmt::Debug {
    /// Complete content of the source
    fn as_slice(&self) -> &[u8];

    /// Length of the source in bytes
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// Whether the source is empty
    fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Borrow `len` bytes starting at `offset`
    fn read_at(&self, offset: u64, len: usize) -> MpqResult<&[u8]> {
        let data = self.as_slice();
        let start = usize::try_from(offset)
            .map_err(|_| MpqError::invalid_format(format!("offset {offset} out of range")))?;
        let end = start.checked_add(len).ok_or_else(|| {
            MpqError::invalid_format(format!("range {offset}+{len} overflows"))
        })?;
        data.get(start..end).ok_or_else(|| {
            MpqError::invalid_format(format!(
                "read of {len} bytes at offset {offset} exceeds source length {}",
                data.len()
            ))
        })
    }

    /// Cursor positioned at `offset`
    fn reader_at(&self, offset: u64) -> MpqResult<ByteReader<'_>> {
        let mut reader = ByteReader::new(self.as_slice());
        reader.seek(offset)?;
        Ok(reader)
    }
}

/// Memory-mapped archive file
pub struct MappedSource {
    mmap: Mmap,
}

impl MappedSource {
    /// Map a file read-only
    pub fn open(path: &Path) -> MpqResult<Self> {
        let file = File::open(path).map_err(|source| MpqError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        // The map is never written through and the archive is opened read-only
        #[allow(unsafe_code)]
        let mmap = unsafe {
            MmapOptions::new()
                .map(&file)
                .map_err(|source| MpqError::Open {
                    path: path.to_path_buf(),
                    source,
                })?
        };

        debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(Self { mmap })
    }
}

impl ByteSource for MappedSource {
    fn as_slice(&self) -> &[u8] {
        &self.mmap
    }
}

impl fmt::Debug for MappedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedSource")
            .field("len", &self.mmap.len())
            .finish()
    }
}

/// Archive content held in memory
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wrap an owned buffer
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Read a whole file into memory
    pub fn read_file(path: &Path) -> MpqResult<Self> {
        let data = std::fs::read(path).map_err(|source| MpqError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded {} ({} bytes)", path.display(), data.len());
        Ok(Self { data })
    }
}

impl ByteSource for MemorySource {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("len", &self.data.len())
            .finish()
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Bounds-checked little-endian cursor over a byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Cursor at the start of `data`
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position
    pub const fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Bytes left after the current position
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move to an absolute position; the end of the data is a valid target
    pub fn seek(&mut self, offset: u64) -> MpqResult<()> {
        match usize::try_from(offset) {
            Ok(pos) if pos <= self.data.len() => {
                self.pos = pos;
                Ok(())
            }
            _ => Err(MpqError::invalid_format(format!(
                "seek to {offset} beyond end of data ({} bytes)",
                self.data.len()
            ))),
        }
    }

    /// Advance without reading
    pub fn skip(&mut self, count: usize) -> MpqResult<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Borrow the next `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> MpqResult<&'a [u8]> {
        if count > self.remaining() {
            return Err(MpqError::invalid_format(format!(
                "unexpected end of data: wanted {count} bytes at {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Read a fixed-size byte array
    pub fn read_array<const N: usize>(&mut self) -> MpqResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> MpqResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a little-endian `u16`
    pub fn read_u16_le(&mut self) -> MpqResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a little-endian `u32`
    pub fn read_u32_le(&mut self) -> MpqResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian `u64`
    pub fn read_u64_le(&mut self) -> MpqResult<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read a NUL-padded string field of `len` bytes
    ///
    /// Content after the first NUL is ignored; invalid UTF-8 is replaced.
    pub fn read_fixed_str(&mut self, len: usize) -> MpqResult<String> {
        let raw = self.read_bytes(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Read `count` little-endian `u32` words
    pub fn read_u32_array(&mut self, count: usize) -> MpqResult<Vec<u32>> {
        let byte_len = count
            .checked_mul(4)
            .ok_or_else(|| MpqError::invalid_format("u32 array length overflows"))?;
        let raw = self.read_bytes(byte_len)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Parse a fixed-layout little-endian structure
    pub fn read_struct<T>(&mut self) -> MpqResult<T>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        let mut cursor = Cursor::new(&self.data[self.pos..]);
        let value = T::read_options(&mut cursor, binrw::Endian::Little, ())?;
        self.pos += cursor.position() as usize;
        Ok(value)
    }
}

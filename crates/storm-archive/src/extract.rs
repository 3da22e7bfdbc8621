//! File extraction pipeline
//!
//! Turns a resolved [`BlockEntry`] into the file's bytes. Files are stored
//! raw, as one compressed unit, or as a sequence of sectors preceded by a
//! sector offset table. Every offset taken from the archive is validated
//! before it is used to slice the source.

use crate::block_table::{BlockEntry, BlockFlags};
use crate::codec::{CodecRegistry, method};
use crate::error::{MpqError, MpqResult};
use crate::source::{ByteReader, ByteSource};
use tracing::{debug, trace};

/// Everything the pipeline needs from an open archive
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    /// Archive byte source
    pub source: &'a dyn ByteSource,
    /// Absolute offset of the archive start
    pub archive_offset: u64,
    /// Sector size in bytes
    pub sector_size: usize,
    /// Codecs for compressed units
    pub codecs: &'a CodecRegistry,
    /// Largest uncompressed size accepted
    pub max_file_size: u64,
}

/// A resolved file, valid for one read
#[derive(Debug, Clone, Copy)]
pub struct FileHandle<'a> {
    name: &'a str,
    block_index: u32,
    block: BlockEntry,
    ctx: ExtractContext<'a>,
}

impl<'a> FileHandle<'a> {
    /// Bind a resolved block to its archive
    pub const fn new(
        name: &'a str,
        block_index: u32,
        block: BlockEntry,
        ctx: ExtractContext<'a>,
    ) -> Self {
        Self {
            name,
            block_index,
            block,
            ctx,
        }
    }

    /// Name the file was resolved from
    pub const fn name(&self) -> &str {
        self.name
    }

    /// Block table index
    pub const fn block_index(&self) -> u32 {
        self.block_index
    }

    /// Block table entry
    pub const fn block(&self) -> &BlockEntry {
        &self.block
    }

    /// Size of the file once extracted
    pub const fn size(&self) -> u64 {
        self.block.uncompressed_size as u64
    }

    /// Extract the file content
    pub fn read(&self) -> MpqResult<Vec<u8>> {
        debug!(
            "Extracting '{}' (block {}, {} -> {} bytes, {})",
            self.name,
            self.block_index,
            self.block.compressed_size,
            self.block.uncompressed_size,
            self.block.flags
        );
        extract(&self.ctx, &self.block)
    }
}

/// Extract the content described by a block entry
pub fn extract(ctx: &ExtractContext<'_>, block: &BlockEntry) -> MpqResult<Vec<u8>> {
    let flags = block.flags;
    if flags.is_encrypted() {
        return Err(MpqError::unsupported("encrypted files"));
    }
    if flags.has(BlockFlags::PATCH_FILE) {
        return Err(MpqError::unsupported("patch files"));
    }
    if flags.has(BlockFlags::DELETE_MARKER) {
        return Err(MpqError::unsupported("deletion markers"));
    }

    let size = u64::from(block.uncompressed_size);
    if size > ctx.max_file_size {
        return Err(MpqError::unsupported(format!(
            "file of {size} bytes exceeds the {} byte limit",
            ctx.max_file_size
        )));
    }
    let size = block.uncompressed_size as usize;
    if size == 0 {
        return Ok(Vec::new());
    }

    let start = ctx
        .archive_offset
        .checked_add(block.file_offset)
        .ok_or_else(|| MpqError::invalid_format("file offset overflows"))?;
    let stored = ctx.source.read_at(start, block.compressed_size as usize)?;

    let data = if !flags.is_compressed() {
        if stored.len() < size {
            return Err(MpqError::SizeMismatch {
                expected: size as u64,
                actual: stored.len() as u64,
            });
        }
        stored[..size].to_vec()
    } else if flags.is_single_unit() {
        decompress_unit(ctx.codecs, flags, stored, size)?
    } else {
        read_sectors(ctx, flags, stored, size)?
    };

    if data.len() != size {
        return Err(MpqError::SizeMismatch {
            expected: size as u64,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}

/// Validated sector offset table
///
/// Holds `sector_count + 1` offsets relative to the start of the stored file;
/// sector `i` spans `offsets[i]..offsets[i + 1]`.
fn sector_offsets(stored: &[u8], sector_count: usize, has_crc: bool) -> MpqResult<Vec<usize>> {
    let entries = sector_count + 1 + usize::from(has_crc);
    let table_len = entries
        .checked_mul(4)
        .ok_or_else(|| MpqError::invalid_format("sector table size overflows"))?;

    let raw = ByteReader::new(stored).read_u32_array(entries)?;
    let offsets: Vec<usize> = raw[..=sector_count].iter().map(|&o| o as usize).collect();

    if offsets[0] != table_len {
        return Err(MpqError::invalid_format(format!(
            "sector table starts at {} instead of {table_len}",
            offsets[0]
        )));
    }
    if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(MpqError::invalid_format("sector offsets are not monotonic"));
    }
    if offsets[sector_count] > stored.len() {
        return Err(MpqError::invalid_format(format!(
            "sector data ends at {} past the stored size {}",
            offsets[sector_count],
            stored.len()
        )));
    }

    Ok(offsets)
}

fn read_sectors(
    ctx: &ExtractContext<'_>,
    flags: BlockFlags,
    stored: &[u8],
    size: usize,
) -> MpqResult<Vec<u8>> {
    let sector_count = size.div_ceil(ctx.sector_size);
    let offsets = sector_offsets(stored, sector_count, flags.has(BlockFlags::SECTOR_CRC))?;
    trace!("{sector_count} sectors of {} bytes", ctx.sector_size);

    let mut out = Vec::with_capacity(size);
    for (index, span) in offsets.windows(2).enumerate() {
        let expected = ctx.sector_size.min(size - index * ctx.sector_size);
        let unit = decompress_unit(ctx.codecs, flags, &stored[span[0]..span[1]], expected)
            .inspect_err(|e| trace!("Sector {index} failed: {e}"))?;
        out.extend_from_slice(&unit);
    }
    Ok(out)
}

/// Decode one sector or single-unit payload of `expected` bytes
fn decompress_unit(
    codecs: &CodecRegistry,
    flags: BlockFlags,
    unit: &[u8],
    expected: usize,
) -> MpqResult<Vec<u8>> {
    // Units that did not shrink are stored without a method byte
    if unit.len() == expected {
        return Ok(unit.to_vec());
    }

    let data = if flags.has(BlockFlags::IMPLODE) {
        codecs.decompress(method::PKWARE, unit, expected)?
    } else {
        let Some((&mask, payload)) = unit.split_first() else {
            return Err(MpqError::SizeMismatch {
                expected: expected as u64,
                actual: 0,
            });
        };
        codecs.decompress(mask, payload, expected)?
    };

    if data.len() != expected {
        return Err(MpqError::SizeMismatch {
            expected: expected as u64,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}

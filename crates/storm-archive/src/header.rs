//! Archive header location and validation
//!
//! An MPQ archive does not have to start at offset 0. Installers and maps
//! commonly prepend an executable stub or other data, so the header is found
//! by scanning the source on 512-byte boundaries for the `MPQ\x1A`
//! signature. A `MPQ\x1B` user data block at a boundary points to the real
//! header through its `header_offset` field.
//!
//! All table offsets in the header are relative to the archive start, the
//! offset where the header itself was found.

use crate::error::{MpqError, MpqResult};
use crate::source::{ByteReader, ByteSource};
use binrw::BinRead;
use tracing::{debug, warn};

/// Archive header signature (`MPQ\x1A`)
pub const MPQ_SIGNATURE: u32 = 0x1A51_504D;

/// User data header signature (`MPQ\x1B`)
pub const USER_DATA_SIGNATURE: u32 = 0x1B51_504D;

/// Alignment of candidate header positions
pub const HEADER_SEARCH_STRIDE: u64 = 0x200;

/// Largest accepted sector size shift (512 << 20 = 512 MiB sectors)
pub const MAX_SECTOR_SIZE_SHIFT: u16 = 20;

/// Archive format versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum FormatVersion {
    /// Original format, 32-byte header
    V1 = 0,
    /// The Burning Crusade, 44-byte header with 64-bit offsets
    V2 = 1,
    /// Cataclysm beta, 68-byte header with HET/BET offsets
    V3 = 2,
    /// Cataclysm and later, 208-byte header with MD5 checksums
    V4 = 3,
}

impl FormatVersion {
    /// Parse the raw header field
    pub const fn from_raw(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::V1),
            1 => Some(Self::V2),
            2 => Some(Self::V3),
            3 => Some(Self::V4),
            _ => None,
        }
    }

    /// Smallest header size valid for this version
    pub const fn min_header_size(self) -> u32 {
        match self {
            Self::V1 => 0x20,
            Self::V2 => 0x2C,
            Self::V3 => 0x44,
            Self::V4 => 0xD0,
        }
    }

    /// Raw header field value
    pub const fn as_raw(self) -> u16 {
        self as u16
    }
}

/// Fields shared by every header version
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
struct BaseHeader {
    signature: u32,
    header_size: u32,
    archive_size: u32,
    format_version: u16,
    sector_size_shift: u16,
    hash_table_offset: u32,
    block_table_offset: u32,
    hash_table_entries: u32,
    block_table_entries: u32,
}

/// v2 extension: high offset bits and the hi-block table
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
struct HeaderExtV2 {
    hi_block_table_offset: u64,
    hash_table_offset_hi: u16,
    block_table_offset_hi: u16,
}

/// v3 extension: 64-bit archive size and HET/BET tables
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
struct HeaderExtV3 {
    archive_size_64: u64,
    bet_table_offset: u64,
    het_table_offset: u64,
}

/// User data block preceding an archive
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct UserDataHeader {
    /// Always [`USER_DATA_SIGNATURE`]
    pub signature: u32,
    /// Maximum size of the user data
    pub user_data_size: u32,
    /// Offset of the archive header from the start of this block
    pub header_offset: u32,
    /// Size of the user data header
    pub user_data_header_size: u32,
}

/// Parsed archive header with table offsets widened to 64 bits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpqHeader {
    /// Declared header size in bytes
    pub header_size: u32,
    /// Archive size (32-bit field)
    pub archive_size: u32,
    /// Format version
    pub format_version: FormatVersion,
    /// Sector size is `512 << sector_size_shift`
    pub sector_size_shift: u16,
    /// Hash table offset relative to the archive start
    pub hash_table_offset: u64,
    /// Block table offset relative to the archive start
    pub block_table_offset: u64,
    /// Number of hash table entries
    pub hash_table_entries: u32,
    /// Number of block table entries
    pub block_table_entries: u32,
    /// Hi-block table offset (v2+, 0 when absent)
    pub hi_block_table_offset: u64,
    /// 64-bit archive size (v3+, 0 when absent)
    pub archive_size_64: u64,
    /// BET table offset (v3+, 0 when absent)
    pub bet_table_offset: u64,
    /// HET table offset (v3+, 0 when absent)
    pub het_table_offset: u64,
}

impl MpqHeader {
    /// Parse a header at the reader position
    ///
    /// Only structural checks happen here; [`MpqHeader::validate`] checks the
    /// header against the source it came from.
    pub fn parse(reader: &mut ByteReader<'_>) -> MpqResult<Self> {
        let base: BaseHeader = reader.read_struct()?;
        if base.signature != MPQ_SIGNATURE {
            return Err(MpqError::invalid_format(format!(
                "bad header signature 0x{:08X}",
                base.signature
            )));
        }

        let format_version = FormatVersion::from_raw(base.format_version)
            .ok_or(MpqError::UnsupportedVersion(base.format_version))?;

        if base.header_size < format_version.min_header_size() {
            return Err(MpqError::invalid_format(format!(
                "header size {} too small for format {:?} (minimum {})",
                base.header_size,
                format_version,
                format_version.min_header_size()
            )));
        }

        let mut header = Self {
            header_size: base.header_size,
            archive_size: base.archive_size,
            format_version,
            sector_size_shift: base.sector_size_shift,
            hash_table_offset: u64::from(base.hash_table_offset),
            block_table_offset: u64::from(base.block_table_offset),
            hash_table_entries: base.hash_table_entries,
            block_table_entries: base.block_table_entries,
            hi_block_table_offset: 0,
            archive_size_64: 0,
            bet_table_offset: 0,
            het_table_offset: 0,
        };

        if format_version >= FormatVersion::V2 {
            let ext: HeaderExtV2 = reader.read_struct()?;
            header.hi_block_table_offset = ext.hi_block_table_offset;
            header.hash_table_offset |= u64::from(ext.hash_table_offset_hi) << 32;
            header.block_table_offset |= u64::from(ext.block_table_offset_hi) << 32;
        }

        if format_version >= FormatVersion::V3 {
            let ext: HeaderExtV3 = reader.read_struct()?;
            header.archive_size_64 = ext.archive_size_64;
            header.bet_table_offset = ext.bet_table_offset;
            header.het_table_offset = ext.het_table_offset;
        }

        Ok(header)
    }

    /// Check the header against the source it was found in
    pub fn validate(&self, archive_offset: u64, source_len: u64) -> MpqResult<()> {
        if self.sector_size_shift > MAX_SECTOR_SIZE_SHIFT {
            return Err(MpqError::invalid_format(format!(
                "sector size shift {} exceeds {}",
                self.sector_size_shift, MAX_SECTOR_SIZE_SHIFT
            )));
        }

        let header_end = archive_offset + u64::from(self.header_size);
        if header_end > source_len {
            return Err(MpqError::invalid_format(format!(
                "header of {} bytes at offset {archive_offset} runs past end of source ({source_len} bytes)",
                self.header_size
            )));
        }

        let archive_end = archive_offset.saturating_add(self.effective_archive_size());
        if archive_end > source_len {
            return Err(MpqError::invalid_format(format!(
                "declared archive size {} at offset {archive_offset} exceeds source length {source_len}",
                self.effective_archive_size()
            )));
        }

        if self.hash_table_entries == 0 {
            if self.het_table_offset != 0 {
                return Err(MpqError::unsupported(
                    "archives indexed only by HET/BET tables",
                ));
            }
            return Err(MpqError::invalid_format("archive has an empty hash table"));
        }

        Ok(())
    }

    /// Sector size in bytes
    pub const fn sector_size(&self) -> usize {
        512usize << self.sector_size_shift
    }

    /// Archive size, preferring the 64-bit field when present
    pub const fn effective_archive_size(&self) -> u64 {
        if self.archive_size_64 != 0 {
            self.archive_size_64
        } else {
            self.archive_size as u64
        }
    }
}

/// Find and validate the archive header
///
/// Returns the absolute offset of the archive start together with the parsed
/// header. Scanning stops at `max_scan_offset` or the end of the source.
/// A candidate header that fails to parse or validate is skipped; if no later
/// candidate is valid, the first such failure is returned.
pub fn locate(source: &dyn ByteSource, max_scan_offset: u64) -> MpqResult<(u64, MpqHeader)> {
    let source_len = source.len();
    let limit = source_len.min(max_scan_offset);
    let mut offset = 0u64;
    let mut first_rejected: Option<MpqError> = None;

    while offset < limit && offset + 4 <= source_len {
        let candidate = match read_signature(source, offset)? {
            MPQ_SIGNATURE => header_at(source, offset).map(|header| Some((offset, header))),
            USER_DATA_SIGNATURE => follow_user_data(source, offset),
            _ => Ok(None),
        };

        match candidate {
            Ok(Some((found, header))) => {
                debug!(
                    "Found MPQ header at offset {found}: version {:?}, {} hash / {} block entries",
                    header.format_version, header.hash_table_entries, header.block_table_entries
                );
                return Ok((found, header));
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping archive header candidate at offset {offset}: {e}");
                first_rejected.get_or_insert(e);
            }
        }
        offset += HEADER_SEARCH_STRIDE;
    }

    Err(first_rejected.unwrap_or(MpqError::SignatureNotFound {
        scanned: offset.min(source_len),
    }))
}

fn read_signature(source: &dyn ByteSource, offset: u64) -> MpqResult<u32> {
    source.reader_at(offset)?.read_u32_le()
}

fn header_at(source: &dyn ByteSource, offset: u64) -> MpqResult<MpqHeader> {
    let mut reader = source.reader_at(offset)?;
    let header = MpqHeader::parse(&mut reader)?;
    header.validate(offset, source.len())?;
    Ok(header)
}

fn follow_user_data(
    source: &dyn ByteSource,
    offset: u64,
) -> MpqResult<Option<(u64, MpqHeader)>> {
    let user_data: UserDataHeader = match source.reader_at(offset)?.read_struct() {
        Ok(header) => header,
        Err(e) => {
            warn!("Truncated user data header at offset {offset}: {e}");
            return Ok(None);
        }
    };

    let target = offset + u64::from(user_data.header_offset);
    if target + 4 > source.len() || read_signature(source, target)? != MPQ_SIGNATURE {
        warn!(
            "User data header at offset {offset} points to {target}, which holds no archive header"
        );
        return Ok(None);
    }

    let header = header_at(source, target)?;
    debug!(
        "User data block at {offset} ({} bytes of user data) points to the header at {target}",
        user_data.user_data_size
    );
    Ok(Some((target, header)))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::MemorySource;

    fn v1_header(archive_size: u32, hash_entries: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MPQ_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&0x20u32.to_le_bytes());
        out.extend_from_slice(&archive_size.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&0x20u32.to_le_bytes());
        out.extend_from_slice(&0x120u32.to_le_bytes());
        out.extend_from_slice(&hash_entries.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out
    }

    fn padded(mut data: Vec<u8>, len: usize) -> Vec<u8> {
        data.resize(len, 0);
        data
    }

    #[test]
    fn test_locate_at_start() {
        let source = MemorySource::new(padded(v1_header(0x200, 16), 0x200));
        let (offset, header) = locate(&source, u64::MAX).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(header.format_version, FormatVersion::V1);
        assert_eq!(header.sector_size(), 4096);
        assert_eq!(header.hash_table_entries, 16);
        assert_eq!(header.block_table_offset, 0x120);
    }

    #[test]
    fn test_locate_after_prefix() {
        let mut data = vec![0xCCu8; 0x400];
        data.extend(padded(v1_header(0x200, 16), 0x200));
        let source = MemorySource::new(data);
        let (offset, _) = locate(&source, u64::MAX).unwrap();
        assert_eq!(offset, 0x400);
    }

    #[test]
    fn test_signature_off_stride_is_ignored() {
        let mut data = vec![0u8; 0x10];
        data.extend(padded(v1_header(0x200, 16), 0x200));
        data.resize(0x800, 0);
        let source = MemorySource::new(data);
        let err = locate(&source, u64::MAX).unwrap_err();
        assert!(matches!(err, MpqError::SignatureNotFound { scanned: 0x800 }));
    }

    #[test]
    fn test_scan_limit() {
        let mut data = vec![0u8; 0x1000];
        data.extend(padded(v1_header(0x200, 16), 0x200));
        let source = MemorySource::new(data);
        assert!(locate(&source, 0x800).is_err());
        assert!(locate(&source, 0x2000).is_ok());
    }

    #[test]
    fn test_broken_candidate_does_not_hide_later_header() {
        // A stub carrying a stray signature with a bogus version at 0x200
        let mut stray = v1_header(0x200, 16);
        stray[12..14].copy_from_slice(&9u16.to_le_bytes());
        let mut data = vec![0u8; 0x200];
        data.extend(padded(stray, 0x200));
        data.extend(padded(v1_header(0x200, 16), 0x200));
        let source = MemorySource::new(data);

        let (offset, header) = locate(&source, u64::MAX).unwrap();
        assert_eq!(offset, 0x400);
        assert_eq!(header.format_version, FormatVersion::V1);
    }

    #[test]
    fn test_first_rejection_reported_when_nothing_valid() {
        let mut stray = v1_header(0x200, 16);
        stray[12..14].copy_from_slice(&9u16.to_le_bytes());
        let mut data = padded(stray, 0x200);
        data.extend(padded(v1_header(0x10_0000, 16), 0x200));
        let source = MemorySource::new(data);

        let err = locate(&source, u64::MAX).unwrap_err();
        assert!(matches!(err, MpqError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_user_data_redirect() {
        let mut data = Vec::new();
        data.extend_from_slice(&USER_DATA_SIGNATURE.to_le_bytes());
        data.extend_from_slice(&0x100u32.to_le_bytes());
        data.extend_from_slice(&0x200u32.to_le_bytes());
        data.extend_from_slice(&0x10u32.to_le_bytes());
        data.resize(0x200, 0);
        data.extend(padded(v1_header(0x200, 16), 0x200));
        let source = MemorySource::new(data);

        let (offset, _) = locate(&source, u64::MAX).unwrap();
        assert_eq!(offset, 0x200);
    }

    #[test]
    fn test_declared_size_exceeds_source() {
        let source = MemorySource::new(padded(v1_header(0x10_0000, 16), 0x200));
        let err = locate(&source, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = v1_header(0x200, 16);
        data[12..14].copy_from_slice(&7u16.to_le_bytes());
        let source = MemorySource::new(padded(data, 0x200));
        let err = locate(&source, u64::MAX).unwrap_err();
        assert!(matches!(err, MpqError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_header_size_too_small_for_version() {
        let mut data = v1_header(0x200, 16);
        // Claim v2 with a v1-sized header
        data[12..14].copy_from_slice(&1u16.to_le_bytes());
        let source = MemorySource::new(padded(data, 0x200));
        let err = locate(&source, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_v2_high_offset_bits() {
        let mut data = v1_header(0x200, 16);
        data[4..8].copy_from_slice(&0x2Cu32.to_le_bytes());
        data[12..14].copy_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        let mut reader = ByteReader::new(&data);
        let header = MpqHeader::parse(&mut reader).unwrap();
        assert_eq!(header.format_version, FormatVersion::V2);
        assert_eq!(header.hash_table_offset, 0x1_0000_0020);
        assert_eq!(header.block_table_offset, 0x120);
    }

    #[test]
    fn test_empty_hash_table_rejected() {
        let source = MemorySource::new(padded(v1_header(0x200, 0), 0x200));
        let err = locate(&source, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_not_an_archive() {
        let source = MemorySource::new(b"just some text".to_vec());
        let err = locate(&source, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);

        let empty = MemorySource::new(Vec::new());
        assert!(locate(&empty, u64::MAX).is_err());
    }
}

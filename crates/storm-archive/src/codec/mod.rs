//! Compression codecs and the registry that dispatches on method ids
//!
//! Every compressed unit of a `COMPRESS` file starts with one method byte.
//! The byte is either a single method id or a bit mask of several methods
//! that were applied one after another. Decompression undoes them in a fixed
//! order (see [`DECOMPRESSION_ORDER`]).
//!
//! zlib, PKWARE implode, bzip2, LZMA and sparse are built in. Huffman and
//! ADPCM are reported as unsupported unless a codec is registered for them
//! with [`CodecRegistry::register`].

mod bzip2;
mod lzma;
mod pkware;
mod sparse;
mod zlib;

pub use self::bzip2::Bzip2Codec;
pub use lzma::LzmaCodec;
pub use pkware::PkwareCodec;
pub use sparse::SparseCodec;
pub use zlib::ZlibCodec;

use crate::error::{MpqError, MpqResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Compression method ids as stored in the unit prefix byte
pub mod method {
    /// Huffman coding (WAVE files)
    pub const HUFFMAN: u8 = 0x01;
    /// zlib / deflate
    pub const ZLIB: u8 = 0x02;
    /// PKWARE Data Compression Library implode
    pub const PKWARE: u8 = 0x08;
    /// bzip2
    pub const BZIP2: u8 = 0x10;
    /// LZMA; never combined with other methods
    pub const LZMA: u8 = 0x12;
    /// Sparse zero-run encoding
    pub const SPARSE: u8 = 0x20;
    /// IMA ADPCM, mono
    pub const ADPCM_MONO: u8 = 0x40;
    /// IMA ADPCM, stereo
    pub const ADPCM_STEREO: u8 = 0x80;

    /// Human readable name of a single method id
    pub const fn name(id: u8) -> &'static str {
        match id {
            HUFFMAN => "huffman",
            ZLIB => "zlib",
            PKWARE => "pkware",
            BZIP2 => "bzip2",
            LZMA => "lzma",
            SPARSE => "sparse",
            ADPCM_MONO => "adpcm-mono",
            ADPCM_STEREO => "adpcm-stereo",
            _ => "unknown",
        }
    }
}

/// Order in which the methods of a combined mask are undone
pub const DECOMPRESSION_ORDER: [u8; 7] = [
    method::BZIP2,
    method::PKWARE,
    method::ZLIB,
    method::SPARSE,
    method::HUFFMAN,
    method::ADPCM_STEREO,
    method::ADPCM_MONO,
];

/// A decompressor for one method id
pub trait Codec: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str {
        "custom"
    }

    /// Decompress `input`, producing at most `expected_len` bytes
    ///
    /// The caller checks the produced length against `expected_len`, so a
    /// codec may return less (or one byte more) to signal a mismatch.
    fn decompress(&self, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>>;
}

impl<F> Codec for F
where
    F: Fn(&[u8], usize) -> MpqResult<Vec<u8>> + Send + Sync,
{
    fn decompress(&self, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
        self(input, expected_len)
    }
}

/// Method id to codec mapping
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<u8, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Registry without any codecs
    pub fn new() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    /// Registry with the built-in codecs
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(method::ZLIB, Arc::new(ZlibCodec));
        registry.register(method::PKWARE, Arc::new(PkwareCodec));
        registry.register(method::BZIP2, Arc::new(Bzip2Codec));
        registry.register(method::LZMA, Arc::new(LzmaCodec));
        registry.register(method::SPARSE, Arc::new(SparseCodec));
        registry
    }

    /// Add or replace the codec for a method id
    pub fn register(&mut self, id: u8, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        self.codecs.insert(id, codec)
    }

    /// Remove the codec for a method id
    pub fn unregister(&mut self, id: u8) -> Option<Arc<dyn Codec>> {
        self.codecs.remove(&id)
    }

    /// Codec registered for a method id
    pub fn get(&self, id: u8) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(&id)
    }

    /// Whether a codec is registered for a method id
    pub fn contains(&self, id: u8) -> bool {
        self.codecs.contains_key(&id)
    }

    /// Registered method ids in ascending order
    pub fn methods(&self) -> Vec<u8> {
        self.codecs.keys().copied().collect()
    }

    /// Undo the compression described by a method byte
    ///
    /// A mask registered as a whole is handed to that codec directly.
    /// Otherwise every bit of the mask is undone in [`DECOMPRESSION_ORDER`],
    /// each stage bounded by `expected_len`.
    pub fn decompress(&self, mask: u8, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
        if let Some(codec) = self.codecs.get(&mask) {
            trace!(
                "Decompressing {} bytes with {} (0x{mask:02X})",
                input.len(),
                codec.name()
            );
            return codec.decompress(input, expected_len);
        }

        if mask == method::LZMA {
            return Err(MpqError::UnsupportedCompression(mask));
        }

        let stages = self.plan(mask)?;
        let mut data: Option<Vec<u8>> = None;
        for (id, codec) in stages {
            let stage_input = data.as_deref().unwrap_or(input);
            trace!(
                "Decompressing {} bytes with {} (stage 0x{id:02X} of mask 0x{mask:02X})",
                stage_input.len(),
                codec.name()
            );
            data = Some(codec.decompress(stage_input, expected_len)?);
        }

        Ok(data.unwrap_or_else(|| input.to_vec()))
    }

    fn plan(&self, mask: u8) -> MpqResult<Vec<(u8, &Arc<dyn Codec>)>> {
        let known = DECOMPRESSION_ORDER.iter().fold(0u8, |acc, id| acc | id);
        if mask & !known != 0 {
            return Err(MpqError::UnsupportedCompression(mask));
        }

        DECOMPRESSION_ORDER
            .iter()
            .filter(|&&id| mask & id != 0)
            .map(|&id| {
                self.codecs
                    .get(&id)
                    .map(|codec| (id, codec))
                    .ok_or(MpqError::UnsupportedCompression(id))
            })
            .collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.codecs
                    .iter()
                    .map(|(id, codec)| (format!("0x{id:02X}"), codec.name())),
            )
            .finish()
    }
}

/// Read a whole decoder, stopping one byte past `limit`
///
/// Returning `limit + 1` bytes lets the caller report the overrun as a size
/// mismatch without buffering an unbounded stream.
pub(crate) fn read_bounded<R: std::io::Read>(
    reader: R,
    limit: usize,
    method: u8,
) -> MpqResult<Vec<u8>> {
    use std::io::Read;

    let mut out = Vec::with_capacity(limit);
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| MpqError::decompression(method, e))?;
    Ok(out)
}

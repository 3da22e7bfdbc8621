//! zlib (deflate) codec

use super::{Codec, method, read_bounded};
use crate::error::MpqResult;
use flate2::read::ZlibDecoder;

/// zlib stream decompression via `flate2`
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
        read_bounded(ZlibDecoder::new(input), expected_len, method::ZLIB)
    }
}

//! bzip2 codec

use super::{Codec, method, read_bounded};
use crate::error::MpqResult;
use bzip2::read::BzDecoder;

/// bzip2 stream decompression via the `bzip2` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
        read_bounded(BzDecoder::new(input), expected_len, method::BZIP2)
    }
}

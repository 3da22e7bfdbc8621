//! LZMA codec
//!
//! Units compressed with LZMA carry a one byte filter marker followed by a
//! standard `.lzma` stream: five property bytes, the 64-bit unpacked size and
//! the compressed data. Only unfiltered streams (marker 0) are accepted.

use super::{Codec, method};
use crate::error::{MpqError, MpqResult};
use std::io::{self, Write};

const FILTER_NONE: u8 = 0;

/// Minimum unit length: filter byte, properties and unpacked size
const HEADER_LEN: usize = 1 + 5 + 8;

/// LZMA decompression via `lzma-rs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LzmaCodec;

impl Codec for LzmaCodec {
    fn name(&self) -> &'static str {
        "lzma"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
        if input.len() < HEADER_LEN {
            return Err(MpqError::decompression(
                method::LZMA,
                format!("unit of {} bytes is shorter than the LZMA header", input.len()),
            ));
        }
        if input[0] != FILTER_NONE {
            return Err(MpqError::unsupported(format!(
                "LZMA filter 0x{:02X}",
                input[0]
            )));
        }

        let mut stream = &input[1..];
        let mut out = LimitedWriter::new(expected_len);
        match lzma_rs::lzma_decompress(&mut stream, &mut out) {
            Ok(()) => Ok(out.into_inner()),
            // The writer stopped the decoder one byte past the bound
            Err(_) if out.overran => Ok(out.into_inner()),
            Err(e) => Err(MpqError::decompression(method::LZMA, e)),
        }
    }
}

/// Writer that keeps at most `limit + 1` bytes and fails past that
struct LimitedWriter {
    buf: Vec<u8>,
    limit: usize,
    overran: bool,
}

impl LimitedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
            overran: false,
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Write for LimitedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = (self.limit + 1).saturating_sub(self.buf.len());
        if room == 0 && !data.is_empty() {
            self.overran = true;
            return Err(io::Error::other(format!(
                "output exceeds expected {} bytes",
                self.limit
            )));
        }
        let taken = data.len().min(room);
        self.buf.extend_from_slice(&data[..taken]);
        Ok(taken)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

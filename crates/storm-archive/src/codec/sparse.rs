//! Sparse (zero-run) codec
//!
//! The stream starts with the big-endian decompressed size. Each following
//! control byte either copies `(b & 0x7F) + 1` literal bytes (high bit set)
//! or emits `(b & 0x7F) + 3` zero bytes (high bit clear).

use super::{Codec, method};
use crate::error::{MpqError, MpqResult};

/// Sparse decompression, implemented in-crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCodec;

impl Codec for SparseCodec {
    fn name(&self) -> &'static str {
        "sparse"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
        let Some((size, mut rest)) = input.split_first_chunk::<4>() else {
            return Err(MpqError::decompression(method::SPARSE, "missing size prefix"));
        };

        // An oversized declaration decodes one byte past the bound, which the
        // caller reports as a size mismatch
        let declared = (u32::from_be_bytes(*size) as usize).min(expected_len.saturating_add(1));

        let mut out = Vec::with_capacity(declared);
        while let Some((&control, tail)) = rest.split_first() {
            rest = tail;
            let left = declared - out.len();

            if control & 0x80 != 0 {
                let count = (usize::from(control & 0x7F) + 1).min(left);
                let Some((literal, tail)) = rest.split_at_checked(count) else {
                    return Err(MpqError::decompression(
                        method::SPARSE,
                        "literal run past end of input",
                    ));
                };
                out.extend_from_slice(literal);
                rest = tail;
            } else {
                let count = (usize::from(control & 0x7F) + 3).min(left);
                out.resize(out.len() + count, 0);
            }

            if out.len() == declared {
                break;
            }
        }

        Ok(out)
    }
}

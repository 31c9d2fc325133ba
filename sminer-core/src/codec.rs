//! SCALE helpers
//!
//! Fixed-shape values are encoded and decoded with `parity_scale_codec`
//! directly. The registry-driven decoders also need to read raw slices and
//! bare sequence lengths, which live here.

use parity_scale_codec::{Compact, Decode, DecodeAll};

use crate::error::{ChainError, Result};

/// Decode a `T` that must span all of `bytes`
pub fn decode_exact<T: Decode>(bytes: &[u8]) -> Result<T> {
    Ok(T::decode_all(&mut &bytes[..])?)
}

/// Read a compact integer that must fit in `u32`
pub fn read_compact_u32(input: &mut &[u8]) -> Result<u32> {
    Ok(Compact::<u32>::decode(input)?.0)
}

/// Read a sequence length prefix
///
/// The length is not checked against the remaining input: elements of a
/// zero-sized type occupy no bytes at all.
pub fn read_len(input: &mut &[u8]) -> Result<usize> {
    Ok(read_compact_u32(input)? as usize)
}

/// Split `len` raw bytes off the front of `input`
pub fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if len > input.len() {
        return Err(ChainError::Codec(format!(
            "unexpected end of input: need {} bytes, have {}",
            len,
            input.len()
        )));
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(head)
}

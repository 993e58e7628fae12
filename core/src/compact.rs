// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Offset-tracking reads of SCALE compact integers.
//!
//! The codec crate knows how to decode a compact from a `&mut &[u8]`; the
//! decoder pipeline works with `(bytes, offset)` pairs instead, so these
//! helpers wrap the codec and report how far the cursor moved. The two low
//! bits of the first byte select the mode: `00` single byte, `01` two
//! bytes, `10` four bytes, `11` big integer with `(first >> 2) + 4`
//! following bytes.

use crate::DecodeError;
use codec::{Compact, Decode, Encode};
use primitive_types::U256;

/// Read a compact `u32` at `offset`, returning the value and the offset of
/// the first byte after it.
pub fn compact_u32(bytes: &[u8], offset: usize) -> Result<(u32, usize), DecodeError> {
    let mut input = bytes.get(offset..).ok_or(DecodeError::Eof(offset))?;
    if input.is_empty() {
        return Err(DecodeError::Eof(offset));
    }
    let before = input.len();
    let value = Compact::<u32>::decode(&mut input).map_err(|_| DecodeError::Compact(offset))?;
    Ok((value.0, offset + (before - input.len())))
}

/// Read a compact `u64` at `offset`.
pub fn compact_u64(bytes: &[u8], offset: usize) -> Result<(u64, usize), DecodeError> {
    let mut input = bytes.get(offset..).ok_or(DecodeError::Eof(offset))?;
    if input.is_empty() {
        return Err(DecodeError::Eof(offset));
    }
    let before = input.len();
    let value = Compact::<u64>::decode(&mut input).map_err(|_| DecodeError::Compact(offset))?;
    Ok((value.0, offset + (before - input.len())))
}

/// Read a compact `u128` at `offset`.
pub fn compact_u128(bytes: &[u8], offset: usize) -> Result<(u128, usize), DecodeError> {
    let mut input = bytes.get(offset..).ok_or(DecodeError::Eof(offset))?;
    if input.is_empty() {
        return Err(DecodeError::Eof(offset));
    }
    let before = input.len();
    let value = Compact::<u128>::decode(&mut input).map_err(|_| DecodeError::Compact(offset))?;
    Ok((value.0, offset + (before - input.len())))
}

/// Read a compact integer of any width at `offset`. Values wider than 16
/// bytes (up to the 32 the big-int mode can carry for `U256`) are handled
/// here where the codec's fixed-width `Compact` impls give up.
pub fn compact_u256(bytes: &[u8], offset: usize) -> Result<(U256, usize), DecodeError> {
    let first = *bytes.get(offset).ok_or(DecodeError::Eof(offset))?;
    if first & 0b11 != 0b11 {
        let (value, next) = compact_u32(bytes, offset)?;
        return Ok((U256::from(value), next));
    }
    let len = ((first >> 2) as usize) + 4;
    if len > 32 {
        return Err(DecodeError::Compact(offset));
    }
    let start = offset + 1;
    let raw = bytes
        .get(start..start + len)
        .ok_or(DecodeError::Eof(start))?;
    Ok((U256::from_little_endian(raw), start + len))
}

/// Total encoded length of the compact integer starting at `offset`.
pub fn compact_len(bytes: &[u8], offset: usize) -> Result<usize, DecodeError> {
    let first = *bytes.get(offset).ok_or(DecodeError::Eof(offset))?;
    let len = match first & 0b11 {
        0b00 => 1,
        0b01 => 2,
        0b10 => 4,
        _ => 1 + ((first >> 2) as usize) + 4,
    };
    if offset + len > bytes.len() {
        return Err(DecodeError::Eof(offset));
    }
    Ok(len)
}

/// Encode a `u32` in compact form.
pub fn encode_compact_u32(value: u32) -> Vec<u8> {
    Compact(value).encode()
}

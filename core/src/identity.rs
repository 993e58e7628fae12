// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The identity pallet's `Data` enum.
//!
//! `Data` is not a regular SCALE variant: the tag byte folds the length of
//! the `Raw` payload into the discriminant, so it needs a hand-written
//! decode. Tag 0 is none, tags 1..=33 carry `tag - 1` raw bytes, and tags
//! 34..=37 carry a 32-byte hash.

use crate::{DecodeError, Value};

/// Decode one identity `Data` value at `offset`, returning the decoded
/// value and the offset just after it. Raw payloads come back as a string
/// when they are valid UTF-8 and as hex otherwise.
pub fn decode_data(bytes: &[u8], offset: usize) -> Result<(Value, usize), DecodeError> {
    let tag = *bytes.get(offset).ok_or(DecodeError::Eof(offset))?;
    let at = offset + 1;
    match tag {
        0 => Ok((Value::Null, at)),
        1..=33 => {
            let len = (tag - 1) as usize;
            let raw = bytes.get(at..at + len).ok_or(DecodeError::Eof(at))?;
            let value = match core::str::from_utf8(raw) {
                Ok(s) => Value::Str(s.to_owned()),
                Err(_) => Value::hex(raw),
            };
            Ok((value, at + len))
        }
        34..=37 => {
            let raw = bytes.get(at..at + 32).ok_or(DecodeError::Eof(at))?;
            let name = match tag {
                34 => "BlakeTwo256",
                35 => "Sha256",
                36 => "Keccak256",
                _ => "ShaThree256",
            };
            Ok((Value::entry(name, Value::hex(raw)), at + 32))
        }
        _ => Err(DecodeError::VariantNotFound { ty: 0, index: tag }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn none_is_a_single_byte() {
        assert_eq!(decode_data(&[0], 0).unwrap(), (Value::Null, 1));
    }

    #[test]
    fn raw_utf8_becomes_a_string() {
        // Tag 6 = Raw with five bytes.
        let mut bytes = vec![6];
        bytes.extend_from_slice(b"alice");
        assert_eq!(
            decode_data(&bytes, 0).unwrap(),
            (Value::Str("alice".into()), 6)
        );
    }

    #[test]
    fn raw_non_utf8_becomes_hex() {
        let bytes = [3, 0xff, 0xfe];
        assert_eq!(
            decode_data(&bytes, 0).unwrap(),
            (Value::Hex("0xfffe".into()), 3)
        );
    }

    #[test]
    fn hash_variants_carry_32_bytes() {
        let mut bytes = vec![34];
        bytes.extend_from_slice(&[0x11; 32]);
        let (value, next) = decode_data(&bytes, 0).unwrap();
        assert_eq!(next, 33);
        assert_eq!(value, Value::entry("BlakeTwo256", Value::hex([0x11; 32])));
    }

    #[test]
    fn out_of_range_tag_errors() {
        assert!(decode_data(&[38], 0).is_err());
        // Truncated raw payload.
        assert!(decode_data(&[10, 0x01], 0).is_err());
    }
}

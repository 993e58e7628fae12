// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Hex helpers. Inputs may or may not carry a `0x` prefix; everything we
//! hand out is `0x`-prefixed lowercase.

use crate::DecodeError;

/// Decode a hex string into bytes. A leading `0x`/`0X` is accepted but not
/// required, and the digits themselves are case-insensitive.
pub fn from_hex(s: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    Ok(hex::decode(digits)?)
}

/// Encode bytes as a `0x`-prefixed lowercase hex string.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes.as_ref()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrips_with_and_without_prefix() {
        for input in ["0xdeadbeef", "deadbeef", "0xDEADBEEF", "DEADBEEF"] {
            let bytes = from_hex(input).unwrap();
            assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]);
            assert_eq!(to_hex(&bytes), "0xdeadbeef");
        }
    }

    #[test]
    fn empty_is_empty() {
        assert_eq!(from_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(from_hex("0x").unwrap(), Vec::<u8>::new());
        assert_eq!(to_hex([]), "0x");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(from_hex("0xzz").is_err());
        assert!(from_hex("abc").is_err()); // odd length
    }
}

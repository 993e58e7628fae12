// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The hashers used to build storage keys and extrinsic hashes.

/// Blake2b with a 256-bit digest; used for extrinsic hashes.
pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    sp_crypto_hashing::blake2_256(data)
}

/// Blake2b with a 128-bit digest.
pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    sp_crypto_hashing::blake2_128(data)
}

/// `blake2_128(key) ++ key`, the transparent map hasher.
pub fn blake2_128_concat(key: &[u8]) -> Vec<u8> {
    let mut out = blake2_128(key).to_vec();
    out.extend_from_slice(key);
    out
}

/// Two concatenated XXH64 runs over the input; used for pallet and entry
/// name prefixes.
pub fn twox_128(data: &[u8]) -> [u8; 16] {
    sp_crypto_hashing::twox_128(data)
}

/// `twox_64(key) ++ key`.
pub fn twox_64_concat(key: &[u8]) -> Vec<u8> {
    let mut out = sp_crypto_hashing::twox_64(key).to_vec();
    out.extend_from_slice(key);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::to_hex;

    #[test]
    fn twox_128_known_prefixes() {
        // Well-known storage prefixes, checkable against any Substrate chain.
        assert_eq!(
            to_hex(twox_128(b"System")),
            "0x26aa394eea5630e07c48ae0c9558cef7"
        );
        assert_eq!(
            to_hex(twox_128(b"Events")),
            "0x80d41e5e16056765bc8461851072c9d7"
        );
    }

    #[test]
    fn concat_hashers_append_the_key() {
        let key = b"balances";
        assert!(twox_64_concat(key).ends_with(key));
        assert!(blake2_128_concat(key).ends_with(key));
        assert_eq!(twox_64_concat(key).len(), 8 + key.len());
        assert_eq!(blake2_128_concat(key).len(), 16 + key.len());
    }

    #[test]
    fn blake2_digest_lengths() {
        assert_eq!(blake2_256(b"x").len(), 32);
        assert_eq!(blake2_128(b"x").len(), 16);
    }
}

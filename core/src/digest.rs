// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Decoding of the digest logs carried in a block header.

use crate::{DecodeError, compact, from_hex, to_hex};
use serde::Serialize;

/// A decoded digest log item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DigestLog {
    /// Which kind of log this is.
    #[serde(rename = "type")]
    pub kind: DigestKind,
    /// The 4-byte consensus engine id as ASCII, for the kinds that carry
    /// one (`aura`, `BABE`, `FRNK`, ...).
    pub engine: Option<String>,
    /// The log payload as hex, if any.
    pub data: Option<String>,
}

/// The digest log kinds the wire format distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DigestKind {
    /// An opaque log the runtime put there.
    Other,
    /// A consensus message for an engine.
    Consensus,
    /// A seal produced by a block author.
    Seal,
    /// Pre-runtime digest (authorship information lives here).
    PreRuntime,
    /// Marker that the runtime environment was updated.
    RuntimeEnvironmentUpdated,
}

/// Decode one digest log from its hex wire form.
pub fn decode_digest_log(log_hex: &str) -> Result<DigestLog, DecodeError> {
    let bytes = from_hex(log_hex)?;
    let tag = *bytes.first().ok_or(DecodeError::Eof(0))?;
    match tag {
        0x00 => {
            let data = read_payload(&bytes, 1)?;
            Ok(DigestLog {
                kind: DigestKind::Other,
                engine: None,
                data: Some(data),
            })
        }
        0x04 | 0x05 | 0x06 => {
            let kind = match tag {
                0x04 => DigestKind::Consensus,
                0x05 => DigestKind::Seal,
                _ => DigestKind::PreRuntime,
            };
            let raw_engine = bytes.get(1..5).ok_or(DecodeError::Eof(1))?;
            let engine = match core::str::from_utf8(raw_engine) {
                Ok(s) => s.to_owned(),
                Err(_) => to_hex(raw_engine),
            };
            let data = read_payload(&bytes, 5)?;
            Ok(DigestLog {
                kind,
                engine: Some(engine),
                data: Some(data),
            })
        }
        0x08 => Ok(DigestLog {
            kind: DigestKind::RuntimeEnvironmentUpdated,
            engine: None,
            data: None,
        }),
        other => Err(DecodeError::VariantNotFound {
            ty: 0,
            index: other,
        }),
    }
}

// A SCALE `Vec<u8>`: compact length then that many bytes.
fn read_payload(bytes: &[u8], offset: usize) -> Result<String, DecodeError> {
    let (len, at) = compact::compact_u32(bytes, offset)?;
    let raw = bytes
        .get(at..at + len as usize)
        .ok_or(DecodeError::Eof(at))?;
    Ok(to_hex(raw))
}

#[cfg(test)]
mod test {
    use super::*;
    use codec::Encode;

    #[test]
    fn pre_runtime_log() {
        // 0x06 ++ "aura" ++ Vec<u8> payload.
        let mut bytes = vec![0x06];
        bytes.extend_from_slice(b"aura");
        bytes.extend(vec![0x01u8, 0x02].encode());
        let log = decode_digest_log(&to_hex(&bytes)).unwrap();
        assert_eq!(log.kind, DigestKind::PreRuntime);
        assert_eq!(log.engine.as_deref(), Some("aura"));
        assert_eq!(log.data.as_deref(), Some("0x0102"));
    }

    #[test]
    fn seal_and_consensus_logs() {
        for (tag, kind) in [(0x04u8, DigestKind::Consensus), (0x05, DigestKind::Seal)] {
            let mut bytes = vec![tag];
            bytes.extend_from_slice(b"FRNK");
            bytes.extend(vec![0xaau8; 3].encode());
            let log = decode_digest_log(&to_hex(&bytes)).unwrap();
            assert_eq!(log.kind, kind);
            assert_eq!(log.engine.as_deref(), Some("FRNK"));
            assert_eq!(log.data.as_deref(), Some("0xaaaaaa"));
        }
    }

    #[test]
    fn runtime_environment_updated_has_no_payload() {
        let log = decode_digest_log("0x08").unwrap();
        assert_eq!(log.kind, DigestKind::RuntimeEnvironmentUpdated);
        assert_eq!(log.engine, None);
        assert_eq!(log.data, None);
    }

    #[test]
    fn other_log_is_a_bare_payload() {
        let mut bytes = vec![0x00];
        bytes.extend(vec![0x99u8].encode());
        let log = decode_digest_log(&to_hex(&bytes)).unwrap();
        assert_eq!(log.kind, DigestKind::Other);
        assert_eq!(log.engine, None);
        assert_eq!(log.data.as_deref(), Some("0x99"));
    }

    #[test]
    fn unknown_tag_errors() {
        assert!(decode_digest_log("0x07").is_err());
        assert!(decode_digest_log("0x").is_err());
    }
}

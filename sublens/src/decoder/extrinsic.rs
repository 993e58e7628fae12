// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Wire-level decoding of one extrinsic.
//!
//! The signed-extension extras are positional: one unknown identifier with
//! a non-zero body invalidates every byte after it. Known identifiers are
//! allow-listed below; anything else is assumed zero-width and logged
//! loudly, and the trailing-bytes check catches the drift if the
//! assumption was wrong.

use crate::decoder::DecodedExtrinsic;
use codec::Decode;
use sublens_core::{Era, Value, compact, from_hex, hashers::blake2_256, registry, to_hex};
use sublens_metadata::Metadata;

/// Decode one raw extrinsic. Never fails: anything undecodable comes back
/// as the `Unknown.unknown` sentinel with the raw hex attached, so block
/// ingestion is never blocked on a single bad extrinsic.
pub fn decode_extrinsic(index: u32, extrinsic_hex: &str, metadata: &Metadata) -> DecodedExtrinsic {
    let mut partial = Partial::default();
    match decode_inner(index, extrinsic_hex, metadata, &mut partial) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(index, error = %e, "undecodable extrinsic; storing sentinel");
            DecodedExtrinsic {
                index,
                tx_hash: partial.tx_hash(extrinsic_hex),
                signer: partial.signer,
                module: "Unknown".into(),
                call: "unknown".into(),
                args: Value::entry("raw", Value::Hex(normalize_hex(extrinsic_hex))),
                nonce: partial.nonce,
                tip: partial.tip,
                success: true,
                fee: None,
            }
        }
    }
}

/// If the extrinsic is the `Timestamp.set` inherent, its single argument
/// is the block's Unix-millisecond timestamp.
pub fn timestamp_of_set_call(extrinsic: &DecodedExtrinsic) -> Option<u64> {
    extrinsic
        .args
        .get("now")
        .or_else(|| extrinsic.args.at(0))
        .and_then(Value::as_u64)
}

// What we managed to pull out before a decode failure; kept so the
// sentinel record still carries the signer when the call args are the
// unparseable part.
#[derive(Default)]
struct Partial {
    signer: Option<String>,
    nonce: Option<u64>,
    tip: Option<String>,
}

impl Partial {
    fn tx_hash(&self, extrinsic_hex: &str) -> Option<String> {
        self.signer.as_ref()?;
        let bytes = from_hex(extrinsic_hex).ok()?;
        Some(to_hex(blake2_256(&bytes)))
    }
}

fn normalize_hex(s: &str) -> String {
    match from_hex(s) {
        Ok(bytes) => to_hex(bytes),
        Err(_) => s.to_owned(),
    }
}

#[derive(Debug, thiserror::Error)]
enum ExtrinsicError {
    #[error("scale: {0}")]
    Scale(#[from] sublens_core::DecodeError),
    #[error("bad era: {0}")]
    Era(codec::Error),
    #[error("unknown pallet index {0}")]
    UnknownPallet(u8),
    #[error("unknown call index {1} in pallet index {0}")]
    UnknownCall(u8, u8),
    #[error("unknown {0} tag {1:#x}")]
    UnknownTag(&'static str, u8),
    #[error("{0} trailing bytes after the call arguments")]
    TrailingBytes(usize),
}

fn decode_inner(
    index: u32,
    extrinsic_hex: &str,
    metadata: &Metadata,
    partial: &mut Partial,
) -> Result<DecodedExtrinsic, ExtrinsicError> {
    let bytes = from_hex(extrinsic_hex)?;

    // Leading compact length; the body simply follows it.
    let (_, mut at) = compact::compact_u32(&bytes, 0)?;

    let version = take(&bytes, at, 1)?[0];
    at += 1;
    let signed = version & 0b1000_0000 != 0;

    if signed {
        at = read_address(&bytes, at, partial)?;
        at = read_signature(&bytes, at)?;
        at = read_signed_extensions(&bytes, at, metadata, partial)?;
    }

    let pallet_index = take(&bytes, at, 1)?[0];
    let call_index = take(&bytes, at + 1, 1)?[0];
    at += 2;

    let pallet = metadata
        .pallet_by_index(pallet_index)
        .ok_or(ExtrinsicError::UnknownPallet(pallet_index))?;
    let variant = pallet
        .call_variant_by_index(call_index)
        .ok_or(ExtrinsicError::UnknownCall(pallet_index, call_index))?;

    let mut args = Vec::with_capacity(variant.fields.len());
    for (n, field) in variant.fields.iter().enumerate() {
        let (value, next) = registry::read(&bytes, at, field.ty, metadata.types())?;
        let name = field
            .name
            .clone()
            .unwrap_or_else(|| format!("param{n}"));
        args.push((name, value));
        at = next;
    }
    if at != bytes.len() {
        return Err(ExtrinsicError::TrailingBytes(bytes.len() - at));
    }

    let tx_hash = partial
        .signer
        .is_some()
        .then(|| to_hex(blake2_256(&bytes)));

    Ok(DecodedExtrinsic {
        index,
        tx_hash,
        signer: partial.signer.clone(),
        module: pallet.name().to_owned(),
        call: variant.name.clone(),
        args: Value::Map(args),
        nonce: partial.nonce,
        tip: partial.tip.clone(),
        success: true,
        fee: None,
    })
}

// MultiAddress: only Id and Address20 recover a signer; the other
// variants are skipped over.
fn read_address(bytes: &[u8], at: usize, partial: &mut Partial) -> Result<usize, ExtrinsicError> {
    let tag = take(bytes, at, 1)?[0];
    let at = at + 1;
    match tag {
        // Id(AccountId32)
        0x00 => {
            partial.signer = Some(to_hex(take(bytes, at, 32)?));
            Ok(at + 32)
        }
        // Index(AccountIndex); no signer to recover.
        0x01 => Ok(at + checked_len(bytes, at, 4)?),
        // Raw(Vec<u8>)
        0x02 => {
            let (len, next) = compact::compact_u32(bytes, at)?;
            Ok(next + checked_len(bytes, next, len as usize)?)
        }
        // Address32
        0x03 => Ok(at + checked_len(bytes, at, 32)?),
        // Address20 (an EVM-style address)
        0x04 => {
            partial.signer = Some(to_hex(take(bytes, at, 20)?));
            Ok(at + 20)
        }
        other => Err(ExtrinsicError::UnknownTag("MultiAddress", other)),
    }
}

fn read_signature(bytes: &[u8], at: usize) -> Result<usize, ExtrinsicError> {
    let tag = take(bytes, at, 1)?[0];
    let at = at + 1;
    match tag {
        // Ed25519 | Sr25519
        0x00 | 0x01 => Ok(at + checked_len(bytes, at, 64)?),
        // Ecdsa: 65 bytes, recovery byte included.
        0x02 => Ok(at + checked_len(bytes, at, 65)?),
        other => Err(ExtrinsicError::UnknownTag("MultiSignature", other)),
    }
}

fn read_signed_extensions(
    bytes: &[u8],
    mut at: usize,
    metadata: &Metadata,
    partial: &mut Partial,
) -> Result<usize, ExtrinsicError> {
    for identifier in metadata.signed_extensions() {
        match identifier.as_str() {
            // No bytes in the extrinsic body; they only sign additional data.
            "CheckNonZeroSender" | "CheckSpecVersion" | "CheckTxVersion" | "CheckGenesis"
            | "CheckWeight" | "PrevalidateAttests" => {}
            "CheckMortality" => {
                let mut input = take(bytes, at, Era::encoded_len(take(bytes, at, 1)?[0]))?;
                let before = input.len();
                Era::decode(&mut input).map_err(ExtrinsicError::Era)?;
                at += before - input.len();
            }
            "CheckNonce" => {
                let (nonce, next) = compact::compact_u64(bytes, at)?;
                partial.nonce = Some(nonce);
                at = next;
            }
            "ChargeTransactionPayment" => {
                let (tip, next) = compact::compact_u256(bytes, at)?;
                partial.tip = Some(tip.to_string());
                at = next;
            }
            "ChargeAssetTxPayment" => {
                let (tip, next) = compact::compact_u256(bytes, at)?;
                partial.tip = Some(tip.to_string());
                at = next;
                let has_asset = take(bytes, at, 1)?[0];
                at += 1;
                if has_asset == 0x01 {
                    let (_, next) = compact::compact_u256(bytes, at)?;
                    at = next;
                }
            }
            // One mode byte; the hash itself lives in additionalSigned.
            "CheckMetadataHash" => {
                at += checked_len(bytes, at, 1)?;
            }
            unknown => {
                // Positional parsing: if this extension actually carries
                // bytes, everything after this point is misread and the
                // trailing-bytes check will reject the extrinsic.
                tracing::warn!(
                    extension = unknown,
                    "unknown signed extension; assuming it adds no bytes to the extrinsic body"
                );
            }
        }
    }
    Ok(at)
}

fn take<'a>(
    bytes: &'a [u8],
    at: usize,
    n: usize,
) -> Result<&'a [u8], sublens_core::DecodeError> {
    bytes
        .get(at..at + n)
        .ok_or(sublens_core::DecodeError::Eof(at))
}

fn checked_len(
    bytes: &[u8],
    at: usize,
    n: usize,
) -> Result<usize, sublens_core::DecodeError> {
    take(bytes, at, n)?;
    Ok(n)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::test_fixture::{fixture_metadata, pallet};
    use codec::{Compact, Encode};
    use pretty_assertions::assert_eq;

    fn signed_body(extras: &[u8], call: &[u8]) -> String {
        let mut body = vec![0x84];
        body.push(0x00); // MultiAddress::Id
        body.extend_from_slice(&[0xab; 32]);
        body.push(0x01); // MultiSignature::Sr25519
        body.extend_from_slice(&[0xcd; 64]);
        body.extend_from_slice(extras);
        body.extend_from_slice(call);
        let mut full = Compact(body.len() as u32).encode();
        full.extend_from_slice(&body);
        to_hex(full)
    }

    #[test]
    fn signed_transfer_decodes_fully() {
        let metadata = fixture_metadata();

        // Extras in declared order: era, nonce, tip, metadata-hash mode.
        let extras = [0x00, 0x14, 0x00, 0x00];
        // Balances::transfer_keep_alive { dest: Id(0xab..), value: 12345 }
        let mut call = vec![pallet::BALANCES, 1, 0x00];
        call.extend_from_slice(&[0xab; 32]);
        call.extend(Compact(12_345u128).encode());

        let decoded = decode_extrinsic(0, &signed_body(&extras, &call), &metadata);

        assert_eq!(decoded.module, "Balances");
        assert_eq!(decoded.call, "transfer_keep_alive");
        assert_eq!(decoded.signer.as_deref(), Some(to_hex([0xab; 32]).as_str()));
        assert_eq!(decoded.nonce, Some(5));
        assert_eq!(decoded.tip.as_deref(), Some("0"));
        assert_eq!(
            decoded.args,
            Value::Map(vec![
                ("dest".into(), Value::entry("Id", Value::hex([0xab; 32]))),
                ("value".into(), Value::BigNum("12345".into())),
            ])
        );
        let tx_hash = decoded.tx_hash.expect("signed extrinsics have a hash");
        assert!(tx_hash.starts_with("0x") && tx_hash.len() == 66);
        assert!(decoded.success);
        assert_eq!(decoded.fee, None);
    }

    #[test]
    fn unsigned_timestamp_set_yields_a_timestamp() {
        let metadata = fixture_metadata();

        let mut body = vec![0x04, pallet::TIMESTAMP, 0];
        body.extend(Compact(1_700_000_000_123u64).encode());
        let mut full = Compact(body.len() as u32).encode();
        full.extend_from_slice(&body);

        let decoded = decode_extrinsic(0, &to_hex(full), &metadata);
        assert_eq!(decoded.module, "Timestamp");
        assert_eq!(decoded.call, "set");
        assert_eq!(decoded.signer, None);
        assert_eq!(decoded.tx_hash, None);
        assert_eq!(timestamp_of_set_call(&decoded), Some(1_700_000_000_123));
    }

    #[test]
    fn mortal_era_is_two_bytes() {
        let metadata = fixture_metadata();
        let era = Era::Mortal {
            period: 64,
            phase: 49,
        }
        .encode();
        let mut extras = era;
        extras.extend_from_slice(&[0x14, 0x00, 0x00]);
        let mut call = vec![pallet::BALANCES, 1, 0x00];
        call.extend_from_slice(&[0xee; 32]);
        call.extend(Compact(1u128).encode());

        let decoded = decode_extrinsic(0, &signed_body(&extras, &call), &metadata);
        assert_eq!(decoded.call, "transfer_keep_alive");
        assert_eq!(decoded.nonce, Some(5));
    }

    #[test]
    fn garbage_becomes_the_sentinel_record() {
        let metadata = fixture_metadata();
        let decoded = decode_extrinsic(7, "0xff00112233", &metadata);
        assert_eq!(decoded.module, "Unknown");
        assert_eq!(decoded.call, "unknown");
        assert_eq!(decoded.index, 7);
        assert_eq!(
            decoded.args.get("raw").and_then(Value::as_str),
            Some("0xff00112233")
        );
        // Optimistic success is kept on the sentinel too.
        assert!(decoded.success);
    }

    #[test]
    fn unknown_call_index_keeps_the_recovered_signer() {
        let metadata = fixture_metadata();
        let extras = [0x00, 0x14, 0x00, 0x00];
        // Call index 99 does not exist in Balances.
        let mut call = vec![pallet::BALANCES, 99];
        call.extend_from_slice(&[0u8; 4]);

        let decoded = decode_extrinsic(0, &signed_body(&extras, &call), &metadata);
        assert_eq!(decoded.module, "Unknown");
        assert_eq!(decoded.signer.as_deref(), Some(to_hex([0xab; 32]).as_str()));
        assert!(decoded.tx_hash.is_some());
        assert_eq!(decoded.nonce, Some(5));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let metadata = fixture_metadata();
        let mut body = vec![0x04, pallet::TIMESTAMP, 0];
        body.extend(Compact(5u64).encode());
        body.push(0xff); // one byte too many
        let mut full = Compact(body.len() as u32).encode();
        full.extend_from_slice(&body);

        let decoded = decode_extrinsic(0, &to_hex(full), &metadata);
        assert_eq!(decoded.module, "Unknown");
    }
}

// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Decoding of whole blocks: extrinsics, events, digest logs, and the
//! facts correlated between them.

pub mod events;
pub mod extrinsic;

#[cfg(test)]
pub mod test_fixture;

use sublens_core::Value;
use sublens_core::digest::{DigestLog, decode_digest_log};
use sublens_metadata::Metadata;
use sublens_rpcs::methods::{Hash, Header};

/// Whether a block sits on the finalized chain or is the current best tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    /// On the best chain; may still be reorged away.
    Best,
    /// Irreversible.
    Finalized,
}

impl BlockStatus {
    /// The status as stored in the blocks table.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Best => "best",
            BlockStatus::Finalized => "finalized",
        }
    }
}

/// The phase of block execution an event was emitted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Applying the extrinsic at this index.
    ApplyExtrinsic(u32),
    /// Finalizing the block.
    Finalization,
    /// Initializing the block.
    Initialization,
}

impl Phase {
    /// The owning extrinsic index, when applicable.
    pub fn extrinsic_index(&self) -> Option<u32> {
        match self {
            Phase::ApplyExtrinsic(at) => Some(*at),
            _ => None,
        }
    }

    /// The phase label as stored in the events table.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::ApplyExtrinsic(_) => "ApplyExtrinsic",
            Phase::Finalization => "Finalization",
            Phase::Initialization => "Initialization",
        }
    }
}

/// One fully decoded extrinsic.
#[derive(Clone, Debug)]
pub struct DecodedExtrinsic {
    /// Position within the block.
    pub index: u32,
    /// Blake2-256 of the raw bytes; only meaningful when signed.
    pub tx_hash: Option<String>,
    /// The signer's public key (or EVM address) as hex, if signed.
    pub signer: Option<String>,
    /// Pallet name, or `Unknown` for the decode-failure sentinel.
    pub module: String,
    /// Call name, or `unknown` for the decode-failure sentinel.
    pub call: String,
    /// Decoded call arguments keyed by field name.
    pub args: Value,
    /// The nonce captured from the signed extensions.
    pub nonce: Option<u64>,
    /// The tip captured from the signed extensions, as a decimal string.
    pub tip: Option<String>,
    /// Optimistically true; rewritten by event correlation.
    pub success: bool,
    /// Actual fee paid, as a decimal string; filled by event correlation.
    pub fee: Option<String>,
}

/// One decoded event.
#[derive(Clone, Debug)]
pub struct DecodedEvent {
    /// Position within the block's event vector.
    pub index: u32,
    /// Pallet name.
    pub module: String,
    /// Event variant name.
    pub event: String,
    /// Decoded event fields.
    pub data: Value,
    /// Which execution phase emitted it.
    pub phase: Phase,
}

/// A block with everything the processor needs to persist it.
#[derive(Clone, Debug)]
pub struct DecodedBlock {
    /// Block height.
    pub height: u32,
    /// Own hash, `0x` hex.
    pub hash: String,
    /// Parent hash, `0x` hex.
    pub parent_hash: String,
    /// State trie root.
    pub state_root: String,
    /// Extrinsics trie root.
    pub extrinsics_root: String,
    /// Runtime spec version in effect at this block.
    pub spec_version: u32,
    /// The `Timestamp.set` inherent's value, Unix milliseconds.
    pub timestamp_ms: Option<u64>,
    /// Decoded digest logs.
    pub digest_logs: Vec<DigestLog>,
    /// Decoded extrinsics, in block order.
    pub extrinsics: Vec<DecodedExtrinsic>,
    /// Decoded events, in emission order.
    pub events: Vec<DecodedEvent>,
}

/// Assemble a [`DecodedBlock`] from a fetched header, body and raw events
/// storage value. Individual extrinsics that fail to decode become
/// `Unknown.unknown` sentinels; the block itself always decodes.
pub fn decode_block(
    header: &Header,
    hash: Hash,
    extrinsic_hexes: &[String],
    events_bytes: Option<&[u8]>,
    metadata: &Metadata,
    spec_version: u32,
) -> DecodedBlock {
    let height = header.number;

    let mut extrinsics: Vec<DecodedExtrinsic> = extrinsic_hexes
        .iter()
        .enumerate()
        .map(|(at, hex)| extrinsic::decode_extrinsic(at as u32, hex, metadata))
        .collect();

    let events = match events_bytes {
        Some(bytes) => events::decode_events(bytes, metadata),
        None => Vec::new(),
    };

    enrich(&mut extrinsics, &events);

    let timestamp_ms = extrinsics
        .iter()
        .find(|xt| xt.module == "Timestamp" && xt.call == "set")
        .and_then(extrinsic::timestamp_of_set_call);

    let digest_logs = header
        .digest
        .logs
        .iter()
        .filter_map(|log| match decode_digest_log(log) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(height, error = %e, "undecodable digest log; dropping");
                None
            }
        })
        .collect();

    DecodedBlock {
        height,
        hash: format!("{hash:#x}"),
        parent_hash: format!("{:#x}", header.parent_hash),
        state_root: format!("{:#x}", header.state_root),
        extrinsics_root: format!("{:#x}", header.extrinsics_root),
        spec_version,
        timestamp_ms,
        digest_logs,
        extrinsics,
        events,
    }
}

/// Correlate events back onto their extrinsics: `System.ExtrinsicFailed`
/// flips success off, `TransactionPayment.TransactionFeePaid` fills in the
/// actual fee. Idempotent: applying it twice changes nothing.
pub fn enrich(extrinsics: &mut [DecodedExtrinsic], events: &[DecodedEvent]) {
    for event in events {
        let Some(at) = event.phase.extrinsic_index() else {
            continue;
        };
        let Some(extrinsic) = extrinsics.get_mut(at as usize) else {
            tracing::warn!(
                event_index = event.index,
                extrinsic_index = at,
                "event points at an extrinsic index outside the block"
            );
            continue;
        };
        if event.module == "System" && event.event == "ExtrinsicFailed" {
            extrinsic.success = false;
        } else if event.module == "TransactionPayment" && event.event == "TransactionFeePaid" {
            extrinsic.fee = event
                .data
                .get("actual_fee")
                .and_then(Value::as_decimal)
                .or_else(|| event.data.at(1).and_then(Value::as_decimal));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn extrinsic(index: u32) -> DecodedExtrinsic {
        DecodedExtrinsic {
            index,
            tx_hash: None,
            signer: None,
            module: "Balances".into(),
            call: "transfer_keep_alive".into(),
            args: Value::Map(vec![]),
            nonce: None,
            tip: None,
            success: true,
            fee: None,
        }
    }

    fn event(index: u32, module: &str, name: &str, phase: Phase, data: Value) -> DecodedEvent {
        DecodedEvent {
            index,
            module: module.into(),
            event: name.into(),
            data,
            phase,
        }
    }

    #[test]
    fn enrichment_correlates_success_and_fee() {
        let mut extrinsics = vec![extrinsic(0), extrinsic(1)];
        let events = vec![
            event(
                0,
                "System",
                "ExtrinsicSuccess",
                Phase::ApplyExtrinsic(0),
                Value::Map(vec![]),
            ),
            event(
                1,
                "TransactionPayment",
                "TransactionFeePaid",
                Phase::ApplyExtrinsic(1),
                Value::Map(vec![
                    ("who".into(), Value::Hex("0xaa".into())),
                    ("actual_fee".into(), Value::BigNum("12345".into())),
                    ("tip".into(), Value::U64(0)),
                ]),
            ),
            event(
                2,
                "System",
                "ExtrinsicFailed",
                Phase::ApplyExtrinsic(1),
                Value::Map(vec![]),
            ),
        ];

        enrich(&mut extrinsics, &events);
        assert!(extrinsics[0].success);
        assert_eq!(extrinsics[0].fee, None);
        assert!(!extrinsics[1].success);
        assert_eq!(extrinsics[1].fee.as_deref(), Some("12345"));

        // Idempotence: a second pass is a no-op.
        let snapshot: Vec<_> = extrinsics
            .iter()
            .map(|x| (x.success, x.fee.clone()))
            .collect();
        enrich(&mut extrinsics, &events);
        let again: Vec<_> = extrinsics
            .iter()
            .map(|x| (x.success, x.fee.clone()))
            .collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn decode_block_assembles_everything() {
        use crate::decoder::test_fixture::{fixture_metadata, pallet};
        use codec::{Compact, Encode};
        use sublens_core::to_hex;
        use sublens_rpcs::methods::Hash;

        let metadata = fixture_metadata();

        // An unsigned Timestamp.set and a signed Balances transfer.
        let mut timestamp_body = vec![0x04, pallet::TIMESTAMP, 0];
        timestamp_body.extend(Compact(1_700_000_000_000u64).encode());
        let mut timestamp_xt = Compact(timestamp_body.len() as u32).encode();
        timestamp_xt.extend(timestamp_body);

        let mut transfer_body = vec![0x84, 0x00];
        transfer_body.extend_from_slice(&[0xab; 32]);
        transfer_body.push(0x01);
        transfer_body.extend_from_slice(&[0xcd; 64]);
        transfer_body.extend_from_slice(&[0x00, 0x14, 0x00, 0x00]);
        transfer_body.extend_from_slice(&[pallet::BALANCES, 1, 0x00]);
        transfer_body.extend_from_slice(&[0xee; 32]);
        transfer_body.extend(Compact(999u128).encode());
        let mut transfer_xt = Compact(transfer_body.len() as u32).encode();
        transfer_xt.extend(transfer_body);

        // Events: success for 0, fee paid + success for 1.
        let mut fee_fields = [0xab; 32].to_vec();
        fee_fields.extend_from_slice(&777u128.to_le_bytes());
        fee_fields.extend_from_slice(&0u128.to_le_bytes());
        let mut events_bytes = Compact(3u32).encode();
        for (phase_at, pallet_index, event_index, fields) in [
            (0u32, pallet::SYSTEM, 0u8, Vec::new()),
            (1, pallet::TRANSACTION_PAYMENT, 0, fee_fields),
            (1, pallet::SYSTEM, 0, Vec::new()),
        ] {
            events_bytes.push(0x00);
            events_bytes.extend_from_slice(&phase_at.to_le_bytes());
            events_bytes.push(pallet_index);
            events_bytes.push(event_index);
            events_bytes.extend_from_slice(&fields);
            events_bytes.extend(Compact(0u32).encode());
        }

        let header: sublens_rpcs::methods::Header = serde_json::from_value(serde_json::json!({
            "parentHash": format!("{:#x}", Hash::repeat_byte(1)),
            "number": "0x64",
            "stateRoot": format!("{:#x}", Hash::repeat_byte(2)),
            "extrinsicsRoot": format!("{:#x}", Hash::repeat_byte(3)),
            "digest": { "logs": ["0x08"] }
        }))
        .unwrap();

        let block = decode_block(
            &header,
            Hash::repeat_byte(9),
            &[to_hex(&timestamp_xt), to_hex(&transfer_xt)],
            Some(&events_bytes),
            &metadata,
            1050,
        );

        assert_eq!(block.height, 100);
        assert_eq!(block.hash, format!("{:#x}", Hash::repeat_byte(9)));
        assert_eq!(block.spec_version, 1050);
        assert_eq!(block.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(block.digest_logs.len(), 1);
        assert_eq!(block.extrinsics.len(), 2);
        assert_eq!(block.events.len(), 3);

        assert_eq!(block.extrinsics[0].module, "Timestamp");
        assert_eq!(block.extrinsics[0].signer, None);
        assert_eq!(block.extrinsics[1].module, "Balances");
        assert_eq!(block.extrinsics[1].call, "transfer_keep_alive");
        assert_eq!(
            block.extrinsics[1].signer.as_deref(),
            Some(to_hex([0xab; 32]).as_str())
        );
        // Event correlation: the transfer paid a fee and succeeded.
        assert!(block.extrinsics[1].success);
        assert_eq!(block.extrinsics[1].fee.as_deref(), Some("777"));
        assert_eq!(block.extrinsics[0].fee, None);
    }

    #[test]
    fn enrichment_ignores_non_apply_phases_and_bad_indices() {
        let mut extrinsics = vec![extrinsic(0)];
        let events = vec![
            event(
                0,
                "System",
                "ExtrinsicFailed",
                Phase::Finalization,
                Value::Map(vec![]),
            ),
            event(
                1,
                "System",
                "ExtrinsicFailed",
                Phase::ApplyExtrinsic(9),
                Value::Map(vec![]),
            ),
        ];
        enrich(&mut extrinsics, &events);
        assert!(extrinsics[0].success);
    }
}

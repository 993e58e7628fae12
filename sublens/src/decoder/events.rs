// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Decoding of the `System.Events` storage value: a SCALE
//! `Vec<EventRecord>` of phase, event and topics.

use crate::decoder::{DecodedEvent, Phase};
use sublens_core::{Value, compact, hashers::twox_128, registry};
use sublens_metadata::Metadata;

/// The storage key the events vector lives under:
/// `twox128("System") ++ twox128("Events")`.
pub fn events_storage_key() -> Vec<u8> {
    let mut key = twox_128(b"System").to_vec();
    key.extend_from_slice(&twox_128(b"Events"));
    key
}

#[derive(Debug, thiserror::Error)]
enum EventsError {
    #[error("scale: {0}")]
    Scale(#[from] sublens_core::DecodeError),
    #[error("unknown phase tag {0:#x}")]
    BadPhase(u8),
    #[error("unknown pallet index {0}")]
    UnknownPallet(u8),
    #[error("unknown event index {1} in pallet {0}")]
    UnknownEvent(u8, u8),
}

/// Decode as many events as the bytes allow.
///
/// The records are positional, so an unknown variant in the middle leaves
/// every later offset unknowable; in that case the events decoded so far
/// are returned and the rest of the vector is dropped with a warning.
pub fn decode_events(bytes: &[u8], metadata: &Metadata) -> Vec<DecodedEvent> {
    let mut events = Vec::new();
    if let Err(e) = decode_into(bytes, metadata, &mut events) {
        tracing::warn!(
            decoded = events.len(),
            error = %e,
            "event decode aborted mid-stream; later events are dropped"
        );
    }
    events
}

fn decode_into(
    bytes: &[u8],
    metadata: &Metadata,
    events: &mut Vec<DecodedEvent>,
) -> Result<(), EventsError> {
    let (count, mut at) = compact::compact_u32(bytes, 0)?;
    for index in 0..count {
        let tag = next_byte(bytes, &mut at)?;
        let phase = match tag {
            0x00 => {
                let raw = bytes
                    .get(at..at + 4)
                    .ok_or(sublens_core::DecodeError::Eof(at))?;
                at += 4;
                Phase::ApplyExtrinsic(u32::from_le_bytes(raw.try_into().expect("4 bytes taken")))
            }
            0x01 => Phase::Finalization,
            0x02 => Phase::Initialization,
            other => return Err(EventsError::BadPhase(other)),
        };

        let pallet_index = next_byte(bytes, &mut at)?;
        let event_index = next_byte(bytes, &mut at)?;
        let pallet = metadata
            .pallet_by_index(pallet_index)
            .ok_or(EventsError::UnknownPallet(pallet_index))?;
        let variant = pallet
            .event_variant_by_index(event_index)
            .ok_or(EventsError::UnknownEvent(pallet_index, event_index))?;

        let mut fields = Vec::with_capacity(variant.fields.len());
        for (n, field) in variant.fields.iter().enumerate() {
            let (value, next) = registry::read(bytes, at, field.ty, metadata.types())?;
            let name = field.name.clone().unwrap_or_else(|| format!("param{n}"));
            fields.push((name, value));
            at = next;
        }

        // Topics: compact count then that many H256s. Not persisted.
        let (topic_count, next) = compact::compact_u32(bytes, at)?;
        let topics_len = topic_count as usize * 32;
        bytes
            .get(next..next + topics_len)
            .ok_or(sublens_core::DecodeError::Eof(next))?;
        at = next + topics_len;

        events.push(DecodedEvent {
            index,
            module: pallet.name().to_owned(),
            event: variant.name.clone(),
            data: Value::Map(fields),
            phase,
        });
    }
    if at != bytes.len() {
        tracing::warn!(
            trailing = bytes.len() - at,
            "trailing bytes after the event vector"
        );
    }
    Ok(())
}

fn next_byte(bytes: &[u8], at: &mut usize) -> Result<u8, sublens_core::DecodeError> {
    let b = *bytes.get(*at).ok_or(sublens_core::DecodeError::Eof(*at))?;
    *at += 1;
    Ok(b)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::test_fixture::{fixture_metadata, pallet};
    use codec::{Compact, Encode};
    use pretty_assertions::assert_eq;
    use sublens_core::to_hex;

    fn record(phase: &[u8], pallet_index: u8, event_index: u8, fields: &[u8]) -> Vec<u8> {
        let mut out = phase.to_vec();
        out.push(pallet_index);
        out.push(event_index);
        out.extend_from_slice(fields);
        out.extend(Compact(0u32).encode()); // no topics
        out
    }

    fn apply(at: u32) -> Vec<u8> {
        let mut out = vec![0x00];
        out.extend_from_slice(&at.to_le_bytes());
        out
    }

    #[test]
    fn storage_key_is_the_well_known_prefix() {
        assert_eq!(
            to_hex(events_storage_key()),
            "0x26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7"
        );
    }

    #[test]
    fn decodes_a_block_worth_of_events() {
        let metadata = fixture_metadata();

        let mut fee_fields = [0xaa; 32].to_vec();
        fee_fields.extend_from_slice(&12_345u128.to_le_bytes());
        fee_fields.extend_from_slice(&0u128.to_le_bytes());

        let mut bytes = Compact(3u32).encode();
        bytes.extend(record(&apply(0), pallet::SYSTEM, 0, &[]));
        bytes.extend(record(
            &apply(1),
            pallet::TRANSACTION_PAYMENT,
            0,
            &fee_fields,
        ));
        bytes.extend(record(&apply(1), pallet::SYSTEM, 1, &[]));

        let events = decode_events(&bytes, &metadata);
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].module, "System");
        assert_eq!(events[0].event, "ExtrinsicSuccess");
        assert_eq!(events[0].phase, Phase::ApplyExtrinsic(0));

        assert_eq!(events[1].module, "TransactionPayment");
        assert_eq!(events[1].event, "TransactionFeePaid");
        assert_eq!(
            events[1].data.get("actual_fee").unwrap(),
            &sublens_core::Value::BigNum("12345".into())
        );

        assert_eq!(events[2].event, "ExtrinsicFailed");
        assert_eq!(events[2].phase.extrinsic_index(), Some(1));
    }

    #[test]
    fn finalization_phase_and_topics() {
        let metadata = fixture_metadata();
        let mut bytes = Compact(1u32).encode();
        let mut rec = vec![0x01, pallet::SYSTEM, 0];
        rec.extend(Compact(2u32).encode());
        rec.extend_from_slice(&[0x11; 64]); // two topics
        bytes.extend(rec);

        let events = decode_events(&bytes, &metadata);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Finalization);
        assert_eq!(events[0].phase.extrinsic_index(), None);
    }

    #[test]
    fn unknown_event_drops_the_tail_but_keeps_the_head() {
        let metadata = fixture_metadata();
        let mut bytes = Compact(2u32).encode();
        bytes.extend(record(&apply(0), pallet::SYSTEM, 0, &[]));
        bytes.extend(record(&apply(0), pallet::SYSTEM, 99, &[]));

        let events = decode_events(&bytes, &metadata);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "ExtrinsicSuccess");
    }

    #[test]
    fn empty_input_decodes_to_nothing() {
        let metadata = fixture_metadata();
        assert!(decode_events(&[], &metadata).is_empty());
        assert!(decode_events(&Compact(0u32).encode(), &metadata).is_empty());
    }
}

// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

use crate::{Metadata, MetadataError, build_pallets};
use frame_metadata::v14::RuntimeMetadataV14;

pub fn build(m: RuntimeMetadataV14) -> Result<Metadata, MetadataError> {
    let (pallets, pallets_by_index) = build_pallets(
        &m.types,
        m.pallets.iter().map(|p| {
            (
                p.index,
                p.name.clone(),
                p.calls.as_ref().map(|c| c.ty.id),
                p.event.as_ref().map(|e| e.ty.id),
            )
        }),
    )?;
    Ok(Metadata {
        pallets,
        pallets_by_index,
        signed_extensions: m
            .extrinsic
            .signed_extensions
            .iter()
            .map(|e| e.identifier.clone())
            .collect(),
        types: m.types,
    })
}

#[cfg(test)]
mod test {
    use crate::{Metadata, MetadataError};
    use assert_matches::assert_matches;
    use codec::Encode;
    use frame_metadata::{RuntimeMetadataPrefixed, v14};
    use scale_info::{IntoPortable, Registry, meta_type};

    // Call variant names mirror the runtime's snake_case dispatchables.
    #[allow(unused, non_camel_case_types)]
    #[derive(scale_info::TypeInfo)]
    enum BalancesCall {
        transfer_allow_death { dest: [u8; 32], value: u128 },
        transfer_keep_alive { dest: [u8; 32], value: u128 },
    }

    #[allow(unused)]
    #[derive(scale_info::TypeInfo)]
    enum BalancesEvent {
        Transfer {
            from: [u8; 32],
            to: [u8; 32],
            amount: u128,
        },
    }

    fn sample() -> RuntimeMetadataPrefixed {
        let mut registry = Registry::new();

        let pallet = v14::PalletMetadata {
            name: "Balances",
            index: 5,
            storage: None,
            calls: Some(v14::PalletCallMetadata {
                ty: meta_type::<BalancesCall>(),
            }),
            event: Some(v14::PalletEventMetadata {
                ty: meta_type::<BalancesEvent>(),
            }),
            constants: vec![],
            error: None,
        };
        let extrinsic = v14::ExtrinsicMetadata {
            ty: meta_type::<()>(),
            version: 4,
            signed_extensions: vec![
                v14::SignedExtensionMetadata {
                    identifier: "CheckMortality",
                    ty: meta_type::<()>(),
                    additional_signed: meta_type::<()>(),
                },
                v14::SignedExtensionMetadata {
                    identifier: "CheckNonce",
                    ty: meta_type::<()>(),
                    additional_signed: meta_type::<()>(),
                },
                v14::SignedExtensionMetadata {
                    identifier: "ChargeTransactionPayment",
                    ty: meta_type::<()>(),
                    additional_signed: meta_type::<()>(),
                },
            ],
        };

        let pallet = pallet.into_portable(&mut registry);
        let extrinsic = extrinsic.into_portable(&mut registry);
        let unit_ty = registry.register_type(&meta_type::<()>());

        let metadata = v14::RuntimeMetadataV14 {
            types: registry.into(),
            pallets: vec![pallet],
            extrinsic,
            ty: unit_ty,
        };
        RuntimeMetadataPrefixed::from(metadata)
    }

    #[test]
    fn pallets_calls_and_events_are_indexed() {
        let metadata = Metadata::try_from(sample()).unwrap();
        let pallet = metadata.pallet_by_index(5).unwrap();
        assert_eq!(pallet.name(), "Balances");
        assert_eq!(
            pallet.call_variant_by_index(1).unwrap().name,
            "transfer_keep_alive"
        );
        assert_eq!(pallet.event_variant_by_index(0).unwrap().name, "Transfer");
        assert_eq!(
            pallet.event_variant_by_index(0).unwrap().fields[2]
                .name
                .as_deref(),
            Some("amount")
        );
        assert!(pallet.call_variant_by_index(9).is_none());
        assert!(metadata.pallet_by_index(6).is_none());
    }

    #[test]
    fn signed_extensions_keep_declaration_order() {
        let metadata = Metadata::try_from(sample()).unwrap();
        assert_eq!(
            metadata.signed_extensions(),
            &[
                "CheckMortality".to_string(),
                "CheckNonce".to_string(),
                "ChargeTransactionPayment".to_string(),
            ]
        );
    }

    #[test]
    fn decode_roundtrip_from_bytes() {
        let bytes = sample().encode();
        let metadata = Metadata::from_bytes(&bytes).unwrap();
        assert!(metadata.pallet_by_name("Balances").is_some());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let prefixed = sample();
        let mangled = RuntimeMetadataPrefixed(0xdead_beef, prefixed.1);
        assert_matches!(
            Metadata::try_from(mangled),
            Err(MetadataError::BadMagic(0xdead_beef))
        );
    }
}

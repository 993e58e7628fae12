// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A small hand-built runtime: enough pallets, calls and events to
//! exercise the decoder paths without a live chain.

use frame_metadata::{RuntimeMetadataPrefixed, v14};
use scale_info::{IntoPortable, Registry, TypeInfo, meta_type};
use sublens_metadata::Metadata;

/// Pallet indices used by the fixture runtime.
pub mod pallet {
    pub const SYSTEM: u8 = 0;
    pub const TIMESTAMP: u8 = 3;
    pub const BALANCES: u8 = 5;
    pub const TRANSACTION_PAYMENT: u8 = 10;
}

#[allow(unused)]
#[derive(TypeInfo, codec::Encode)]
pub enum MultiAddressT {
    Id([u8; 32]),
    Raw(Vec<u8>),
}

#[allow(unused, non_camel_case_types)]
#[derive(TypeInfo, codec::Encode)]
pub enum BalancesCall {
    transfer_allow_death {
        dest: MultiAddressT,
        #[codec(compact)]
        value: u128,
    },
    transfer_keep_alive {
        dest: MultiAddressT,
        #[codec(compact)]
        value: u128,
    },
}

#[allow(unused, non_camel_case_types)]
#[derive(TypeInfo, codec::Encode)]
pub enum TimestampCall {
    set {
        #[codec(compact)]
        now: u64,
    },
}

#[allow(unused)]
#[derive(TypeInfo)]
pub enum SystemEvent {
    ExtrinsicSuccess,
    ExtrinsicFailed,
}

#[allow(unused)]
#[derive(TypeInfo)]
pub enum BalancesEvent {
    Transfer {
        from: [u8; 32],
        to: [u8; 32],
        amount: u128,
    },
}

#[allow(unused)]
#[derive(TypeInfo)]
pub enum TransactionPaymentEvent {
    TransactionFeePaid {
        who: [u8; 32],
        actual_fee: u128,
        tip: u128,
    },
}

fn pallet_entry(
    name: &'static str,
    index: u8,
    calls: Option<scale_info::MetaType>,
    event: Option<scale_info::MetaType>,
) -> v14::PalletMetadata {
    v14::PalletMetadata {
        name,
        index,
        storage: None,
        calls: calls.map(|ty| v14::PalletCallMetadata { ty }),
        event: event.map(|ty| v14::PalletEventMetadata { ty }),
        constants: vec![],
        error: None,
    }
}

/// Build the fixture runtime's [`Metadata`].
pub fn fixture_metadata() -> Metadata {
    Metadata::try_from(fixture_metadata_prefixed()).expect("fixture metadata is well formed")
}

/// The fixture runtime as raw prefixed metadata, for paths that exercise
/// the decode-from-bytes route.
pub fn fixture_metadata_prefixed() -> RuntimeMetadataPrefixed {
    let mut registry = Registry::new();

    let pallets = vec![
        pallet_entry(
            "System",
            pallet::SYSTEM,
            None,
            Some(meta_type::<SystemEvent>()),
        ),
        pallet_entry(
            "Timestamp",
            pallet::TIMESTAMP,
            Some(meta_type::<TimestampCall>()),
            None,
        ),
        pallet_entry(
            "Balances",
            pallet::BALANCES,
            Some(meta_type::<BalancesCall>()),
            Some(meta_type::<BalancesEvent>()),
        ),
        pallet_entry(
            "TransactionPayment",
            pallet::TRANSACTION_PAYMENT,
            None,
            Some(meta_type::<TransactionPaymentEvent>()),
        ),
    ];

    let extension = |identifier: &'static str| v14::SignedExtensionMetadata {
        identifier,
        ty: meta_type::<()>(),
        additional_signed: meta_type::<()>(),
    };
    let extrinsic = v14::ExtrinsicMetadata {
        ty: meta_type::<()>(),
        version: 4,
        signed_extensions: vec![
            extension("CheckMortality"),
            extension("CheckNonce"),
            extension("ChargeTransactionPayment"),
            extension("CheckMetadataHash"),
        ],
    };

    let pallets: Vec<_> = pallets
        .into_iter()
        .map(|p| p.into_portable(&mut registry))
        .collect();
    let extrinsic = extrinsic.into_portable(&mut registry);
    let unit_ty = registry.register_type(&meta_type::<()>());

    let metadata = v14::RuntimeMetadataV14 {
        types: registry.into(),
        pallets,
        extrinsic,
        ty: unit_ty,
    };
    RuntimeMetadataPrefixed::from(metadata)
}

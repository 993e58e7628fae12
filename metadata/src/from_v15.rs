// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

use crate::{Metadata, MetadataError, build_pallets};
use frame_metadata::v15::RuntimeMetadataV15;

pub fn build(m: RuntimeMetadataV15) -> Result<Metadata, MetadataError> {
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

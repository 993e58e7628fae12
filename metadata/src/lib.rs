// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Lookup tables over a chain's runtime metadata.
//!
//! The node hands back SCALE-encoded `frame-metadata`; this crate turns
//! V14+ of it into a [`Metadata`] value the decoder can query cheaply:
//! pallets by index, call and event variants by index, the
//! signed-extension identifiers in declaration order, and the full type
//! registry for dynamic decoding. Metadata layout is stable within a spec
//! version, so one [`Metadata`] is built per spec version and shared.

mod from_v14;
mod from_v15;
mod from_v16;

use codec::Decode;
use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed};
use scale_info::{PortableRegistry, TypeDef, form::PortableForm};
use std::collections::BTreeMap;

/// A decoded, indexed view of one spec version's runtime metadata.
#[derive(Clone, Debug)]
pub struct Metadata {
    pallets: Vec<PalletMetadata>,
    pallets_by_index: BTreeMap<u8, usize>,
    signed_extensions: Vec<String>,
    types: PortableRegistry,
}

/// One pallet's call and event tables.
#[derive(Clone, Debug)]
pub struct PalletMetadata {
    index: u8,
    name: String,
    calls: BTreeMap<u8, VariantDesc>,
    events: BTreeMap<u8, VariantDesc>,
}

/// A call or event variant: its name and its fields in wire order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantDesc {
    /// The variant name, e.g. `transfer_keep_alive` or `Transfer`.
    pub name: String,
    /// The fields in the order they appear on the wire.
    pub fields: Vec<FieldDesc>,
}

/// One field of a call or event variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDesc {
    /// The field name, if the variant has named fields.
    pub name: Option<String>,
    /// The field's id in the type registry.
    pub ty: u32,
}

impl Metadata {
    /// Decode SCALE-encoded `frame-metadata` bytes, as returned by
    /// `state_getMetadata`, into a [`Metadata`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetadataError> {
        let prefixed = RuntimeMetadataPrefixed::decode(&mut &bytes[..])?;
        Self::try_from(prefixed)
    }

    /// Look up a pallet by its index.
    pub fn pallet_by_index(&self, index: u8) -> Option<&PalletMetadata> {
        self.pallets_by_index
            .get(&index)
            .map(|&at| &self.pallets[at])
    }

    /// Like [`Self::pallet_by_index`], but an error if the pallet is missing.
    pub fn pallet_by_index_err(&self, index: u8) -> Result<&PalletMetadata, MetadataError> {
        self.pallet_by_index(index)
            .ok_or(MetadataError::PalletIndexNotFound(index))
    }

    /// Look up a pallet by name.
    pub fn pallet_by_name(&self, name: &str) -> Option<&PalletMetadata> {
        self.pallets.iter().find(|p| p.name == name)
    }

    /// The signed-extension identifiers in the order the runtime declares
    /// them, which is the order their extra data appears in an extrinsic.
    pub fn signed_extensions(&self) -> &[String] {
        &self.signed_extensions
    }

    /// The full type registry for dynamic decoding.
    pub fn types(&self) -> &PortableRegistry {
        &self.types
    }

    /// All pallets, in metadata order.
    pub fn pallets(&self) -> impl Iterator<Item = &PalletMetadata> {
        self.pallets.iter()
    }
}

impl PalletMetadata {
    /// The pallet's index in the runtime's outer enums.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// The pallet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a call variant by index.
    pub fn call_variant_by_index(&self, index: u8) -> Option<&VariantDesc> {
        self.calls.get(&index)
    }

    /// Look up an event variant by index.
    pub fn event_variant_by_index(&self, index: u8) -> Option<&VariantDesc> {
        self.events.get(&index)
    }
}

impl TryFrom<RuntimeMetadataPrefixed> for Metadata {
    type Error = MetadataError;

    fn try_from(prefixed: RuntimeMetadataPrefixed) -> Result<Self, Self::Error> {
        if prefixed.0 != frame_metadata::META_RESERVED {
            return Err(MetadataError::BadMagic(prefixed.0));
        }
        match prefixed.1 {
            RuntimeMetadata::V14(m) => from_v14::build(m),
            RuntimeMetadata::V15(m) => from_v15::build(m),
            RuntimeMetadata::V16(m) => from_v16::build(m),
            _ => Err(MetadataError::UnsupportedVersion),
        }
    }
}

/// Something went wrong turning raw metadata into a [`Metadata`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MetadataError {
    /// The bytes did not start with the `meta` magic number.
    #[error("metadata bytes carry the wrong magic number: {0:#x}")]
    BadMagic(u32),
    /// The metadata version has no type registry we can work with.
    #[error("unsupported metadata version; V14 or newer is required")]
    UnsupportedVersion,
    /// The bytes could not be SCALE decoded at all.
    #[error("could not decode metadata: {0}")]
    Codec(#[from] codec::Error),
    /// A pallet pointed at a call/event type that is not in the registry.
    #[error("type {0} not found in the metadata's own registry")]
    TypeNotFound(u32),
    /// A pallet pointed at a call/event type that is not an enum.
    #[error("type {0} was expected to be a variant type")]
    NotAVariantType(u32),
    /// No pallet with the given index.
    #[error("pallet with index {0} not found")]
    PalletIndexNotFound(u8),
}

/// Shared by the per-version conversions: resolve a call/event enum type id
/// into an index → variant table.
fn variant_lookup(
    types: &PortableRegistry,
    ty: Option<u32>,
) -> Result<BTreeMap<u8, VariantDesc>, MetadataError> {
    let Some(ty) = ty else {
        return Ok(BTreeMap::new());
    };
    let resolved = types.resolve(ty).ok_or(MetadataError::TypeNotFound(ty))?;
    let TypeDef::Variant(def) = &resolved.type_def else {
        return Err(MetadataError::NotAVariantType(ty));
    };
    Ok(def
        .variants
        .iter()
        .map(|v| (v.index, variant_desc(v)))
        .collect())
}

fn variant_desc(v: &scale_info::Variant<PortableForm>) -> VariantDesc {
    VariantDesc {
        name: v.name.clone(),
        fields: v
            .fields
            .iter()
            .map(|f| FieldDesc {
                name: f.name.clone(),
                ty: f.ty.id,
            })
            .collect(),
    }
}

fn build_pallets(
    types: &PortableRegistry,
    pallets: impl Iterator<Item = (u8, String, Option<u32>, Option<u32>)>,
) -> Result<(Vec<PalletMetadata>, BTreeMap<u8, usize>), MetadataError> {
    let mut out = Vec::new();
    let mut by_index = BTreeMap::new();
    for (index, name, call_ty, event_ty) in pallets {
        by_index.insert(index, out.len());
        out.push(PalletMetadata {
            index,
            name,
            calls: variant_lookup(types, call_ty)?,
            events: variant_lookup(types, event_ty)?,
        });
    }
    Ok((out, by_index))
}

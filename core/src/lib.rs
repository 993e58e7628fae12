// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! SCALE primitives for the sublens indexer.
//!
//! This crate carries the wire-level building blocks that every other part
//! of the indexer leans on: hex normalization, compact integers, the storage
//! key hashers, and a dynamically-typed traversal over the runtime's own
//! [`scale_info::PortableRegistry`]. Nothing in here performs I/O.

pub mod compact;
pub mod digest;
pub mod era;
pub mod hashers;
pub mod hex;
pub mod identity;
pub mod registry;
pub mod value;

pub use compact::{compact_u32, compact_u256, encode_compact_u32};
pub use era::Era;
pub use self::hex::{from_hex, to_hex};
pub use registry::{read, skip};
pub use value::Value;

/// Errors that can occur while decoding SCALE bytes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Ran off the end of the input bytes.
    #[error("unexpected end of input at offset {0}")]
    Eof(usize),
    /// A hex string could not be parsed.
    #[error("invalid hex: {0}")]
    Hex(#[from] ::hex::FromHexError),
    /// A compact integer was malformed or out of range for the target.
    #[error("malformed compact integer at offset {0}")]
    Compact(usize),
    /// A type id was not present in the registry.
    #[error("type {0} not found in registry")]
    TypeNotFound(u32),
    /// A variant index had no matching variant in the type definition.
    #[error("variant index {index} not found in type {ty}")]
    VariantNotFound {
        /// The type id of the enum being decoded.
        ty: u32,
        /// The variant index read off the wire.
        index: u8,
    },
    /// Traversal exceeded the recursion bound and the raw-hex fallback
    /// also failed to find the end of the value.
    #[error("recursion limit exceeded decoding type {0}")]
    DepthLimit(u32),
    /// A length prefix implies more bytes than the input holds.
    #[error("length {len} at offset {offset} exceeds remaining input")]
    LengthOutOfBounds {
        /// Claimed number of items or bytes.
        len: usize,
        /// Offset of the length prefix.
        offset: usize,
    },
    /// Anything the SCALE codec itself rejects.
    #[error("codec error: {0}")]
    Codec(#[from] codec::Error),
}

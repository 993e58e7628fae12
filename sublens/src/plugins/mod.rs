// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Pallet-specific extensions.
//!
//! Extensions are compiled into the binary as [`Extension`]
//! implementations; the extensions directory holds one JSON manifest per
//! enabled extension, selecting it by id and pinning which events and
//! calls it receives. Each extension owns its own tables, created through
//! its migrations, and is dispatched inside the block's transaction,
//! isolated by a savepoint so one failing handler cannot poison the block
//! write.

pub mod registry;
pub mod transfers;

pub use registry::PluginRegistry;

use crate::Error;
use crate::store::Tx;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What an extension announces about itself.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Manifest {
    /// Unique extension id.
    pub id: String,
    /// Extension version, informational.
    pub version: String,
    /// The pallet this extension belongs to, informational.
    #[serde(default)]
    pub pallet_id: Option<String>,
    /// `Module.Event` keys this extension wants dispatched.
    #[serde(default)]
    pub supported_events: Vec<String>,
    /// `Module.call` keys this extension wants dispatched.
    #[serde(default)]
    pub supported_calls: Vec<String>,
}

/// One schema migration an extension ships.
#[derive(Clone, Debug)]
pub struct Migration {
    /// Ordered version label, recorded in `extension_migrations`.
    pub version: String,
    /// The SQL to run, atomically with the version record.
    pub sql: String,
}

/// A decoded block as seen by `on_block` handlers.
#[derive(Clone, Debug)]
pub struct BlockCtx<'a> {
    /// Block height.
    pub height: u32,
    /// Block hash, `0x` hex.
    pub hash: &'a str,
    /// The block's timestamp, Unix milliseconds.
    pub timestamp_ms: Option<u64>,
}

/// A decoded extrinsic as seen by `on_extrinsic` handlers.
#[derive(Clone, Debug)]
pub struct ExtrinsicCtx<'a> {
    /// Owning block height.
    pub block_height: u32,
    /// Position within the block.
    pub index: u32,
    /// Pallet name.
    pub module: &'a str,
    /// Call name.
    pub call: &'a str,
    /// Signer hex, if signed.
    pub signer: Option<&'a str>,
    /// Decoded arguments, in store form.
    pub args: &'a serde_json::Value,
    /// Success after event correlation.
    pub success: bool,
}

/// A decoded event as seen by `on_event` handlers.
#[derive(Clone, Debug)]
pub struct EventCtx<'a> {
    /// Owning block height.
    pub block_height: u32,
    /// Position within the block's event vector.
    pub index: u32,
    /// Owning extrinsic index, for ApplyExtrinsic events.
    pub extrinsic_index: Option<u32>,
    /// Pallet name.
    pub module: &'a str,
    /// Event name.
    pub event: &'a str,
    /// Decoded event data, in store form.
    pub data: &'a serde_json::Value,
}

/// A pallet-specific extension. All handlers default to no-ops; an
/// extension implements the ones it cares about.
#[async_trait]
pub trait Extension: Send + Sync {
    /// The compiled-in manifest; the discovery manifest may narrow it.
    fn manifest(&self) -> &Manifest;

    /// Schema migrations, in order.
    fn migrations(&self) -> Vec<Migration> {
        Vec::new()
    }

    /// Called once per block, before the extrinsic and event dispatch.
    async fn on_block(&self, _tx: &mut Tx<'_>, _block: &BlockCtx<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// Called for each matching extrinsic.
    async fn on_extrinsic(
        &self,
        _tx: &mut Tx<'_>,
        _extrinsic: &ExtrinsicCtx<'_>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called for each matching event, both live and during backfill.
    async fn on_event(&self, _tx: &mut Tx<'_>, _event: &EventCtx<'_>) -> Result<(), Error> {
        Ok(())
    }
}

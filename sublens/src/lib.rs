// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A block indexer for Substrate based chains.
//!
//! sublens follows one or more nodes over JSON-RPC, decodes every block's
//! extrinsics and events against the runtime's own metadata, correlates
//! derived facts (success, fee, timestamp), and keeps a normalized
//! relational view in Postgres.
//!
//! The moving parts, bottom-up:
//!
//! - [`sublens_rpcs`] balances calls over N endpoints and exposes the
//!   legacy RPC methods and head subscriptions.
//! - [`runtimes`] caches one decoded metadata lookup per spec version,
//!   deduplicating concurrent fetches.
//! - [`decoder`] turns raw extrinsic/event bytes into decoded records.
//! - [`store`] owns the Postgres schema and the per-block transactions.
//! - [`processor`] maps one decoded block into rows, atomically.
//! - [`plugins`] dispatches decoded items to pallet-specific extensions.
//! - [`pipeline`] drives backfill, gap repair and the two live streams.

pub mod accounts;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod health;
pub mod metrics;
pub mod pipeline;
pub mod plugins;
pub mod processor;
pub mod runtimes;
pub mod store;

pub use config::Config;

/// Top level error type for the indexer service.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An RPC-level failure that survived pool failover and retries.
    #[error("rpc: {0}")]
    Rpc(#[from] sublens_rpcs::Error),
    /// Runtime metadata could not be fetched or understood.
    #[error("metadata: {0}")]
    Metadata(#[from] sublens_metadata::MetadataError),
    /// A SCALE decode failure that could not be recovered locally.
    #[error("decode: {0}")]
    Decode(#[from] sublens_core::DecodeError),
    /// The store rejected a query or transaction.
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
    /// Schema migrations failed to apply.
    #[error("migrate: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// The node has no block (yet) where we expected one.
    #[error("block {0} not found on any endpoint")]
    BlockNotFound(u32),
    /// A header was announced but its body could not be fetched.
    #[error("no block body for {0}")]
    MissingBody(String),
    /// JSON (de)serialization failure at the store boundary.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error, e.g. from the health listener or manifest discovery.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Bad or missing configuration; fatal at startup.
    #[error("config: {0}")]
    Config(String),
}

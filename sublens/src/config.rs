// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Service configuration, from flags with environment fallbacks.

use clap::Parser;
use std::path::PathBuf;

/// A block indexer for Substrate based chains.
#[derive(Parser, Clone, Debug)]
#[command(name = "sublens", version, about)]
pub struct Config {
    /// Node WS endpoints to balance over; comma separated.
    #[arg(long = "url", env = "SUBLENS_URLS", value_delimiter = ',', required = true)]
    pub urls: Vec<String>,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Identifier for the chain being indexed; keys the indexer_state row.
    #[arg(long, env = "CHAIN_ID", default_value = "substrate")]
    pub chain_id: String,

    /// Heights per backfill batch.
    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    /// Concurrent block fetches during backfill; capped at the batch size.
    #[arg(long, env = "BACKFILL_CONCURRENCY", default_value_t = 10)]
    pub backfill_concurrency: usize,

    /// How many gaps one verification pass attempts to repair.
    #[arg(long, env = "GAP_REPAIR_LIMIT", default_value_t = 500)]
    pub gap_repair_limit: usize,

    /// Directory holding extension manifests.
    #[arg(long, env = "EXTENSIONS_DIR", default_value = "extensions")]
    pub extensions_dir: PathBuf,

    /// Port for the /health and /metrics endpoint.
    #[arg(long, env = "HEALTH_PORT", default_value_t = 3001)]
    pub health_port: u16,

    /// Seconds between account balance refresh sweeps.
    #[arg(long, env = "BALANCE_REFRESH_SECS", default_value_t = 60)]
    pub balance_refresh_secs: u64,

    /// Key required for maintenance operations.
    #[arg(long, env = "ADMIN_KEY")]
    pub admin_key: Option<String>,
}

impl Config {
    /// The effective backfill concurrency: never more workers than there
    /// are heights in a batch.
    pub fn effective_concurrency(&self) -> usize {
        self.backfill_concurrency.clamp(1, self.batch_size.max(1))
    }
}

// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Indexer state, account balances, extension bookkeeping and the replay
//! query used by extension backfill.

use super::{Store, Tx};
use crate::Error;

/// The per-chain indexer state row.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct IndexerStateRow {
    /// Chain identifier.
    pub chain_id: String,
    /// Highest finalized height known to be persisted.
    pub last_finalized: i64,
    /// Highest best height seen.
    pub last_best: i64,
    /// `initializing`, `syncing`, `live` or `paused`.
    pub state: String,
}

/// One stored event, as replayed to extensions during backfill.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct StoredEvent {
    /// Owning block height.
    pub block_height: i64,
    /// Position within the block.
    pub idx: i32,
    /// Owning extrinsic index, if any.
    pub extrinsic_idx: Option<i32>,
    /// Pallet name.
    pub module: String,
    /// Event name.
    pub event: String,
    /// Decoded event data.
    pub data: serde_json::Value,
}

impl Store {
    /// Make sure the indexer_state row for this chain exists.
    pub async fn init_indexer_state(&self, chain_id: &str) -> Result<(), Error> {
        sqlx::query("INSERT INTO indexer_state (chain_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(chain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Read the indexer state for a chain.
    pub async fn indexer_state(&self, chain_id: &str) -> Result<Option<IndexerStateRow>, Error> {
        let row = sqlx::query_as::<_, IndexerStateRow>(
            "SELECT chain_id, last_finalized, last_best, state \
             FROM indexer_state WHERE chain_id = $1",
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Record a state machine transition.
    pub async fn set_indexer_state(&self, chain_id: &str, state: &str) -> Result<(), Error> {
        sqlx::query("UPDATE indexer_state SET state = $2 WHERE chain_id = $1")
            .bind(chain_id)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Advance the last-finalized watermark; never moves backwards.
    pub async fn advance_last_finalized(&self, chain_id: &str, height: i64) -> Result<(), Error> {
        sqlx::query(
            "UPDATE indexer_state SET last_finalized = GREATEST(last_finalized, $2) \
             WHERE chain_id = $1",
        )
        .bind(chain_id)
        .bind(height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advance the last-best watermark; never moves backwards.
    pub async fn advance_last_best(&self, chain_id: &str, height: i64) -> Result<(), Error> {
        sqlx::query(
            "UPDATE indexer_state SET last_best = GREATEST(last_best, $2) WHERE chain_id = $1",
        )
        .bind(chain_id)
        .bind(height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The migration versions already applied for an extension.
    pub async fn applied_extension_migrations(
        &self,
        extension_id: &str,
    ) -> Result<Vec<String>, Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT version FROM extension_migrations WHERE extension_id = $1 ORDER BY version",
        )
        .bind(extension_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Record a migration as applied, inside the transaction that ran it.
    pub async fn record_extension_migration(
        &self,
        tx: &mut Tx<'_>,
        extension_id: &str,
        version: &str,
    ) -> Result<(), Error> {
        sqlx::query("INSERT INTO extension_migrations (extension_id, version) VALUES ($1, $2)")
            .bind(extension_id)
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// A page of stored events matching any of the given `Module.Event`
    /// keys, strictly after the `(height, idx)` cursor, in
    /// height-then-index order.
    pub async fn events_for_replay(
        &self,
        keys: &[String],
        after: (i64, i32),
        limit: i64,
    ) -> Result<Vec<StoredEvent>, Error> {
        let rows = sqlx::query_as::<_, StoredEvent>(
            "SELECT block_height, idx, extrinsic_idx, module, event, data FROM events \
             WHERE (module || '.' || event) = ANY($1) \
             AND (block_height, idx) > ($2, $3) \
             ORDER BY block_height, idx \
             LIMIT $4",
        )
        .bind(keys)
        .bind(after.0)
        .bind(after.1)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Accounts whose balance row is missing or stale relative to their
    /// last activity.
    pub async fn accounts_needing_refresh(&self, limit: i64) -> Result<Vec<String>, Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT a.address FROM accounts a \
             LEFT JOIN account_balances b ON b.address = a.address \
             WHERE b.address IS NULL OR a.last_active_block > b.updated_at_block \
             ORDER BY a.last_active_block DESC \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(a,)| a).collect())
    }

    /// Upsert a live-storage balance snapshot for an account.
    pub async fn upsert_account_balance(
        &self,
        address: &str,
        free: &str,
        reserved: &str,
        frozen: &str,
        flags: &str,
        updated_at_block: i64,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO account_balances (address, free, reserved, frozen, flags, updated_at_block) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (address) DO UPDATE SET \
             free = EXCLUDED.free, reserved = EXCLUDED.reserved, frozen = EXCLUDED.frozen, \
             flags = EXCLUDED.flags, updated_at_block = EXCLUDED.updated_at_block",
        )
        .bind(address)
        .bind(free)
        .bind(reserved)
        .bind(frozen)
        .bind(flags)
        .bind(updated_at_block)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

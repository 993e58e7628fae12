// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Writes and queries over blocks, extrinsics and events.

use super::{Store, Tx};
use crate::Error;

/// One row of the blocks table.
#[derive(Clone, Debug)]
pub struct BlockRow {
    /// Block height.
    pub height: i64,
    /// Own hash.
    pub hash: String,
    /// Parent hash.
    pub parent_hash: String,
    /// State trie root.
    pub state_root: String,
    /// Extrinsics trie root.
    pub extrinsics_root: String,
    /// `Timestamp.set` value, Unix milliseconds.
    pub timestamp_ms: Option<i64>,
    /// Block author; deliberately left null by the core.
    pub validator: Option<String>,
    /// `best` or `finalized`.
    pub status: String,
    /// Runtime spec version at this height.
    pub spec_version: i64,
    /// Number of extrinsics in the block.
    pub extrinsic_count: i32,
    /// Number of events in the block.
    pub event_count: i32,
    /// Decoded digest logs.
    pub digest_logs: serde_json::Value,
}

/// One row of the extrinsics table.
#[derive(Clone, Debug)]
pub struct ExtrinsicRow {
    /// Owning block height.
    pub block_height: i64,
    /// Position within the block.
    pub idx: i32,
    /// Blake2-256 of the raw bytes, for signed extrinsics.
    pub tx_hash: Option<String>,
    /// Signer public key hex, if signed.
    pub signer: Option<String>,
    /// Pallet name.
    pub module: String,
    /// Call name.
    pub call: String,
    /// Decoded arguments.
    pub args: serde_json::Value,
    /// Nonce from the signed extensions.
    pub nonce: Option<i64>,
    /// Success after event correlation.
    pub success: bool,
    /// Actual fee, decimal string.
    pub fee: Option<String>,
    /// Tip, decimal string.
    pub tip: Option<String>,
}

/// One row of the events table.
#[derive(Clone, Debug)]
pub struct EventRow {
    /// Owning block height.
    pub block_height: i64,
    /// Position within the block's event vector.
    pub idx: i32,
    /// Owning extrinsic index, for ApplyExtrinsic events.
    pub extrinsic_idx: Option<i32>,
    /// Pallet name.
    pub module: String,
    /// Event name.
    pub event: String,
    /// Decoded event data.
    pub data: serde_json::Value,
    /// Phase label.
    pub phase: String,
}

impl Store {
    /// Upsert a block row keyed by height.
    pub async fn upsert_block(&self, tx: &mut Tx<'_>, row: &BlockRow) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO blocks (height, hash, parent_hash, state_root, extrinsics_root, \
             timestamp_ms, validator, status, spec_version, extrinsic_count, event_count, digest_logs) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (height) DO UPDATE SET \
             hash = EXCLUDED.hash, parent_hash = EXCLUDED.parent_hash, \
             state_root = EXCLUDED.state_root, extrinsics_root = EXCLUDED.extrinsics_root, \
             timestamp_ms = EXCLUDED.timestamp_ms, validator = EXCLUDED.validator, \
             status = EXCLUDED.status, spec_version = EXCLUDED.spec_version, \
             extrinsic_count = EXCLUDED.extrinsic_count, event_count = EXCLUDED.event_count, \
             digest_logs = EXCLUDED.digest_logs",
        )
        .bind(row.height)
        .bind(&row.hash)
        .bind(&row.parent_hash)
        .bind(&row.state_root)
        .bind(&row.extrinsics_root)
        .bind(row.timestamp_ms)
        .bind(&row.validator)
        .bind(&row.status)
        .bind(row.spec_version)
        .bind(row.extrinsic_count)
        .bind(row.event_count)
        .bind(&row.digest_logs)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Upsert an extrinsic row keyed by `(block_height, idx)`.
    pub async fn upsert_extrinsic(&self, tx: &mut Tx<'_>, row: &ExtrinsicRow) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO extrinsics (block_height, idx, tx_hash, signer, module, call, args, \
             nonce, success, fee, tip) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (block_height, idx) DO UPDATE SET \
             tx_hash = EXCLUDED.tx_hash, signer = EXCLUDED.signer, module = EXCLUDED.module, \
             call = EXCLUDED.call, args = EXCLUDED.args, nonce = EXCLUDED.nonce, \
             success = EXCLUDED.success, fee = EXCLUDED.fee, tip = EXCLUDED.tip",
        )
        .bind(row.block_height)
        .bind(row.idx)
        .bind(&row.tx_hash)
        .bind(&row.signer)
        .bind(&row.module)
        .bind(&row.call)
        .bind(&row.args)
        .bind(row.nonce)
        .bind(row.success)
        .bind(&row.fee)
        .bind(&row.tip)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Insert an event row; events are immutable once written for a block,
    /// so conflicts are ignored.
    pub async fn insert_event(&self, tx: &mut Tx<'_>, row: &EventRow) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO events (block_height, idx, extrinsic_idx, module, event, data, phase) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (block_height, idx) DO NOTHING",
        )
        .bind(row.block_height)
        .bind(row.idx)
        .bind(row.extrinsic_idx)
        .bind(&row.module)
        .bind(&row.event)
        .bind(&row.data)
        .bind(&row.phase)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Upsert an account on first appearance as a signer and advance its
    /// last-active block monotonically.
    pub async fn upsert_account(
        &self,
        tx: &mut Tx<'_>,
        address: &str,
        block_height: i64,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO accounts (address, created_at_block, last_active_block) \
             VALUES ($1, $2, $2) \
             ON CONFLICT (address) DO UPDATE SET \
             last_active_block = GREATEST(accounts.last_active_block, EXCLUDED.last_active_block)",
        )
        .bind(address)
        .bind(block_height)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Delete the extrinsic and event rows under one height, used when a
    /// block row is rewritten with a different hash.
    pub async fn delete_block_children(&self, tx: &mut Tx<'_>, height: i64) -> Result<(), Error> {
        sqlx::query("DELETE FROM events WHERE block_height = $1")
            .bind(height)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM extrinsics WHERE block_height = $1")
            .bind(height)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// The hash and status of the block at a height, if stored.
    pub async fn block_meta(&self, height: i64) -> Result<Option<(String, String)>, Error> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT hash, status FROM blocks WHERE height = $1")
                .bind(height)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// Same as [`Self::block_meta`] but inside a transaction, so the
    /// best-stream writer can check finality before overwriting.
    pub async fn block_meta_tx(
        &self,
        tx: &mut Tx<'_>,
        height: i64,
    ) -> Result<Option<(String, String)>, Error> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT hash, status FROM blocks WHERE height = $1")
                .bind(height)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(row)
    }

    /// Promote a block to finalized status.
    pub async fn mark_finalized(&self, height: i64) -> Result<(), Error> {
        sqlx::query("UPDATE blocks SET status = 'finalized' WHERE height = $1")
            .bind(height)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete best-status rows at and above `height`, cascading to their
    /// extrinsics and events. Finalized rows are never touched. Returns
    /// the number of blocks removed.
    pub async fn prune_best_from(&self, height: i64) -> Result<u64, Error> {
        let mut tx = self.begin().await?;
        sqlx::query(
            "DELETE FROM events e USING blocks b \
             WHERE e.block_height = b.height AND b.height >= $1 AND b.status = 'best'",
        )
        .bind(height)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM extrinsics x USING blocks b \
             WHERE x.block_height = b.height AND b.height >= $1 AND b.status = 'best'",
        )
        .bind(height)
        .execute(&mut *tx)
        .await?;
        let pruned = sqlx::query("DELETE FROM blocks WHERE height >= $1 AND status = 'best'")
            .bind(height)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(pruned)
    }

    /// Highest stored block height, if any.
    pub async fn max_height(&self) -> Result<Option<i64>, Error> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(height) FROM blocks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Missing heights between the lowest and highest stored blocks, in
    /// ascending order, capped at `limit`.
    pub async fn missing_heights(&self, limit: i64) -> Result<Vec<i64>, Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT gs.height FROM generate_series(\
                 (SELECT MIN(height) FROM blocks), (SELECT MAX(height) FROM blocks)\
             ) AS gs(height) \
             LEFT JOIN blocks b ON b.height = gs.height \
             WHERE b.height IS NULL \
             ORDER BY gs.height \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(h,)| h).collect())
    }
}

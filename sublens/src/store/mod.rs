// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The Postgres store.
//!
//! The indexer core owns all writes to `blocks`, `extrinsics`, `events`,
//! `accounts` and `indexer_state`; extensions write only inside their own
//! tables, and `account_balances` belongs to the balance refresher. Every
//! block is written in a single transaction.

pub mod blocks;
pub mod state;

use crate::Error;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// A transaction over the store.
pub type Tx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// Handle to the relational store; cheap to clone.
#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to Postgres.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;
        Ok(Store { pool })
    }

    /// Wrap an existing pool; used by tests.
    pub fn from_pool(pool: PgPool) -> Self {
        Store { pool }
    }

    /// Apply the core schema migrations.
    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Begin a transaction.
    pub async fn begin(&self) -> Result<Tx<'static>, Error> {
        Ok(self.pool.begin().await?)
    }

    /// The underlying pool, for read-side queries.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

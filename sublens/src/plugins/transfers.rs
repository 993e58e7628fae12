// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The built-in balances-transfers extension: records every
//! `Balances.Transfer` event in its own table.

use super::{EventCtx, Extension, Manifest, Migration};
use crate::Error;
use crate::store::Tx;
use async_trait::async_trait;

/// Indexes `Balances.Transfer` events into `ext_balances_transfers`.
pub struct BalancesTransfers {
    manifest: Manifest,
}

impl Default for BalancesTransfers {
    fn default() -> Self {
        BalancesTransfers {
            manifest: Manifest {
                id: "balances-transfers".into(),
                version: "1.0.0".into(),
                pallet_id: Some("Balances".into()),
                supported_events: vec!["Balances.Transfer".into()],
                supported_calls: vec![],
            },
        }
    }
}

#[async_trait]
impl Extension for BalancesTransfers {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            version: "0001".into(),
            sql: "CREATE TABLE IF NOT EXISTS ext_balances_transfers (\
                      block_height BIGINT NOT NULL,\
                      event_idx INTEGER NOT NULL,\
                      from_address TEXT,\
                      to_address TEXT,\
                      amount TEXT,\
                      PRIMARY KEY (block_height, event_idx)\
                  );\
                  CREATE INDEX IF NOT EXISTS ext_balances_transfers_from_idx \
                      ON ext_balances_transfers (from_address);\
                  CREATE INDEX IF NOT EXISTS ext_balances_transfers_to_idx \
                      ON ext_balances_transfers (to_address);"
                .into(),
        }]
    }

    async fn on_event(&self, tx: &mut Tx<'_>, event: &EventCtx<'_>) -> Result<(), Error> {
        let from = event.data.get("from").and_then(|v| v.as_str());
        let to = event.data.get("to").and_then(|v| v.as_str());
        let amount = event
            .data
            .get("amount")
            .and_then(|v| v.as_str().map(str::to_owned).or_else(|| v.as_u64().map(|n| n.to_string())));
        sqlx::query(
            "INSERT INTO ext_balances_transfers \
             (block_height, event_idx, from_address, to_address, amount) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (block_height, event_idx) DO NOTHING",
        )
        .bind(event.block_height as i64)
        .bind(event.index as i32)
        .bind(from)
        .bind(to)
        .bind(amount)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn manifest_subscribes_to_transfers_only() {
        let ext = BalancesTransfers::default();
        assert_eq!(ext.manifest().id, "balances-transfers");
        assert_eq!(ext.manifest().supported_events, vec!["Balances.Transfer"]);
        assert!(ext.manifest().supported_calls.is_empty());
        assert_eq!(ext.migrations().len(), 1);
        assert!(ext.migrations()[0].sql.contains("ext_balances_transfers"));
    }
}

// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The account-state refresher.
//!
//! Balances are read from live storage at the finalized head rather than
//! reconstructed from events: the chain's own `System.Account` entry is
//! the source of truth, and one read replaces any amount of event
//! arithmetic.

use crate::Error;
use crate::store::Store;
use codec::Decode;
use std::time::Duration;
use sublens_core::hashers::{blake2_128_concat, twox_128};
use sublens_core::from_hex;
use sublens_rpcs::LegacyRpcMethods;
use tokio::sync::watch;

// Accounts refreshed per sweep.
const SWEEP_LIMIT: i64 = 100;

/// The `System.Account` storage layout.
#[derive(Clone, Debug, Decode)]
pub struct AccountInfo {
    /// Transaction count.
    pub nonce: u32,
    /// Consumer reference count.
    pub consumers: u32,
    /// Provider reference count.
    pub providers: u32,
    /// Self-sufficient reference count.
    pub sufficients: u32,
    /// The balances themselves.
    pub data: AccountData,
}

/// The balance portion of [`AccountInfo`].
#[derive(Clone, Debug, Decode)]
pub struct AccountData {
    /// Spendable balance.
    pub free: u128,
    /// Held balance.
    pub reserved: u128,
    /// Frozen balance.
    pub frozen: u128,
    /// Holds/freezes flags word.
    pub flags: u128,
}

/// The storage key of `System.Account(pubkey)`:
/// `twox128("System") ++ twox128("Account") ++ blake2_128_concat(pubkey)`.
pub fn account_storage_key(pubkey: &[u8]) -> Vec<u8> {
    let mut key = twox_128(b"System").to_vec();
    key.extend_from_slice(&twox_128(b"Account"));
    key.extend_from_slice(&blake2_128_concat(pubkey));
    key
}

/// Periodically refreshes `account_balances` for accounts whose activity
/// outran their last snapshot.
pub struct BalanceRefresher {
    store: Store,
    methods: LegacyRpcMethods,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BalanceRefresher {
    /// Wire up a refresher.
    pub fn new(
        store: Store,
        methods: LegacyRpcMethods,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        BalanceRefresher {
            store,
            methods,
            interval,
            shutdown,
        }
    }

    /// Run sweeps until shutdown.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                result = self.shutdown.changed() => {
                    if result.is_err() || *self.shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }
            match self.sweep().await {
                Ok(0) => {}
                Ok(refreshed) => tracing::debug!(refreshed, "balance sweep done"),
                Err(e) => tracing::warn!(error = %e, "balance sweep failed"),
            }
        }
    }

    /// One sweep: refresh the stalest accounts at the finalized head.
    pub async fn sweep(&self) -> Result<usize, Error> {
        let accounts = self.store.accounts_needing_refresh(SWEEP_LIMIT).await?;
        if accounts.is_empty() {
            return Ok(0);
        }
        let head = self.methods.chain_get_finalized_head().await?;
        let height = self
            .methods
            .chain_get_header(Some(head))
            .await?
            .ok_or_else(|| Error::MissingBody(format!("{head:#x}")))?
            .number as i64;

        let mut refreshed = 0;
        for address in accounts {
            let pubkey = match from_hex(&address) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "unparseable account address");
                    continue;
                }
            };
            let key = account_storage_key(&pubkey);
            let stored = self.methods.state_get_storage(&key, Some(head)).await?;
            let data = match stored {
                Some(bytes) => match AccountInfo::decode(&mut &bytes[..]) {
                    Ok(info) => info.data,
                    Err(e) => {
                        tracing::warn!(address = %address, error = %e, "undecodable AccountInfo");
                        continue;
                    }
                },
                // Reaped account: an explicit zero snapshot beats a stale one.
                None => AccountData {
                    free: 0,
                    reserved: 0,
                    frozen: 0,
                    flags: 0,
                },
            };
            self.store
                .upsert_account_balance(
                    &address,
                    &data.free.to_string(),
                    &data.reserved.to_string(),
                    &data.frozen.to_string(),
                    &data.flags.to_string(),
                    height,
                )
                .await?;
            refreshed += 1;
        }
        Ok(refreshed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use codec::Encode;
    use sublens_core::to_hex;

    #[test]
    fn storage_key_shape() {
        let pubkey = [0xab; 32];
        let key = account_storage_key(&pubkey);
        // twox128(System) ++ twox128(Account) ++ blake2_128 ++ pubkey
        assert_eq!(key.len(), 16 + 16 + 16 + 32);
        assert!(to_hex(&key).starts_with("0x26aa394eea5630e07c48ae0c9558cef7"));
        assert!(key.ends_with(&pubkey));
    }

    #[test]
    fn account_info_decodes_the_fixed_layout() {
        #[derive(Encode)]
        struct Wire {
            nonce: u32,
            consumers: u32,
            providers: u32,
            sufficients: u32,
            free: u128,
            reserved: u128,
            frozen: u128,
            flags: u128,
        }
        let bytes = Wire {
            nonce: 7,
            consumers: 1,
            providers: 1,
            sufficients: 0,
            free: 1_000_000_000_000,
            reserved: 5,
            frozen: 0,
            flags: 1 << 127,
        }
        .encode();
        let info = AccountInfo::decode(&mut &bytes[..]).unwrap();
        assert_eq!(info.nonce, 7);
        assert_eq!(info.data.free, 1_000_000_000_000);
        assert_eq!(info.data.reserved, 5);
        assert_eq!(info.data.flags, 1 << 127);
    }
}

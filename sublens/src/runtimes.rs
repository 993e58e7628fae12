// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The metadata cache: block hash → spec version → decoded [`Metadata`].
//!
//! Metadata layout is stable within a spec version, so one decoded lookup
//! is shared across every block of that version. Concurrent backfill
//! workers asking for the same spec version share a single underlying
//! `state_getMetadata` fetch via a per-version [`OnceCell`]; coordinating
//! through the LRU alone would race.

use crate::Error;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use sublens_metadata::Metadata;
use sublens_rpcs::LegacyRpcMethods;
use sublens_rpcs::methods::Hash;
use tokio::sync::OnceCell;

const HASH_CACHE_CAPACITY: usize = 10_000;
const SPEC_CACHE_CAPACITY: usize = 50;

/// Resolves and caches runtime metadata per spec version.
pub struct RuntimeCache {
    methods: LegacyRpcMethods,
    spec_by_hash: Mutex<LruCache<Hash, u32>>,
    metadata_by_spec: Mutex<LruCache<u32, Arc<Metadata>>>,
    inflight: Mutex<HashMap<u32, Arc<OnceCell<Arc<Metadata>>>>>,
}

impl RuntimeCache {
    /// Create an empty cache over the given RPC methods.
    pub fn new(methods: LegacyRpcMethods) -> Self {
        RuntimeCache {
            methods,
            spec_by_hash: Mutex::new(LruCache::new(
                NonZeroUsize::new(HASH_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            metadata_by_spec: Mutex::new(LruCache::new(
                NonZeroUsize::new(SPEC_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// The decoded metadata lookup and spec version in effect at the given
    /// block hash.
    pub async fn ensure_metadata(&self, hash: Hash) -> Result<(Arc<Metadata>, u32), Error> {
        let spec_version = self.spec_version_at(hash).await?;

        if let Some(metadata) = self
            .metadata_by_spec
            .lock()
            .expect("metadata lock poisoned")
            .get(&spec_version)
        {
            return Ok((metadata.clone(), spec_version));
        }

        // Join an in-flight fetch for this spec version, or become it.
        let cell = self
            .inflight
            .lock()
            .expect("inflight lock poisoned")
            .entry(spec_version)
            .or_default()
            .clone();

        let metadata = cell
            .get_or_try_init(|| async {
                tracing::info!(spec_version, "fetching runtime metadata");
                let bytes = self.methods.state_get_metadata(Some(hash)).await?;
                let metadata = Metadata::from_bytes(&bytes)?;
                Ok::<_, Error>(Arc::new(metadata))
            })
            .await?
            .clone();

        self.metadata_by_spec
            .lock()
            .expect("metadata lock poisoned")
            .put(spec_version, metadata.clone());
        self.inflight
            .lock()
            .expect("inflight lock poisoned")
            .remove(&spec_version);

        Ok((metadata, spec_version))
    }

    async fn spec_version_at(&self, hash: Hash) -> Result<u32, Error> {
        if let Some(spec) = self
            .spec_by_hash
            .lock()
            .expect("spec lock poisoned")
            .get(&hash)
        {
            return Ok(*spec);
        }
        let version = self.methods.state_get_runtime_version(Some(hash)).await?;
        self.spec_by_hash
            .lock()
            .expect("spec lock poisoned")
            .put(hash, version.spec_version);
        Ok(version.spec_version)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::test_fixture::fixture_metadata_prefixed;
    use codec::Encode;
    use std::sync::atomic::{AtomicU64, Ordering};
    use sublens_rpcs::methods::Bytes;
    use sublens_rpcs::mock::MockRpcClient;
    use sublens_rpcs::RpcClient;

    fn cache_with_counters() -> (Arc<RuntimeCache>, Arc<AtomicU64>, Arc<AtomicU64>) {
        let version_calls = Arc::new(AtomicU64::new(0));
        let metadata_calls = Arc::new(AtomicU64::new(0));
        let vc = version_calls.clone();
        let mc = metadata_calls.clone();
        let client = MockRpcClient::new(move |method, _params| match method {
            "state_getRuntimeVersion" => {
                vc.fetch_add(1, Ordering::Relaxed);
                MockRpcClient::json(serde_json::json!({
                    "specVersion": 1050, "transactionVersion": 26
                }))
            }
            "state_getMetadata" => {
                mc.fetch_add(1, Ordering::Relaxed);
                MockRpcClient::json(Bytes(fixture_metadata_prefixed().encode()))
            }
            other => Err(sublens_rpcs::Error::RequestRejected(format!(
                "unexpected call {other}"
            ))),
        });
        let methods = LegacyRpcMethods::new(RpcClient::new(client));
        (
            Arc::new(RuntimeCache::new(methods)),
            version_calls,
            metadata_calls,
        )
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_metadata_fetch() {
        let (cache, version_calls, metadata_calls) = cache_with_counters();
        let hash = Hash::repeat_byte(1);

        let lookups = futures::future::join_all(
            (0..8).map(|_| cache.ensure_metadata(hash)),
        )
        .await;
        for result in lookups {
            let (metadata, spec) = result.unwrap();
            assert_eq!(spec, 1050);
            assert!(metadata.pallet_by_name("Balances").is_some());
        }

        assert_eq!(metadata_calls.load(Ordering::Relaxed), 1);
        // The hash cache also deduplicated the runtime version call.
        assert_eq!(version_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn different_hashes_reuse_the_spec_version_lookup() {
        let (cache, version_calls, metadata_calls) = cache_with_counters();
        cache.ensure_metadata(Hash::repeat_byte(1)).await.unwrap();
        cache.ensure_metadata(Hash::repeat_byte(2)).await.unwrap();

        // Two hash lookups, one metadata decode.
        assert_eq!(version_calls.load(Ordering::Relaxed), 2);
        assert_eq!(metadata_calls.load(Ordering::Relaxed), 1);
    }
}

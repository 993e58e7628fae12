// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The ingestion pipeline: backfill, gap repair, and the two live
//! streams.
//!
//! The finalized stream is canonical and drives the `last_finalized`
//! watermark; the best stream is optimistic and may be reorganized away.
//! Historical fetches (backfill and gap repair) always go through the
//! legacy by-height methods, because the follow-style subscriptions only
//! cover recent blocks.

use crate::Error;
use crate::decoder::{self, BlockStatus, events::events_storage_key};
use crate::metrics::Metrics;
use crate::plugins::PluginRegistry;
use crate::processor;
use crate::runtimes::RuntimeCache;
use crate::store::Store;
use futures::StreamExt;
use rand::Rng;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sublens_rpcs::LegacyRpcMethods;
use sublens_rpcs::methods::Hash;
use tokio::sync::watch;

// Per-block fetch budget: up to 3 attempts, sleeping 200ms times the
// attempt number plus jitter between them. Blocks that exhaust it become
// gaps for the next verification pass.
const BLOCK_ATTEMPTS: u32 = 3;
const RETRY_STEP_MS: u64 = 200;

// Subscription reconnect backoff bounds.
const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

const GAP_REPAIR_CONCURRENCY: usize = 5;

/// Everything the pipeline needs to run, wired once at startup.
pub struct Indexer {
    store: Store,
    methods: LegacyRpcMethods,
    runtimes: Arc<RuntimeCache>,
    plugins: Arc<PluginRegistry>,
    metrics: Arc<Metrics>,
    chain_id: String,
    batch_size: u32,
    concurrency: usize,
    gap_repair_limit: i64,
    shutdown: watch::Receiver<bool>,
    paused: AtomicBool,
    prior_state: Mutex<String>,
    last_finalized_seen: AtomicU32,
}

impl Indexer {
    /// Wire up a pipeline.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        methods: LegacyRpcMethods,
        runtimes: Arc<RuntimeCache>,
        plugins: Arc<PluginRegistry>,
        metrics: Arc<Metrics>,
        config: &crate::Config,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Indexer {
            store,
            methods,
            runtimes,
            plugins,
            metrics,
            chain_id: config.chain_id.clone(),
            batch_size: config.batch_size.max(1) as u32,
            concurrency: config.effective_concurrency(),
            gap_repair_limit: config.gap_repair_limit as i64,
            shutdown,
            paused: AtomicBool::new(false),
            prior_state: Mutex::new("syncing".to_owned()),
            last_finalized_seen: AtomicU32::new(0),
        }
    }

    /// Run the whole lifecycle: migrations, backfill, gap verification,
    /// then the two live subscriptions until shutdown.
    pub async fn run(&self) -> Result<(), Error> {
        self.store.init_indexer_state(&self.chain_id).await?;
        self.set_state("initializing").await?;

        self.plugins.run_migrations(&self.store).await;

        Ok(())
    }

    /// Pause ingestion; in-flight blocks finish, nothing new starts.
    pub async fn pause(&self) -> Result<(), Error> {
        let current = self
            .store
            .indexer_state(&self.chain_id)
            .await?
            .map(|row| row.state)
            .unwrap_or_else(|| "syncing".to_owned());
        if current != "paused" {
            *self.prior_state.lock().expect("state lock poisoned") = current;
            self.paused.store(true, Ordering::SeqCst);
            self.store.set_indexer_state(&self.chain_id, "paused").await?;
            tracing::info!("pipeline paused");
        }
        Ok(())
    }

    /// Resume ingestion in whatever state it was paused from.
    pub async fn resume(&self) -> Result<(), Error> {
        if self.paused.swap(false, Ordering::SeqCst) {
            let prior = self
                .prior_state
                .lock()
                .expect("state lock poisoned")
                .clone();
            self.store.set_indexer_state(&self.chain_id, &prior).await?;
            tracing::info!(state = %prior, "pipeline resumed");
        }
        Ok(())
    }

    fn stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn wait_if_paused(&self) {
        while self.paused.load(Ordering::SeqCst) && !self.stopped() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn set_state(&self, state: &'static str) -> Result<(), Error> {
        tracing::info!(state, "indexer state");
        self.store.set_indexer_state(&self.chain_id, state).await
    }

    // ---- backfill -------------------------------------------------------

    async fn backfill(&self, from: u32, to: u32) -> Result<(), Error> {
        tracing::info!(from, to, blocks = to - from + 1, "backfill starting");
        let mut batch_start = from;
        while batch_start <= to && !self.stopped() {
            let batch_end = batch_start
                .saturating_add(self.batch_size - 1)
                .min(to);
            let results = futures::stream::iter(batch_start..=batch_end)
                .map(|height| {
                    let work = self.ingest_height(height);
                    async move { (height, work.await) }
                })
                .buffer_unordered(self.concurrency)
                .collect::<Vec<(u32, bool)>>()
                .await;

            // The watermark only covers heights below the first failure;
            // everything above it is either persisted or a logged gap the
            // verification pass will repair.
            let first_failure = results
                .iter()
                .filter(|(_, persisted)| !persisted)
                .map(|(height, _)| *height)
                .min();
            let watermark = match first_failure {
                None => Some(batch_end),
                Some(height) => height.checked_sub(1).filter(|w| *w >= batch_start),
            };
            if let Some(watermark) = watermark {
                self.store
                    .advance_last_finalized(&self.chain_id, watermark as i64)
                    .await?;
                self.last_finalized_seen
                    .fetch_max(watermark, Ordering::Relaxed);
            }
            tracing::info!(
                through = batch_end,
                of = to,
                "backfill progress"
            );
            let Some(next) = batch_end.checked_add(1) else { break };
            batch_start = next;
        }
        tracing::info!("backfill finished");
        Ok(())
    }

    // One block by height with the per-block retry budget; failures leave
    // a gap and never abort the caller. Returns whether the block was
    // persisted.
    async fn ingest_height(&self, height: u32) -> bool {
        self.wait_if_paused().await;
        for attempt in 1..=BLOCK_ATTEMPTS {
            match self.fetch_and_process_height(height).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(height, attempt, error = %e, "block fetch failed");
                    if attempt < BLOCK_ATTEMPTS && !self.stopped() {
                        let jitter = rand::thread_rng().gen_range(0..RETRY_STEP_MS);
                        tokio::time::sleep(Duration::from_millis(
                            RETRY_STEP_MS * attempt as u64 + jitter,
                        ))
                        .await;
                    }
                }
            }
        }
        self.metrics.gaps_detected.fetch_add(1, Ordering::Relaxed);
        tracing::error!(height, "giving up on block; left as a gap for the next verification pass");
        false
    }

    async fn fetch_and_process_height(&self, height: u32) -> Result<(), Error> {
        let hash = self
            .methods
            .chain_get_block_hash(Some(height))
            .await?
            .ok_or(Error::BlockNotFound(height))?;
        self.fetch_and_process(hash, BlockStatus::Finalized).await
    }

    async fn fetch_and_process(&self, hash: Hash, status: BlockStatus) -> Result<(), Error> {
        let details = self
            .methods
            .chain_get_block(Some(hash))
            .await?
            .ok_or_else(|| Error::MissingBody(format!("{hash:#x}")))?;
        let (metadata, spec_version) = self.runtimes.ensure_metadata(hash).await?;
        let events_bytes = self
            .methods
            .state_get_storage(&events_storage_key(), Some(hash))
            .await?;

        let decoded = decoder::decode_block(
            &details.block.header,
            hash,
            &details.block.extrinsics,
            events_bytes.as_deref(),
            &metadata,
            spec_version,
        );
        processor::process_block(&self.store, &self.plugins, &self.metrics, &decoded, status).await
    }

    // ---- gap verification ----------------------------------------------

    async fn verify_gaps(&self) -> Result<(), Error> {
        let gaps = self.store.missing_heights(self.gap_repair_limit).await?;
        if gaps.is_empty() {
            tracing::info!("gap verification found nothing missing");
            return Ok(());
        }
        tracing::warn!(count = gaps.len(), "gap verification found missing heights");
        futures::stream::iter(gaps.into_iter().map(|height| height as u32))
            .map(|height| self.repair_gap(height))
            .buffer_unordered(GAP_REPAIR_CONCURRENCY)
            .collect::<Vec<()>>()
            .await;

        let remaining = self.store.missing_heights(self.gap_repair_limit).await?;
        if !remaining.is_empty() {
            tracing::error!(
                count = remaining.len(),
                first = remaining.first(),
                "persistent gaps remain after repair"
            );
        }
        Ok(())
    }

    async fn repair_gap(&self, height: u32) {
        for attempt in 1..=BLOCK_ATTEMPTS {
            match self.fetch_and_process_height(height).await {
                Ok(()) => {
                    self.metrics.gaps_repaired.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    tracing::warn!(height, attempt, error = %e, "gap repair attempt failed");
                    if attempt < BLOCK_ATTEMPTS && !self.stopped() {
                        tokio::time::sleep(Duration::from_millis(RETRY_STEP_MS * attempt as u64))
                            .await;
                    }
                }
            }
        }
    }

    // ---- live streams ---------------------------------------------------

    async fn finalized_loop(&self) {
        let mut delay = RECONNECT_MIN;
        while !self.stopped() {
            match self.methods.chain_subscribe_finalized_heads().await {
                Ok(mut subscription) => loop {
                    let next = tokio::select! {
                        _ = self.wait_for_shutdown() => return,
                        next = subscription.next() => next,
                    };
                    match next {
                        Some(Ok(header)) => {
                            self.wait_if_paused().await;
                            if self.process_finalized(&header).await {
                                delay = RECONNECT_MIN;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "finalized stream error; reconnecting");
                            break;
                        }
                        None => {
                            tracing::warn!("finalized stream ended; reconnecting");
                            break;
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "finalized subscription failed");
                }
            }
            if self.stopped() {
                return;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(RECONNECT_MAX);
        }
    }

    // Process one finalized head, catching up any heights the stream
    // skipped (several blocks can finalize at once). Returns whether the
    // head itself was processed.
    async fn process_finalized(&self, header: &sublens_rpcs::methods::Header) -> bool {
        let height = header.number;
        let caught_up = self.last_finalized_seen.load(Ordering::Relaxed);
        if caught_up > 0 && height > caught_up + 1 {
            for missed in (caught_up + 1)..height {
                self.ingest_height(missed).await;
            }
        }

        let hash = match header.hash() {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(height, error = %e, "finalized header does not re-hash");
                return false;
            }
        };
        match self.fetch_and_process(hash, BlockStatus::Finalized).await {
            Ok(()) => {
                let _ = self.store.mark_finalized(height as i64).await;
                if let Err(e) = self
                    .store
                    .advance_last_finalized(&self.chain_id, height as i64)
                    .await
                {
                    tracing::warn!(height, error = %e, "could not advance last_finalized");
                }
                self.last_finalized_seen.fetch_max(height, Ordering::Relaxed);
                true
            }
            Err(e) => {
                tracing::warn!(height, error = %e, "finalized block processing failed");
                false
            }
        }
    }

    async fn best_loop(&self) {
        let mut delay = RECONNECT_MIN;
        while !self.stopped() {
            match self.methods.chain_subscribe_new_heads().await {
                Ok(mut subscription) => loop {
                    let next = tokio::select! {
                        _ = self.wait_for_shutdown() => return,
                        next = subscription.next() => next,
                    };
                    match next {
                        Some(Ok(header)) => {
                            self.wait_if_paused().await;
                            if self.process_best(&header).await {
                                delay = RECONNECT_MIN;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "best stream error; reconnecting");
                            break;
                        }
                        None => {
                            tracing::warn!("best stream ended; reconnecting");
                            break;
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "best subscription failed");
                }
            }
            if self.stopped() {
                return;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(RECONNECT_MAX);
        }
    }

    async fn process_best(&self, header: &sublens_rpcs::methods::Header) -> bool {
        let height = header.number;
        let hash = match header.hash() {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(height, error = %e, "best header does not re-hash");
                return false;
            }
        };
        let hash_hex = format!("{hash:#x}");

        // Fork handling: a best row being replaced by a different hash
        // means the chain reorganized under us. Prune the stale best
        // suffix before re-ingesting; finalized rows are never touched.
        match self.store.block_meta(height as i64).await {
            Ok(Some((stored_hash, status))) => {
                if status == "finalized" {
                    tracing::debug!(height, "height already finalized; best head ignored");
                    return true;
                }
                if stored_hash != hash_hex {
                    tracing::info!(
                        height,
                        old = %stored_hash,
                        new = %hash_hex,
                        "best-chain reorganization; pruning stale suffix"
                    );
                    self.metrics.reorgs_handled.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self.store.prune_best_from(height as i64).await {
                        tracing::warn!(height, error = %e, "fork prune failed");
                        return false;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(height, error = %e, "could not check for forks");
                return false;
            }
        }

        match self.fetch_and_process(hash, BlockStatus::Best).await {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .advance_last_best(&self.chain_id, height as i64)
                    .await
                {
                    tracing::warn!(height, error = %e, "could not advance last_best");
                }
                true
            }
            Err(e) => {
                tracing::warn!(height, error = %e, "best block processing failed");
                false
            }
        }
    }
}

// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Throughput counters, exposed on the health endpoint.

use crate::decoder::DecodedBlock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters updated by the pipeline and processor.
#[derive(Debug)]
pub struct Metrics {
    /// Blocks fully processed.
    pub blocks_indexed: AtomicU64,
    /// Extrinsic rows written.
    pub extrinsics_indexed: AtomicU64,
    /// Event rows written.
    pub events_indexed: AtomicU64,
    /// Extrinsics persisted as the `Unknown.unknown` sentinel.
    pub decode_fallbacks: AtomicU64,
    /// Blocks given up on after the per-block retry budget.
    pub gaps_detected: AtomicU64,
    /// Gaps later repaired by a verification pass.
    pub gaps_repaired: AtomicU64,
    /// Best-chain reorganizations handled.
    pub reorgs_handled: AtomicU64,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            blocks_indexed: AtomicU64::new(0),
            extrinsics_indexed: AtomicU64::new(0),
            events_indexed: AtomicU64::new(0),
            decode_fallbacks: AtomicU64::new(0),
            gaps_detected: AtomicU64::new(0),
            gaps_repaired: AtomicU64::new(0),
            reorgs_handled: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl Metrics {
    /// Account one processed block.
    pub fn record_block(&self, block: &DecodedBlock) {
        self.blocks_indexed.fetch_add(1, Ordering::Relaxed);
        self.extrinsics_indexed
            .fetch_add(block.extrinsics.len() as u64, Ordering::Relaxed);
        self.events_indexed
            .fetch_add(block.events.len() as u64, Ordering::Relaxed);
        let fallbacks = block
            .extrinsics
            .iter()
            .filter(|xt| xt.module == "Unknown")
            .count() as u64;
        if fallbacks > 0 {
            self.decode_fallbacks.fetch_add(fallbacks, Ordering::Relaxed);
        }
    }

    /// A point-in-time view for the metrics endpoint.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.started.elapsed();
        let blocks = self.blocks_indexed.load(Ordering::Relaxed);
        MetricsSnapshot {
            uptime_seconds: uptime.as_secs(),
            blocks_indexed: blocks,
            extrinsics_indexed: self.extrinsics_indexed.load(Ordering::Relaxed),
            events_indexed: self.events_indexed.load(Ordering::Relaxed),
            decode_fallbacks: self.decode_fallbacks.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            gaps_repaired: self.gaps_repaired.load(Ordering::Relaxed),
            reorgs_handled: self.reorgs_handled.load(Ordering::Relaxed),
            blocks_per_second: if uptime.as_secs_f64() > 0.0 {
                blocks as f64 / uptime.as_secs_f64()
            } else {
                0.0
            },
        }
    }
}

/// Serialized form of [`Metrics`].
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since startup.
    pub uptime_seconds: u64,
    /// Blocks fully processed.
    pub blocks_indexed: u64,
    /// Extrinsic rows written.
    pub extrinsics_indexed: u64,
    /// Event rows written.
    pub events_indexed: u64,
    /// Sentinel extrinsic records.
    pub decode_fallbacks: u64,
    /// Blocks skipped as gaps.
    pub gaps_detected: u64,
    /// Gaps repaired.
    pub gaps_repaired: u64,
    /// Reorgs handled.
    pub reorgs_handled: u64,
    /// Mean throughput since startup.
    pub blocks_per_second: f64,
}

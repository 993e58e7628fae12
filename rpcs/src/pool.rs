// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A load balancing RPC client that spreads requests over several
//! endpoints.
//!
//! Selection runs in two phases. While any healthy endpoint has fewer than
//! [`WARMUP_SAMPLES`] latency samples the pool round-robins over the
//! healthy set to gather data. After that, an endpoint is picked at random
//! with probability proportional to the inverse of its average latency, so
//! a slow backup keeps receiving a trickle of traffic and its numbers stay
//! current. Endpoints that fail repeatedly are suspended with exponential
//! backoff and revived on demand if nothing better remains.

use crate::client::{RawRpcFuture, RawRpcSubscription, RpcClient, RpcClientT};
use crate::Error;
use rand::Rng;
use serde::Serialize;
use serde_json::value::RawValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Samples each healthy endpoint must accumulate before the pool switches
/// from round-robin to weighted selection.
pub const WARMUP_SAMPLES: usize = 20;

/// How many latency samples are kept per endpoint.
pub const LATENCY_WINDOW: usize = 500;

// Suspension kicks in on the 3rd consecutive failure at 5s and doubles up
// to the 120s ceiling.
const SUSPEND_THRESHOLD: u32 = 3;
const SUSPEND_BASE_SECS: f64 = 5.0;
const SUSPEND_MAX_SECS: f64 = 120.0;

// Floor for the average latency in the weight formula, in milliseconds.
const MIN_AVG_MS: f64 = 0.1;

/// A load balancing [`RpcClientT`] implementation over N endpoints.
#[derive(Clone)]
pub struct BalancedRpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    endpoints: Vec<Endpoint>,
    round_robin: AtomicUsize,
}

struct Endpoint {
    url: String,
    client: RpcClient,
    state: Mutex<EndpointState>,
}

#[derive(Default)]
struct EndpointState {
    consecutive_failures: u32,
    suspended_until: Option<Instant>,
    success_count: u64,
    fail_count: u64,
    latencies_ms: VecDeque<f64>,
}

impl EndpointState {
    fn is_suspended(&self, now: Instant) -> bool {
        self.suspended_until.is_some_and(|until| until > now)
    }

    fn avg_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        Some(self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64)
    }

    fn record_success(&mut self, latency: Duration) {
        self.consecutive_failures = 0;
        self.suspended_until = None;
        self.success_count += 1;
        if self.latencies_ms.len() == LATENCY_WINDOW {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(latency.as_secs_f64() * 1000.0);
    }

    fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.fail_count += 1;
        if self.consecutive_failures >= SUSPEND_THRESHOLD {
            let doublings = self.consecutive_failures - SUSPEND_THRESHOLD;
            let secs =
                (SUSPEND_BASE_SECS * 2f64.powi(doublings as i32)).min(SUSPEND_MAX_SECS);
            self.suspended_until = Some(now + Duration::from_secs_f64(secs));
        }
    }
}

impl BalancedRpcClient {
    /// Build a pool over already-constructed clients.
    ///
    /// # Panics
    ///
    /// Panics if `endpoints` is empty.
    pub fn new(endpoints: Vec<(String, RpcClient)>) -> Self {
        assert!(
            !endpoints.is_empty(),
            "At least one endpoint must be provided"
        );
        BalancedRpcClient {
            inner: Arc::new(Inner {
                endpoints: endpoints
                    .into_iter()
                    .map(|(url, client)| Endpoint {
                        url,
                        client,
                        state: Mutex::new(EndpointState::default()),
                    })
                    .collect(),
                round_robin: AtomicUsize::new(0),
            }),
        }
    }

    /// Connect to each URL and build a pool over the resulting clients.
    pub async fn connect<S: AsRef<str>>(urls: &[S]) -> Result<Self, Error> {
        let mut endpoints = Vec::with_capacity(urls.len());
        for url in urls {
            let client = RpcClient::from_url(url.as_ref()).await?;
            endpoints.push((url.as_ref().to_owned(), client));
        }
        if endpoints.is_empty() {
            return Err(Error::AllEndpointsFailed { attempts: 0 });
        }
        Ok(Self::new(endpoints))
    }

    /// How many endpoints the pool routes over.
    pub fn len(&self) -> usize {
        self.inner.endpoints.len()
    }

    /// `true` if the pool has no endpoints; never the case in practice.
    pub fn is_empty(&self) -> bool {
        self.inner.endpoints.is_empty()
    }

    /// Pick an endpoint for the next attempt, ignoring the ones already
    /// tried during this call.
    fn pick(&self, exclude: &[usize]) -> Option<usize> {
        let now = Instant::now();
        let endpoints = &self.inner.endpoints;

        // (index, samples, avg latency) for every non-suspended candidate.
        let mut eligible = Vec::with_capacity(endpoints.len());
        for (at, endpoint) in endpoints.iter().enumerate() {
            if exclude.contains(&at) {
                continue;
            }
            let state = endpoint.state.lock().expect("endpoint lock poisoned");
            if state.is_suspended(now) {
                continue;
            }
            eligible.push((at, state.latencies_ms.len(), state.avg_latency_ms()));
        }

        if eligible.is_empty() {
            // Everything usable is suspended; revive whichever suspension
            // ends first rather than failing the call outright.
            return endpoints
                .iter()
                .enumerate()
                .filter(|(at, _)| !exclude.contains(at))
                .filter_map(|(at, endpoint)| {
                    let state = endpoint.state.lock().expect("endpoint lock poisoned");
                    state.suspended_until.map(|until| (until, at))
                })
                .min_by_key(|(until, _)| *until)
                .map(|(_, at)| at);
        }

        // Warm-up phase: round-robin until every healthy endpoint has
        // enough samples for the weights to mean something.
        if eligible.iter().any(|(_, samples, _)| *samples < WARMUP_SAMPLES) {
            let turn = self.inner.round_robin.fetch_add(1, Ordering::Relaxed);
            return Some(eligible[turn % eligible.len()].0);
        }

        // Weighted phase: inverse-latency weights, uniform random within
        // the weight distribution rather than strict turn-taking.
        let weights: Vec<f64> = eligible
            .iter()
            .map(|(_, _, avg)| 1.0 / avg.expect("warm-up guarantees samples").max(MIN_AVG_MS))
            .collect();
        let total: f64 = weights.iter().sum();
        let mut target = rand::thread_rng().gen_range(0.0..total);
        for ((at, _, _), weight) in eligible.iter().zip(&weights) {
            if target < *weight {
                return Some(*at);
            }
            target -= weight;
        }
        Some(eligible.last().expect("eligible is non-empty").0)
    }

    fn record(&self, at: usize, outcome: Result<Duration, ()>) {
        let endpoint = &self.inner.endpoints[at];
        let mut state = endpoint.state.lock().expect("endpoint lock poisoned");
        match outcome {
            Ok(latency) => state.record_success(latency),
            Err(()) => {
                state.record_failure(Instant::now());
                if let Some(until) = state.suspended_until {
                    tracing::warn!(
                        url = %endpoint.url,
                        consecutive_failures = state.consecutive_failures,
                        suspended_for = ?until.saturating_duration_since(Instant::now()),
                        "endpoint suspended after repeated failures"
                    );
                }
            }
        }
    }

    /// A point-in-time view of every endpoint's health and routing weight.
    pub fn snapshot(&self) -> PoolSnapshot {
        let now = Instant::now();
        let mut snapshots: Vec<EndpointSnapshot> = self
            .inner
            .endpoints
            .iter()
            .map(|endpoint| {
                let state = endpoint.state.lock().expect("endpoint lock poisoned");
                let mut sorted: Vec<f64> = state.latencies_ms.iter().copied().collect();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let percentile = |p: f64| -> Option<f64> {
                    if sorted.is_empty() {
                        return None;
                    }
                    let at = ((sorted.len() as f64 - 1.0) * p).round() as usize;
                    Some(sorted[at])
                };
                EndpointSnapshot {
                    url: endpoint.url.clone(),
                    suspended_ms: state
                        .suspended_until
                        .filter(|until| *until > now)
                        .map(|until| until.saturating_duration_since(now).as_millis() as u64),
                    consecutive_failures: state.consecutive_failures,
                    success_count: state.success_count,
                    fail_count: state.fail_count,
                    samples: state.latencies_ms.len(),
                    avg_latency_ms: state.avg_latency_ms(),
                    p50_latency_ms: percentile(0.50),
                    p95_latency_ms: percentile(0.95),
                    max_latency_ms: sorted.last().copied(),
                    weight: 0.0,
                }
            })
            .collect();

        // Normalized routing weights over the currently healthy set.
        let total: f64 = snapshots
            .iter()
            .filter(|s| s.suspended_ms.is_none())
            .filter_map(|s| s.avg_latency_ms)
            .map(|avg| 1.0 / avg.max(MIN_AVG_MS))
            .sum();
        if total > 0.0 {
            for snapshot in &mut snapshots {
                if snapshot.suspended_ms.is_none() {
                    if let Some(avg) = snapshot.avg_latency_ms {
                        snapshot.weight = (1.0 / avg.max(MIN_AVG_MS)) / total;
                    }
                }
            }
        }
        PoolSnapshot {
            endpoints: snapshots,
        }
    }
}

/// Health and routing information for the whole pool.
#[derive(Clone, Debug, Serialize)]
pub struct PoolSnapshot {
    /// One entry per configured endpoint.
    pub endpoints: Vec<EndpointSnapshot>,
}

/// Health and routing information for one endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct EndpointSnapshot {
    /// The endpoint URL.
    pub url: String,
    /// Remaining suspension time, if currently suspended.
    pub suspended_ms: Option<u64>,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Cumulative successful calls.
    pub success_count: u64,
    /// Cumulative failed calls.
    pub fail_count: u64,
    /// Latency samples currently in the ring.
    pub samples: usize,
    /// Mean latency over the ring.
    pub avg_latency_ms: Option<f64>,
    /// Median latency.
    pub p50_latency_ms: Option<f64>,
    /// 95th percentile latency.
    pub p95_latency_ms: Option<f64>,
    /// Worst latency in the ring.
    pub max_latency_ms: Option<f64>,
    /// Normalized routing weight at snapshot time; 0 while suspended or
    /// during warm-up.
    pub weight: f64,
}

impl RpcClientT for BalancedRpcClient {
    fn request_raw<'a>(
        &'a self,
        method: &'a str,
        params: Option<Box<RawValue>>,
    ) -> RawRpcFuture<'a, Box<RawValue>> {
        Box::pin(async move {
            let mut tried = Vec::new();
            while tried.len() < self.inner.endpoints.len() {
                let Some(at) = self.pick(&tried) else { break };
                tried.push(at);
                let endpoint = &self.inner.endpoints[at];
                let started = Instant::now();
                match endpoint.client.request_raw(method, params.clone()).await {
                    Ok(res) => {
                        self.record(at, Ok(started.elapsed()));
                        return Ok(res);
                    }
                    Err(e) => {
                        self.record(at, Err(()));
                        tracing::debug!(
                            url = %endpoint.url, method, error = %e,
                            "endpoint attempt failed; trying another"
                        );
                    }
                }
            }
            Err(Error::AllEndpointsFailed {
                attempts: tried.len(),
            })
        })
    }

    fn subscribe_raw<'a>(
        &'a self,
        sub: &'a str,
        params: Option<Box<RawValue>>,
        unsub: &'a str,
    ) -> RawRpcFuture<'a, RawRpcSubscription> {
        Box::pin(async move {
            let mut tried = Vec::new();
            while tried.len() < self.inner.endpoints.len() {
                let Some(at) = self.pick(&tried) else { break };
                tried.push(at);
                let endpoint = &self.inner.endpoints[at];
                let started = Instant::now();
                match endpoint
                    .client
                    .subscribe_raw(sub, params.clone(), unsub)
                    .await
                {
                    Ok(res) => {
                        self.record(at, Ok(started.elapsed()));
                        return Ok(res);
                    }
                    Err(e) => {
                        self.record(at, Err(()));
                        tracing::debug!(
                            url = %endpoint.url, sub, error = %e,
                            "endpoint subscribe failed; trying another"
                        );
                    }
                }
            }
            Err(Error::AllEndpointsFailed {
                attempts: tried.len(),
            })
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::MockRpcClient;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicU64;

    fn counting_endpoint(ok: bool) -> (Arc<AtomicU64>, RpcClient) {
        let calls = Arc::new(AtomicU64::new(0));
        let calls2 = calls.clone();
        let client = MockRpcClient::new(move |_method, _params| {
            calls2.fetch_add(1, Ordering::Relaxed);
            if ok {
                Ok(RawValue::from_string("1".into()).expect("valid JSON"))
            } else {
                Err(Error::RequestRejected("nope".into()))
            }
        });
        (calls, RpcClient::new(client))
    }

    fn pool_of(clients: Vec<(Arc<AtomicU64>, RpcClient)>) -> (Vec<Arc<AtomicU64>>, BalancedRpcClient) {
        let mut counters = Vec::new();
        let mut endpoints = Vec::new();
        for (n, (counter, client)) in clients.into_iter().enumerate() {
            counters.push(counter);
            endpoints.push((format!("ws://localhost:{}", 9000 + n), client));
        }
        (counters, BalancedRpcClient::new(endpoints))
    }

    #[tokio::test]
    async fn warm_up_is_round_robin() {
        let (counters, pool) =
            pool_of(vec![counting_endpoint(true), counting_endpoint(true), counting_endpoint(true)]);
        for _ in 0..30 {
            pool.request_raw("foo", None).await.unwrap();
        }
        // Below 20 samples each, every endpoint gets exactly its turn.
        for counter in &counters {
            assert_eq!(counter.load(Ordering::Relaxed), 10);
        }
    }

    #[tokio::test]
    async fn failing_endpoint_fails_over() {
        let (counters, pool) = pool_of(vec![counting_endpoint(false), counting_endpoint(true)]);
        for _ in 0..3 {
            pool.request_raw("foo", None).await.unwrap();
        }
        // The bad endpoint was tried but the good one served every call.
        assert!(counters[0].load(Ordering::Relaxed) >= 1);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.endpoints[1].success_count, 3);
        // Three consecutive failures suspend with at least the 5s base.
        let bad = &snapshot.endpoints[0];
        assert_eq!(bad.consecutive_failures, 3);
        let suspended = bad.suspended_ms.expect("suspended after 3 failures");
        assert!((4_000..=120_000).contains(&suspended), "{suspended}");
    }

    #[tokio::test]
    async fn all_endpoints_failing_errors_out() {
        let (_, pool) = pool_of(vec![counting_endpoint(false), counting_endpoint(false)]);
        let err = pool.request_raw("foo", None).await.unwrap_err();
        assert_matches!(err, Error::AllEndpointsFailed { attempts: 2 });
    }

    #[tokio::test]
    async fn suspended_endpoints_are_skipped_then_revived() {
        let (counters, pool) = pool_of(vec![counting_endpoint(false), counting_endpoint(true)]);
        // Drive the bad endpoint into suspension.
        for _ in 0..5 {
            pool.request_raw("foo", None).await.unwrap();
        }
        let tried_before = counters[0].load(Ordering::Relaxed);
        // While suspended, it gets no traffic at all.
        for _ in 0..10 {
            pool.request_raw("foo", None).await.unwrap();
        }
        assert_eq!(counters[0].load(Ordering::Relaxed), tried_before);

        // If every endpoint is suspended, the earliest suspension is
        // revived rather than failing the call.
        {
            let now = Instant::now();
            for (n, endpoint) in pool.inner.endpoints.iter().enumerate() {
                let mut state = endpoint.state.lock().unwrap();
                state.suspended_until = Some(now + Duration::from_secs(60 + n as u64));
            }
        }
        // Endpoint 0 has the earliest deadline so it takes the first
        // attempt, fails, and endpoint 1 is revived next and serves it.
        pool.request_raw("foo", None).await.unwrap();
        assert_eq!(counters[0].load(Ordering::Relaxed), tried_before + 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let mut state = EndpointState::default();
        let now = Instant::now();
        let mut last = Duration::ZERO;
        for _ in 0..3 {
            state.record_failure(now);
        }
        let first = state.suspended_until.unwrap().duration_since(now);
        assert_eq!(first.as_secs(), 5);
        for _ in 0..10 {
            state.record_failure(now);
            let d = state.suspended_until.unwrap().duration_since(now);
            assert!(d >= last);
            last = d;
        }
        assert_eq!(last.as_secs(), 120);

        // One success clears everything.
        state.record_success(Duration::from_millis(3));
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.suspended_until.is_none());
    }

    #[test]
    fn weighted_phase_shares_by_inverse_latency() {
        let (_, pool) = pool_of(vec![
            counting_endpoint(true),
            counting_endpoint(true),
            counting_endpoint(true),
        ]);
        // Seed the rings directly: endpoint 0 is twice as slow.
        for (n, endpoint) in pool.inner.endpoints.iter().enumerate() {
            let mut state = endpoint.state.lock().unwrap();
            let latency = if n == 0 { 20.0 } else { 10.0 };
            for _ in 0..WARMUP_SAMPLES {
                state.latencies_ms.push_back(latency);
            }
        }
        let mut slow_hits = 0u32;
        let rounds = 10_000;
        for _ in 0..rounds {
            if pool.pick(&[]) == Some(0) {
                slow_hits += 1;
            }
        }
        // 1/20 / (1/20 + 1/10 + 1/10) = 0.2, within statistical noise.
        let share = slow_hits as f64 / rounds as f64;
        assert!((0.18..=0.22).contains(&share), "share was {share}");
    }

    #[test]
    fn snapshot_reports_percentiles_and_weights() {
        let (_, pool) = pool_of(vec![counting_endpoint(true), counting_endpoint(true)]);
        for endpoint in &pool.inner.endpoints {
            let mut state = endpoint.state.lock().unwrap();
            for latency in 1..=100 {
                state.latencies_ms.push_back(latency as f64);
            }
        }
        let snapshot = pool.snapshot();
        let first = &snapshot.endpoints[0];
        assert_eq!(first.samples, 100);
        assert_eq!(first.max_latency_ms, Some(100.0));
        assert!(first.p50_latency_ms.unwrap() >= 49.0 && first.p50_latency_ms.unwrap() <= 52.0);
        assert!(first.p95_latency_ms.unwrap() >= 94.0);
        // Equal latencies, equal weights.
        assert!((snapshot.endpoints[0].weight - 0.5).abs() < 1e-9);
        assert!((snapshot.endpoints[1].weight - 0.5).abs() < 1e-9);
    }
}

//! Component C — ML Prediction Manager (§4.C)
//!
//! Keeps a bounded rolling price history per `(chain, pairKey)` so the
//! out-of-scope ML predictor always sees a recent window, and pre-fetches a
//! batch of predictions once per detection tick behind a short TTL cache so
//! a slow predictor call can never stall the hot path past `maxLatencyMs`.

use crate::collaborators::{MlPredictor, Prediction};
use dashmap::DashMap;
use moka::sync::Cache;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const MAX_SAMPLES_PER_KEY: usize = 100;
const MAX_KEYS: u64 = 10_000;
const HISTORY_TTL_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct MlPredictionManagerConfig {
    /// Per-call predictor timeout (default 50ms).
    pub max_latency_ms: u64,
    /// TTL on the prediction cache (default 1s).
    pub cache_ttl: Duration,
}

impl Default for MlPredictionManagerConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: 50,
            cache_ttl: Duration::from_secs(1),
        }
    }
}

/// An input tuple for a batched prefetch call.
#[derive(Debug, Clone)]
pub struct PricePrefetchInput {
    pub chain: String,
    pub pair_key: String,
    pub price: f64,
}

fn history_key(chain: &str, pair_key: &str) -> String {
    format!("{chain}:{pair_key}")
}

/// A rolling price buffer for one `(chain, pairKey)`, plus the timestamp of
/// its last write so stale keys can be pruned on a TTL, not just a count cap.
struct HistoryBucket {
    samples: VecDeque<f64>,
    last_update_ms: i64,
}

pub struct MlPredictionManager {
    predictor: Arc<dyn MlPredictor>,
    config: MlPredictionManagerConfig,
    history: DashMap<String, Mutex<HistoryBucket>>,
    cache: Cache<String, Option<Prediction>>,
    ready: AtomicBool,
    update_count: AtomicU64,
}

impl MlPredictionManager {
    pub fn new(predictor: Arc<dyn MlPredictor>, config: MlPredictionManagerConfig) -> Self {
        let cache = Cache::builder().time_to_live(config.cache_ttl).build();
        Self {
            predictor,
            config,
            history: DashMap::new(),
            cache,
            ready: AtomicBool::new(false),
            update_count: AtomicU64::new(0),
        }
    }

    /// Probes the predictor's readiness. Never fails the caller — a
    /// predictor that isn't ready yet just leaves `is_ready()` false and the
    /// detection tick skips prefetching this cycle.
    pub fn initialize(&self) -> bool {
        let ready = self.predictor.is_ready();
        self.ready.store(ready, Ordering::SeqCst);
        ready
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Appends one observed price to the rolling buffer for `(chain,
    /// pairKey)`, capped at 100 samples and 10,000 distinct keys, and runs
    /// TTL-based pruning every 100th call so a key never seen again is
    /// dropped within `HISTORY_TTL_MS` instead of lingering indefinitely.
    pub fn track_price_update(&self, chain: &str, pair_key: &str, price: f64) {
        let key = history_key(chain, pair_key);
        let now = crate::time::now_ms();
        if !self.history.contains_key(&key) && self.history.len() as u64 >= MAX_KEYS {
            warn!(key, "history key cap reached, dropping oldest to make room");
            if let Some(entry) = self.history.iter().next() {
                let to_remove = entry.key().clone();
                drop(entry);
                self.history.remove(&to_remove);
            }
        }
        let bucket = self.history.entry(key).or_insert_with(|| {
            Mutex::new(HistoryBucket {
                samples: VecDeque::new(),
                last_update_ms: now,
            })
        });
        {
            let mut bucket = bucket.lock().unwrap();
            bucket.samples.push_back(price);
            if bucket.samples.len() > MAX_SAMPLES_PER_KEY {
                bucket.samples.pop_front();
            }
            bucket.last_update_ms = now;
        }

        let count = self.update_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count % 100 == 0 {
            self.prune_stale(now);
        }
    }

    /// Drops any key whose buffer hasn't been touched in `HISTORY_TTL_MS`.
    fn prune_stale(&self, now: i64) {
        self.history
            .retain(|_, bucket| now - bucket.lock().unwrap().last_update_ms < HISTORY_TTL_MS);
    }

    fn recent_prices(&self, chain: &str, pair_key: &str) -> Vec<f64> {
        let key = history_key(chain, pair_key);
        self.history
            .get(&key)
            .map(|bucket| bucket.lock().unwrap().samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Deduplicates inputs by `"chain:pairKey"`, issues one predictor call
    /// per distinct key with a `maxLatencyMs` timeout, caches every result
    /// (including timeouts/errors, as `None`) for `cacheTtl`, and returns the
    /// assembled map.
    pub async fn prefetch_predictions(
        &self,
        inputs: &[PricePrefetchInput],
    ) -> HashMap<String, Option<Prediction>> {
        let mut seen = HashMap::new();
        for input in inputs {
            seen.entry(history_key(&input.chain, &input.pair_key))
                .or_insert_with(|| input.clone());
        }

        let mut results = HashMap::with_capacity(seen.len());
        let mut calls = Vec::with_capacity(seen.len());
        for (key, input) in seen {
            let recent = self.recent_prices(&input.chain, &input.pair_key);
            calls.push(async move {
                let prediction = tokio::time::timeout(
                    Duration::from_millis(self.config.max_latency_ms),
                    self.predictor
                        .predict_price(&input.chain, &input.pair_key, &recent),
                )
                .await;
                let prediction = match prediction {
                    Ok(Ok(p)) => Some(p),
                    Ok(Err(e)) => {
                        warn!(key = %key, error = %e, "ml predictor call failed");
                        None
                    }
                    Err(_) => {
                        warn!(key = %key, "ml predictor call timed out");
                        None
                    }
                };
                (key, prediction)
            });
        }

        let outcomes = futures::future::join_all(calls).await;
        for (key, prediction) in outcomes {
            self.cache.insert(key.clone(), prediction);
            results.insert(key, prediction);
        }
        results
    }

    pub fn get_cached_prediction(&self, chain: &str, pair_key: &str) -> Option<Prediction> {
        self.cache.get(&history_key(chain, pair_key)).flatten()
    }

    pub async fn cleanup(&self) -> anyhow::Result<()> {
        self.predictor.cleanup_or_noop().await
    }

    pub fn clear(&self) {
        self.history.clear();
        self.cache.invalidate_all();
    }
}

/// Small extension so `MlPredictionManager::cleanup` has something to call —
/// the `MlPredictor` trait itself has no `cleanup` hook (§6 only specifies
/// `isReady`/`predictPrice`), unlike `BridgePredictor` which does.
#[async_trait::async_trait]
trait MlPredictorCleanupExt {
    async fn cleanup_or_noop(&self) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl<T: MlPredictor + ?Sized> MlPredictorCleanupExt for T {
    async fn cleanup_or_noop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

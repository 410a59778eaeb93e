//! Component B — Price Data Manager (§4.B)
//!
//! A three-level `chain -> dex -> pairKey -> latest` store, plus a
//! cross-chain index (`byToken`) keyed by normalized pair key so the
//! detection tick can pull every chain's view of "WETH/USDC" in one lookup
//! regardless of which DEX or alias spelling produced it.

use crate::normalize::normalized_pair_key;
use crate::types::{IndexedSnapshot, PricePoint, PriceUpdate};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct PriceDataManagerConfig {
    /// Evict entries older than this (ms). Default 5 min.
    pub max_price_age_ms: i64,
}

impl Default for PriceDataManagerConfig {
    fn default() -> Self {
        Self {
            max_price_age_ms: 5 * 60 * 1000,
        }
    }
}

type DexMap = HashMap<String, PriceUpdate>;
type ChainMap = HashMap<String, DexMap>;

pub struct PriceDataManager {
    config: PriceDataManagerConfig,
    // chain -> dex -> pairKey -> latest
    store: RwLock<HashMap<String, ChainMap>>,
    update_count: std::sync::atomic::AtomicU64,
}

impl PriceDataManager {
    pub fn new(config: PriceDataManagerConfig) -> Self {
        Self {
            config,
            store: RwLock::new(HashMap::new()),
            update_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Upserts `update` into `chain -> dex -> pairKey -> latest`, then runs
    /// cleanup every 100th call.
    pub fn handle_update(&self, update: PriceUpdate) {
        {
            let mut store = self.store.write().unwrap();
            let chain_map = store.entry(update.chain.clone()).or_default();
            let dex_map = chain_map.entry(update.dex.clone()).or_default();
            dex_map.insert(update.pair_key.clone(), update);
        }

        let count = self
            .update_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        if count % 100 == 0 {
            self.cleanup();
        }
    }

    /// Evicts entries older than `maxPriceAgeMs` and collapses any dex/chain
    /// map left empty by eviction.
    fn cleanup(&self) {
        let now = crate::time::now_ms();
        let max_age = self.config.max_price_age_ms;
        let mut store = self.store.write().unwrap();

        for dex_map in store.values_mut() {
            dex_map.retain(|_dex, pair_map| {
                pair_map.retain(|_pair_key, update| now - update.timestamp < max_age);
                !pair_map.is_empty()
            });
        }
        store.retain(|_chain, dex_map| !dex_map.is_empty());
    }

    pub fn create_snapshot(&self) -> Vec<PricePoint> {
        let store = self.store.read().unwrap();
        let mut points = Vec::new();
        for (chain, dex_map) in store.iter() {
            for (dex, pair_map) in dex_map.iter() {
                for (pair_key, update) in pair_map.iter() {
                    points.push(PricePoint {
                        chain: chain.clone(),
                        dex: dex.clone(),
                        pair_key: pair_key.clone(),
                        price: update.price,
                        update: update.clone(),
                    });
                }
            }
        }
        points
    }

    /// Builds the hot-path structure for one detection tick: a flat
    /// `tokenPairs` list, a cross-chain `byToken` index keyed by normalized
    /// pair key, and a `byChain` index. Immutable for the tick's duration —
    /// callers should build one per tick, not cache it across ticks.
    pub fn create_indexed_snapshot(&self) -> IndexedSnapshot {
        let points = self.create_snapshot();
        let mut token_pairs = Vec::new();
        let mut by_token: HashMap<String, Vec<PricePoint>> = HashMap::new();
        let mut by_chain: HashMap<String, Vec<PricePoint>> = HashMap::new();

        for point in points {
            if !token_pairs.contains(&point.pair_key) {
                token_pairs.push(point.pair_key.clone());
            }
            if let Some(key) = normalized_pair_key(&point.pair_key) {
                by_token.entry(key).or_default().push(point.clone());
            }
            by_chain.entry(point.chain.clone()).or_default().push(point);
        }

        IndexedSnapshot {
            token_pairs,
            by_token,
            by_chain,
            timestamp: crate::time::now_ms(),
        }
    }

    pub fn get_pair_count(&self) -> usize {
        let store = self.store.read().unwrap();
        store
            .values()
            .flat_map(|dex_map| dex_map.values())
            .map(|pair_map| pair_map.len())
            .sum()
    }

    pub fn get_chains(&self) -> Vec<String> {
        self.store.read().unwrap().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.store.write().unwrap().clear();
        self.update_count.store(0, std::sync::atomic::Ordering::SeqCst);
    }
}

//! In-process reference implementations of the collaborator traits.
//!
//! These exist so the crate builds and its detection pipeline is
//! exercisable without a live chain connector, ML service, or bridge
//! predictor attached — they are intentionally minimal, not production
//! collaborators. A real deployment swaps these for real clients behind the
//! same traits.

use super::{
    BridgeModelUpdate, BridgePrediction, BridgePredictor, MlPredictor, OraclePrice, Prediction,
    PriceOracle, StreamClient, StreamMessage, WhaleTracker,
};
use crate::types::{PredictionDirection, WhaleActivitySummary, WhaleBias, WhaleTransaction};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Fixed or manually-seeded spot prices, e.g. for tests or a bring-up
/// environment with no real oracle yet.
#[derive(Default)]
pub struct InMemoryPriceOracle {
    prices: DashMap<String, f64>,
}

impl InMemoryPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl PriceOracle for InMemoryPriceOracle {
    async fn get_price(&self, symbol: &str) -> anyhow::Result<OraclePrice> {
        let price = self
            .prices
            .get(symbol)
            .map(|p| *p.value())
            .ok_or_else(|| anyhow::anyhow!("no price for {symbol}"))?;
        Ok(OraclePrice {
            price,
            is_stale: false,
            source: "in-memory".to_string(),
            timestamp: crate::time::now_ms(),
        })
    }
}

const WHALE_WINDOW_MS: i64 = 5 * 60 * 1000;
const SUPER_WHALE_USD: f64 = 500_000.0;

/// Aggregates recorded whale transactions into a rolling 5-minute window per
/// (token, chain), matching the shape the real tracker would expose.
#[derive(Default)]
pub struct InMemoryWhaleTracker {
    transactions: Mutex<Vec<WhaleTransaction>>,
}

impl InMemoryWhaleTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WhaleTracker for InMemoryWhaleTracker {
    async fn record_transaction(&self, tx: &WhaleTransaction) -> anyhow::Result<()> {
        self.transactions.lock().unwrap().push(tx.clone());
        Ok(())
    }

    async fn get_activity_summary(
        &self,
        token: &str,
        chain: &str,
    ) -> anyhow::Result<WhaleActivitySummary> {
        let now = crate::time::now_ms();
        let txs = self.transactions.lock().unwrap();
        let window: Vec<WhaleTransaction> = txs
            .iter()
            .filter(|t| {
                t.token == token && t.chain == chain && now - t.timestamp <= WHALE_WINDOW_MS
            })
            .cloned()
            .collect();

        let mut buy_volume_usd = 0.0;
        let mut sell_volume_usd = 0.0;
        let mut super_whale_count = 0;
        for t in &window {
            match t.direction {
                crate::types::TradeDirection::Buy => buy_volume_usd += t.usd_value,
                crate::types::TradeDirection::Sell => sell_volume_usd += t.usd_value,
            }
            if t.usd_value >= SUPER_WHALE_USD {
                super_whale_count += 1;
            }
        }
        let net_flow_usd = buy_volume_usd - sell_volume_usd;
        let dominant_direction = if net_flow_usd > buy_volume_usd.max(sell_volume_usd) * 0.1 {
            WhaleBias::Bullish
        } else if net_flow_usd < -(buy_volume_usd.max(sell_volume_usd) * 0.1) {
            WhaleBias::Bearish
        } else {
            WhaleBias::Neutral
        };

        Ok(WhaleActivitySummary {
            dominant_direction,
            buy_volume_usd,
            sell_volume_usd,
            net_flow_usd,
            super_whale_count,
            transaction_count: window.len() as u32,
            recent_transactions: window,
        })
    }
}

/// No routes, no predictions, by default — this is the "cold start" shape
/// the Bridge Cost Estimator's ladder (§4.A) is designed to fall through.
/// Routes/predictions can be seeded for tests.
#[derive(Default)]
pub struct InMemoryBridgePredictor {
    routes: DashMap<(String, String), Vec<String>>,
    predictions: DashMap<(String, String), BridgePrediction>,
    model_updates: Mutex<Vec<BridgeModelUpdate>>,
}

impl InMemoryBridgePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_route(&self, source: &str, target: &str, bridge: &str) {
        self.routes
            .entry((source.to_string(), target.to_string()))
            .or_default()
            .push(bridge.to_string());
    }

    pub fn seed_prediction(&self, source: &str, target: &str, prediction: BridgePrediction) {
        self.predictions
            .insert((source.to_string(), target.to_string()), prediction);
    }

    pub fn model_update_count(&self) -> usize {
        self.model_updates.lock().unwrap().len()
    }
}

#[async_trait]
impl BridgePredictor for InMemoryBridgePredictor {
    async fn get_available_routes(&self, source: &str, target: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .routes
            .get(&(source.to_string(), target.to_string()))
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn predict_optimal_bridge(
        &self,
        source: &str,
        target: &str,
        _amount: f64,
        _urgency: &str,
    ) -> anyhow::Result<Option<BridgePrediction>> {
        Ok(self
            .predictions
            .get(&(source.to_string(), target.to_string()))
            .map(|p| p.clone()))
    }

    async fn update_model(&self, update: BridgeModelUpdate) -> anyhow::Result<()> {
        self.model_updates.lock().unwrap().push(update);
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A trend-following stand-in for the real ML service: direction follows
/// the sign of the change between the first and last sample in the supplied
/// window, confidence scales with the magnitude of that change. Good enough
/// to exercise the confidence-calculator's ML adjustment path in tests.
pub struct InMemoryMlPredictor {
    ready: AtomicBool,
}

impl Default for InMemoryMlPredictor {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(true),
        }
    }
}

impl InMemoryMlPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl MlPredictor for InMemoryMlPredictor {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn predict_price(
        &self,
        _chain: &str,
        _pair_key: &str,
        recent_prices: &[f64],
    ) -> anyhow::Result<Prediction> {
        if recent_prices.len() < 2 {
            return Ok(Prediction {
                direction: PredictionDirection::Sideways,
                confidence: 0.5,
            });
        }
        let first = recent_prices[0];
        let last = *recent_prices.last().unwrap();
        if first <= 0.0 {
            return Ok(Prediction {
                direction: PredictionDirection::Sideways,
                confidence: 0.5,
            });
        }
        let change = (last - first) / first;
        let direction = if change > 0.002 {
            PredictionDirection::Up
        } else if change < -0.002 {
            PredictionDirection::Down
        } else {
            PredictionDirection::Sideways
        };
        let confidence = change.abs().min(0.5) * 2.0;
        Ok(Prediction {
            direction,
            confidence: confidence.max(0.5),
        })
    }
}

/// An in-process stand-in for a Redis-stream-backed `StreamClient`: every
/// stream is a plain append-only `Vec`, acked entries are removed, and the
/// legacy health key lives in a side map. No consumer-group semantics beyond
/// "already delivered once" tracking — good enough to exercise the
/// publisher/consumer contracts without a live Redis instance.
#[derive(Default)]
pub struct InMemoryStreamClient {
    streams: DashMap<String, Vec<(String, Value)>>,
    kv: DashMap<String, String>,
    next_id: AtomicU64,
}

impl InMemoryStreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_len(&self, stream: &str) -> usize {
        self.streams.get(stream).map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StreamClient for InMemoryStreamClient {
    async fn create_consumer_group(&self, stream: &str, _group: &str) -> anyhow::Result<()> {
        self.streams.entry(stream.to_string()).or_default();
        Ok(())
    }

    async fn xreadgroup(
        &self,
        stream: &str,
        _group: &str,
        _consumer: &str,
        count: usize,
        _block_ms: u64,
    ) -> anyhow::Result<Vec<StreamMessage>> {
        let entries = self.streams.get(stream);
        let Some(entries) = entries else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .take(count)
            .map(|(id, payload)| StreamMessage {
                id: id.clone(),
                payload: payload.clone(),
            })
            .collect())
    }

    async fn xack(&self, stream: &str, _group: &str, id: &str) -> anyhow::Result<()> {
        if let Some(mut entries) = self.streams.get_mut(stream) {
            entries.retain(|(entry_id, _)| entry_id != id);
        }
        Ok(())
    }

    async fn xadd_with_limit(&self, stream: &str, payload: &Value, cap: usize) -> anyhow::Result<String> {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut entries = self.streams.entry(stream.to_string()).or_default();
        entries.push((id.clone(), payload.clone()));
        if entries.len() > cap {
            let excess = entries.len() - cap;
            entries.drain(0..excess);
        }
        Ok(id)
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.kv.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        self.kv.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeDirection;

    #[tokio::test]
    async fn whale_tracker_aggregates_window() {
        let tracker = InMemoryWhaleTracker::new();
        let tx = WhaleTransaction {
            transaction_hash: "0x1".into(),
            wallet_address: "0xabc".into(),
            chain: "ethereum".into(),
            dex: "uniswap_v3".into(),
            token: "WETH".into(),
            direction: TradeDirection::Buy,
            usd_value: 600_000.0,
            amount: "200".into(),
            impact: 0.01,
            timestamp: crate::time::now_ms(),
        };
        tracker.record_transaction(&tx).await.unwrap();
        let summary = tracker
            .get_activity_summary("WETH", "ethereum")
            .await
            .unwrap();
        assert_eq!(summary.transaction_count, 1);
        assert_eq!(summary.super_whale_count, 1);
        assert_eq!(summary.dominant_direction, WhaleBias::Bullish);
    }

    #[tokio::test]
    async fn oracle_rejects_unknown_symbol() {
        let oracle = InMemoryPriceOracle::new();
        assert!(oracle.get_price("ZZZ").await.is_err());
    }
}

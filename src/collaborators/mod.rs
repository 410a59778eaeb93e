//! Collaborator interfaces (§6)
//!
//! Everything in this module is an *external* contract: RPC/WS chain
//! connectors, the learned bridge predictor's training loop, the ML
//! price-movement predictor's model internals, and the whale activity
//! tracker's own aggregation logic are explicitly out of scope (§1). The
//! core only depends on these narrow `async_trait` interfaces.
//!
//! `memory` provides minimal in-process reference implementations so the
//! crate builds, runs its detection loop, and is testable standalone.
//! `redis_stream` provides the one collaborator this crate does carry a
//! concrete production implementation for — the stream client — since §6
//! pins down its wire semantics precisely enough (`xreadgroup`, `xack`,
//! capped `xadd`) that "out of scope" would leave no way to run the system
//! at all.

pub mod memory;
pub mod redis_stream;

use crate::types::{PredictionDirection, WhaleActivitySummary, WhaleTransaction};
use async_trait::async_trait;
use serde_json::Value;

/// A spot price lookup result from the price oracle.
#[derive(Debug, Clone)]
pub struct OraclePrice {
    pub price: f64,
    pub is_stale: bool,
    pub source: String,
    pub timestamp: i64,
}

/// `getPrice(symbol) -> {price, isStale, source, timestamp}` (§6).
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_price(&self, symbol: &str) -> anyhow::Result<OraclePrice>;
}

/// `recordTransaction` / `getActivitySummary` (§6). The tracker owns its own
/// aggregation window; the core only ever reads its summaries.
#[async_trait]
pub trait WhaleTracker: Send + Sync {
    async fn record_transaction(&self, tx: &WhaleTransaction) -> anyhow::Result<()>;
    async fn get_activity_summary(
        &self,
        token: &str,
        chain: &str,
    ) -> anyhow::Result<WhaleActivitySummary>;
}

/// One bridge's optimal-route prediction, in wei on the source chain.
#[derive(Debug, Clone)]
pub struct BridgePrediction {
    pub bridge_name: String,
    pub estimated_cost_wei: f64,
    pub estimated_latency_seconds: f64,
    pub confidence: f64,
}

/// Feedback from an executed (or simulated) bridge hop, forwarded to the
/// predictor's training loop after `DetectorCore::update_bridge_data`
/// rate-limiting and validation (§4.G).
#[derive(Debug, Clone)]
pub struct BridgeModelUpdate {
    pub bridge: String,
    pub actual_latency_ms: u64,
    pub actual_cost_usd: f64,
    pub success: bool,
    pub timestamp: i64,
}

/// `getAvailableRoutes` / `predictOptimalBridge` / `updateModel` / `cleanup`
/// (§6). Training-loop internals are out of scope; the core only consumes
/// predictions and forwards update feedback.
#[async_trait]
pub trait BridgePredictor: Send + Sync {
    async fn get_available_routes(&self, source: &str, target: &str) -> anyhow::Result<Vec<String>>;

    async fn predict_optimal_bridge(
        &self,
        source: &str,
        target: &str,
        amount: f64,
        urgency: &str,
    ) -> anyhow::Result<Option<BridgePrediction>>;

    async fn update_model(&self, update: BridgeModelUpdate) -> anyhow::Result<()>;

    async fn cleanup(&self) -> anyhow::Result<()>;
}

/// `{direction, confidence}` — the only shape of the ML predictor we
/// consume (§1); its model internals are out of scope.
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub direction: PredictionDirection,
    pub confidence: f64,
}

/// `isReady` / `predictPrice` (§6).
#[async_trait]
pub trait MlPredictor: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn predict_price(
        &self,
        chain: &str,
        pair_key: &str,
        recent_prices: &[f64],
    ) -> anyhow::Result<Prediction>;
}

/// One message popped off a consumer group, still unacknowledged.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub payload: Value,
}

/// Redis-stream-shaped collaborator (§6): `createConsumerGroup`,
/// `xreadgroup`, `xack`, `xaddWithLimit`, `disconnect`, plus the legacy
/// `get`/`set`/`del` health key.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn create_consumer_group(&self, stream: &str, group: &str) -> anyhow::Result<()>;

    /// Reads up to `count` new messages (`startId = ">"`), blocking up to
    /// `block_ms` milliseconds.
    async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> anyhow::Result<Vec<StreamMessage>>;

    async fn xack(&self, stream: &str, group: &str, id: &str) -> anyhow::Result<()>;

    /// Appends `payload`, trimming the stream to approximately `cap` entries.
    async fn xadd_with_limit(&self, stream: &str, payload: &Value, cap: usize) -> anyhow::Result<String>;

    async fn disconnect(&self) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn del(&self, key: &str) -> anyhow::Result<()>;
}

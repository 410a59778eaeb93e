//! Core data model
//!
//! Every type here is either directly observed on an input stream
//! (`PriceUpdate`, `WhaleTransaction`, `PendingSwapIntent`), derived from the
//! Price Data Manager (`PricePoint`, `IndexedSnapshot`), produced by the
//! detection pipeline (`CrossChainOpportunity`, `BridgeCostEstimate`), or
//! shipped to the execution engine (`ArbitrageOpportunity`).
//!
//! Author: AI-Generated
//! Created: 2026-02-14

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between token parts of an internal pair key, e.g.
/// `"uniswap_v3_WETH_USDC"`. Normalization always splits on this.
pub const TOKEN_PAIR_INTERNAL_SEPARATOR: char = '_';

/// Trade direction carried on a whale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// Aggregate directional bias of a whale activity summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhaleBias {
    Bullish,
    Bearish,
    Neutral,
}

/// Direction predicted by the ML price-movement predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionDirection {
    Up,
    Down,
    Sideways,
}

/// Where a bridge cost estimate ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeCostSource {
    Predictor,
    Config,
    Fallback,
}

/// One observation of one trading pair on one DEX on one chain.
///
/// Invariant: `price > 0.0` and `timestamp > 0`; callers must validate before
/// handing a `PriceUpdate` to the Price Data Manager — see `validate()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub chain: String,
    pub dex: String,
    pub pair_key: String,
    pub pair_address: String,
    pub token0: String,
    pub token1: String,
    /// Arbitrary-precision reserve, carried as a decimal string.
    pub reserve0: String,
    pub reserve1: String,
    /// Quote-per-base price.
    pub price: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub block_number: u64,
    /// Producer-observed latency in milliseconds.
    pub latency: u64,
}

impl PriceUpdate {
    pub fn validate(&self) -> bool {
        self.price > 0.0 && self.price.is_finite() && self.timestamp > 0
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.timestamp).max(0)
    }
}

/// A large trade observed on-chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleTransaction {
    pub transaction_hash: String,
    pub wallet_address: String,
    pub chain: String,
    pub dex: String,
    /// Single token symbol, e.g. `"WETH"`.
    pub token: String,
    pub direction: TradeDirection,
    pub usd_value: f64,
    /// Arbitrary-precision token amount, as a decimal string.
    pub amount: String,
    /// Price-impact fraction of this trade.
    pub impact: f64,
    pub timestamp: i64,
}

impl WhaleTransaction {
    pub fn validate(&self) -> bool {
        self.usd_value >= 0.0
    }
}

/// Per-(token, chain) rolling aggregate over a window (5 min default),
/// produced by the out-of-scope whale activity tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleActivitySummary {
    pub dominant_direction: WhaleBias,
    pub buy_volume_usd: f64,
    pub sell_volume_usd: f64,
    pub net_flow_usd: f64,
    pub super_whale_count: u32,
    pub transaction_count: u32,
    pub recent_transactions: Vec<WhaleTransaction>,
}

/// A to-be-mined swap observed in the mempool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSwapIntent {
    pub hash: String,
    pub chain_id: u64,
    pub router: String,
    /// DEX family name, e.g. `"uniswap_v3"`.
    #[serde(rename = "type")]
    pub intent_type: String,
    pub token_in: String,
    pub token_out: String,
    /// Arbitrary-precision amount, as a decimal string.
    pub amount_in: String,
    /// Arbitrary-precision gas price (wei), as a decimal string.
    pub gas_price: String,
    pub slippage_tolerance: f64,
    /// Unix seconds OR milliseconds — callers must normalize via
    /// `normalize_deadline_ms`.
    pub deadline: i64,
    /// Pre-computed price impact supplied by the message producer, if any.
    #[serde(default)]
    pub estimated_impact: Option<f64>,
}

/// Normalizes a deadline that may be given in Unix seconds or milliseconds.
///
/// `deadline < 10^10` is assumed to be seconds (this holds until the year
/// 2286) and is scaled up; anything at or above that is assumed already in
/// milliseconds.
pub fn normalize_deadline_ms(deadline: i64) -> i64 {
    if deadline < 10_000_000_000 {
        deadline.saturating_mul(1000)
    } else {
        deadline
    }
}

/// A snapshot tuple carried through the detection pipeline. Derived; no
/// independent lifecycle of its own.
#[derive(Debug, Clone)]
pub struct PricePoint {
    pub chain: String,
    pub dex: String,
    pub pair_key: String,
    pub price: f64,
    pub update: PriceUpdate,
}

/// A point-in-time, multi-indexed copy of the latest-price store, built once
/// per detection tick and immutable for its duration.
#[derive(Debug, Clone, Default)]
pub struct IndexedSnapshot {
    pub token_pairs: Vec<String>,
    pub by_token: std::collections::HashMap<String, Vec<PricePoint>>,
    pub by_chain: std::collections::HashMap<String, Vec<PricePoint>>,
    pub timestamp: i64,
}

/// The internal opportunity record produced by the detector core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainOpportunity {
    /// Display form `"BASE/QUOTE"`.
    pub token: String,
    pub source_chain: String,
    pub source_dex: String,
    pub source_price: f64,
    pub target_chain: String,
    pub target_dex: String,
    pub target_price: f64,
    pub price_diff: f64,
    pub percentage_diff: f64,
    pub estimated_profit: f64,
    /// USD per token.
    pub bridge_cost: f64,
    /// USD per token, after bridge/gas/swap-fee costs.
    pub net_profit: f64,
    pub confidence: f64,
    pub created_at: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whale_triggered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whale_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whale_direction: Option<WhaleBias>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whale_volume_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_confidence_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_source_direction: Option<PredictionDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_target_direction: Option<PredictionDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_supported: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_deadline: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_slippage: Option<f64>,
}

impl CrossChainOpportunity {
    /// Dedupe/wire key: chain-pair scoped, deliberately NOT DEX-scoped — see
    /// `publisher::dedupe_key`.
    pub fn dedupe_key(&self) -> String {
        crate::publisher::dedupe_key(&self.source_chain, &self.target_chain, &self.token)
    }
}

/// Result of the Bridge Cost Estimator's cost ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeCostEstimate {
    pub cost_usd: f64,
    pub source: BridgeCostSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_seconds: Option<f64>,
}

/// Dedupe cache value.
#[derive(Debug, Clone)]
pub struct DedupeEntry {
    pub opportunity: CrossChainOpportunity,
    pub created_at: i64,
}

/// The external wire record handed to the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrageOpportunity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub buy_dex: String,
    pub sell_dex: String,
    pub buy_chain: String,
    pub sell_chain: String,
    pub token_in: String,
    pub token_out: String,
    /// Raw 18-decimal token amount, as a decimal string (may exceed u64).
    pub amount_in: String,
    pub expected_profit: f64,
    pub profit_percentage: f64,
    pub bridge_required: bool,
    pub bridge_cost: f64,
    pub created_at: i64,
}

/// Health status tri-state used by both the health record and the circuit
/// breaker's external signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Published to the `health` output stream on every health tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub name: String,
    pub status: HealthStatus,
    #[serde(rename = "uptime")]
    pub uptime_seconds: u64,
    #[serde(rename = "memoryUsage")]
    pub memory_usage_bytes: u64,
    #[serde(rename = "cpuUsage")]
    pub cpu_usage_percent: f64,
    pub last_heartbeat: i64,
    pub chains_monitored: Vec<String>,
    pub opportunities_cache: usize,
    pub ml_predictor_active: bool,
}

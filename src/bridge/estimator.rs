//! Component A — Bridge Cost Estimator (§4.A)
//!
//! A three-step ladder, cheapest/most-confident source first: a learned
//! `BridgePredictor` when it has a route and clears the confidence bar,
//! otherwise a static per-route fee table, otherwise a flat percentage of
//! trade size with a dollar floor. Every `BridgeCostEstimate` carries its
//! `source` so callers (and tests) can tell which rung produced it.

use crate::collaborators::BridgePredictor;
use crate::types::{BridgeCostEstimate, BridgeCostSource, PriceUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One entry of the static bridge-cost fallback table.
#[derive(Debug, Clone)]
pub struct BridgeTableEntry {
    pub bridge: String,
    pub fee_usd: f64,
    pub latency_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct BridgeEstimatorConfig {
    /// Predictor output is only trusted above this confidence (default 0.3).
    pub min_prediction_confidence: f64,
    /// Flat fee fallback as a percentage of trade size (default 0.1).
    pub fallback_fee_pct: f64,
    /// Dollar floor under the flat fee fallback (default 2.0).
    pub min_fallback_fee_usd: f64,
    /// Trade size assumed when a caller doesn't supply one explicitly.
    pub default_trade_size_usd: f64,
}

impl Default for BridgeEstimatorConfig {
    fn default() -> Self {
        Self {
            min_prediction_confidence: 0.3,
            fallback_fee_pct: 0.1,
            min_fallback_fee_usd: 2.0,
            default_trade_size_usd: 10_000.0,
        }
    }
}

/// Bridges amounts to USD for the predictor call and caps/floors the result.
/// Mirrors `extractTokenAmount`'s own clamp so the two never disagree about
/// what counts as a sane token quantity.
const MIN_TOKEN_AMOUNT: f64 = 1e-18;
const MAX_TOKEN_AMOUNT: f64 = 1e12;

pub struct BridgeCostEstimator {
    predictor: Arc<dyn BridgePredictor>,
    config: BridgeEstimatorConfig,
    static_table: HashMap<(String, String), BridgeTableEntry>,
    /// Bit pattern of the last accepted native-token USD price, atomic so
    /// concurrent detection ticks can read it without a lock.
    native_price_bits: AtomicU64,
}

impl BridgeCostEstimator {
    pub fn new(predictor: Arc<dyn BridgePredictor>, config: BridgeEstimatorConfig) -> Self {
        Self {
            predictor,
            config,
            static_table: HashMap::new(),
            native_price_bits: AtomicU64::new(0),
        }
    }

    pub fn with_static_table(
        predictor: Arc<dyn BridgePredictor>,
        config: BridgeEstimatorConfig,
        static_table: HashMap<(String, String), BridgeTableEntry>,
    ) -> Self {
        Self {
            predictor,
            config,
            static_table,
            native_price_bits: AtomicU64::new(0),
        }
    }

    /// Accepts a new native-token spot price. Rejected silently (logged) if
    /// non-positive or non-finite — callers keep using the last good value.
    pub fn update_native_price(&self, usd: f64) {
        if usd > 0.0 && usd.is_finite() {
            self.native_price_bits.store(usd.to_bits(), Ordering::SeqCst);
        } else {
            warn!(usd, "rejected non-positive or non-finite native price");
        }
    }

    pub fn get_native_price(&self) -> f64 {
        f64::from_bits(self.native_price_bits.load(Ordering::SeqCst))
    }

    /// `tradeSize / price`, clamped to `[1e-18, 1e12]`. Returns `1.0` if
    /// `price <= 0` — a unit amount is a safer default than a divide-by-zero
    /// blowup for a caller that forgot to validate the update first.
    pub fn extract_token_amount(&self, token_update: &PriceUpdate, trade_size_usd: Option<f64>) -> f64 {
        if token_update.price <= 0.0 {
            return 1.0;
        }
        let trade_size = trade_size_usd.unwrap_or(self.config.default_trade_size_usd);
        let amount = trade_size / token_update.price;
        amount.clamp(MIN_TOKEN_AMOUNT, MAX_TOKEN_AMOUNT)
    }

    /// `costUsd / tokenPrice`, or `costUsd` itself if the token's price is
    /// non-positive or non-finite (conservative: treat one token as worth
    /// one dollar rather than divide by a bad price).
    pub async fn estimate(
        &self,
        source_chain: &str,
        target_chain: &str,
        token_update: &PriceUpdate,
    ) -> f64 {
        let detailed = self
            .detailed_estimate(source_chain, target_chain, token_update, None)
            .await;
        if token_update.price > 0.0 && token_update.price.is_finite() {
            detailed.cost_usd / token_update.price
        } else {
            detailed.cost_usd
        }
    }

    pub async fn detailed_estimate(
        &self,
        source_chain: &str,
        target_chain: &str,
        token_update: &PriceUpdate,
        trade_size_usd: Option<f64>,
    ) -> BridgeCostEstimate {
        let amount = self.extract_token_amount(token_update, trade_size_usd);

        if let Some(estimate) = self
            .try_predictor(source_chain, target_chain, amount)
            .await
        {
            return estimate;
        }

        if let Some(entry) = self
            .static_table
            .get(&(source_chain.to_string(), target_chain.to_string()))
        {
            return BridgeCostEstimate {
                cost_usd: entry.fee_usd,
                source: BridgeCostSource::Config,
                confidence: None,
                bridge: Some(entry.bridge.clone()),
                latency_seconds: Some(entry.latency_seconds),
            };
        }

        let trade_size = trade_size_usd.unwrap_or(self.config.default_trade_size_usd);
        let flat_fee = (trade_size * self.config.fallback_fee_pct / 100.0)
            .max(self.config.min_fallback_fee_usd);
        BridgeCostEstimate {
            cost_usd: flat_fee,
            source: BridgeCostSource::Fallback,
            confidence: None,
            bridge: None,
            latency_seconds: None,
        }
    }

    async fn try_predictor(
        &self,
        source_chain: &str,
        target_chain: &str,
        amount: f64,
    ) -> Option<BridgeCostEstimate> {
        let routes = self
            .predictor
            .get_available_routes(source_chain, target_chain)
            .await
            .ok()?;
        if routes.is_empty() {
            return None;
        }

        let prediction = self
            .predictor
            .predict_optimal_bridge(source_chain, target_chain, amount, "medium")
            .await
            .ok()??;

        if prediction.confidence <= self.config.min_prediction_confidence {
            debug!(
                confidence = prediction.confidence,
                threshold = self.config.min_prediction_confidence,
                "predictor confidence below threshold, falling through"
            );
            return None;
        }

        let native_price = self.get_native_price();
        if native_price <= 0.0 {
            warn!("predictor route available but no native price cached, falling through");
            return None;
        }

        let cost_usd = (prediction.estimated_cost_wei / 1e18) * native_price;
        Some(BridgeCostEstimate {
            cost_usd,
            source: BridgeCostSource::Predictor,
            confidence: Some(prediction.confidence),
            bridge: Some(prediction.bridge_name),
            latency_seconds: Some(prediction.estimated_latency_seconds),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::InMemoryBridgePredictor;
    use crate::collaborators::BridgePrediction;

    fn sample_update(price: f64) -> PriceUpdate {
        PriceUpdate {
            chain: "ethereum".into(),
            dex: "uniswap_v3".into(),
            pair_key: "uniswap_v3_WETH_USDC".into(),
            pair_address: "0xabc".into(),
            token0: "WETH".into(),
            token1: "USDC".into(),
            reserve0: "1000000000000000000".into(),
            reserve1: "2500000000".into(),
            price,
            timestamp: crate::time::now_ms(),
            block_number: 1,
            latency: 10,
        }
    }

    #[tokio::test]
    async fn falls_through_to_fallback_with_no_routes_or_table() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let estimate = estimator
            .detailed_estimate("ethereum", "arbitrum", &sample_update(2500.0), Some(10_000.0))
            .await;
        assert_eq!(estimate.source, BridgeCostSource::Fallback);
        assert_eq!(estimate.cost_usd, 10.0); // 0.1% of 10_000
    }

    #[tokio::test]
    async fn fallback_respects_dollar_floor() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let estimate = estimator
            .detailed_estimate("ethereum", "arbitrum", &sample_update(2500.0), Some(100.0))
            .await;
        assert_eq!(estimate.source, BridgeCostSource::Fallback);
        assert_eq!(estimate.cost_usd, 2.0); // floor, 0.1% of 100 is only 0.10
    }

    #[tokio::test]
    async fn static_table_wins_over_fallback() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        let mut table = HashMap::new();
        table.insert(
            ("ethereum".to_string(), "arbitrum".to_string()),
            BridgeTableEntry {
                bridge: "hop".into(),
                fee_usd: 3.5,
                latency_seconds: 600.0,
            },
        );
        let estimator = BridgeCostEstimator::with_static_table(
            predictor,
            BridgeEstimatorConfig::default(),
            table,
        );
        let estimate = estimator
            .detailed_estimate("ethereum", "arbitrum", &sample_update(2500.0), None)
            .await;
        assert_eq!(estimate.source, BridgeCostSource::Config);
        assert_eq!(estimate.cost_usd, 3.5);
        assert_eq!(estimate.bridge.as_deref(), Some("hop"));
    }

    #[tokio::test]
    async fn low_confidence_prediction_falls_through() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        predictor.seed_route("ethereum", "arbitrum", "across");
        predictor.seed_prediction(
            "ethereum",
            "arbitrum",
            BridgePrediction {
                bridge_name: "across".into(),
                estimated_cost_wei: 1e15,
                estimated_latency_seconds: 120.0,
                confidence: 0.2,
            },
        );
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let estimate = estimator
            .detailed_estimate("ethereum", "arbitrum", &sample_update(2500.0), Some(10_000.0))
            .await;
        assert_eq!(estimate.source, BridgeCostSource::Fallback);
    }

    #[tokio::test]
    async fn high_confidence_prediction_used_once_native_price_known() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        predictor.seed_route("ethereum", "arbitrum", "across");
        predictor.seed_prediction(
            "ethereum",
            "arbitrum",
            BridgePrediction {
                bridge_name: "across".into(),
                estimated_cost_wei: 2e15,
                estimated_latency_seconds: 90.0,
                confidence: 0.8,
            },
        );
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        estimator.update_native_price(2500.0);
        let estimate = estimator
            .detailed_estimate("ethereum", "arbitrum", &sample_update(2500.0), Some(10_000.0))
            .await;
        assert_eq!(estimate.source, BridgeCostSource::Predictor);
        assert_eq!(estimate.cost_usd, 0.002 * 2500.0);
    }

    #[tokio::test]
    async fn prediction_without_native_price_falls_through() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        predictor.seed_route("ethereum", "arbitrum", "across");
        predictor.seed_prediction(
            "ethereum",
            "arbitrum",
            BridgePrediction {
                bridge_name: "across".into(),
                estimated_cost_wei: 2e15,
                estimated_latency_seconds: 90.0,
                confidence: 0.8,
            },
        );
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let estimate = estimator
            .detailed_estimate("ethereum", "arbitrum", &sample_update(2500.0), Some(10_000.0))
            .await;
        assert_eq!(estimate.source, BridgeCostSource::Fallback);
    }

    #[test]
    fn extract_token_amount_clamps_to_floor() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let update = sample_update(1e30);
        let amount = estimator.extract_token_amount(&update, Some(10_000.0));
        assert_eq!(amount, MIN_TOKEN_AMOUNT);
    }

    #[test]
    fn extract_token_amount_returns_unit_on_bad_price() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let update = sample_update(0.0);
        assert_eq!(estimator.extract_token_amount(&update, Some(10_000.0)), 1.0);
    }

    #[tokio::test]
    async fn estimate_divides_by_token_price() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let update = sample_update(2500.0);
        let cost_in_token_units = estimator.estimate("ethereum", "arbitrum", &update).await;
        // fallback floor of $2 against default trade size of $10_000 -> 0.1% = $10
        assert_eq!(cost_in_token_units, 10.0 / 2500.0);
    }

    #[tokio::test]
    async fn estimate_falls_back_to_cost_usd_on_bad_price() {
        let predictor = Arc::new(InMemoryBridgePredictor::new());
        let estimator = BridgeCostEstimator::new(predictor, BridgeEstimatorConfig::default());
        let update = sample_update(-1.0);
        let cost = estimator.estimate("ethereum", "arbitrum", &update).await;
        assert_eq!(cost, 10.0);
    }
}

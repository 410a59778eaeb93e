//! Whale-triggered fan-out (§4.G)
//!
//! A trade large enough to move a market short-circuits the periodic
//! detection tick instead of waiting for the next one: record it, pull the
//! token's rolling activity summary, and if either threshold trips, scan
//! every cross-chain bucket that actually contains this token (exact match
//! on the normalized symbol, never substring — `ETH` must not match
//! `WETH_USDC` before normalization folds it to `WETH`).

use super::core::DetectorCore;
use crate::normalize::{normalize_token_for_cross_chain, pair_contains_token};
use crate::types::WhaleTransaction;
use std::sync::Arc;
use tracing::{info, warn};

impl DetectorCore {
    pub(super) async fn handle_whale_transaction(self: &Arc<Self>, tx: WhaleTransaction) {
        if let Err(e) = self.handles.whale_tracker.record_transaction(&tx).await {
            warn!(error = %e, "failed to record whale transaction");
        }

        let summary = match self
            .handles
            .whale_tracker
            .get_activity_summary(&tx.token, &tx.chain)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "failed to fetch whale activity summary");
                return;
            }
        };

        let triggers = tx.usd_value >= self.config.super_whale_threshold_usd
            || summary.net_flow_usd.abs() > self.config.significant_flow_threshold_usd;
        if !triggers {
            return;
        }

        let Some(_permit) = self.whale_guard.try_acquire() else {
            info!("Whale detection rate limited");
            return;
        };

        let normalized_symbol = normalize_token_for_cross_chain(&tx.token);
        let snapshot = self.price_manager.create_indexed_snapshot();

        for (pair_key, points) in snapshot.by_token.iter() {
            if !pair_contains_token(pair_key, &normalized_symbol) {
                continue;
            }
            if points.len() < 2 {
                continue;
            }
            let Some(opportunity) = self
                .find_arbitrage(points, Some((&summary, &tx.transaction_hash)), None)
                .await
            else {
                continue;
            };
            if opportunity.confidence <= self.config.confidence_threshold {
                continue;
            }
            if let Err(e) = self.publisher.publish(opportunity).await {
                warn!(error = %e, "failed to publish whale-triggered opportunity");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::{
        InMemoryBridgePredictor, InMemoryMlPredictor, InMemoryPriceOracle, InMemoryStreamClient,
        InMemoryWhaleTracker,
    };
    use crate::config::DetectorConfig;
    use crate::detector::{DetectorCore, DetectorHandles};
    use crate::types::{PriceUpdate, TradeDirection};

    fn test_config() -> DetectorConfig {
        DetectorConfig::from_toml(toml::from_str("[general]\n").unwrap())
    }

    fn test_handles() -> DetectorHandles {
        DetectorHandles {
            stream_client: Arc::new(InMemoryStreamClient::new()),
            price_oracle: Arc::new(InMemoryPriceOracle::new()),
            whale_tracker: Arc::new(InMemoryWhaleTracker::new()),
            bridge_predictor: Arc::new(InMemoryBridgePredictor::new()),
            ml_predictor: Arc::new(InMemoryMlPredictor::new()),
            hostname: "test-host".to_string(),
        }
    }

    fn seed_cross_chain_pair(core: &Arc<DetectorCore>) {
        let now = crate::time::now_ms();
        for (chain, dex, price) in [("ethereum", "uniswap_v3", 2500.0), ("bsc", "pancakeswap", 2750.0)] {
            core.price_manager.handle_update(PriceUpdate {
                chain: chain.into(),
                dex: dex.into(),
                pair_key: format!("{dex}_WETH_USDC"),
                pair_address: "0xabc".into(),
                token0: "WETH".into(),
                token1: "USDC".into(),
                reserve0: "1".into(),
                reserve1: "1".into(),
                price,
                timestamp: now,
                block_number: 1,
                latency: 1,
            });
        }
    }

    fn whale_tx(hash: &str, usd_value: f64) -> WhaleTransaction {
        WhaleTransaction {
            transaction_hash: hash.into(),
            wallet_address: "0xwhale".into(),
            chain: "ethereum".into(),
            dex: "uniswap_v3".into(),
            token: "ETH".into(),
            direction: TradeDirection::Buy,
            usd_value,
            amount: "100".into(),
            impact: 0.01,
            timestamp: crate::time::now_ms(),
        }
    }

    #[tokio::test]
    async fn super_whale_triggers_a_scan_and_publishes() {
        let core = DetectorCore::new(test_config(), test_handles());
        seed_cross_chain_pair(&core);
        core.handle_whale_transaction(whale_tx("0x1", 600_000.0)).await;
        assert!(core.publisher.dedupe_cache_size() > 0);
    }

    #[tokio::test]
    async fn sub_threshold_transaction_does_not_scan() {
        let core = DetectorCore::new(test_config(), test_handles());
        seed_cross_chain_pair(&core);
        core.handle_whale_transaction(whale_tx("0x1", 1_000.0)).await;
        assert_eq!(core.publisher.dedupe_cache_size(), 0);
    }

    #[tokio::test]
    async fn second_rapid_whale_scan_is_cooldown_dropped() {
        let core = DetectorCore::new(test_config(), test_handles());
        seed_cross_chain_pair(&core);
        core.handle_whale_transaction(whale_tx("0x1", 600_000.0)).await;
        let first_size = core.publisher.dedupe_cache_size();
        // second super-whale tx arrives immediately after; whale guard's
        // cooldown should drop the scan entirely (no crash, no new publish).
        core.handle_whale_transaction(whale_tx("0x2", 600_000.0)).await;
        assert_eq!(core.publisher.dedupe_cache_size(), first_size);
    }
}

//! Pending-intent analysis (§4.G)
//!
//! A mempool swap intent gets a same-chain opportunity estimate: the
//! affected DEX's post-swap price is projected from the intent's price
//! impact, then compared against the best quote from another DEX on the
//! same chain. Profit arithmetic runs in `BigInt` since `amountIn` and
//! `gasPrice` are arbitrary-precision wei values that can exceed
//! `MAX_SAFE_INTEGER`.

use super::core::DetectorCore;
use crate::normalize::normalized_pair_key;
use crate::types::{normalize_deadline_ms, CrossChainOpportunity, PendingSwapIntent, PricePoint};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::sync::Arc;
use tracing::warn;

/// `2^53 - 1`, the largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;
/// `amountIn`/reserves are carried as 18-decimal wei-equivalent strings;
/// profit is reported scaled back down to whole-token decimal units.
const TOKEN_DECIMALS_MULTIPLIER: f64 = 1e18;

impl DetectorCore {
    pub(super) async fn handle_pending_opportunity(self: &Arc<Self>, intent: PendingSwapIntent) {
        let Some(chain) = self.config.chain_id_map.get(&intent.chain_id).cloned() else {
            return;
        };

        let deadline_ms = normalize_deadline_ms(intent.deadline);
        let now = crate::time::now_ms();
        if deadline_ms <= now {
            return;
        }

        let snapshot = self.price_manager.create_indexed_snapshot();
        let pair_key_guess = format!("{}_{}", intent.token_in, intent.token_out);
        let Some(normalized_key) = normalized_pair_key(&pair_key_guess) else {
            return;
        };
        let Some(points) = snapshot.by_token.get(&normalized_key) else {
            return;
        };

        let same_chain: Vec<&PricePoint> = points.iter().filter(|p| p.chain == chain).collect();
        if same_chain.is_empty() {
            return;
        }

        let intent_type_lower = intent.intent_type.to_lowercase();
        let affected = same_chain
            .iter()
            .find(|p| p.dex.to_lowercase().contains(&intent_type_lower))
            .or_else(|| same_chain.first())
            .copied();
        let Some(affected) = affected else { return };

        let impact = estimate_pending_impact(&intent, affected);
        if impact < 0.001 {
            return;
        }

        let post_swap_price = affected.price * (1.0 + impact);
        if post_swap_price <= 0.0 {
            return;
        }

        let alt_point = same_chain
            .iter()
            .filter(|p| p.dex != affected.dex)
            .max_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal))
            .copied();
        let Some(alt_point) = alt_point else { return };

        let relative_improvement = (alt_point.price - post_swap_price) / post_swap_price;
        if relative_improvement < 0.005 {
            return;
        }

        let seconds_to_deadline = ((deadline_ms - now) as f64 / 1000.0).max(0.0);
        let time_factor = (seconds_to_deadline / 300.0).clamp(0.0, 1.0);
        let confidence = ((0.6 + impact * 10.0) * time_factor).min(0.95);

        let Some(net_profit) =
            pending_net_profit(&intent, relative_improvement, self.config.estimated_swap_gas)
        else {
            return;
        };
        if net_profit <= 0.0 {
            return;
        }

        let opportunity = CrossChainOpportunity {
            token: format!("{}/{}", intent.token_in, intent.token_out),
            source_chain: chain.clone(),
            source_dex: affected.dex.clone(),
            source_price: post_swap_price,
            target_chain: chain,
            target_dex: alt_point.dex.clone(),
            target_price: alt_point.price,
            price_diff: alt_point.price - post_swap_price,
            percentage_diff: relative_improvement * 100.0,
            estimated_profit: alt_point.price - post_swap_price,
            bridge_cost: 0.0,
            net_profit,
            confidence,
            created_at: now,
            whale_triggered: None,
            whale_tx_hash: None,
            whale_direction: None,
            whale_volume_usd: None,
            ml_confidence_boost: None,
            ml_source_direction: None,
            ml_target_direction: None,
            ml_supported: None,
            pending_tx_hash: Some(intent.hash.clone()),
            pending_deadline: Some(deadline_ms),
            pending_slippage: Some(intent.slippage_tolerance),
        };

        if let Err(e) = self.publisher.publish(opportunity).await {
            warn!(error = %e, "failed to publish pending-intent opportunity");
        }
    }
}

/// Price-impact fraction of the pending swap against the affected DEX's
/// pool: the message producer's own estimate if in range, else a
/// constant-product approximation from reserves, else the intent's own
/// slippage tolerance.
fn estimate_pending_impact(intent: &PendingSwapIntent, affected: &PricePoint) -> f64 {
    if let Some(estimated) = intent.estimated_impact {
        if (0.0..=0.5).contains(&estimated) {
            return estimated;
        }
    }

    let reserve_in_str = if intent.token_in == affected.update.token0 {
        &affected.update.reserve0
    } else {
        &affected.update.reserve1
    };

    let reserve_in: BigInt = match reserve_in_str.parse() {
        Ok(v) => v,
        Err(_) => return intent.slippage_tolerance,
    };
    let amount_in: BigInt = match intent.amount_in.parse() {
        Ok(v) => v,
        Err(_) => return intent.slippage_tolerance,
    };

    let denom = &reserve_in + &amount_in;
    if denom.is_zero() {
        return intent.slippage_tolerance;
    }

    // amountIn / (reserve + amountIn), kept precise via a fixed-point BigInt
    // division instead of converting the (possibly huge) operands to f64 first.
    let scale = BigInt::from(1_000_000_000u64);
    let scaled = (&amount_in * &scale) / &denom;
    scaled.to_f64().unwrap_or(0.0) / 1_000_000_000.0
}

/// Gross profit `amountIn * floor(priceDiffPercent * 10000) / 10000` minus
/// gas cost `gasPrice * estimatedSwapGas`, both in raw wei-equivalent units.
/// Per §4.G step 10: if either operand would overflow `MAX_SAFE_INTEGER`,
/// subtract in `BigInt` first and convert once; otherwise convert both to
/// `f64` first (cheaper, and equivalent for values that fit).
fn pending_net_profit(intent: &PendingSwapIntent, price_diff_percent_frac: f64, estimated_swap_gas: u64) -> Option<f64> {
    let amount_in: BigInt = intent.amount_in.parse().ok()?;
    let gas_price: BigInt = intent.gas_price.parse().ok()?;

    let price_diff_percent = price_diff_percent_frac * 100.0;
    let scale = (price_diff_percent * 10_000.0).floor();
    if !scale.is_finite() {
        return None;
    }
    let scale = BigInt::from(scale as i64);

    let gross_profit = (&amount_in * &scale) / BigInt::from(10_000);
    let gas_cost = &gas_price * BigInt::from(estimated_swap_gas);

    let max_safe = BigInt::from(MAX_SAFE_INTEGER);
    let net_raw = if gross_profit.abs() > max_safe || gas_cost.abs() > max_safe {
        let net = &gross_profit - &gas_cost;
        net.to_f64()?
    } else {
        gross_profit.to_f64()? - gas_cost.to_f64()?
    };

    Some(net_raw / TOKEN_DECIMALS_MULTIPLIER)
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
    use crate::types::PriceUpdate;
    use std::collections::HashMap;

    fn test_config() -> DetectorConfig {
        let mut config = DetectorConfig::from_toml(toml::from_str("[general]\n").unwrap());
        config.chain_id_map = HashMap::from([(1u64, "ethereum".to_string())]);
        config
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

    fn seed_same_chain_pair(core: &Arc<DetectorCore>) {
        let now = crate::time::now_ms();
        for (dex, price) in [("uniswap_v3", 2500.0), ("sushiswap", 2575.0)] {
            core.price_manager.handle_update(PriceUpdate {
                chain: "ethereum".into(),
                dex: dex.into(),
                pair_key: format!("{dex}_WETH_USDC"),
                pair_address: "0xabc".into(),
                token0: "WETH".into(),
                token1: "USDC".into(),
                reserve0: "1000000000000000000000".into(),
                reserve1: "2500000000000".into(),
                price,
                timestamp: now,
                block_number: 1,
                latency: 1,
            });
        }
    }

    fn sample_intent() -> PendingSwapIntent {
        PendingSwapIntent {
            hash: "0xpending".into(),
            chain_id: 1,
            router: "0xrouter".into(),
            intent_type: "uniswap_v3".into(),
            token_in: "WETH".into(),
            token_out: "USDC".into(),
            amount_in: "10000000000000000000".into(), // 10 WETH
            gas_price: "20000000000".into(),           // 20 gwei
            slippage_tolerance: 0.01,
            deadline: crate::time::now_ms() + 120_000,
            estimated_impact: Some(0.02),
        }
    }

    #[tokio::test]
    async fn emits_exactly_one_opportunity_with_pending_fields_set() {
        let core = DetectorCore::new(test_config(), test_handles());
        seed_same_chain_pair(&core);
        core.handle_pending_opportunity(sample_intent()).await;
        assert_eq!(core.publisher.dedupe_cache_size(), 1);
    }

    #[tokio::test]
    async fn unknown_chain_id_is_dropped() {
        let core = DetectorCore::new(test_config(), test_handles());
        seed_same_chain_pair(&core);
        let mut intent = sample_intent();
        intent.chain_id = 999;
        core.handle_pending_opportunity(intent).await;
        assert_eq!(core.publisher.dedupe_cache_size(), 0);
    }

    #[tokio::test]
    async fn past_deadline_is_dropped() {
        let core = DetectorCore::new(test_config(), test_handles());
        seed_same_chain_pair(&core);
        let mut intent = sample_intent();
        intent.deadline = crate::time::now_ms() - 1_000;
        core.handle_pending_opportunity(intent).await;
        assert_eq!(core.publisher.dedupe_cache_size(), 0);
    }

    #[test]
    fn zero_reserves_fall_back_to_slippage_tolerance_without_nan() {
        let affected = PricePoint {
            chain: "ethereum".into(),
            dex: "uniswap_v3".into(),
            pair_key: "uniswap_v3_WETH_USDC".into(),
            price: 2500.0,
            update: PriceUpdate {
                chain: "ethereum".into(),
                dex: "uniswap_v3".into(),
                pair_key: "uniswap_v3_WETH_USDC".into(),
                pair_address: "0xabc".into(),
                token0: "WETH".into(),
                token1: "USDC".into(),
                reserve0: "0".into(),
                reserve1: "0".into(),
                price: 2500.0,
                timestamp: crate::time::now_ms(),
                block_number: 1,
                latency: 1,
            },
        };
        let mut intent = sample_intent();
        intent.estimated_impact = None;
        let impact = estimate_pending_impact(&intent, &affected);
        assert!(!impact.is_nan());
        assert_eq!(impact, intent.slippage_tolerance);
    }
}

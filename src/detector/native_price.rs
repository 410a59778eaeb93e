//! Native-token price refresh & rate-of-change breaker (§4.G)
//!
//! Implemented as a sleep-chain rather than `tokio::time::interval`: the
//! next refresh is only scheduled after the current one finishes, which
//! gives implicit single-flight without a guard. Accepted prices feed the
//! Bridge Cost Estimator's wei-to-USD conversion; a sudden outlier (oracle
//! glitch, flash-loan-driven spot manipulation) must not poison it.

use super::core::DetectorCore;
use crate::normalize::normalize_token_for_cross_chain;
use crate::types::PriceUpdate;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const NATIVE_PRICE_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const NATIVE_PRICE_MIN: f64 = 100.0;
const NATIVE_PRICE_MAX: f64 = 100_000.0;
const NATIVE_PRICE_HISTORY_CAP: usize = 10;
const MAX_RELATIVE_DEVIATION: f64 = 0.2;
const MIN_SAMPLES_FOR_BREAKER: usize = 3;

const STABLECOINS: &[&str] = &["USDC", "USDT", "DAI", "BUSD", "FRAX", "TUSD"];

impl DetectorCore {
    pub(super) async fn run_native_price_refresh_loop(self: Arc<Self>) {
        loop {
            match self.handles.price_oracle.get_price(&self.config.native_price_symbol).await {
                Ok(oracle_price) => {
                    if !oracle_price.is_stale {
                        self.accept_native_price_candidate(oracle_price.price);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "native price oracle lookup failed");
                }
            }
            tokio::time::sleep(NATIVE_PRICE_REFRESH_INTERVAL).await;
        }
    }

    /// Rejects a candidate price that falls outside the sanity range or
    /// deviates too far from the rolling median, otherwise records it and
    /// forwards it to the Bridge Cost Estimator.
    fn accept_native_price_candidate(&self, price: f64) -> bool {
        if !(NATIVE_PRICE_MIN..=NATIVE_PRICE_MAX).contains(&price) {
            return false;
        }

        let mut history = self.native_price_history.lock().unwrap();
        if history.len() >= MIN_SAMPLES_FOR_BREAKER {
            let median = rolling_median(history.make_contiguous());
            if median > 0.0 && ((price - median).abs() / median) > MAX_RELATIVE_DEVIATION {
                return false;
            }
        }

        history.push_back(price);
        if history.len() > NATIVE_PRICE_HISTORY_CAP {
            history.pop_front();
        }
        drop(history);

        self.bridge_estimator.update_native_price(price);
        true
    }

    /// Routes qualifying `PriceUpdate`s (a WETH/ETH leg paired with a
    /// stablecoin, in sanity range) through the same breaker before they can
    /// influence the native price the Bridge Cost Estimator uses.
    pub(super) async fn route_price_update_to_native_breaker(self: &Arc<Self>, update: &PriceUpdate) {
        let token0 = normalize_token_for_cross_chain(&update.token0);
        let token1 = normalize_token_for_cross_chain(&update.token1);

        let has_native_leg = token0 == "WETH" || token1 == "WETH";
        let has_stable_leg = STABLECOINS.contains(&token0.as_str()) || STABLECOINS.contains(&token1.as_str());
        if !has_native_leg || !has_stable_leg {
            return;
        }

        self.accept_native_price_candidate(update.price);
    }
}

/// Sorted-copy median; doesn't mutate the caller's deque ordering.
fn rolling_median(samples: &[f64]) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

//! Bridge-data ingress (§4.G)
//!
//! Feedback about an executed (or simulated) bridge hop — actual latency,
//! actual cost, success — is how the learned `BridgePredictor` gets better
//! over time. Rate-limited per route so a misbehaving or compromised feeder
//! can't flood the predictor's training loop.

use super::core::DetectorCore;
use crate::collaborators::BridgeModelUpdate;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const RATE_LIMIT_WINDOW_MS: i64 = 60_000;
const RATE_LIMIT_MAX_UPDATES: usize = 10;
const MAX_LATENCY_MS: u64 = 3_600_000;
const MAX_COST_USD: f64 = 1_000.0;
const MAX_AMOUNT_USD: f64 = 100_000_000.0;
const MAX_FUTURE_SKEW_MS: i64 = 60_000;

impl DetectorCore {
    /// Validates and rate-limits one bridge-execution observation, then
    /// forwards it to the bridge predictor's training loop. Returns `true`
    /// if the update was accepted.
    pub async fn update_bridge_data(
        self: &Arc<Self>,
        source_chain: String,
        target_chain: String,
        bridge: String,
        actual_latency_ms: u64,
        actual_cost_usd: f64,
        amount_usd: f64,
        success: bool,
        timestamp: i64,
    ) -> bool {
        if !validate_bridge_data(actual_latency_ms, actual_cost_usd, amount_usd, timestamp) {
            return false;
        }

        let route = (source_chain.clone(), target_chain.clone(), bridge.clone());
        if !self.check_and_record_bridge_rate_limit(route) {
            warn!(source = %source_chain, target = %target_chain, %bridge, "bridge data rate limited");
            return false;
        }

        let update = BridgeModelUpdate {
            bridge,
            actual_latency_ms,
            actual_cost_usd,
            success,
            timestamp,
        };
        if let Err(e) = self.handles.bridge_predictor.update_model(update).await {
            warn!(error = %e, "bridge predictor model update failed");
            return false;
        }

        true
    }

    fn check_and_record_bridge_rate_limit(&self, route: (String, String, String)) -> bool {
        let now = crate::time::now_ms();
        let mut map = self.bridge_update_timestamps.lock().unwrap();
        let window = map.entry(route).or_default();
        while let Some(&front) = window.front() {
            if now - front > RATE_LIMIT_WINDOW_MS {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= RATE_LIMIT_MAX_UPDATES {
            return false;
        }
        window.push_back(now);
        true
    }
}

fn validate_bridge_data(latency_ms: u64, cost_usd: f64, amount_usd: f64, timestamp: i64) -> bool {
    if latency_ms == 0 || latency_ms > MAX_LATENCY_MS {
        return false;
    }
    if !(0.0..=MAX_COST_USD).contains(&cost_usd) {
        return false;
    }
    if !(0.0..=MAX_AMOUNT_USD).contains(&amount_usd) || amount_usd == 0.0 {
        return false;
    }
    let now = crate::time::now_ms();
    if timestamp > now + MAX_FUTURE_SKEW_MS {
        return false;
    }
    true
}

/// Periodically drops empty route buckets from the rate-limit map so it
/// doesn't grow unbounded across the lifetime of a long-running process.
pub(super) async fn run_bridge_data_cleanup_loop(core: Arc<DetectorCore>) {
    let mut interval = tokio::time::interval(Duration::from_secs(300));
    loop {
        interval.tick().await;
        let now = crate::time::now_ms();
        let mut map = core.bridge_update_timestamps.lock().unwrap();
        map.retain(|_, window| {
            while let Some(&front) = window.front() {
                if now - front > RATE_LIMIT_WINDOW_MS {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
    }
}

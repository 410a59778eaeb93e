//! Component E — Opportunity Publisher (§4.E)
//!
//! Owns the dedupe cache, the internal→wire conversion, and the capped
//! emission to the `opportunities` output stream. The dedupe key is
//! deliberately chain-pair scoped (never DEX-scoped) — publishing the same
//! chain pair via two different DEX pairs counts as the same opportunity
//! (§9 Open Questions).

use crate::collaborators::StreamClient;
use crate::types::{ArbitrageOpportunity, CrossChainOpportunity, DedupeEntry};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

pub fn dedupe_key(source_chain: &str, target_chain: &str, token: &str) -> String {
    format!("{source_chain}-{target_chain}-{token}")
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub dedupe_window_ms: i64,
    pub min_profit_improvement: f64,
    pub default_trade_size_usd: f64,
    pub max_cache_size: usize,
    pub cache_ttl_ms: i64,
    pub output_stream: String,
    pub output_stream_cap: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 5_000,
            min_profit_improvement: 0.1,
            default_trade_size_usd: 10_000.0,
            max_cache_size: 1_000,
            cache_ttl_ms: 10 * 60 * 1000,
            output_stream: "opportunities".to_string(),
            output_stream_cap: 10_000,
        }
    }
}

const MAX_AMOUNT_IN_TOKENS: f64 = 1e12;
const TOKEN_DECIMALS_MULTIPLIER: f64 = 1e18;

pub struct OpportunityPublisher {
    stream_client: std::sync::Arc<dyn StreamClient>,
    config: PublisherConfig,
    dedupe_cache: Mutex<HashMap<String, DedupeEntry>>,
}

impl OpportunityPublisher {
    pub fn new(stream_client: std::sync::Arc<dyn StreamClient>, config: PublisherConfig) -> Self {
        Self {
            stream_client,
            config,
            dedupe_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the opportunity was written to the output stream.
    pub async fn publish(&self, opportunity: CrossChainOpportunity) -> anyhow::Result<bool> {
        let key = opportunity.dedupe_key();
        let now = crate::time::now_ms();

        if !self.should_publish(&key, &opportunity, now) {
            return Ok(false);
        }

        let wire = self.to_wire_form(&opportunity, now);
        let payload = serde_json::to_value(&wire)?;
        self.stream_client
            .xadd_with_limit(&self.config.output_stream, &payload, self.config.output_stream_cap)
            .await?;

        self.dedupe_cache.lock().unwrap().insert(
            key,
            DedupeEntry {
                opportunity,
                created_at: now,
            },
        );
        self.cleanup_cache();
        Ok(true)
    }

    fn should_publish(&self, key: &str, opportunity: &CrossChainOpportunity, now: i64) -> bool {
        let cache = self.dedupe_cache.lock().unwrap();
        let Some(prior) = cache.get(key) else {
            return true;
        };

        if now - prior.created_at >= self.config.dedupe_window_ms {
            return true;
        }

        let old = prior.opportunity.net_profit;
        let new = opportunity.net_profit;
        let improvement = if old <= 0.0 && new > 0.0 {
            1.0
        } else if new <= 0.0 {
            return false;
        } else {
            (new - old) / old
        };
        improvement >= self.config.min_profit_improvement
    }

    fn to_wire_form(&self, opportunity: &CrossChainOpportunity, now: i64) -> ArbitrageOpportunity {
        let (token_in, token_out) = opportunity
            .token
            .split_once('/')
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .unwrap_or_else(|| (opportunity.token.clone(), opportunity.token.clone()));

        let amount_in_tokens =
            (self.config.default_trade_size_usd / opportunity.source_price.max(1.0))
                .min(MAX_AMOUNT_IN_TOKENS);
        let amount_in_raw = (amount_in_tokens * TOKEN_DECIMALS_MULTIPLIER).floor();

        ArbitrageOpportunity {
            id: format!("cross-chain-{now}-{}", random_suffix()),
            kind: "cross-chain".to_string(),
            buy_dex: opportunity.source_dex.clone(),
            sell_dex: opportunity.target_dex.clone(),
            buy_chain: opportunity.source_chain.clone(),
            sell_chain: opportunity.target_chain.clone(),
            token_in,
            token_out,
            amount_in: format!("{amount_in_raw:.0}"),
            expected_profit: (opportunity.percentage_diff / 100.0) * amount_in_tokens,
            profit_percentage: opportunity.percentage_diff / 100.0,
            bridge_required: true,
            bridge_cost: opportunity.bridge_cost,
            created_at: now,
        }
    }

    /// Removes entries older than `cacheTtlMs`, then trims oldest-first down
    /// to `maxCacheSize` if still over. Runs after every `publish` but is a
    /// no-op below `maxCacheSize`.
    fn cleanup_cache(&self) {
        let mut cache = self.dedupe_cache.lock().unwrap();
        if cache.len() <= self.config.max_cache_size {
            return;
        }

        let now = crate::time::now_ms();
        cache.retain(|_, entry| now - entry.created_at < self.config.cache_ttl_ms);

        if cache.len() > self.config.max_cache_size {
            let mut entries: Vec<(String, i64)> = cache
                .iter()
                .map(|(k, v)| (k.clone(), v.created_at))
                .collect();
            entries.sort_by_key(|(_, created_at)| *created_at);
            let excess = cache.len() - self.config.max_cache_size;
            for (key, _) in entries.into_iter().take(excess) {
                cache.remove(&key);
            }
        }
        debug!(size = cache.len(), "dedupe cache cleaned");
    }

    pub fn dedupe_cache_size(&self) -> usize {
        self.dedupe_cache.lock().unwrap().len()
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..9)
        .map(|_| std::char::from_digit(rng.gen_range(0..10), 10).unwrap())
        .collect()
}

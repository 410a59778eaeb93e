//! Detector configuration
//!
//! Loaded from a TOML file (same `toml::from_str` + `serde(default =
//! "...")` idiom as the paper-trading config reader this crate's ancestor
//! used), with a handful of env-var overrides layered on top for the
//! deployment knobs that traditionally come from the environment
//! (`NODE_ENV`-equivalent dev/production interval defaults, `HOSTNAME`).

use crate::bridge::{BridgeEstimatorConfig, BridgeTableEntry};
use crate::confidence::ConfidenceConfig;
use crate::ml::MlPredictionManagerConfig;
use crate::price::PriceDataManagerConfig;
use crate::publisher::PublisherConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A non-fatal configuration issue — surfaced to the operator via a warn
/// log, never blocks construction.
#[derive(Debug, Clone)]
pub struct ConfigWarning(pub String);

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub general: GeneralSection,
    #[serde(default)]
    pub ml: MlSection,
    #[serde(default)]
    pub whale: WhaleSection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub publisher: PublisherSection,
    #[serde(default)]
    pub chains: HashMap<String, u64>,
    #[serde(default)]
    pub bridge_routes: Vec<BridgeRouteEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSection {
    #[serde(default = "default_detection_interval_ms")]
    pub detection_interval_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_max_price_age_ms")]
    pub max_price_age_ms: i64,
    #[serde(default = "default_store_max_age_ms")]
    pub store_max_age_ms: i64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_min_profit_percentage")]
    pub min_profit_percentage: f64,
    #[serde(default = "default_default_trade_size_usd")]
    pub default_trade_size_usd: f64,
    #[serde(default = "default_estimated_gas_cost")]
    pub estimated_gas_cost_usd: f64,
    #[serde(default = "default_fee_percentage")]
    pub fee_percentage: f64,
    #[serde(default = "default_spread_threshold")]
    pub spread_pre_filter_threshold: f64,
    #[serde(default = "default_estimated_swap_gas")]
    pub estimated_swap_gas: u64,
    #[serde(default = "default_native_price_symbol")]
    pub native_price_symbol: String,
}

fn default_detection_interval_ms() -> u64 { 100 }
fn default_health_check_interval_ms() -> u64 { 10_000 }
fn default_max_price_age_ms() -> i64 { 30_000 }
fn default_store_max_age_ms() -> i64 { 300_000 }
fn default_confidence_threshold() -> f64 { 0.3 }
fn default_min_profit_percentage() -> f64 { 0.001 }
fn default_default_trade_size_usd() -> f64 { 10_000.0 }
fn default_estimated_gas_cost() -> f64 { 5.0 }
fn default_fee_percentage() -> f64 { 0.003 }
fn default_spread_threshold() -> f64 { 0.005 }
fn default_estimated_swap_gas() -> u64 { 200_000 }
fn default_native_price_symbol() -> String { "ETH".to_string() }

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            detection_interval_ms: default_detection_interval_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            max_price_age_ms: default_max_price_age_ms(),
            store_max_age_ms: default_store_max_age_ms(),
            confidence_threshold: default_confidence_threshold(),
            min_profit_percentage: default_min_profit_percentage(),
            default_trade_size_usd: default_default_trade_size_usd(),
            estimated_gas_cost_usd: default_estimated_gas_cost(),
            fee_percentage: default_fee_percentage(),
            spread_pre_filter_threshold: default_spread_threshold(),
            estimated_swap_gas: default_estimated_swap_gas(),
            native_price_symbol: default_native_price_symbol(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlSection {
    #[serde(default = "default_ml_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_ml_aligned_boost")]
    pub aligned_boost: f64,
    #[serde(default = "default_ml_opposed_penalty")]
    pub opposed_penalty: f64,
    #[serde(default = "default_ml_max_latency_ms")]
    pub max_latency_ms: u64,
}

fn default_ml_min_confidence() -> f64 { 0.6 }
fn default_ml_aligned_boost() -> f64 { 1.15 }
fn default_ml_opposed_penalty() -> f64 { 0.9 }
fn default_ml_max_latency_ms() -> u64 { 50 }

impl Default for MlSection {
    fn default() -> Self {
        Self {
            min_confidence: default_ml_min_confidence(),
            aligned_boost: default_ml_aligned_boost(),
            opposed_penalty: default_ml_opposed_penalty(),
            max_latency_ms: default_ml_max_latency_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleSection {
    #[serde(default = "default_super_whale_threshold_usd")]
    pub super_whale_threshold_usd: f64,
    #[serde(default = "default_significant_flow_threshold_usd")]
    pub significant_flow_threshold_usd: f64,
    #[serde(default = "default_whale_cooldown_ms")]
    pub cooldown_ms: i64,
}

fn default_super_whale_threshold_usd() -> f64 { 500_000.0 }
fn default_significant_flow_threshold_usd() -> f64 { 100_000.0 }
fn default_whale_cooldown_ms() -> i64 { 1_000 }

impl Default for WhaleSection {
    fn default() -> Self {
        Self {
            super_whale_threshold_usd: default_super_whale_threshold_usd(),
            significant_flow_threshold_usd: default_significant_flow_threshold_usd(),
            cooldown_ms: default_whale_cooldown_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSection {
    #[serde(default = "default_min_prediction_confidence")]
    pub min_prediction_confidence: f64,
    #[serde(default = "default_fallback_fee_pct")]
    pub fallback_fee_pct: f64,
    #[serde(default = "default_min_fallback_fee_usd")]
    pub min_fallback_fee_usd: f64,
}

fn default_min_prediction_confidence() -> f64 { 0.3 }
fn default_fallback_fee_pct() -> f64 { 0.1 }
fn default_min_fallback_fee_usd() -> f64 { 2.0 }

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            min_prediction_confidence: default_min_prediction_confidence(),
            fallback_fee_pct: default_fallback_fee_pct(),
            min_fallback_fee_usd: default_min_fallback_fee_usd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRouteEntry {
    pub source_chain: String,
    pub target_chain: String,
    pub bridge: String,
    pub fee_usd: f64,
    pub latency_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherSection {
    #[serde(default = "default_dedupe_window_ms")]
    pub dedupe_window_ms: i64,
    #[serde(default = "default_min_profit_improvement")]
    pub min_profit_improvement: f64,
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: i64,
    #[serde(default = "default_output_stream_cap")]
    pub output_stream_cap: usize,
}

fn default_dedupe_window_ms() -> i64 { 5_000 }
fn default_min_profit_improvement() -> f64 { 0.1 }
fn default_max_cache_size() -> usize { 1_000 }
fn default_cache_ttl_ms() -> i64 { 10 * 60 * 1000 }
fn default_output_stream_cap() -> usize { 10_000 }

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            dedupe_window_ms: default_dedupe_window_ms(),
            min_profit_improvement: default_min_profit_improvement(),
            max_cache_size: default_max_cache_size(),
            cache_ttl_ms: default_cache_ttl_ms(),
            output_stream_cap: default_output_stream_cap(),
        }
    }
}

impl TomlConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file: {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&content).context("failed to parse TOML configuration")?;
        Ok(config)
    }
}

/// The assembled, validated runtime configuration the Detector Core and its
/// subordinates are constructed from.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub detection_interval: Duration,
    pub health_check_interval: Duration,
    pub max_price_age_ms: i64,
    pub confidence_threshold: f64,
    pub min_profit_percentage: f64,
    pub default_trade_size_usd: f64,
    pub estimated_gas_cost_usd: f64,
    pub fee_percentage: f64,
    pub spread_pre_filter_threshold: f64,
    pub estimated_swap_gas: u64,
    pub native_price_symbol: String,
    pub super_whale_threshold_usd: f64,
    pub significant_flow_threshold_usd: f64,
    pub whale_cooldown_ms: i64,
    pub chain_id_map: HashMap<u64, String>,
    pub ml: MlSection,
    pub confidence: ConfidenceConfig,
    pub bridge: BridgeEstimatorConfig,
    pub bridge_table: HashMap<(String, String), BridgeTableEntry>,
    pub price: PriceDataManagerConfig,
    pub ml_manager: MlPredictionManagerConfig,
    pub publisher: PublisherConfig,
}

impl DetectorConfig {
    pub fn from_toml(toml: TomlConfig) -> Self {
        let chain_id_map = toml
            .chains
            .into_iter()
            .map(|(name, id)| (id, name))
            .collect();

        let bridge_table = toml
            .bridge_routes
            .into_iter()
            .map(|entry| {
                (
                    (entry.source_chain, entry.target_chain),
                    BridgeTableEntry {
                        bridge: entry.bridge,
                        fee_usd: entry.fee_usd,
                        latency_seconds: entry.latency_seconds,
                    },
                )
            })
            .collect();

        Self {
            detection_interval: Duration::from_millis(toml.general.detection_interval_ms),
            health_check_interval: Duration::from_millis(toml.general.health_check_interval_ms),
            max_price_age_ms: toml.general.max_price_age_ms,
            confidence_threshold: toml.general.confidence_threshold,
            min_profit_percentage: toml.general.min_profit_percentage,
            default_trade_size_usd: toml.general.default_trade_size_usd,
            estimated_gas_cost_usd: toml.general.estimated_gas_cost_usd,
            fee_percentage: toml.general.fee_percentage,
            spread_pre_filter_threshold: toml.general.spread_pre_filter_threshold,
            estimated_swap_gas: toml.general.estimated_swap_gas,
            native_price_symbol: toml.general.native_price_symbol.clone(),
            super_whale_threshold_usd: toml.whale.super_whale_threshold_usd,
            significant_flow_threshold_usd: toml.whale.significant_flow_threshold_usd,
            whale_cooldown_ms: toml.whale.cooldown_ms,
            chain_id_map,
            ml: toml.ml.clone(),
            confidence: ConfidenceConfig {
                ml_min_confidence: toml.ml.min_confidence,
                ml_aligned_boost: toml.ml.aligned_boost,
                ml_opposed_penalty: toml.ml.opposed_penalty,
                ..ConfidenceConfig::default()
            },
            bridge: BridgeEstimatorConfig {
                min_prediction_confidence: toml.bridge.min_prediction_confidence,
                fallback_fee_pct: toml.bridge.fallback_fee_pct,
                min_fallback_fee_usd: toml.bridge.min_fallback_fee_usd,
                default_trade_size_usd: toml.general.default_trade_size_usd,
            },
            bridge_table,
            price: PriceDataManagerConfig {
                max_price_age_ms: toml.general.store_max_age_ms,
            },
            ml_manager: MlPredictionManagerConfig {
                max_latency_ms: toml.ml.max_latency_ms,
                cache_ttl: Duration::from_secs(1),
            },
            publisher: PublisherConfig {
                dedupe_window_ms: toml.publisher.dedupe_window_ms,
                min_profit_improvement: toml.publisher.min_profit_improvement,
                default_trade_size_usd: toml.general.default_trade_size_usd,
                max_cache_size: toml.publisher.max_cache_size,
                cache_ttl_ms: toml.publisher.cache_ttl_ms,
                output_stream: "opportunities".to_string(),
                output_stream_cap: toml.publisher.output_stream_cap,
            },
        }
    }

    /// Fatal checks (§4.G "Configuration validation at construction"). A
    /// `detectionIntervalMs` floor of 10ms keeps the single-flight guard
    /// meaningful; `10` itself is accepted, `9` is rejected.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, crate::error::DetectorError> {
        use crate::error::DetectorError;

        if self.detection_interval.as_millis() < 10 {
            return Err(DetectorError::InvalidConfig(format!(
                "detectionIntervalMs must be >= 10, got {}",
                self.detection_interval.as_millis()
            )));
        }
        if self.default_trade_size_usd <= 0.0 {
            return Err(DetectorError::InvalidConfig(
                "defaultTradeSizeUsd must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ml.min_confidence) {
            return Err(DetectorError::InvalidConfig(
                "mlConfig.minConfidence must be within [0,1]".to_string(),
            ));
        }
        if self.ml.aligned_boost < 1.0 {
            return Err(DetectorError::InvalidConfig(
                "mlConfig.alignedBoost must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ml.opposed_penalty) {
            return Err(DetectorError::InvalidConfig(
                "mlConfig.opposedPenalty must be within [0,1]".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        if self.ml_manager.max_latency_ms > self.detection_interval.as_millis() as u64 {
            warnings.push(ConfigWarning(format!(
                "ml.maxLatencyMs ({}) exceeds detectionIntervalMs ({}ms); predictions may lag the tick",
                self.ml_manager.max_latency_ms,
                self.detection_interval.as_millis()
            )));
        }
        if self.health_check_interval.as_millis() < 5_000 {
            warnings.push(ConfigWarning(format!(
                "healthCheckIntervalMs ({}ms) is below the recommended 5000ms floor",
                self.health_check_interval.as_millis()
            )));
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml_str = r#"
[general]
detectionIntervalMs = 100
"#;
        let parsed: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.general.detection_interval_ms, 100);
        assert_eq!(parsed.general.health_check_interval_ms, 10_000);
    }

    #[test]
    fn detector_staleness_window_and_store_eviction_age_are_independent() {
        let toml = TomlConfig {
            general: GeneralSection::default(),
            ml: MlSection::default(),
            whale: WhaleSection::default(),
            bridge: BridgeSection::default(),
            publisher: PublisherSection::default(),
            chains: HashMap::new(),
            bridge_routes: Vec::new(),
        };
        let config = DetectorConfig::from_toml(toml);
        assert_eq!(config.max_price_age_ms, 30_000);
        assert_eq!(config.price.max_price_age_ms, 300_000);
    }

    #[test]
    fn detection_interval_of_10ms_is_accepted() {
        let mut toml = TomlConfig {
            general: GeneralSection::default(),
            ml: MlSection::default(),
            whale: WhaleSection::default(),
            bridge: BridgeSection::default(),
            publisher: PublisherSection::default(),
            chains: HashMap::new(),
            bridge_routes: Vec::new(),
        };
        toml.general.detection_interval_ms = 10;
        let config = DetectorConfig::from_toml(toml);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn detection_interval_of_9ms_is_rejected() {
        let mut toml = TomlConfig {
            general: GeneralSection::default(),
            ml: MlSection::default(),
            whale: WhaleSection::default(),
            bridge: BridgeSection::default(),
            publisher: PublisherSection::default(),
            chains: HashMap::new(),
            bridge_routes: Vec::new(),
        };
        toml.general.detection_interval_ms = 9;
        let config = DetectorConfig::from_toml(toml);
        assert!(config.validate().is_err());
    }

    #[test]
    fn low_health_check_interval_warns_but_does_not_fail() {
        let mut toml = TomlConfig {
            general: GeneralSection::default(),
            ml: MlSection::default(),
            whale: WhaleSection::default(),
            bridge: BridgeSection::default(),
            publisher: PublisherSection::default(),
            chains: HashMap::new(),
            bridge_routes: Vec::new(),
        };
        toml.general.health_check_interval_ms = 1_000;
        let config = DetectorConfig::from_toml(toml);
        let warnings = config.validate().unwrap();
        assert!(!warnings.is_empty());
    }

    #[test]
    fn invalid_opposed_penalty_is_rejected() {
        let mut toml = TomlConfig {
            general: GeneralSection::default(),
            ml: MlSection::default(),
            whale: WhaleSection::default(),
            bridge: BridgeSection::default(),
            publisher: PublisherSection::default(),
            chains: HashMap::new(),
            bridge_routes: Vec::new(),
        };
        toml.ml.opposed_penalty = 1.5;
        let config = DetectorConfig::from_toml(toml);
        assert!(config.validate().is_err());
    }
}

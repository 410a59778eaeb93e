//! Component D — Confidence Calculator (§4.D)
//!
//! A pure function pipeline: base spread score, freshness penalty, then
//! optional whale and ML multiplicative adjustments, clamped to `[0, 0.95]`.
//! No component state — callers gather the relevant inputs (price points,
//! whale summary, ML predictions) themselves.

use crate::collaborators::Prediction;
use crate::types::{PredictionDirection, WhaleActivitySummary, WhaleBias};

pub const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct ConfidenceConfig {
    pub whale_bullish_boost: f64,
    pub whale_bearish_penalty: f64,
    pub super_whale_boost: f64,
    pub ml_min_confidence: f64,
    pub ml_aligned_boost: f64,
    pub ml_opposed_penalty: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            whale_bullish_boost: 1.15,
            whale_bearish_penalty: 0.85,
            super_whale_boost: 1.25,
            ml_min_confidence: 0.6,
            ml_aligned_boost: 1.15,
            ml_opposed_penalty: 0.9,
        }
    }
}

/// ML predictions for the two sides of an opportunity, if prefetched.
#[derive(Debug, Clone, Copy, Default)]
pub struct MlContext {
    pub source: Option<Prediction>,
    pub target: Option<Prediction>,
}

pub fn calculate_confidence(
    config: &ConfidenceConfig,
    low_price: f64,
    high_price: f64,
    low_timestamp_ms: i64,
    now_ms: i64,
    whale: Option<&WhaleActivitySummary>,
    ml: Option<MlContext>,
) -> f64 {
    let base = ((high_price / low_price - 1.0).min(0.5)) * 2.0;

    let age_minutes = ((now_ms - low_timestamp_ms) as f64 / 60_000.0).max(0.0);
    let freshness = (1.0 - age_minutes * 0.1).max(0.1);

    let mut score = base * freshness;

    if let Some(summary) = whale {
        match summary.dominant_direction {
            WhaleBias::Bullish => {
                score *= config.whale_bullish_boost;
                if summary.super_whale_count > 0 {
                    score *= config.super_whale_boost;
                }
            }
            WhaleBias::Bearish => score *= config.whale_bearish_penalty,
            WhaleBias::Neutral => {}
        }
    }

    if let Some(ml) = ml {
        let mut source_aligned = false;
        if let Some(prediction) = ml.source {
            if prediction.confidence >= config.ml_min_confidence {
                match prediction.direction {
                    PredictionDirection::Up => {
                        score *= config.ml_aligned_boost;
                        source_aligned = true;
                    }
                    PredictionDirection::Down => score *= config.ml_opposed_penalty,
                    PredictionDirection::Sideways => {}
                }
            }
        }
        if let Some(prediction) = ml.target {
            if prediction.confidence >= config.ml_min_confidence {
                match prediction.direction {
                    PredictionDirection::Up | PredictionDirection::Sideways => {
                        let boost = if source_aligned {
                            1.05
                        } else {
                            config.ml_aligned_boost
                        };
                        score *= boost;
                    }
                    PredictionDirection::Down => score *= config.ml_opposed_penalty,
                }
            }
        }
    }

    score.min(MAX_CONFIDENCE).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_spread_of_50_percent_saturates_the_cap() {
        let config = ConfidenceConfig::default();
        let now = crate::time::now_ms();
        let score = calculate_confidence(&config, 100.0, 150.0, now, now, None, None);
        assert_eq!(score, MAX_CONFIDENCE);
    }

    #[test]
    fn freshness_decays_with_age() {
        let config = ConfidenceConfig::default();
        let now = crate::time::now_ms();
        let fresh = calculate_confidence(&config, 100.0, 110.0, now, now, None, None);
        let stale = calculate_confidence(&config, 100.0, 110.0, now - 5 * 60_000, now, None, None);
        assert!(stale < fresh);
    }

    #[test]
    fn bullish_super_whale_boosts_score() {
        let config = ConfidenceConfig::default();
        let now = crate::time::now_ms();
        let summary = WhaleActivitySummary {
            dominant_direction: WhaleBias::Bullish,
            buy_volume_usd: 1.0,
            sell_volume_usd: 0.0,
            net_flow_usd: 1.0,
            super_whale_count: 1,
            transaction_count: 1,
            recent_transactions: vec![],
        };
        let without = calculate_confidence(&config, 100.0, 102.0, now, now, None, None);
        let with = calculate_confidence(&config, 100.0, 102.0, now, now, Some(&summary), None);
        assert!(with > without);
    }

    #[test]
    fn bearish_whale_penalizes_score() {
        let config = ConfidenceConfig::default();
        let now = crate::time::now_ms();
        let summary = WhaleActivitySummary {
            dominant_direction: WhaleBias::Bearish,
            buy_volume_usd: 0.0,
            sell_volume_usd: 1.0,
            net_flow_usd: -1.0,
            super_whale_count: 0,
            transaction_count: 1,
            recent_transactions: vec![],
        };
        let without = calculate_confidence(&config, 100.0, 102.0, now, now, None, None);
        let with = calculate_confidence(&config, 100.0, 102.0, now, now, Some(&summary), None);
        assert!(with < without);
    }

    #[test]
    fn low_confidence_ml_prediction_is_ignored() {
        let config = ConfidenceConfig::default();
        let now = crate::time::now_ms();
        let ml = MlContext {
            source: Some(Prediction {
                direction: PredictionDirection::Up,
                confidence: 0.1,
            }),
            target: None,
        };
        let without = calculate_confidence(&config, 100.0, 102.0, now, now, None, None);
        let with = calculate_confidence(&config, 100.0, 102.0, now, now, None, Some(ml));
        assert_eq!(with, without);
    }

    #[test]
    fn aligned_ml_both_sides_boosts_more_than_one_side() {
        let config = ConfidenceConfig::default();
        let now = crate::time::now_ms();
        let one_side = MlContext {
            source: Some(Prediction {
                direction: PredictionDirection::Up,
                confidence: 0.9,
            }),
            target: None,
        };
        let both_sides = MlContext {
            source: Some(Prediction {
                direction: PredictionDirection::Up,
                confidence: 0.9,
            }),
            target: Some(Prediction {
                direction: PredictionDirection::Up,
                confidence: 0.9,
            }),
        };
        let with_one = calculate_confidence(&config, 100.0, 102.0, now, now, None, Some(one_side));
        let with_both =
            calculate_confidence(&config, 100.0, 102.0, now, now, None, Some(both_sides));
        assert!(with_both > with_one);
    }

    #[test]
    fn score_never_exceeds_cap() {
        let config = ConfidenceConfig::default();
        let now = crate::time::now_ms();
        let summary = WhaleActivitySummary {
            dominant_direction: WhaleBias::Bullish,
            buy_volume_usd: 1.0,
            sell_volume_usd: 0.0,
            net_flow_usd: 1.0,
            super_whale_count: 5,
            transaction_count: 5,
            recent_transactions: vec![],
        };
        let ml = MlContext {
            source: Some(Prediction {
                direction: PredictionDirection::Up,
                confidence: 0.99,
            }),
            target: Some(Prediction {
                direction: PredictionDirection::Up,
                confidence: 0.99,
            }),
        };
        let score = calculate_confidence(&config, 10.0, 20.0, now, now, Some(&summary), Some(ml));
        assert!(score <= MAX_CONFIDENCE);
    }
}

//! Detector Core — lifecycle, scheduling, and the detection-tick hot path
//! (§4.G). Whale fan-out, pending-intent analysis, and the native-price
//! refresh/breaker live in sibling modules as additional `impl DetectorCore`
//! blocks so this file stays focused on start/stop and the periodic
//! detection tick.

use crate::bridge::BridgeCostEstimator;
use crate::collaborators::{BridgePredictor, MlPredictor, PriceOracle, StreamClient, WhaleTracker};
use crate::confidence::{calculate_confidence, MlContext};
use crate::config::DetectorConfig;
use crate::consumer::{consumer_name, ConsumerEvent, StreamConsumer};
use crate::detector::guard::{CooldownGuard, SingleFlightGuard};
use crate::detector::state_machine::{State, StateManager};
use crate::error::{DetectorError, DetectorResult};
use crate::ml::MlPredictionManager;
use crate::price::PriceDataManager;
use crate::publisher::OpportunityPublisher;
use crate::types::{CrossChainOpportunity, HealthRecord, HealthStatus, PricePoint};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
const CIRCUIT_BREAKER_COOLDOWN_MS: i64 = 30_000;
const TRANSITION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const TOP_N_OPPORTUNITIES: usize = 10;

/// The collaborators the Detector Core wires up at start; everything it
/// doesn't own outright (§6).
pub struct DetectorHandles {
    pub stream_client: Arc<dyn StreamClient>,
    pub price_oracle: Arc<dyn PriceOracle>,
    pub whale_tracker: Arc<dyn WhaleTracker>,
    pub bridge_predictor: Arc<dyn BridgePredictor>,
    pub ml_predictor: Arc<dyn MlPredictor>,
    pub hostname: String,
}

pub struct DetectorCore {
    pub(super) config: DetectorConfig,
    pub(super) state: StateManager,
    pub(super) handles: DetectorHandles,

    pub(super) price_manager: Arc<PriceDataManager>,
    pub(super) ml_manager: Arc<MlPredictionManager>,
    pub(super) bridge_estimator: Arc<BridgeCostEstimator>,
    pub(super) publisher: Arc<OpportunityPublisher>,

    pub(super) detection_guard: SingleFlightGuard,
    pub(super) health_guard: SingleFlightGuard,
    pub(super) whale_guard: CooldownGuard,

    pub(super) consecutive_tick_failures: AtomicU32,
    pub(super) circuit_open_until_ms: AtomicI64,

    pub(super) native_price_history: Mutex<VecDeque<f64>>,
    pub(super) bridge_update_timestamps: Mutex<HashMap<(String, String, String), VecDeque<i64>>>,

    pub(super) started_at_ms: AtomicI64,
    pub(super) tasks: AsyncMutex<Vec<JoinHandle<()>>>,
    pub(super) consumer: AsyncMutex<Option<StreamConsumer>>,
}

impl DetectorCore {
    pub fn new(config: DetectorConfig, handles: DetectorHandles) -> Arc<Self> {
        let bridge_estimator = Arc::new(BridgeCostEstimator::with_static_table(
            handles.bridge_predictor.clone(),
            config.bridge.clone(),
            config.bridge_table.clone(),
        ));
        let price_manager = Arc::new(PriceDataManager::new(config.price.clone()));
        let ml_manager = Arc::new(MlPredictionManager::new(
            handles.ml_predictor.clone(),
            config.ml_manager.clone(),
        ));
        let publisher = Arc::new(OpportunityPublisher::new(
            handles.stream_client.clone(),
            config.publisher.clone(),
        ));

        Arc::new(Self {
            config,
            state: StateManager::new(),
            handles,
            price_manager,
            ml_manager,
            bridge_estimator,
            publisher,
            detection_guard: SingleFlightGuard::new(),
            health_guard: SingleFlightGuard::new(),
            whale_guard: CooldownGuard::new(config.whale_cooldown_ms),
            consecutive_tick_failures: AtomicU32::new(0),
            circuit_open_until_ms: AtomicI64::new(0),
            native_price_history: Mutex::new(VecDeque::new()),
            bridge_update_timestamps: Mutex::new(HashMap::new()),
            started_at_ms: AtomicI64::new(0),
            tasks: AsyncMutex::new(Vec::new()),
            consumer: AsyncMutex::new(None),
        })
    }

    pub fn state(&self) -> State {
        self.state.get_state()
    }

    pub fn consecutive_tick_failures(&self) -> u32 {
        self.consecutive_tick_failures.load(Ordering::SeqCst)
    }

    pub fn is_circuit_open(&self) -> bool {
        crate::time::now_ms() < self.circuit_open_until_ms.load(Ordering::SeqCst)
    }

    /// Runs the start sequence (§4.G): validates collaborators are present,
    /// creates consumer groups, initializes ML and the whale tracker
    /// (best-effort), then begins the three periodic schedules. A hung
    /// transition past 30s surfaces as `TransitionTimeout`.
    pub async fn start(self: &Arc<Self>) -> DetectorResult<()> {
        if self.state.get_state() != State::Stopped {
            return Err(DetectorError::InvalidStartState(self.state.get_state()));
        }

        let this = self.clone();
        let outcome = tokio::time::timeout(TRANSITION_TIMEOUT, async move { this.do_start().await }).await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DetectorError::TransitionTimeout(TRANSITION_TIMEOUT)),
        }
    }

    async fn do_start(self: Arc<Self>) -> DetectorResult<()> {
        self.state
            .execute_start(|| async {
                self.started_at_ms.store(crate::time::now_ms(), Ordering::SeqCst);

                let name = consumer_name(&self.handles.hostname, crate::time::now_ms());
                let (mut consumer, mut receiver) =
                    StreamConsumer::new(self.handles.stream_client.clone(), name);
                consumer
                    .create_consumer_groups()
                    .await
                    .map_err(|e| DetectorError::Stream(e.to_string()))?;
                consumer.start();
                *self.consumer.lock().await = Some(consumer);

                if !self.ml_manager.initialize() {
                    warn!("ML predictor not ready at start; continuing with mlPredictorActive=false");
                }
                let _ = self.handles.whale_tracker.get_activity_summary("", "").await;

                let event_loop_core = self.clone();
                let event_loop = tokio::spawn(async move {
                    while let Some(event) = receiver.recv().await {
                        event_loop_core.handle_consumer_event(event).await;
                    }
                });

                let detection_core = self.clone();
                let detection_task = tokio::spawn(async move {
                    detection_core.run_detection_loop().await;
                });

                let health_core = self.clone();
                let health_task = tokio::spawn(async move {
                    health_core.run_health_loop().await;
                });

                let native_price_core = self.clone();
                let native_price_task = tokio::spawn(async move {
                    native_price_core.run_native_price_refresh_loop().await;
                });

                let bridge_cleanup_core = self.clone();
                let bridge_cleanup_task = tokio::spawn(async move {
                    crate::detector::bridge_data::run_bridge_data_cleanup_loop(bridge_cleanup_core).await;
                });

                let mut tasks = self.tasks.lock().await;
                tasks.push(event_loop);
                tasks.push(detection_task);
                tasks.push(health_task);
                tasks.push(native_price_task);
                tasks.push(bridge_cleanup_task);

                Ok::<(), DetectorError>(())
            })
            .await
            .map_err(|e| match e {
                crate::detector::state_machine::StartRejected::InvalidState(s) => {
                    DetectorError::InvalidStartState(s)
                }
                crate::detector::state_machine::StartRejected::Failed(err) => err,
            })
    }

    /// Reverse of start: stop timers first, then the consumer, then
    /// disconnect the stream client with a 5s timeout. Always reaches
    /// `STOPPED` even if a step fails (§7 propagation policy).
    pub async fn stop(self: &Arc<Self>) -> DetectorResult<()> {
        let this = self.clone();
        self.state
            .execute_stop(|| async move {
                let mut tasks = this.tasks.lock().await;
                for task in tasks.drain(..) {
                    task.abort();
                }
                drop(tasks);

                if let Some(mut consumer) = this.consumer.lock().await.take() {
                    consumer.stop();
                }

                let disconnect = tokio::time::timeout(
                    std::time::Duration::from_secs(5),
                    this.handles.stream_client.disconnect(),
                )
                .await;
                match disconnect {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "stream client disconnect failed"),
                    Err(_) => warn!("stream client disconnect timed out"),
                }
                Ok::<(), DetectorError>(())
            })
            .await
            .map_err(|e| match e {
                crate::detector::state_machine::StopRejected::InvalidState(s) => {
                    DetectorError::InvalidStopState(s)
                }
                crate::detector::state_machine::StopRejected::Failed(err) => err,
            })
    }

    async fn handle_consumer_event(self: &Arc<Self>, event: ConsumerEvent) {
        match event {
            ConsumerEvent::PriceUpdate(update) => self.handle_price_update(update).await,
            ConsumerEvent::WhaleTransaction(tx) => self.handle_whale_transaction(tx).await,
            ConsumerEvent::PendingOpportunity(intent) => self.handle_pending_opportunity(intent).await,
            ConsumerEvent::Error(e) => warn!(error = %e, "stream consumer error"),
        }
    }

    pub(super) async fn handle_price_update(self: &Arc<Self>, update: crate::types::PriceUpdate) {
        self.ml_manager
            .track_price_update(&update.chain, &update.pair_key, update.price);
        self.route_price_update_to_native_breaker(&update).await;
        self.price_manager.handle_update(update);
    }

    async fn run_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.detection_interval);
        loop {
            interval.tick().await;
            if self.is_circuit_open() {
                continue;
            }
            let Some(_permit) = self.detection_guard.try_acquire() else {
                continue;
            };
            match self.run_detection_tick().await {
                Ok(()) => {
                    self.consecutive_tick_failures.store(0, Ordering::SeqCst);
                }
                Err(e) => {
                    warn!(error = %e, "detection tick failed");
                    let failures = self.consecutive_tick_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures >= CIRCUIT_BREAKER_THRESHOLD {
                        self.circuit_open_until_ms.store(
                            crate::time::now_ms() + CIRCUIT_BREAKER_COOLDOWN_MS,
                            Ordering::SeqCst,
                        );
                        self.consecutive_tick_failures.store(0, Ordering::SeqCst);
                        warn!("circuit breaker open: pausing detection tick for 30s");
                    }
                }
            }
        }
    }

    /// One full detection tick (§4.G steps 1-6).
    async fn run_detection_tick(self: &Arc<Self>) -> anyhow::Result<()> {
        let snapshot = self.price_manager.create_indexed_snapshot();

        let mut surviving_pairs = Vec::new();
        // Spread pre-filter operates per normalized-token bucket, the same
        // grouping findArbitrage consumes.
        let mut surviving_buckets: Vec<(&String, &Vec<PricePoint>)> = Vec::new();
        for (key, points) in snapshot.by_token.iter() {
            if points.len() < 2 {
                continue;
            }
            let mut min_price = f64::INFINITY;
            let mut max_price = f64::NEG_INFINITY;
            for p in points {
                min_price = min_price.min(p.price);
                max_price = max_price.max(p.price);
            }
            if min_price <= 0.0 || !min_price.is_finite() {
                continue;
            }
            let spread = (max_price - min_price) / min_price;
            if spread < self.config.spread_pre_filter_threshold {
                continue;
            }
            surviving_buckets.push((key, points));
            for p in points {
                surviving_pairs.push(crate::ml::manager::PricePrefetchInput {
                    chain: p.chain.clone(),
                    pair_key: p.pair_key.clone(),
                    price: p.price,
                });
            }
        }

        if self.ml_manager.is_ready() && !surviving_pairs.is_empty() {
            self.ml_manager.prefetch_predictions(&surviving_pairs).await;
        }

        let mut opportunities = Vec::new();
        for (_key, points) in surviving_buckets {
            if let Some(opportunity) = self.find_arbitrage(points, None, None).await {
                opportunities.push(opportunity);
            }
        }

        opportunities.retain(|o| o.net_profit > 0.0 && o.confidence > self.config.confidence_threshold);
        opportunities.sort_by(|a, b| {
            let whale_order = b.whale_triggered.unwrap_or(false).cmp(&a.whale_triggered.unwrap_or(false));
            whale_order.then(b.net_profit.partial_cmp(&a.net_profit).unwrap_or(std::cmp::Ordering::Equal))
        });
        opportunities.truncate(TOP_N_OPPORTUNITIES);

        for opportunity in opportunities {
            if let Err(e) = self.publisher.publish(opportunity).await {
                warn!(error = %e, "failed to publish opportunity");
            }
        }

        Ok(())
    }

    /// The hot-path min/max arbitrage search (§4.G findArbitrage). `whale`
    /// carries the triggering transaction hash and activity summary when
    /// called from the whale fan-out path; `None` for the periodic tick.
    pub(super) async fn find_arbitrage(
        &self,
        points: &[PricePoint],
        whale: Option<(&crate::types::WhaleActivitySummary, &str)>,
        ml_predictions: Option<(crate::collaborators::Prediction, crate::collaborators::Prediction)>,
    ) -> Option<CrossChainOpportunity> {
        if points.len() < 2 {
            return None;
        }

        let mut lowest = &points[0];
        let mut highest = &points[0];
        for p in &points[1..] {
            if p.price < lowest.price {
                lowest = p;
            }
            if p.price > highest.price {
                highest = p;
            }
        }

        if lowest.price <= 0.0 || !lowest.price.is_finite() {
            return None;
        }
        if lowest.chain == highest.chain {
            return None;
        }

        let now = crate::time::now_ms();
        if lowest.update.age_ms(now) > self.config.max_price_age_ms
            || highest.update.age_ms(now) > self.config.max_price_age_ms
        {
            return None;
        }

        let price_diff = highest.price - lowest.price;
        let percentage_diff = (price_diff / lowest.price) * 100.0;

        let detailed = self
            .bridge_estimator
            .detailed_estimate(&lowest.chain, &highest.chain, &lowest.update, Some(self.config.default_trade_size_usd))
            .await;
        let trade_tokens = self
            .bridge_estimator
            .extract_token_amount(&lowest.update, Some(self.config.default_trade_size_usd));
        let bridge_cost_per_token = detailed.cost_usd / trade_tokens;
        if !bridge_cost_per_token.is_finite() || bridge_cost_per_token < 0.0 {
            return None;
        }

        let gas_per_token = (self.config.estimated_gas_cost_usd * 2.0) / trade_tokens;
        let swap_fee_per_token = self.config.fee_percentage * (lowest.price + highest.price);

        let net_profit = price_diff - bridge_cost_per_token - gas_per_token - swap_fee_per_token;
        if net_profit <= self.config.min_profit_percentage * lowest.price {
            return None;
        }

        let ml_predictions = ml_predictions.or_else(|| {
            let source = self.ml_manager.get_cached_prediction(&lowest.chain, &lowest.pair_key)?;
            let target = self.ml_manager.get_cached_prediction(&highest.chain, &highest.pair_key)?;
            Some((source, target))
        });
        let ml_context = ml_predictions.map(|(source, target)| MlContext {
            source: Some(source),
            target: Some(target),
        });
        let confidence = calculate_confidence(
            &self.config.confidence,
            lowest.price,
            highest.price,
            lowest.update.timestamp,
            now,
            whale.map(|(summary, _)| summary),
            ml_context,
        );

        let mut opportunity = CrossChainOpportunity {
            token: display_token(&lowest.pair_key),
            source_chain: lowest.chain.clone(),
            source_dex: lowest.dex.clone(),
            source_price: lowest.price,
            target_chain: highest.chain.clone(),
            target_dex: highest.dex.clone(),
            target_price: highest.price,
            price_diff,
            percentage_diff,
            estimated_profit: price_diff,
            bridge_cost: bridge_cost_per_token,
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
            pending_tx_hash: None,
            pending_deadline: None,
            pending_slippage: None,
        };

        if let Some((summary, tx_hash)) = whale {
            opportunity.whale_triggered = Some(true);
            opportunity.whale_tx_hash = Some(tx_hash.to_string());
            opportunity.whale_direction = Some(summary.dominant_direction);
            opportunity.whale_volume_usd = Some(summary.buy_volume_usd.max(summary.sell_volume_usd));
        }
        if let Some((source, target)) = ml_predictions {
            opportunity.ml_source_direction = Some(source.direction);
            opportunity.ml_target_direction = Some(target.direction);
            opportunity.ml_supported = Some(true);
        }

        Some(opportunity)
    }

    async fn run_health_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.health_check_interval);
        loop {
            interval.tick().await;
            let Some(_permit) = self.health_guard.try_acquire() else {
                continue;
            };
            if let Err(e) = self.run_health_tick().await {
                warn!(error = %e, "health tick failed");
            }
        }
    }

    async fn run_health_tick(&self) -> anyhow::Result<()> {
        let now = crate::time::now_ms();
        let started_at = self.started_at_ms.load(Ordering::SeqCst);
        let uptime_seconds = ((now - started_at).max(0) / 1000) as u64;

        let record = HealthRecord {
            name: "cross-chain-detector".to_string(),
            status: if self.is_circuit_open() {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            uptime_seconds,
            memory_usage_bytes: 0,
            cpu_usage_percent: 0.0,
            last_heartbeat: now,
            chains_monitored: self.price_manager.get_chains(),
            opportunities_cache: self.publisher.dedupe_cache_size(),
            ml_predictor_active: self.ml_manager.is_ready(),
        };

        let payload = serde_json::to_value(&record)?;
        self.handles
            .stream_client
            .xadd_with_limit("health", &payload, 1_000)
            .await?;
        self.handles
            .stream_client
            .set("health:legacy", &serde_json::to_string(&record)?)
            .await?;
        info!(status = %record.status, "health tick published");
        Ok(())
    }
}

fn display_token(pair_key: &str) -> String {
    match crate::normalize::split_pair_parts(pair_key) {
        Some((a, b)) => format!("{a}/{b}"),
        None => pair_key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::{
        InMemoryBridgePredictor, InMemoryMlPredictor, InMemoryPriceOracle, InMemoryStreamClient,
        InMemoryWhaleTracker,
    };
    use crate::config::{DetectorConfig, TomlConfig};

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

    fn point(chain: &str, dex: &str, price: f64, timestamp: i64) -> PricePoint {
        let update = crate::types::PriceUpdate {
            chain: chain.into(),
            dex: dex.into(),
            pair_key: format!("{dex}_WETH_USDC"),
            pair_address: "0xabc".into(),
            token0: "WETH".into(),
            token1: "USDC".into(),
            reserve0: "1".into(),
            reserve1: "1".into(),
            price,
            timestamp,
            block_number: 1,
            latency: 1,
        };
        PricePoint {
            chain: chain.into(),
            dex: dex.into(),
            pair_key: update.pair_key.clone(),
            price,
            update,
        }
    }

    #[tokio::test]
    async fn find_arbitrage_requires_two_points() {
        let core = DetectorCore::new(test_config(), test_handles());
        let points = vec![point("ethereum", "uniswap_v3", 2500.0, crate::time::now_ms())];
        assert!(core.find_arbitrage(&points, None, None).await.is_none());
    }

    #[tokio::test]
    async fn find_arbitrage_rejects_stale_points() {
        let core = DetectorCore::new(test_config(), test_handles());
        let stale = crate::time::now_ms() - 60_000;
        let points = vec![
            point("ethereum", "uniswap_v3", 2500.0, stale),
            point("bsc", "pancakeswap", 2750.0, stale),
        ];
        assert!(core.find_arbitrage(&points, None, None).await.is_none());
    }

    #[tokio::test]
    async fn find_arbitrage_rejects_same_chain() {
        let core = DetectorCore::new(test_config(), test_handles());
        let now = crate::time::now_ms();
        let points = vec![
            point("ethereum", "uniswap_v3", 2500.0, now),
            point("ethereum", "sushiswap", 2750.0, now),
        ];
        assert!(core.find_arbitrage(&points, None, None).await.is_none());
    }

    #[tokio::test]
    async fn find_arbitrage_emits_profitable_cross_chain_opportunity() {
        let core = DetectorCore::new(test_config(), test_handles());
        let now = crate::time::now_ms();
        let points = vec![
            point("ethereum", "uniswap_v3", 2500.0, now),
            point("bsc", "pancakeswap", 2750.0, now),
        ];
        let opportunity = core.find_arbitrage(&points, None, None).await.unwrap();
        assert_eq!(opportunity.source_chain, "ethereum");
        assert_eq!(opportunity.target_chain, "bsc");
        assert!(opportunity.net_profit > 0.0);
        assert!(opportunity.confidence > 0.0 && opportunity.confidence <= 0.95);
    }

    #[test]
    fn circuit_breaker_starts_closed() {
        let core = DetectorCore::new(test_config(), test_handles());
        assert!(!core.is_circuit_open());
        assert_eq!(core.consecutive_tick_failures(), 0);
    }
}

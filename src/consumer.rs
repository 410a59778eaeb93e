//! Component F — Stream Consumer (§4.F)
//!
//! Three independent consumer-group poll loops — `price-updates`,
//! `whale-alerts`, `pending-opportunities` — each validating its payload
//! shape at the boundary and acking unconditionally (valid or not) so a
//! poisoned message can never block the group. Validated messages are
//! delivered as `ConsumerEvent`s over an mpsc channel; the Detector Core is
//! the sole subscriber.

use crate::collaborators::StreamClient;
use crate::types::{PendingSwapIntent, PriceUpdate, WhaleTransaction};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const CONSUMER_GROUP: &str = "cross-chain-detector-group";
const PRICE_UPDATES_STREAM: &str = "price-updates";
const WHALE_ALERTS_STREAM: &str = "whale-alerts";
const PENDING_OPPORTUNITIES_STREAM: &str = "pending-opportunities";
const POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    PriceUpdate(PriceUpdate),
    WhaleTransaction(WhaleTransaction),
    PendingOpportunity(PendingSwapIntent),
    Error(String),
}

/// Derives a unique consumer name per instance: `cross-chain-{hostname}-{startedAtMs}`.
pub fn consumer_name(hostname: &str, started_at_ms: i64) -> String {
    format!("cross-chain-{hostname}-{started_at_ms}")
}

struct StreamSpec {
    name: &'static str,
    batch: usize,
}

pub struct StreamConsumer {
    client: Arc<dyn StreamClient>,
    consumer_name: String,
    sender: mpsc::Sender<ConsumerEvent>,
    handles: Vec<JoinHandle<()>>,
}

impl StreamConsumer {
    pub fn new(client: Arc<dyn StreamClient>, consumer_name: String) -> (Self, mpsc::Receiver<ConsumerEvent>) {
        let (sender, receiver) = mpsc::channel(1024);
        (
            Self {
                client,
                consumer_name,
                sender,
                handles: Vec::new(),
            },
            receiver,
        )
    }

    pub async fn create_consumer_groups(&self) -> anyhow::Result<()> {
        for stream in [PRICE_UPDATES_STREAM, WHALE_ALERTS_STREAM, PENDING_OPPORTUNITIES_STREAM] {
            self.client.create_consumer_group(stream, CONSUMER_GROUP).await?;
        }
        Ok(())
    }

    /// Spawns one poll loop per stream. Each loop runs until `stop()` aborts it.
    pub fn start(&mut self) {
        let specs = [
            StreamSpec { name: PRICE_UPDATES_STREAM, batch: 50 },
            StreamSpec { name: WHALE_ALERTS_STREAM, batch: 10 },
            StreamSpec { name: PENDING_OPPORTUNITIES_STREAM, batch: 5 },
        ];
        for spec in specs {
            let client = self.client.clone();
            let sender = self.sender.clone();
            let consumer_name = self.consumer_name.clone();
            let handle = tokio::spawn(async move {
                poll_loop(client, consumer_name, spec.name, spec.batch, sender).await;
            });
            self.handles.push(handle);
        }
    }

    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

async fn poll_loop(
    client: Arc<dyn StreamClient>,
    consumer_name: String,
    stream: &'static str,
    batch: usize,
    sender: mpsc::Sender<ConsumerEvent>,
) {
    loop {
        match client
            .xreadgroup(stream, CONSUMER_GROUP, &consumer_name, batch, POLL_INTERVAL_MS)
            .await
        {
            Ok(messages) => {
                for message in messages {
                    let event = parse_message(stream, &message.payload);
                    if let Some(event) = event {
                        if sender.send(event).await.is_err() {
                            return; // receiver dropped, core is shutting down
                        }
                    }
                    if let Err(e) = client.xack(stream, CONSUMER_GROUP, &message.id).await {
                        warn!(stream, error = %e, "failed to ack message");
                    }
                }
            }
            Err(e) => {
                debug!(stream, error = %e, "transient consumer read failure");
                let _ = sender.send(ConsumerEvent::Error(e.to_string())).await;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

/// Validates a raw payload against its stream's required shape. Returns
/// `None` (logged) on a shape mismatch — the caller still acks.
fn parse_message(stream: &str, payload: &Value) -> Option<ConsumerEvent> {
    match stream {
        PRICE_UPDATES_STREAM => match serde_json::from_value::<PriceUpdate>(payload.clone()) {
            Ok(update) if update.validate() => Some(ConsumerEvent::PriceUpdate(update)),
            Ok(_) => {
                warn!(stream, "price update failed validation, dropping");
                None
            }
            Err(e) => {
                warn!(stream, error = %e, "malformed price update, dropping");
                None
            }
        },
        WHALE_ALERTS_STREAM => match serde_json::from_value::<WhaleTransaction>(payload.clone()) {
            Ok(tx) if tx.validate() => Some(ConsumerEvent::WhaleTransaction(tx)),
            Ok(_) => {
                warn!(stream, "whale transaction failed validation, dropping");
                None
            }
            Err(e) => {
                warn!(stream, error = %e, "malformed whale transaction, dropping");
                None
            }
        },
        PENDING_OPPORTUNITIES_STREAM => {
            match serde_json::from_value::<PendingSwapIntent>(payload.clone()) {
                Ok(intent) => Some(ConsumerEvent::PendingOpportunity(intent)),
                Err(e) => {
                    warn!(stream, error = %e, "malformed pending intent, dropping");
                    None
                }
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::InMemoryStreamClient;
    use serde_json::json;

    #[test]
    fn consumer_name_includes_hostname_and_timestamp() {
        let name = consumer_name("host-1", 12345);
        assert_eq!(name, "cross-chain-host-1-12345");
    }

    #[test]
    fn valid_price_update_parses() {
        let payload = json!({
            "chain": "ethereum",
            "dex": "uniswap_v3",
            "pairKey": "uniswap_v3_WETH_USDC",
            "pairAddress": "0xabc",
            "token0": "WETH",
            "token1": "USDC",
            "reserve0": "1",
            "reserve1": "1",
            "price": 2500.0,
            "timestamp": crate::time::now_ms(),
            "blockNumber": 1,
            "latency": 10
        });
        let event = parse_message(PRICE_UPDATES_STREAM, &payload);
        assert!(matches!(event, Some(ConsumerEvent::PriceUpdate(_))));
    }

    #[test]
    fn price_update_with_nonpositive_price_is_dropped() {
        let payload = json!({
            "chain": "ethereum",
            "dex": "uniswap_v3",
            "pairKey": "uniswap_v3_WETH_USDC",
            "pairAddress": "0xabc",
            "token0": "WETH",
            "token1": "USDC",
            "reserve0": "1",
            "reserve1": "1",
            "price": 0.0,
            "timestamp": crate::time::now_ms(),
            "blockNumber": 1,
            "latency": 10
        });
        assert!(parse_message(PRICE_UPDATES_STREAM, &payload).is_none());
    }

    #[test]
    fn malformed_payload_is_dropped_not_panicking() {
        let payload = json!({"garbage": true});
        assert!(parse_message(PRICE_UPDATES_STREAM, &payload).is_none());
    }

    #[tokio::test]
    async fn start_then_stop_does_not_panic() {
        let client = Arc::new(InMemoryStreamClient::new());
        let (mut consumer, _receiver) = StreamConsumer::new(client, "cross-chain-test-1".to_string());
        consumer.create_consumer_groups().await.unwrap();
        consumer.start();
        consumer.stop();
    }
}

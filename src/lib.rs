//! Cross-chain arbitrage detector
//!
//! A stateful stream processor: consumes DEX price updates, whale-transaction
//! alerts, and pending-mempool intents across many chains, finds profitable
//! cross-chain spreads net of bridge/gas/swap costs, scores them, and emits
//! deduplicated opportunities to a downstream execution engine.

pub mod bridge;
pub mod collaborators;
pub mod confidence;
pub mod config;
pub mod consumer;
pub mod detector;
pub mod error;
pub mod ml;
pub mod normalize;
pub mod price;
pub mod publisher;
pub mod time;
pub mod types;

pub use config::{ConfigWarning, DetectorConfig, TomlConfig};
pub use detector::{DetectorCore, DetectorHandles, State};
pub use error::{DetectorError, DetectorResult};
pub use types::{ArbitrageOpportunity, CrossChainOpportunity};

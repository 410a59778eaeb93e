//! Bridge Cost Estimator (component A, §4.A)

pub mod estimator;

pub use estimator::{BridgeCostEstimator, BridgeEstimatorConfig, BridgeTableEntry};

//! Price Data Manager (component B, §4.B)

pub mod manager;

pub use manager::{PriceDataManager, PriceDataManagerConfig};

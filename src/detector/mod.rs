//! Detector Core (component G, §4.G) — lifecycle, scheduling, and the
//! detection/whale/pending-intent algorithms.

pub mod bridge_data;
pub mod core;
pub mod guard;
pub mod native_price;
pub mod pending;
pub mod state_machine;
pub mod whale;

pub use core::{DetectorCore, DetectorHandles};
pub use state_machine::State;

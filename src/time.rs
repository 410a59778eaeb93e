//! Wall-clock helpers
//!
//! The core only ever needs milliseconds-since-epoch; everything else
//! (TTLs, staleness windows, cooldowns) is expressed in milliseconds too so
//! there is a single unit to reason about.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

//! Cache metrics
//!
//! Recorded through the `metrics` facade. The host application installs
//! whatever recorder/exporter it uses; without one these calls are no-ops.

use metrics::counter;

/// Outcome of a cache read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Hit,
    Miss,
}

impl LookupResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupResult::Hit => "hit",
            LookupResult::Miss => "miss",
        }
    }
}

impl From<bool> for LookupResult {
    fn from(hit: bool) -> Self {
        if hit { LookupResult::Hit } else { LookupResult::Miss }
    }
}

/// Record a read against a named connection
pub fn record_lookup(connection: &str, result: LookupResult) {
    let labels = [
        ("connection", connection.to_string()),
        ("result", result.as_str().to_string()),
    ];

    counter!("api_cache_lookups_total", &labels).increment(1);
}

/// Record a computation triggered by a miss
pub fn record_compute(connection: &str) {
    counter!("api_cache_computes_total", "connection" => connection.to_string()).increment(1);
}

/// Record keys removed by a prefix clear
pub fn record_prefix_clear(connection: &str, deleted: usize) {
    counter!("api_cache_prefix_cleared_total", "connection" => connection.to_string())
        .increment(deleted as u64);
}

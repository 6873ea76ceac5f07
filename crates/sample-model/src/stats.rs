//! Ingest counters.

use serde::{Deserialize, Serialize};

/// Process-wide ingest statistics. Reset only on explicit request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Data samples accepted.
    pub received: u64,
    /// Samples lost according to sequence gaps.
    pub dropped: u64,
    /// Data lines that failed to parse.
    pub parse_err: u64,
    /// Samples per second over the trailing window.
    pub pps: f64,
    /// Status/comment lines seen.
    #[serde(default)]
    pub status_lines: u64,
    /// Samples discarded because the producer's protocol version is unsupported.
    #[serde(default)]
    pub protocol_mismatch: u64,
    /// Device restarts detected from the device clock.
    #[serde(default)]
    pub device_resets: u64,
    /// Host receive clock minus device clock since the run began (ms).
    #[serde(default)]
    pub clock_drift_ms: f64,
}

impl Stats {
    /// Fraction of expected samples that never arrived.
    pub fn loss_ratio(&self) -> f64 {
        let expected = self.received + self.dropped;
        if expected == 0 {
            0.0
        } else {
            self.dropped as f64 / expected as f64
        }
    }
}

// src/metrics.rs

use log::debug;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const VIDEO_REQUEST: &str = "video_request";
pub const VIDEO_SUCCESS: &str = "video_success";
pub const DOWNLOAD_FAILURE: &str = "download_failure";
pub const BAD_REQUEST: &str = "bad_request";
pub const QUOTA_EXCEED: &str = "quota_exceed";
pub const PLAYLIST_VIP_REQUIRED: &str = "playlist_vip_required";
pub const AUDIO_REQUEST: &str = "audio_request";
pub const AUDIO_SUCCESS: &str = "audio_success";
pub const CONVERSION_FAILURE: &str = "conversion_failure";

/// Process-wide named counters
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter, creating it on first use
    pub fn increment(&self, name: &str) {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let value = counters.entry(name.to_string()).or_insert(0);
        *value += 1;
        debug!("metric {} = {}", name, value);
    }

    /// Current value of a counter, zero if never incremented
    pub fn get(&self, name: &str) -> u64 {
        let counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counters.get(name).copied().unwrap_or(0)
    }

    /// Copy of all counters, sorted by name
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counters.clone()
    }

    /// Render the counters as `name: value` lines for diagnostics
    pub fn render(&self) -> String {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return "No metrics recorded yet.".to_string();
        }

        snapshot
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

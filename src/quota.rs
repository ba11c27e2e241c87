// src/quota.rs
// Per-user consumption counters with a time-boxed window

use crate::error::AppError;
use crate::UserId;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// What a quota unit stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaMode {
    /// One unit per delivered artifact
    Requests,
    /// One unit per delivered byte
    Bytes,
}

impl Default for QuotaMode {
    fn default() -> Self {
        Self::Requests
    }
}

impl QuotaMode {
    /// Units charged for delivering an artifact of `size_bytes`
    pub fn units_for(&self, size_bytes: u64) -> u64 {
        match self {
            QuotaMode::Requests => 1,
            QuotaMode::Bytes => size_bytes,
        }
    }
}

/// Consumption of one user inside the current window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub user_id: UserId,
    pub consumed_units: u64,
    pub window_expiry: DateTime<Utc>,
}

/// Answer of a `remaining` query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    /// Units left; negative when a single delivery overshot the cap
    pub units_remaining: i64,
    /// Seconds until the current window expires, 0 when no window is open
    pub seconds_until_reset: u64,
}

/// Durable per-user quota counters.
///
/// Cap enforcement is not done here: `consume` never fails, callers compare
/// `remaining` before scheduling work.
pub trait QuotaStore: Send + Sync {
    fn remaining(&self, user_id: UserId) -> QuotaStatus;
    fn consume(&self, user_id: UserId, units: u64);
    fn reset_all(&self);
}

/// Serializable copy of every live record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub records: Vec<QuotaRecord>,
}

/// In-memory quota store guarded by a single mutex.
///
/// The lock is only held for map operations, never across I/O, so
/// `reset_all` and `consume` contend for a bounded time.
#[derive(Debug)]
pub struct MemoryQuotaStore {
    cap: u64,
    window: Duration,
    records: Mutex<HashMap<UserId, QuotaRecord>>,
}

impl MemoryQuotaStore {
    pub fn new(cap: u64, window: std::time::Duration) -> Self {
        let window = Duration::from_std(window).unwrap_or_else(|_| Duration::days(1));
        Self {
            cap,
            window,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, QuotaRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// `remaining` evaluated at an explicit instant
    pub fn remaining_at(&self, user_id: UserId, now: DateTime<Utc>) -> QuotaStatus {
        let records = self.lock();
        match records.get(&user_id) {
            Some(record) if record.window_expiry > now => {
                let seconds = (record.window_expiry - now).num_seconds().max(0) as u64;
                QuotaStatus {
                    units_remaining: self.cap as i64 - record.consumed_units.min(i64::MAX as u64) as i64,
                    seconds_until_reset: seconds,
                }
            }
            _ => QuotaStatus {
                units_remaining: self.cap as i64,
                seconds_until_reset: 0,
            },
        }
    }

    /// `consume` evaluated at an explicit instant
    pub fn consume_at(&self, user_id: UserId, units: u64, now: DateTime<Utc>) {
        let mut records = self.lock();
        let record = records.entry(user_id).or_insert_with(|| QuotaRecord {
            user_id,
            consumed_units: 0,
            window_expiry: now + self.window,
        });

        // an expired window starts over instead of accumulating
        if record.window_expiry <= now {
            record.consumed_units = 0;
            record.window_expiry = now + self.window;
        }

        record.consumed_units = record.consumed_units.saturating_add(units);
        debug!(
            "user {} consumed {} units ({} total in window)",
            user_id, units, record.consumed_units
        );
    }

    /// Copy of the live records, taken under the lock
    pub fn snapshot(&self) -> QuotaSnapshot {
        let records = self.lock();
        let mut items: Vec<QuotaRecord> = records.values().cloned().collect();
        items.sort_by_key(|r| r.user_id);
        QuotaSnapshot { records: items }
    }

    /// Replace the contents with a snapshot, dropping expired records
    pub fn restore(&self, snapshot: QuotaSnapshot, now: DateTime<Utc>) {
        let mut records = self.lock();
        records.clear();
        for record in snapshot.records {
            if record.window_expiry > now {
                records.insert(record.user_id, record);
            }
        }
        debug!("restored {} quota records", records.len());
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn remaining(&self, user_id: UserId) -> QuotaStatus {
        self.remaining_at(user_id, Utc::now())
    }

    fn consume(&self, user_id: UserId, units: u64) {
        self.consume_at(user_id, units, Utc::now())
    }

    fn reset_all(&self) {
        let mut records = self.lock();
        let count = records.len();
        records.clear();
        info!("quota reset for {} users", count);
    }
}

/// Write a snapshot of the store to `path`
pub async fn save_quota_state(store: &MemoryQuotaStore, path: PathBuf) -> Result<(), AppError> {
    let snapshot = store.snapshot();
    let json = serde_json::to_string_pretty(&snapshot).map_err(AppError::JsonError)?;

    let path_str = path.to_string_lossy().to_string();
    tokio::task::spawn_blocking(move || {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)
    })
    .await
    .map_err(|e| AppError::General(format!("Failed to save quota state: {}", e)))?
    .map_err(AppError::IoError)?;

    debug!("Quota state saved to {}", path_str);
    Ok(())
}

/// Load a snapshot from `path` into the store; a missing file is not an error
pub async fn load_quota_state(store: &MemoryQuotaStore, path: PathBuf) -> Result<(), AppError> {
    if !path.exists() {
        debug!("No quota state file found at {:?}", path);
        return Ok(());
    }

    let json = tokio::fs::read_to_string(&path)
        .await
        .map_err(AppError::IoError)?;
    let snapshot: QuotaSnapshot = serde_json::from_str(&json).map_err(AppError::JsonError)?;
    store.restore(snapshot, Utc::now());

    debug!("Quota state loaded from {:?}", path);
    Ok(())
}

/// Periodically persist the store until the task is aborted
pub fn spawn_autosave(
    store: Arc<MemoryQuotaStore>,
    path: PathBuf,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = save_quota_state(&store, path.clone()).await {
                warn!("Failed to autosave quota state: {}", e);
            }
        }
    })
}

// src/scheduler.rs
// Daily quota reset at a fixed wall-clock boundary

use crate::quota::QuotaStore;
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use log::{debug, info};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// First instant strictly after `now` whose local time of day is `at`.
///
/// Days where `at` does not exist (a DST gap) fire at the first valid minute
/// after it.
pub fn next_fire_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        let mut candidate = day.and_time(at);
        for _ in 0..180 {
            if let Some(fire) = tz.from_local_datetime(&candidate).earliest() {
                if fire > *now {
                    return fire;
                }
                break;
            }
            candidate += Duration::minutes(1);
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => return now.clone() + Duration::days(1),
        };
    }
}

/// Recurring trigger calling `QuotaStore::reset_all`
pub struct ResetScheduler {
    quota: Arc<dyn QuotaStore>,
    at: NaiveTime,
}

impl ResetScheduler {
    pub fn new(quota: Arc<dyn QuotaStore>, at: NaiveTime) -> Self {
        Self { quota, at }
    }

    pub fn next_fire(&self) -> DateTime<Local> {
        next_fire_after(&Local::now(), self.at)
    }

    /// Run the trigger in the background until the handle is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut after = Local::now();
            loop {
                let fire = next_fire_after(&after, self.at);
                let wait = (fire - Local::now()).to_std().unwrap_or_default();
                debug!(
                    "next quota reset at {} (in {}s)",
                    fire.format("%Y-%m-%d %H:%M:%S"),
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;

                info!("running daily quota reset");
                self.quota.reset_all();
                // a timer that wakes early must not fire twice for one boundary
                after = fire.max(Local::now());
            }
        })
    }
}

// src/admission.rs

use crate::metrics;
use crate::quota::QuotaStore;
use crate::vip::VipVerifier;
use crate::UserId;
use chrono::{DateTime, Duration, Local};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static COMMAND_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/ytdl(?:@\w+)?\s*").expect("static regex"));
static ABSOLUTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://[^\s/?#]+[^\s]*$").expect("static regex"));
static PLAYLIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]list=").expect("static regex"));

/// Why a request was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    QuotaExceeded {
        seconds_until_reset: u64,
        reset_at: DateTime<Local>,
    },
    BadRequest,
    VipRequired,
}

impl RejectReason {
    /// The single counter incremented for this rejection
    pub fn counter(&self) -> &'static str {
        match self {
            RejectReason::QuotaExceeded { .. } => metrics::QUOTA_EXCEED,
            RejectReason::BadRequest => metrics::BAD_REQUEST,
            RejectReason::VipRequired => metrics::PLAYLIST_VIP_REQUIRED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    Accepted(String),
    Rejected(RejectReason),
}

/// Strip an optional `/ytdl` command prefix and surrounding whitespace
pub fn strip_command(text: &str) -> &str {
    let text = text.trim();
    match COMMAND_PREFIX.find(text) {
        Some(m) => text[m.end()..].trim(),
        None => text,
    }
}

/// Whether `url` denotes a multi-item collection
pub fn is_playlist(url: &str) -> bool {
    PLAYLIST_MARKER.is_match(url)
}

/// Decides whether a request may be dispatched
pub struct AdmissionController {
    quota: Arc<dyn QuotaStore>,
    vip: Arc<dyn VipVerifier>,
}

impl AdmissionController {
    pub fn new(quota: Arc<dyn QuotaStore>, vip: Arc<dyn VipVerifier>) -> Self {
        Self { quota, vip }
    }

    pub async fn admit(&self, user_id: UserId, raw_text: &str) -> AdmissionResult {
        // Quota is only checked for any remaining units; the size of the job
        // is unknown until it has run.
        let status = self.quota.remaining(user_id);
        if status.units_remaining <= 0 {
            let reset_at = Local::now() + Duration::seconds(status.seconds_until_reset as i64);
            warn!(
                "quota exceed for {}, try again in {} seconds({})",
                user_id,
                status.seconds_until_reset,
                reset_at.format("%Y-%m-%d %H:%M:%S")
            );
            return AdmissionResult::Rejected(RejectReason::QuotaExceeded {
                seconds_until_reset: status.seconds_until_reset,
                reset_at,
            });
        }

        let url = strip_command(raw_text);
        if !ABSOLUTE_URL.is_match(url) {
            info!("rejecting non-link request from {}", user_id);
            return AdmissionResult::Rejected(RejectReason::BadRequest);
        }

        if is_playlist(url) && !self.vip.check_vip(user_id).await {
            info!("playlist request from non-VIP user {}", user_id);
            return AdmissionResult::Rejected(RejectReason::VipRequired);
        }

        info!("start {}", url);
        AdmissionResult::Accepted(url.to_string())
    }
}

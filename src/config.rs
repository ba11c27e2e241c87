// src/config.rs
// Typed runtime configuration assembled from CLI flags and environment

use crate::error::AppError;
use crate::progress::ThrottlePolicy;
use crate::quota::QuotaMode;
use crate::UserId;
use chrono::NaiveTime;
use clap::ArgMatches;
use dirs_next as dirs;
use std::path::PathBuf;
use std::time::Duration;

const STATE_DIR_NAME: &str = "ytdlbot";
const QUOTA_STATE_FILE: &str = "quota.json";
const VIP_STATE_FILE: &str = "vip.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    pub quota_cap: u64,
    pub quota_mode: QuotaMode,
    pub quota_window: Duration,
    pub reset_at: NaiveTime,
    pub state_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub ytdl_bin: String,
    pub ffmpeg_bin: String,
    pub download_timeout: Option<Duration>,
    pub vip_users: Vec<UserId>,
    pub payment_url: Option<String>,
    pub owner_id: Option<UserId>,
    pub throttle: ThrottlePolicy,
    pub error_limit: usize,
}

/// Parse a `HH:MM` (or `HH:MM:SS`) wall-clock time
pub fn parse_reset_time(value: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AppError::ConfigError(format!("Invalid reset time '{}', expected HH:MM", value)))
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STATE_DIR_NAME)
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, AppError> {
        let workers = matches.get_one::<usize>("workers").copied().unwrap_or(100);
        if workers == 0 {
            return Err(AppError::ConfigError("Worker count must be at least 1".to_string()));
        }

        let quota_cap = matches.get_one::<u64>("quota").copied().unwrap_or(5);
        if quota_cap == 0 {
            return Err(AppError::ConfigError("Quota must be at least 1 unit".to_string()));
        }

        let quota_mode = match matches.get_one::<String>("quota-mode").map(|s| s.as_str()) {
            Some("bytes") => QuotaMode::Bytes,
            Some("requests") | None => QuotaMode::Requests,
            Some(other) => {
                return Err(AppError::ConfigError(format!("Unknown quota mode '{}'", other)));
            }
        };

        let quota_window = matches.get_one::<u64>("quota-window").copied().unwrap_or(86_400);
        if quota_window == 0 {
            return Err(AppError::ConfigError("Quota window must be positive".to_string()));
        }

        let reset_at = parse_reset_time(
            matches
                .get_one::<String>("reset-at")
                .map(|s| s.as_str())
                .unwrap_or("00:00"),
        )?;

        let state_dir = matches
            .get_one::<String>("state-dir")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);
        let workspace_dir = matches
            .get_one::<String>("workspace-dir")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let outbox_dir = matches
            .get_one::<String>("outbox-dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir.join("outbox"));

        let payment_url = matches.get_one::<String>("payment-url").cloned();
        if let Some(url) = &payment_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::ConfigError(format!(
                    "Payment endpoint must be an http(s) URL: {}",
                    url
                )));
            }
        }

        let throttle = ThrottlePolicy {
            step_percent: matches.get_one::<u8>("progress-step").copied().unwrap_or(5),
            window: Duration::from_secs(matches.get_one::<u64>("progress-window").copied().unwrap_or(5)),
        };

        Ok(Self {
            workers,
            quota_cap,
            quota_mode,
            quota_window: Duration::from_secs(quota_window),
            reset_at,
            state_dir,
            workspace_dir,
            outbox_dir,
            ytdl_bin: matches
                .get_one::<String>("ytdl-bin")
                .cloned()
                .unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_bin: matches
                .get_one::<String>("ffmpeg-bin")
                .cloned()
                .unwrap_or_else(|| "ffmpeg".to_string()),
            download_timeout: matches
                .get_one::<u64>("download-timeout")
                .copied()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            vip_users: matches
                .get_many::<i64>("vip-users")
                .map(|ids| ids.copied().collect())
                .unwrap_or_default(),
            payment_url,
            owner_id: matches.get_one::<i64>("owner-id").copied(),
            throttle,
            error_limit: matches.get_one::<usize>("error-limit").copied().unwrap_or(4000),
        })
    }

    pub fn quota_state_path(&self) -> PathBuf {
        self.state_dir.join(QUOTA_STATE_FILE)
    }

    pub fn vip_state_path(&self) -> PathBuf {
        self.state_dir.join(VIP_STATE_FILE)
    }
}

// src/text.rs
// User-facing message templates

use crate::quota::{QuotaMode, QuotaStatus};
use chrono::{DateTime, Local};
use humansize::{format_size, BINARY};

pub const START: &str = "Welcome to the media download bot. Send me a link and I'll fetch the video for you.";
pub const HELP: &str = "1. Send a link to a video page.\n2. Wait for the download to finish.\n3. Tap \"audio\" under a video to get its sound track.\n\nPlaylists are available to VIP users, see /vip.";
pub const ABOUT: &str = "Media download bot, built on yt-dlp and ffmpeg.";
pub const TERMS: &str = "Only download content you have the right to. Files are deleted from the server as soon as they are delivered.";
pub const VIP: &str = "VIP users can download playlists. After paying, send /vip <payment id> to activate.";
pub const VIP_PAY: &str = "Verifying your payment...";
pub const VIP_GREETING: &str = "Welcome back, VIP!\n\n";
pub const PROCESSING: &str = "Processing";
pub const SENDING: &str = "Download complete. Sending now...";
pub const SUCCESS: &str = "Download success!✅";
pub const BAD_REQUEST: &str = "I think you should send me a link.";
pub const VIP_REQUIRED: &str = "Playlist download is only available to VIP users. Join /vip now.";
pub const CONVERTING: &str = "Converting to audio...please wait patiently";
pub const UNAVAILABLE: &str = "The service is temporarily overloaded, please try again later.";

fn format_units(units: i64, mode: QuotaMode) -> String {
    match mode {
        QuotaMode::Requests => format!("{} downloads", units.max(0)),
        QuotaMode::Bytes => format_size(units.max(0) as u64, BINARY),
    }
}

/// Caption line describing the remaining quota
pub fn remaining_quota_caption(status: &QuotaStatus, mode: QuotaMode) -> String {
    if status.seconds_until_reset == 0 {
        format!("Remaining quota: {}", format_units(status.units_remaining, mode))
    } else {
        format!(
            "Remaining quota: {}, refresh in {} seconds",
            format_units(status.units_remaining, mode),
            status.seconds_until_reset
        )
    }
}

pub fn quota_exceeded(seconds_until_reset: u64, reset_at: &DateTime<Local>) -> String {
    format!(
        "Quota exceed, try again in {} seconds({})",
        seconds_until_reset,
        reset_at.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn video_caption(file_name: &str, url: &str, size_bytes: u64, remaining: &str) -> String {
    format!(
        "`{}`\n\n{}\n\nsize: {}\n\n{}",
        file_name,
        url,
        format_size(size_bytes, BINARY),
        remaining
    )
}

pub fn download_failed(url: &str, detail: &str) -> String {
    format!("{} download failed❌：\n```{}```", url, detail)
}

pub fn conversion_failed(detail: &str) -> String {
    format!("Audio conversion failed❌：\n```{}```", detail)
}

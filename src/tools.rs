// src/tools.rs
// Startup probe of the external tools the bot shells out to. Nothing is
// installed or updated here; we only report what is available.

use crate::error::AppError;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;

// Minimum versions understanding our progress template and audio copy
pub const MIN_YTDLP_VERSION: &str = "2023.07.06";
pub const MIN_FFMPEG_VERSION: &str = "4.0.0";

static YTDLP_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}\.\d{1,2}\.\d{1,2})").expect("static regex"));
static FFMPEG_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ffmpeg\s+version\s+(?:n|git-)?(?:\d{4}-\d{2}-\d{2}-)?(\d+\.\d+(?:\.\d+)?)")
        .expect("static regex")
});
static GENERIC_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\.\d+(?:\.\d+)?)").expect("static regex"));

/// Which external tool a probe is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    YtDlp,
    Ffmpeg,
}

impl ToolKind {
    fn version_flag(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => "--version",
            ToolKind::Ffmpeg => "-version",
        }
    }

    pub fn min_version(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => MIN_YTDLP_VERSION,
            ToolKind::Ffmpeg => MIN_FFMPEG_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub kind: ToolKind,
    pub binary: String,
    pub version: String,
    pub is_min_version: bool,
}

/// Extract the version from `--version` output, `None` if nothing looks like one
pub fn parse_version(output: &str, kind: ToolKind) -> Option<String> {
    let specific = match kind {
        ToolKind::YtDlp => &YTDLP_VERSION,
        ToolKind::Ffmpeg => &FFMPEG_VERSION,
    };

    specific
        .captures(output)
        .or_else(|| GENERIC_VERSION.captures(output))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Compare dotted versions numerically, missing parts count as zero
pub fn is_minimum_version(version: &str, min_version: &str) -> bool {
    let version_parts: Vec<u32> = version.split('.').filter_map(|s| s.parse().ok()).collect();
    let min_parts: Vec<u32> = min_version.split('.').filter_map(|s| s.parse().ok()).collect();

    for i in 0..3 {
        let v1 = version_parts.get(i).copied().unwrap_or(0);
        let v2 = min_parts.get(i).copied().unwrap_or(0);
        if v1 > v2 {
            return true;
        }
        if v1 < v2 {
            return false;
        }
    }
    true
}

/// Run `binary` with its version flag and parse the answer
pub async fn probe(binary: &str, kind: ToolKind) -> Result<ToolInfo, AppError> {
    let output = AsyncCommand::new(binary)
        .arg(kind.version_flag())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AppError::General(format!("{} executable not found", binary)),
            _ => AppError::General(format!("Failed to execute {}: {}", binary, e)),
        })?;

    if !output.status.success() {
        return Err(AppError::General(format!(
            "{} {} exited with {}",
            binary,
            kind.version_flag(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = match parse_version(&stdout, kind) {
        Some(version) => version,
        None => {
            debug!("Unparseable version output from {}: {}", binary, stdout);
            "unknown".to_string()
        }
    };
    let is_min_version = version != "unknown" && is_minimum_version(&version, kind.min_version());

    Ok(ToolInfo {
        kind,
        binary: binary.to_string(),
        version,
        is_min_version,
    })
}

/// Probe both tools and log what was found. Missing tools are not fatal:
/// the affected requests fail with a clear message instead.
pub async fn check_tools(ytdl_bin: &str, ffmpeg_bin: &str) -> Vec<Result<ToolInfo, AppError>> {
    let mut results = Vec::with_capacity(2);
    for (binary, kind) in [(ytdl_bin, ToolKind::YtDlp), (ffmpeg_bin, ToolKind::Ffmpeg)] {
        let result = probe(binary, kind).await;
        match &result {
            Ok(info) if info.is_min_version => info!("found {} {}", info.binary, info.version),
            Ok(info) => warn!(
                "{} {} is older than {}, downloads may fail",
                info.binary,
                info.version,
                kind.min_version()
            ),
            Err(e) => warn!("{}", e),
        }
        results.push(result);
    }
    results
}

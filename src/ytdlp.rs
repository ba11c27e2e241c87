// src/ytdlp.rs
// Downloader backed by the yt-dlp executable

use crate::dispatcher::{ArtifactRef, Downloader, JobResult};
use crate::progress::{ProgressEvent, ProgressSink};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as AsyncCommand;

const PROGRESS_PREFIX: &str = "download:";
const FILE_PREFIX: &str = "file:";
const STDERR_TAIL_LINES: usize = 200;

/// Parse a line produced by our `--progress-template`.
///
/// Format: `download:<done>/<total>/<playlist_index>/<n_entries>`, where any
/// field except `done` may be `NA`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let parts: Vec<&str> = rest.split('/').map(str::trim).collect();
    if parts.len() != 4 {
        return None;
    }

    let number = |s: &str| -> Option<u64> {
        if s == "NA" || s.is_empty() {
            return None;
        }
        s.parse::<u64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f.max(0.0) as u64))
    };

    let bytes_done = number(parts[0])?;
    let bytes_total = number(parts[1]).unwrap_or(0);
    let index = number(parts[2]).unwrap_or(1) as u32;
    let entries = number(parts[3]).unwrap_or(1) as u32;

    Some(ProgressEvent {
        bytes_done,
        bytes_total,
        items_done: index.saturating_sub(1),
        items_total: entries.max(index),
    })
}

/// Parse a final file path printed by `--print after_move:`
pub fn parse_file_line(line: &str) -> Option<PathBuf> {
    let path = line.trim().strip_prefix(FILE_PREFIX)?.trim();
    if path.is_empty() || path == "NA" {
        return None;
    }
    Some(PathBuf::from(path))
}

pub struct YtDlpDownloader {
    binary: String,
    timeout: Option<Duration>,
}

impl YtDlpDownloader {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to yt-dlp for one fetch
    pub fn build_args(url: &str, dest_dir: &Path) -> Vec<String> {
        let output = dest_dir.join("%(title).150B [%(id)s].%(ext)s");
        let mut args: Vec<String> = vec![
            "-o".into(),
            output.to_string_lossy().to_string(),
            "-f".into(),
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".into(),
            "--merge-output-format".into(),
            "mp4".into(),
            "--newline".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!(
                "{}%(progress.downloaded_bytes)s/%(progress.total_bytes,progress.total_bytes_estimate)s/%(info.playlist_index)s/%(info.n_entries)s",
                PROGRESS_PREFIX
            ),
            "--print".into(),
            format!("after_move:{}%(filepath)s", FILE_PREFIX),
            "--no-simulate".into(),
            "--socket-timeout".into(),
            "30".into(),
            "--retries".into(),
            "10".into(),
            "--fragment-retries".into(),
            "10".into(),
        ];
        args.push("--".into());
        args.push(url.to_string());
        args
    }
}

async fn read_stdout<R>(reader: R, progress: ProgressSink) -> Vec<PathBuf>
where
    R: AsyncRead + Unpin,
{
    let mut files = Vec::new();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(event) = parse_progress_line(&line) {
            progress.report(event);
        } else if let Some(path) = parse_file_line(&line) {
            debug!("yt-dlp produced {:?}", path);
            if !files.contains(&path) {
                files.push(path);
            }
        } else if !line.trim().is_empty() {
            debug!("yt-dlp: {}", line);
        }
    }
    files
}

async fn read_stderr<R>(reader: R, progress: ProgressSink) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::new();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(event) = parse_progress_line(&line) {
            progress.report(event);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        debug!("yt-dlp stderr: {}", line);
        tail.push_back(line);
        if tail.len() > STDERR_TAIL_LINES {
            tail.pop_front();
        }
    }
    tail
}

/// Files in `dir` in name order, skipping partial downloads
async fn scan_directory(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".part") || name.ends_with(".ytdl") {
            continue;
        }
        if entry.file_type().await?.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn fetch(&self, url: &str, dest_dir: &Path, progress: ProgressSink) -> JobResult {
        let mut command = AsyncCommand::new(&self.binary);
        command
            .args(Self::build_args(url, dest_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return match e.kind() {
                    io::ErrorKind::NotFound => {
                        error!("{} executable not found", self.binary);
                        JobResult::failure(format!(
                            "{} executable not found. Please ensure it's installed and in your PATH.",
                            self.binary
                        ))
                    }
                    _ => {
                        error!("Failed to execute {}: {}", self.binary, e);
                        JobResult::failure(format!("Failed to execute {}: {}", self.binary, e))
                    }
                };
            }
        };

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_stdout(out, progress.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_stderr(err, progress.clone())));

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("yt-dlp timed out after {}s, killing", limit.as_secs());
                    let _ = child.kill().await;
                    return JobResult::failure(format!(
                        "Download timed out after {} seconds",
                        limit.as_secs()
                    ));
                }
            },
            None => child.wait().await,
        };

        let status = match waited {
            Ok(status) => status,
            Err(e) => return JobResult::failure(format!("Failed to complete download: {}", e)),
        };

        let files = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => VecDeque::new(),
        };

        if !status.success() {
            let detail = if stderr_tail.is_empty() {
                format!("yt-dlp exited with {}", status)
            } else {
                stderr_tail.into_iter().collect::<Vec<_>>().join("\n")
            };
            return JobResult::failure(detail);
        }

        let files = if files.is_empty() {
            match scan_directory(dest_dir).await {
                Ok(found) => found,
                Err(e) => return JobResult::failure(format!("Failed to list downloaded files: {}", e)),
            }
        } else {
            files
        };

        let mut items = Vec::with_capacity(files.len());
        for path in files {
            match ArtifactRef::from_path(&path).await {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping missing output {:?}: {}", path, e),
            }
        }

        info!("yt-dlp finished {} with {} files", url, items.len());
        JobResult::success(items)
    }
}

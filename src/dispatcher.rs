// src/dispatcher.rs
// Lifecycle of one download job: scoped workspace, fetch, delivery, cleanup

use crate::error::AppError;
use crate::progress::ProgressSink;
use crate::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Default number of characters of a diagnostic shown to the user
pub const DEFAULT_ERROR_LIMIT: usize = 4000;

/// Current status of a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// One retrieved file inside a job's working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub display_name: String,
}

impl ArtifactRef {
    /// Build a reference from a file on disk
    pub async fn from_path(path: &Path) -> Result<Self, AppError> {
        let metadata = tokio::fs::metadata(path).await?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self {
            file_path: path.to_path_buf(),
            size_bytes: metadata.len(),
            display_name,
        })
    }
}

/// Outcome reported by a downloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub status: JobStatus,
    pub items: Vec<ArtifactRef>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(items: Vec<ArtifactRef>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            items,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            items: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// External media fetching tool
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Retrieve `url` into `dest_dir`, pushing progress into `progress`.
    /// Items are listed in retrieval order.
    async fn fetch(&self, url: &str, dest_dir: &Path, progress: ProgressSink) -> JobResult;
}

/// A download job and everything known about it
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub request_id: String,
    pub user_id: UserId,
    pub source_url: String,
    /// Removed by the time the dispatcher returns the job
    pub working_directory: PathBuf,
    pub status: JobStatus,
    pub result_items: Vec<ArtifactRef>,
    pub error_detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadJob {
    pub fn new(user_id: UserId, url: &str) -> Self {
        Self {
            request_id: generate_job_id(),
            user_id,
            source_url: url.to_string(),
            working_directory: PathBuf::new(),
            status: JobStatus::Pending,
            result_items: Vec::new(),
            error_detail: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Failed)
    }

    fn mark_running(&mut self, working_directory: PathBuf) {
        self.working_directory = working_directory;
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    fn mark_succeeded(&mut self, items: Vec<ArtifactRef>) {
        self.status = JobStatus::Succeeded;
        self.finished_at = Some(Utc::now());
        self.result_items = items;
    }

    fn mark_failed(&mut self, error: String, limit: usize) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error_detail = Some(truncate_chars(&error, limit));
    }
}

/// Generate a unique job ID
fn generate_job_id() -> String {
    use rand::Rng;
    let timestamp = Utc::now().timestamp_millis();
    let random = rand::thread_rng().gen::<u32>();
    format!("job_{}_{}", timestamp, random)
}

/// First `limit` characters of `text`, never splitting a character
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Owns the working directory and the fetch task of one running job.
///
/// Dropped early, it aborts the fetch and removes the directory only once the
/// aborted task (and the child process it owns) is gone.
struct JobScope {
    workspace: Option<tempfile::TempDir>,
    fetch: Option<JoinHandle<JobResult>>,
}

impl JobScope {
    async fn join_fetch(&mut self) -> JobResult {
        let task = match self.fetch.as_mut() {
            Some(task) => task,
            None => return JobResult::failure("Download task was not started"),
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => JobResult::failure("Downloader crashed during transfer"),
            Err(e) => JobResult::failure(format!("Download task failed: {}", e)),
        };
        self.fetch = None;
        result
    }

    fn release(mut self) {
        if let Some(workspace) = self.workspace.take() {
            release_workspace(workspace);
        }
    }
}

impl Drop for JobScope {
    fn drop(&mut self) {
        let workspace = match self.workspace.take() {
            Some(workspace) => workspace,
            None => return,
        };

        match (self.fetch.take(), tokio::runtime::Handle::try_current()) {
            (Some(task), Ok(runtime)) => {
                task.abort();
                debug!("job dropped, removing {:?} after the fetch stops", workspace.path());
                runtime.spawn(async move {
                    let _ = task.await;
                    release_workspace(workspace);
                });
            }
            (Some(task), Err(_)) => {
                task.abort();
                release_workspace(workspace);
            }
            (None, _) => release_workspace(workspace),
        }
    }
}

/// Runs download jobs inside exclusively owned working directories
pub struct JobDispatcher {
    downloader: Arc<dyn Downloader>,
    workspace_root: PathBuf,
    error_limit: usize,
}

impl JobDispatcher {
    pub fn new(downloader: Arc<dyn Downloader>, workspace_root: PathBuf) -> Self {
        Self {
            downloader,
            workspace_root,
            error_limit: DEFAULT_ERROR_LIMIT,
        }
    }

    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn allocate_workspace(&self) -> Result<tempfile::TempDir, AppError> {
        std::fs::create_dir_all(&self.workspace_root).map_err(AppError::WorkspaceUnavailable)?;
        tempfile::Builder::new()
            .prefix("ytdl-")
            .tempdir_in(&self.workspace_root)
            .map_err(AppError::WorkspaceUnavailable)
    }

    /// Run one job to a terminal status.
    ///
    /// `deliver` is called with the retrieved items while they still exist on
    /// disk. The working directory is gone once this returns, and also when
    /// the returned future is dropped early. Only a failure to allocate the
    /// working directory is reported as `Err`.
    pub async fn run<F, Fut>(
        &self,
        user_id: UserId,
        url: &str,
        progress: ProgressSink,
        deliver: F,
    ) -> Result<DownloadJob, AppError>
    where
        F: FnOnce(Vec<ArtifactRef>) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let mut job = DownloadJob::new(user_id, url);

        let workspace = match self.allocate_workspace() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Failed to allocate working directory for {}: {}", job.request_id, e);
                return Err(e);
            }
        };
        job.mark_running(workspace.path().to_path_buf());
        info!("{} started for {} in {:?}", job.request_id, url, job.working_directory);

        let downloader = Arc::clone(&self.downloader);
        let fetch_url = url.to_string();
        let dest_dir = job.working_directory.clone();
        let mut scope = JobScope {
            workspace: Some(workspace),
            fetch: Some(tokio::spawn(async move {
                downloader.fetch(&fetch_url, &dest_dir, progress).await
            })),
        };

        let result = scope.join_fetch().await;

        match result {
            JobResult {
                status: JobStatus::Succeeded,
                items,
                ..
            } if !items.is_empty() => {
                debug!("{} retrieved {} items", job.request_id, items.len());
                match deliver(items.clone()).await {
                    Ok(()) => job.mark_succeeded(items),
                    Err(e) => job.mark_failed(e.to_string(), self.error_limit),
                }
            }
            JobResult {
                status: JobStatus::Succeeded,
                ..
            } => job.mark_failed("No files were downloaded".to_string(), self.error_limit),
            JobResult { error, .. } => job.mark_failed(
                error.unwrap_or_else(|| "Unknown download error".to_string()),
                self.error_limit,
            ),
        }

        scope.release();

        match job.status {
            JobStatus::Succeeded => info!("{} succeeded", job.request_id),
            _ => warn!(
                "{} failed: {}",
                job.request_id,
                job.error_detail.as_deref().unwrap_or("")
            ),
        }
        Ok(job)
    }
}

fn release_workspace(workspace: tempfile::TempDir) {
    let path = workspace.path().to_path_buf();
    if let Err(e) = workspace.close() {
        warn!("Failed to remove working directory {:?}: {}", path, e);
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                error!("Working directory {:?} leaked: {}", path, e);
            }
        }
    }
}

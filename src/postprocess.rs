// src/postprocess.rs
// Audio extraction from an already delivered video

use crate::error::AppError;
use crate::progress::ProgressSink;
use crate::transport::{ArtifactKind, ChatAction, ChatTransport, MessageRef};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command as AsyncCommand;

/// External audio conversion tool
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Convert `source` into `out_dir/dest_name`, returning the produced path
    async fn convert(&self, dest_name: &str, source: &Path, out_dir: &Path) -> Result<PathBuf, AppError>;
}

/// Name of the audio file produced for a delivered video
pub fn audio_file_name(source_name: &str) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "audio".to_string());
    format!("{}.m4a", stem)
}

pub struct FfmpegConverter {
    binary: String,
}

impl FfmpegConverter {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    pub fn build_args(source: &Path, dest: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-i".into(),
            source.to_string_lossy().to_string(),
            "-vn".into(),
            "-c:a".into(),
            "copy".into(),
            dest.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn convert(&self, dest_name: &str, source: &Path, out_dir: &Path) -> Result<PathBuf, AppError> {
        let dest = out_dir.join(dest_name);
        let output = AsyncCommand::new(&self.binary)
            .args(Self::build_args(source, &dest))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    AppError::ConversionFailure(format!("{} executable not found", self.binary))
                }
                _ => AppError::ConversionFailure(format!("Failed to execute {}: {}", self.binary, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(AppError::ConversionFailure(format!(
                "{} exited with {}: {}",
                self.binary, output.status, tail
            )));
        }

        Ok(dest)
    }
}

/// Turns a delivered video into an audio-only artifact
pub struct PostProcessor {
    converter: Arc<dyn AudioConverter>,
    scratch_root: PathBuf,
}

impl PostProcessor {
    pub fn new(converter: Arc<dyn AudioConverter>, scratch_root: PathBuf) -> Self {
        Self {
            converter,
            scratch_root,
        }
    }

    /// Re-fetch the video behind `source_message`, convert it, send the audio.
    ///
    /// Both the fetched source and the produced audio live in scoped temp
    /// paths that are removed on every exit path. Returns the name of the
    /// delivered audio file.
    pub async fn convert_to_audio(
        &self,
        transport: &dyn ChatTransport,
        source_name: &str,
        source_message: &MessageRef,
    ) -> Result<String, AppError> {
        let chat_id = source_message.chat_id;
        let dest_name = audio_file_name(source_name);
        let suffix = Path::new(source_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        std::fs::create_dir_all(&self.scratch_root).map_err(AppError::WorkspaceUnavailable)?;
        let source = tempfile::Builder::new()
            .prefix("ytdl-src-")
            .suffix(&suffix)
            .tempfile_in(&self.scratch_root)
            .map_err(AppError::WorkspaceUnavailable)?;
        let out_dir = tempfile::Builder::new()
            .prefix("ytdl-audio-")
            .tempdir_in(&self.scratch_root)
            .map_err(AppError::WorkspaceUnavailable)?;

        info!("downloading to {:?}", source.path());
        transport.send_chat_action(chat_id, ChatAction::RecordVideoNote).await?;
        transport.download_media(source_message, source.path()).await?;
        debug!("downloading complete {:?}", source.path());

        transport.send_chat_action(chat_id, ChatAction::RecordAudio).await?;
        let audio = self
            .converter
            .convert(&dest_name, source.path(), out_dir.path())
            .await?;
        if let Err(e) = source.close() {
            warn!("Failed to remove fetched source: {}", e);
        }

        transport.send_chat_action(chat_id, ChatAction::UploadAudio).await?;
        transport
            .send_artifact(chat_id, &audio, "", ArtifactKind::Audio, ProgressSink::discard())
            .await?;

        if let Err(e) = out_dir.close() {
            warn!("Failed to remove audio scratch directory: {}", e);
        }
        info!("audio {} delivered to {}", dest_name, chat_id);
        Ok(dest_name)
    }
}

// tests/common/mod.rs
// Shared mock collaborators for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ytdlbot::dispatcher::{ArtifactRef, Downloader, JobResult};
use ytdlbot::error::AppError;
use ytdlbot::postprocess::AudioConverter;
use ytdlbot::progress::{ProgressEvent, ProgressSink};
use ytdlbot::transport::{ArtifactKind, ChatAction, ChatId, ChatKind, ChatTransport, Inbound, MessageRef};
use ytdlbot::vip::VipVerifier;
use ytdlbot::UserId;

/// Everything the core asked the transport to do
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Status { chat_id: ChatId, message_id: i64, text: String },
    Edit { message_id: i64, text: String },
    Action { chat_id: ChatId, action: ChatAction },
    Artifact {
        chat_id: ChatId,
        file_name: String,
        caption: String,
        kind: ArtifactKind,
        size: u64,
    },
    Answer { callback_id: String, text: String },
}

pub struct MockTransport {
    events: Mutex<VecDeque<Inbound>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
    media: Vec<u8>,
    fail_uploads: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(100),
            media: b"fake video bytes".to_vec(),
            fail_uploads: false,
        }
    }

    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::new()
        }
    }

    pub fn with_events(events: Vec<Inbound>) -> Self {
        let transport = Self::new();
        transport.events.lock().unwrap().extend(events);
        transport
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Text of every sent or edited status, in order
    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Status { text, .. } | Call::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn artifacts(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Artifact { .. }))
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn next_event(&self) -> Option<Inbound> {
        self.events.lock().unwrap().pop_front()
    }

    async fn send_status(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, AppError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Status {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(MessageRef { chat_id, message_id })
    }

    async fn edit_status(&self, message: &MessageRef, text: &str) -> Result<(), AppError> {
        self.record(Call::Edit {
            message_id: message.message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<(), AppError> {
        self.record(Call::Action { chat_id, action });
        Ok(())
    }

    async fn send_artifact(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
        kind: ArtifactKind,
        progress: ProgressSink,
    ) -> Result<MessageRef, AppError> {
        if self.fail_uploads {
            return Err(AppError::Transport("upload rejected".to_string()));
        }
        // the file must still exist while it is being sent
        let size = std::fs::metadata(path)?.len();
        progress.report(ProgressEvent::bytes(size / 2, size));
        progress.report(ProgressEvent::bytes(size, size));
        self.record(Call::Artifact {
            chat_id,
            file_name: path.file_name().unwrap().to_string_lossy().to_string(),
            caption: caption.to_string(),
            kind,
            size,
        });
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageRef { chat_id, message_id })
    }

    async fn download_media(&self, _message: &MessageRef, dest: &Path) -> Result<(), AppError> {
        std::fs::write(dest, &self.media)?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), AppError> {
        self.record(Call::Answer {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

pub fn private_message(user_id: UserId, text: &str) -> Inbound {
    Inbound::Message {
        chat_id: user_id,
        chat_kind: ChatKind::Private,
        user_id,
        text: text.to_string(),
    }
}

pub fn group_message(chat_id: ChatId, user_id: UserId, text: &str) -> Inbound {
    Inbound::Message {
        chat_id,
        chat_kind: ChatKind::Group,
        user_id,
        text: text.to_string(),
    }
}

/// How a scripted downloader behaves
#[derive(Debug, Clone)]
pub enum Script {
    /// Write the named files (with the given sizes) and succeed
    Files(Vec<(String, usize)>),
    /// Write a partial file, then fail with the message
    Fail(String),
    /// Succeed without producing anything
    Empty,
    /// Write a partial file, then panic
    Panic,
    /// Write a partial file, then never finish
    Hang,
    /// Keep writing fragments until cancelled
    Linger,
}

pub struct ScriptedDownloader {
    script: Script,
    seen: Mutex<Vec<PathBuf>>,
    started: tokio::sync::Notify,
}

impl ScriptedDownloader {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            seen: Mutex::new(Vec::new()),
            started: tokio::sync::Notify::new(),
        })
    }

    pub fn single(name: &str, size: usize) -> Arc<Self> {
        Self::new(Script::Files(vec![(name.to_string(), size)]))
    }

    /// Working directories the downloader was handed
    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn fetch(&self, _url: &str, dest_dir: &Path, progress: ProgressSink) -> JobResult {
        self.seen.lock().unwrap().push(dest_dir.to_path_buf());
        let partial = dest_dir.join("partial.mp4.part");

        match &self.script {
            Script::Files(files) => {
                let total: usize = files.iter().map(|(_, size)| size).sum();
                let mut done = 0usize;
                let mut items = Vec::new();
                for (name, size) in files {
                    let path = dest_dir.join(name);
                    std::fs::write(&path, vec![7u8; *size]).unwrap();
                    done += size;
                    progress.report(ProgressEvent::bytes(done as u64, total as u64));
                    items.push(ArtifactRef::from_path(&path).await.unwrap());
                }
                JobResult::success(items)
            }
            Script::Fail(message) => {
                std::fs::write(&partial, b"half").unwrap();
                JobResult::failure(message.clone())
            }
            Script::Empty => JobResult::success(Vec::new()),
            Script::Panic => {
                std::fs::write(&partial, b"half").unwrap();
                panic!("downloader exploded");
            }
            Script::Hang => {
                std::fs::write(&partial, b"half").unwrap();
                self.started.notify_one();
                tokio::time::sleep(Duration::from_secs(3600)).await;
                JobResult::failure("unreachable")
            }
            Script::Linger => {
                std::fs::write(&partial, b"half").unwrap();
                self.started.notify_one();
                let mut fragment = 0u64;
                loop {
                    let _ = std::fs::write(dest_dir.join(format!("frag{}.part", fragment)), b"x");
                    fragment += 1;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
    }
}

/// Converter writing a fixed payload, or failing
pub struct MockConverter {
    fail: Option<String>,
    sources: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    outputs: Mutex<Vec<PathBuf>>,
}

impl MockConverter {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: None,
            sources: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail: Some(message.to_string()),
            sources: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        })
    }

    /// Source paths with the bytes they held at conversion time
    pub fn sources(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.sources.lock().unwrap().clone()
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioConverter for MockConverter {
    async fn convert(&self, dest_name: &str, source: &Path, out_dir: &Path) -> Result<PathBuf, AppError> {
        let bytes = std::fs::read(source)?;
        self.sources.lock().unwrap().push((source.to_path_buf(), bytes));
        if let Some(message) = &self.fail {
            return Err(AppError::ConversionFailure(message.clone()));
        }
        let dest = out_dir.join(dest_name);
        std::fs::write(&dest, b"fake audio")?;
        self.outputs.lock().unwrap().push(dest.clone());
        Ok(dest)
    }
}

/// Fixed set of VIP users
pub struct StaticVip {
    users: HashSet<UserId>,
}

impl StaticVip {
    pub fn none() -> Arc<Self> {
        Arc::new(Self { users: HashSet::new() })
    }

    pub fn with(users: &[UserId]) -> Arc<Self> {
        Arc::new(Self {
            users: users.iter().copied().collect(),
        })
    }
}

#[async_trait]
impl VipVerifier for StaticVip {
    async fn check_vip(&self, user_id: UserId) -> bool {
        self.users.contains(&user_id)
    }

    async fn verify_payment(&self, _user_id: UserId, token: &str) -> String {
        format!("checked {}", token)
    }
}

/// Entries currently inside `dir`
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

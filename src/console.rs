// src/console.rs
// Local transport driven by stdin, delivering files into an outbox directory

use crate::error::AppError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::router::AUDIO_CALLBACK;
use crate::transport::{ArtifactKind, ChatAction, ChatId, ChatKind, ChatTransport, Inbound, MessageRef};
use crate::UserId;
use async_trait::async_trait;
use colored::*;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};

const COPY_CHUNK: usize = 256 * 1024;

/// Parse one console line.
///
/// `<user_id> <text>` is a private message, `<user_id> !audio <message_id>`
/// presses the audio button under a delivered video.
pub fn parse_line(line: &str, next_callback: u64) -> Option<ConsoleInput> {
    let line = line.trim();
    let (user, rest) = line.split_once(char::is_whitespace)?;
    let user_id: UserId = user.parse().ok()?;
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    if let Some(target) = rest.strip_prefix("!audio") {
        let message_id: i64 = target.trim().parse().ok()?;
        return Some(ConsoleInput::Audio {
            callback_id: format!("cb{}", next_callback),
            user_id,
            message_id,
        });
    }

    Some(ConsoleInput::Message {
        user_id,
        text: rest.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Message { user_id: UserId, text: String },
    Audio { callback_id: String, user_id: UserId, message_id: i64 },
}

struct Delivered {
    path: PathBuf,
    file_name: String,
}

pub struct ConsoleTransport {
    lines: tokio::sync::Mutex<Lines<Box<dyn AsyncBufRead + Send + Unpin>>>,
    outbox: PathBuf,
    next_message_id: AtomicI64,
    callbacks: AtomicI64,
    delivered: Mutex<HashMap<i64, Delivered>>,
}

impl ConsoleTransport {
    /// Transport reading from the process stdin
    pub fn stdin(outbox: PathBuf) -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()), outbox)
    }

    pub fn from_reader<R>(reader: R, outbox: PathBuf) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self {
            lines: tokio::sync::Mutex::new(reader.lines()),
            outbox,
            next_message_id: AtomicI64::new(1),
            callbacks: AtomicI64::new(1),
            delivered: Mutex::new(HashMap::new()),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    fn allocate_message(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        }
    }

    fn remember(&self, message_id: i64, delivered: Delivered) {
        match self.delivered.lock() {
            Ok(mut map) => map.insert(message_id, delivered),
            Err(poisoned) => poisoned.into_inner().insert(message_id, delivered),
        };
    }

    fn lookup(&self, message_id: i64) -> Option<(PathBuf, String)> {
        let map = match self.delivered.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(&message_id)
            .map(|d| (d.path.clone(), d.file_name.clone()))
    }
}

/// Copy `src` to `dest` in chunks, reporting bytes written
async fn copy_with_progress(src: &Path, dest: &Path, progress: &ProgressSink) -> Result<u64, AppError> {
    let mut input = File::open(src).await?;
    let total = input.metadata().await?.len();
    let mut output = File::create(dest).await?;
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut done = 0u64;

    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await?;
        done += n as u64;
        progress.report(ProgressEvent::bytes(done, total));
    }
    output.flush().await?;
    Ok(done)
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn next_event(&self) -> Option<Inbound> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    return None;
                }
            };

            let seq = self.callbacks.fetch_add(1, Ordering::SeqCst) as u64;
            match parse_line(&line, seq) {
                Some(ConsoleInput::Message { user_id, text }) => {
                    return Some(Inbound::Message {
                        chat_id: user_id,
                        chat_kind: ChatKind::Private,
                        user_id,
                        text,
                    });
                }
                Some(ConsoleInput::Audio {
                    callback_id,
                    user_id,
                    message_id,
                }) => {
                    let file_name = self.lookup(message_id).map(|(_, name)| name);
                    return Some(Inbound::Callback {
                        callback_id,
                        user_id,
                        data: AUDIO_CALLBACK.to_string(),
                        message: MessageRef {
                            chat_id: user_id,
                            message_id,
                        },
                        file_name,
                    });
                }
                None => {
                    if !line.trim().is_empty() {
                        eprintln!("{}", "Expected: <user_id> <text> or <user_id> !audio <message_id>".yellow());
                    }
                }
            }
        }
    }

    async fn send_status(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, AppError> {
        let message = self.allocate_message(chat_id);
        println!("{} {}", format!("[{} #{}]", chat_id, message.message_id).bright_cyan(), text);
        Ok(message)
    }

    async fn edit_status(&self, message: &MessageRef, text: &str) -> Result<(), AppError> {
        println!(
            "{} {}",
            format!("[{} #{} edited]", message.chat_id, message.message_id).cyan(),
            text
        );
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<(), AppError> {
        debug!("chat {} action {:?}", chat_id, action);
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
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AppError::Transport(format!("Not a file: {:?}", path)))?;

        tokio::fs::create_dir_all(&self.outbox)
            .await
            .map_err(|e| AppError::Transport(format!("Outbox unavailable: {}", e)))?;

        let message = self.allocate_message(chat_id);
        let dest = self
            .outbox
            .join(format!("{}_{}_{}", chat_id, message.message_id, file_name));
        let written = copy_with_progress(path, &dest, &progress).await?;
        info!("delivered {} ({} bytes) to {:?}", file_name, written, dest);

        self.remember(
            message.message_id,
            Delivered {
                path: dest.clone(),
                file_name: file_name.clone(),
            },
        );

        let label = match kind {
            ArtifactKind::Video => format!(
                "video #{} (send '{} !audio {}' for its audio)",
                message.message_id, chat_id, message.message_id
            ),
            ArtifactKind::Audio => format!("audio #{}", message.message_id),
        };
        println!(
            "{} {} -> {}\n{}",
            format!("[{}]", chat_id).bright_green(),
            label.green(),
            dest.display(),
            caption
        );
        Ok(message)
    }

    async fn download_media(&self, message: &MessageRef, dest: &Path) -> Result<(), AppError> {
        let (source, _) = self
            .lookup(message.message_id)
            .ok_or_else(|| AppError::Transport(format!("No media attached to message {}", message.message_id)))?;
        tokio::fs::copy(&source, dest)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to fetch {:?}: {}", source, e)))?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), AppError> {
        println!("{} {}", format!("[callback {}]", callback_id).magenta(), text);
        Ok(())
    }
}

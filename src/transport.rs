// src/transport.rs
// Contract between the core and the chat platform

use crate::error::AppError;
use crate::progress::ProgressSink;
use crate::UserId;
use async_trait::async_trait;
use std::path::Path;

pub type ChatId = i64;

/// Handle to a message previously sent or received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// Event delivered by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message {
        chat_id: ChatId,
        chat_kind: ChatKind,
        user_id: UserId,
        text: String,
    },
    Callback {
        callback_id: String,
        user_id: UserId,
        data: String,
        /// Message the button was attached to
        message: MessageRef,
        /// File name of the media carried by that message
        file_name: Option<String>,
    },
}

impl Inbound {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Inbound::Message { chat_id, .. } => *chat_id,
            Inbound::Callback { message, .. } => message.chat_id,
        }
    }
}

/// Presence indicator shown while work is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadVideo,
    UploadDocument,
    RecordVideoNote,
    RecordAudio,
    UploadAudio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Video with an inline "audio" conversion button
    Video,
    Audio,
}

/// Chat platform operations the core depends on
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Next inbound event, `None` once the platform connection is closed
    async fn next_event(&self) -> Option<Inbound>;

    async fn send_status(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, AppError>;

    async fn edit_status(&self, message: &MessageRef, text: &str) -> Result<(), AppError>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<(), AppError>;

    /// Upload a file; upload progress is pushed into `progress`
    async fn send_artifact(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
        kind: ArtifactKind,
        progress: ProgressSink,
    ) -> Result<MessageRef, AppError>;

    /// Fetch the media attached to a delivered message into `dest`
    async fn download_media(&self, message: &MessageRef, dest: &Path) -> Result<(), AppError>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), AppError>;
}

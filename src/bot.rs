// src/bot.rs
// Wires the core components together and runs the bounded worker pool

use crate::admission::{AdmissionController, AdmissionResult, RejectReason};
use crate::dispatcher::{truncate_chars, ArtifactRef, JobDispatcher, JobStatus};
use crate::error::AppError;
use crate::metrics::{self, MetricsRecorder};
use crate::postprocess::PostProcessor;
use crate::progress::{run_status_reporter, ProgressReporter, ProgressSink, ThrottlePolicy};
use crate::quota::{QuotaMode, QuotaStore};
use crate::router::{Route, Router};
use crate::text;
use crate::transport::{ArtifactKind, ChatAction, ChatId, ChatTransport, Inbound, MessageRef};
use crate::vip::VipVerifier;
use crate::UserId;
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Tunables that shape handler behaviour
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub workers: usize,
    pub quota_mode: QuotaMode,
    pub throttle: ThrottlePolicy,
    pub error_limit: usize,
    pub owner_id: Option<UserId>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            workers: 100,
            quota_mode: QuotaMode::Requests,
            throttle: ThrottlePolicy::default(),
            error_limit: crate::dispatcher::DEFAULT_ERROR_LIMIT,
            owner_id: None,
        }
    }
}

/// Collaborators the bot is assembled from
pub struct BotParts {
    pub transport: Arc<dyn ChatTransport>,
    pub quota: Arc<dyn QuotaStore>,
    pub vip: Arc<dyn VipVerifier>,
    pub dispatcher: JobDispatcher,
    pub postprocessor: PostProcessor,
    pub metrics: Arc<MetricsRecorder>,
}

pub struct Bot {
    transport: Arc<dyn ChatTransport>,
    router: Router,
    quota: Arc<dyn QuotaStore>,
    vip: Arc<dyn VipVerifier>,
    admission: AdmissionController,
    dispatcher: JobDispatcher,
    postprocessor: PostProcessor,
    metrics: Arc<MetricsRecorder>,
    settings: BotSettings,
    started: Instant,
    started_at: DateTime<Local>,
}

impl Bot {
    pub fn new(parts: BotParts, settings: BotSettings) -> Self {
        let admission = AdmissionController::new(Arc::clone(&parts.quota), Arc::clone(&parts.vip));
        Self {
            transport: parts.transport,
            router: Router::new(),
            quota: parts.quota,
            vip: parts.vip,
            admission,
            dispatcher: parts.dispatcher,
            postprocessor: parts.postprocessor,
            metrics: parts.metrics,
            settings,
            started: Instant::now(),
            started_at: Local::now(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Pull events from the transport until it closes, handling each in its
    /// own task. At most `workers` events are in flight at once.
    pub async fn serve(self: Arc<Self>) {
        let workers = self.settings.workers.max(1);
        let pool = Arc::new(Semaphore::new(workers));
        info!("serving with {} workers", workers);

        while let Some(event) = self.transport.next_event().await {
            let permit = match Arc::clone(&pool).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let bot = Arc::clone(&self);
            tokio::spawn(async move {
                bot.handle(event).await;
                drop(permit);
            });
        }

        debug!("transport closed, waiting for in-flight work");
        let _ = pool.acquire_many(workers as u32).await;
        info!("all workers finished");
    }

    /// Route one event and run its handler
    pub async fn handle(&self, event: Inbound) {
        let route = match self.router.route(&event) {
            Some(route) => route,
            None => {
                debug!("ignoring event in chat {}", event.chat_id());
                return;
            }
        };

        let result = match (route, event) {
            (Route::Audio, Inbound::Callback { callback_id, message, file_name, .. }) => {
                self.handle_audio(&callback_id, &message, file_name.as_deref()).await
            }
            (route, Inbound::Message { chat_id, user_id, text, .. }) => match route {
                Route::Start => self.handle_start(chat_id, user_id).await,
                Route::Help => self.reply(chat_id, text::HELP).await,
                Route::About => self.reply(chat_id, text::ABOUT).await,
                Route::Terms => self.reply(chat_id, text::TERMS).await,
                Route::Ping => self.handle_ping(chat_id, user_id).await,
                Route::Vip => self.handle_vip(chat_id, user_id, &text).await,
                Route::Download => self.handle_download(chat_id, user_id, &text).await,
                Route::Audio => Ok(()),
            },
            (route, _) => {
                warn!("route {:?} does not accept this event kind", route);
                Ok(())
            }
        };

        if let Err(e) = result {
            if e.is_degradation() {
                error!("service degraded: {}", e);
            } else {
                error!("handler {:?} failed: {}", route, e);
            }
        }
    }

    async fn reply(&self, chat_id: ChatId, message: &str) -> Result<(), AppError> {
        self.transport.send_chat_action(chat_id, ChatAction::Typing).await?;
        self.transport.send_status(chat_id, message).await?;
        Ok(())
    }

    fn remaining_caption(&self, user_id: UserId) -> String {
        text::remaining_quota_caption(&self.quota.remaining(user_id), self.settings.quota_mode)
    }

    async fn handle_start(&self, chat_id: ChatId, user_id: UserId) -> Result<(), AppError> {
        info!("Welcome to youtube-dl bot!");
        let greeting = if self.vip.check_vip(user_id).await {
            text::VIP_GREETING
        } else {
            ""
        };
        let message = format!("{}{}\n\n{}", greeting, text::START, self.remaining_caption(user_id));
        self.reply(chat_id, &message).await
    }

    async fn handle_ping(&self, chat_id: ChatId, user_id: UserId) -> Result<(), AppError> {
        let uptime = self.started.elapsed().as_secs();
        let mut message = format!(
            "{} v{}\nUp since {} ({}h {}m)",
            env!("CARGO_PKG_NAME"),
            crate::VERSION,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            uptime / 3600,
            (uptime % 3600) / 60
        );
        if self.settings.owner_id == Some(user_id) {
            message.push_str("\n\n");
            message.push_str(&self.metrics.render());
        }
        self.reply(chat_id, &message).await
    }

    async fn handle_vip(&self, chat_id: ChatId, user_id: UserId, message: &str) -> Result<(), AppError> {
        let token = message
            .trim()
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim())
            .unwrap_or("");

        if token.is_empty() {
            return self.reply(chat_id, text::VIP).await;
        }

        self.transport.send_chat_action(chat_id, ChatAction::Typing).await?;
        let status = self.transport.send_status(chat_id, text::VIP_PAY).await?;
        let outcome = self.vip.verify_payment(user_id, token).await;
        self.transport.edit_status(&status, &outcome).await
    }

    async fn handle_download(&self, chat_id: ChatId, user_id: UserId, message: &str) -> Result<(), AppError> {
        let url = match self.admission.admit(user_id, message).await {
            AdmissionResult::Accepted(url) => url,
            AdmissionResult::Rejected(reason) => {
                self.metrics.increment(reason.counter());
                let reply = match &reason {
                    RejectReason::QuotaExceeded {
                        seconds_until_reset,
                        reset_at,
                    } => text::quota_exceeded(*seconds_until_reset, reset_at),
                    RejectReason::BadRequest => text::BAD_REQUEST.to_string(),
                    RejectReason::VipRequired => text::VIP_REQUIRED.to_string(),
                };
                self.transport.send_status(chat_id, &reply).await?;
                return Ok(());
            }
        };

        self.metrics.increment(metrics::VIDEO_REQUEST);
        let status = self.transport.send_status(chat_id, text::PROCESSING).await?;
        self.transport.send_chat_action(chat_id, ChatAction::UploadVideo).await?;

        let (sink, rx) = ProgressSink::channel();
        let mut reporter = Some(self.spawn_reporter(rx, "Downloading", status));

        let slot = &mut reporter;
        let url_ref = url.as_str();
        let outcome = self
            .dispatcher
            .run(user_id, &url, sink, move |items| async move {
                if let Some(task) = slot.take() {
                    let _ = task.await;
                }
                self.deliver(chat_id, user_id, url_ref, &status, items).await
            })
            .await;

        if let Some(task) = reporter.take() {
            let _ = task.await;
        }

        let job = match outcome {
            Ok(job) => job,
            Err(e) => {
                self.metrics.increment(metrics::DOWNLOAD_FAILURE);
                self.transport.edit_status(&status, text::UNAVAILABLE).await?;
                return Err(e);
            }
        };

        match job.status {
            JobStatus::Succeeded => {
                self.transport.edit_status(&status, text::SUCCESS).await?;
            }
            _ => {
                self.metrics.increment(metrics::DOWNLOAD_FAILURE);
                self.transport.send_chat_action(chat_id, ChatAction::Typing).await?;
                let detail = job.error_detail.unwrap_or_default();
                let detail = truncate_chars(&detail, self.settings.error_limit);
                self.transport
                    .edit_status(&status, &text::download_failed(&url, &detail))
                    .await?;
            }
        }
        Ok(())
    }

    fn spawn_reporter(
        &self,
        rx: tokio::sync::mpsc::UnboundedReceiver<crate::progress::ProgressEvent>,
        label: &str,
        status: MessageRef,
    ) -> JoinHandle<ProgressReporter> {
        let reporter = ProgressReporter::new(self.settings.throttle, label);
        tokio::spawn(run_status_reporter(
            rx,
            reporter,
            label.to_lowercase(),
            Arc::clone(&self.transport),
            status,
        ))
    }

    /// Send every retrieved item while the working directory still exists
    async fn deliver(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        url: &str,
        status: &MessageRef,
        items: Vec<ArtifactRef>,
    ) -> Result<(), AppError> {
        self.transport.send_chat_action(chat_id, ChatAction::UploadDocument).await?;

        for item in items {
            self.transport.edit_status(status, text::SENDING).await?;
            let caption = text::video_caption(
                &item.display_name,
                url,
                item.size_bytes,
                &self.remaining_caption(user_id),
            );

            let (sink, rx) = ProgressSink::channel();
            let upload = self.spawn_reporter(rx, "Uploading", *status);
            let sent = self
                .transport
                .send_artifact(chat_id, &item.file_path, &caption, ArtifactKind::Video, sink)
                .await;
            let _ = upload.await;
            sent?;

            self.metrics.increment(metrics::VIDEO_SUCCESS);
            self.quota
                .consume(user_id, self.settings.quota_mode.units_for(item.size_bytes));
        }
        Ok(())
    }

    async fn handle_audio(
        &self,
        callback_id: &str,
        message: &MessageRef,
        file_name: Option<&str>,
    ) -> Result<(), AppError> {
        self.transport.answer_callback(callback_id, text::CONVERTING).await?;
        self.metrics.increment(metrics::AUDIO_REQUEST);

        let file_name = match file_name {
            Some(name) => name,
            None => {
                self.metrics.increment(metrics::CONVERSION_FAILURE);
                self.transport
                    .send_status(message.chat_id, &text::conversion_failed("This message carries no video."))
                    .await?;
                return Ok(());
            }
        };

        match self
            .postprocessor
            .convert_to_audio(self.transport.as_ref(), file_name, message)
            .await
        {
            Ok(audio) => {
                info!("converted {} to {}", file_name, audio);
                self.metrics.increment(metrics::AUDIO_SUCCESS);
                Ok(())
            }
            Err(e) if e.is_degradation() => {
                self.metrics.increment(metrics::CONVERSION_FAILURE);
                self.transport.send_status(message.chat_id, text::UNAVAILABLE).await?;
                Err(e)
            }
            Err(e) => {
                warn!("audio conversion of {} failed: {}", file_name, e);
                self.metrics.increment(metrics::CONVERSION_FAILURE);
                let detail = truncate_chars(&e.to_string(), self.settings.error_limit);
                self.transport
                    .send_status(message.chat_id, &text::conversion_failed(&detail))
                    .await?;
                Ok(())
            }
        }
    }
}

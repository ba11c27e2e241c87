// src/progress.rs
// Throttled progress reporting for in-flight transfers

use crate::transport::{ChatTransport, MessageRef};
use humansize::{format_size, BINARY};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One progress observation pushed by a downloader or uploader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressEvent {
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub items_done: u32,
    pub items_total: u32,
}

impl ProgressEvent {
    pub fn bytes(bytes_done: u64, bytes_total: u64) -> Self {
        Self {
            bytes_done,
            bytes_total,
            items_done: 0,
            items_total: 0,
        }
    }

    /// Completed percentage, 0 while the total is unknown
    pub fn percentage(&self) -> u8 {
        if self.bytes_total == 0 {
            return 0;
        }
        let pct = (self.bytes_done as f64 / self.bytes_total as f64 * 100.0) as u64;
        pct.min(100) as u8
    }
}

/// Sending half of a progress channel.
///
/// Reporting never blocks and never fails; events sent after the consumer is
/// gone are dropped.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Percentage step and time window governing emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub step_percent: u8,
    pub window: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            step_percent: 5,
            window: Duration::from_secs(5),
        }
    }
}

/// Per-transfer throttle state
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub job_id: String,
    pub last_reported_percentage: u8,
    pub last_report_timestamp: Instant,
    /// Playlist position of the item the percentage refers to
    pub current_item: u32,
    last_sample: (Instant, u64),
    speed_samples: Vec<f64>,
    speed: f64,
}

impl ProgressState {
    fn new(job_id: &str, now: Instant) -> Self {
        Self {
            job_id: job_id.to_string(),
            last_reported_percentage: 0,
            last_report_timestamp: now,
            current_item: 0,
            last_sample: (now, 0),
            speed_samples: Vec::new(),
            speed: 0.0,
        }
    }

    fn sample_speed(&mut self, bytes_done: u64, now: Instant) {
        let (at, bytes) = self.last_sample;
        let elapsed = now.saturating_duration_since(at);
        if elapsed < Duration::from_millis(100) {
            return;
        }

        if let Some(delta) = bytes_done.checked_sub(bytes) {
            self.speed_samples.push(delta as f64 / elapsed.as_secs_f64());
            if self.speed_samples.len() > 10 {
                self.speed_samples.remove(0);
            }
            let sum: f64 = self.speed_samples.iter().sum();
            self.speed = sum / self.speed_samples.len() as f64;
        }
        self.last_sample = (now, bytes_done);
    }

    fn eta(&self, event: &ProgressEvent) -> Option<Duration> {
        if self.speed <= 0.0 || event.bytes_done >= event.bytes_total {
            return None;
        }
        let remaining = (event.bytes_total - event.bytes_done) as f64;
        Some(Duration::from_secs_f64(remaining / self.speed))
    }
}

/// A status line the transport should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub job_id: String,
    pub percentage: u8,
    pub text: String,
}

/// Decides when progress becomes a visible status update
#[derive(Debug)]
pub struct ProgressReporter {
    policy: ThrottlePolicy,
    label: String,
    states: HashMap<String, ProgressState>,
}

impl ProgressReporter {
    pub fn new(policy: ThrottlePolicy, label: &str) -> Self {
        Self {
            policy,
            label: label.to_string(),
            states: HashMap::new(),
        }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Start tracking a transfer; the window is measured from here
    pub fn begin(&mut self, job_id: &str, now: Instant) {
        self.states
            .insert(job_id.to_string(), ProgressState::new(job_id, now));
    }

    /// Drop the state of a finished transfer
    pub fn finish(&mut self, job_id: &str) -> Option<ProgressState> {
        self.states.remove(job_id)
    }

    pub fn state(&self, job_id: &str) -> Option<&ProgressState> {
        self.states.get(job_id)
    }

    /// Feed one event; returns an update when the throttle lets it through
    pub fn on_progress(
        &mut self,
        job_id: &str,
        event: ProgressEvent,
        now: Instant,
    ) -> Option<StatusUpdate> {
        let policy = self.policy;
        let state = self
            .states
            .entry(job_id.to_string())
            .or_insert_with(|| ProgressState::new(job_id, now));

        // each playlist item restarts at 0 %, so the step is measured per item
        if event.items_done != state.current_item {
            state.current_item = event.items_done;
            state.last_reported_percentage = 0;
            state.last_sample = (now, 0);
        }

        state.sample_speed(event.bytes_done, now);

        let percentage = event.percentage();
        let stepped = percentage >= state.last_reported_percentage.saturating_add(policy.step_percent);
        let waited = now.saturating_duration_since(state.last_report_timestamp) >= policy.window;
        let completed = percentage == 100 && state.last_reported_percentage < 100;

        if !(stepped || waited || completed) {
            return None;
        }

        state.last_reported_percentage = percentage;
        state.last_report_timestamp = now;

        let text = format_status(&self.label, &event, state.speed, state.eta(&event));
        Some(StatusUpdate {
            job_id: job_id.to_string(),
            percentage,
            text,
        })
    }
}

fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(duration) => {
            let total_secs = duration.as_secs();
            let hours = total_secs / 3600;
            let minutes = (total_secs % 3600) / 60;
            let seconds = total_secs % 60;

            if hours > 0 {
                format!("{}h {}m {}s", hours, minutes, seconds)
            } else if minutes > 0 {
                format!("{}m {}s", minutes, seconds)
            } else {
                format!("{}s", seconds)
            }
        }
        None => "Calculating...".to_string(),
    }
}

/// Render a status message for a progress event
pub fn format_status(label: &str, event: &ProgressEvent, speed: f64, eta: Option<Duration>) -> String {
    let mut text = format!("{} {}%", label, event.percentage());
    if event.items_total > 1 {
        let current = (event.items_done + 1).min(event.items_total);
        text.push_str(&format!(" [{}/{}]", current, event.items_total));
    }

    let size = if event.bytes_total == 0 {
        format!("{} / Unknown", format_size(event.bytes_done, BINARY))
    } else {
        format!(
            "{} / {}",
            format_size(event.bytes_done, BINARY),
            format_size(event.bytes_total, BINARY)
        )
    };
    let speed = if speed <= 0.0 {
        "Calculating...".to_string()
    } else {
        format!("{}/s", format_size(speed as u64, BINARY))
    };

    text.push_str(&format!("\nSize: {} | Speed: {} | ETA: {}", size, speed, format_eta(eta)));
    text
}

/// Consume a progress channel and edit `status` whenever the throttle allows.
///
/// Runs until every sink for the channel is dropped. Events queued while an
/// edit is in flight are coalesced to the most recent one.
pub async fn run_status_reporter(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    mut reporter: ProgressReporter,
    job_id: String,
    transport: Arc<dyn ChatTransport>,
    status: MessageRef,
) -> ProgressReporter {
    reporter.begin(&job_id, Instant::now());

    while let Some(mut event) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            event = newer;
        }

        if let Some(update) = reporter.on_progress(&job_id, event, Instant::now()) {
            debug!("{} progress {}%", job_id, update.percentage);
            if let Err(e) = transport.edit_status(&status, &update.text).await {
                warn!("Failed to edit status for {}: {}", job_id, e);
            }
        }
    }

    reporter.finish(&job_id);
    reporter
}

// src/router.rs
// Explicit mapping from inbound event kind to handler

use crate::transport::{ChatKind, Inbound};
use std::collections::HashMap;

pub const AUDIO_CALLBACK: &str = "audio";

/// Handler selected for an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Start,
    Help,
    Ping,
    About,
    Terms,
    Vip,
    Download,
    Audio,
}

/// Built once at startup, then shared read-only by every worker
#[derive(Debug, Clone)]
pub struct Router {
    commands: HashMap<&'static str, Route>,
    callbacks: HashMap<&'static str, Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Command name of a `/command@bot args` message, lowercased
pub fn command_name(text: &str) -> Option<String> {
    let first = text.trim().split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

impl Router {
    pub fn new() -> Self {
        let commands = HashMap::from([
            ("start", Route::Start),
            ("help", Route::Help),
            ("ping", Route::Ping),
            ("about", Route::About),
            ("terms", Route::Terms),
            ("vip", Route::Vip),
            ("ytdl", Route::Download),
        ]);
        let callbacks = HashMap::from([(AUDIO_CALLBACK, Route::Audio)]);
        Self { commands, callbacks }
    }

    /// Pick the handler for `inbound`, `None` when the event is ignored.
    ///
    /// In group chats only explicit commands are handled; plain text there is
    /// conversation, not a request.
    pub fn route(&self, inbound: &Inbound) -> Option<Route> {
        match inbound {
            Inbound::Message {
                chat_kind, text, ..
            } => match command_name(text) {
                Some(name) => match self.commands.get(name.as_str()) {
                    Some(route) => Some(*route),
                    None if *chat_kind == ChatKind::Private => Some(Route::Download),
                    None => None,
                },
                None if *chat_kind == ChatKind::Private => Some(Route::Download),
                None => None,
            },
            Inbound::Callback { data, .. } => self.callbacks.get(data.as_str()).copied(),
        }
    }
}

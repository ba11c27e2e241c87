// src/lib.rs
// Core of the media download bot, independent of the chat platform

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifier of a chat platform user
pub type UserId = i64;

pub mod admission;
pub mod bot;
pub mod cli;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod postprocess;
pub mod progress;
pub mod quota;
pub mod router;
pub mod scheduler;
pub mod text;
pub mod tools;
pub mod transport;
pub mod vip;
pub mod ytdlp;

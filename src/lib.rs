//! Update dispatch runtime for Telegram bots.
//!
//! A [`Bot`] receives updates through long polling or a webhook, resolves
//! its own identity once, builds a fresh [`Context`] per update and runs the
//! handler under a timeout. Failures go to a replaceable error handler.

pub mod api;
pub mod bot;
pub mod catch;
pub mod client;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod identity;
pub mod middleware;
pub mod platform;
pub mod response;
pub mod types;

#[cfg(test)]
mod mocks;

pub use api::{BotApi, TelegramApi};
pub use bot::{Bot, BotOptions, LaunchOptions, WebhookOptions};
pub use catch::{ErrorHandler, ExitCodeReporter, FailLoudly, FaultReporter};
pub use client::Telegram;
pub use context::Context;
pub use error::{ApiError, BotError, Result};
pub use middleware::{Middleware, Next};
pub use types::{BotIdentity, Update, UpdateKind};

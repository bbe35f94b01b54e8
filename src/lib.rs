//! MediaRelay - Telegram bot that turns Facebook, TikTok and YouTube links
//! into playable media.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging and shared utilities
//! - `download`: link classification, adapter fallback, delivery planning and the
//!   per-message pipeline
//! - `storage`: the known-chats store behind the user count and broadcast
//! - `telegram`: the messaging gateway, dispatcher schema and admin panel
//! - `testing`: a recording gateway for tests

#![allow(clippy::too_many_arguments)]

pub mod cli;
pub mod core;
pub mod download;
pub mod storage;
pub mod telegram;
pub mod testing;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult, Config};
pub use download::{MediaPipeline, MediaRequest, Resolver, SourceRegistry};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use telegram::{schema, HandlerDeps};

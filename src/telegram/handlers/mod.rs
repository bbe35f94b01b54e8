//! Telegram bot handler tree configuration
//!
//! This module provides the main dispatcher schema for the Telegram bot.
//! Routing works on decoded envelopes, so tests drive the same handlers as
//! production through a recording gateway.

mod commands;
mod schema;
mod types;

pub use commands::{handle_callback, handle_message};
pub use schema::schema;
pub use types::{HandlerDeps, HandlerError};

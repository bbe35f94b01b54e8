//! Bot initialization and command parsing
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation

use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;

use crate::core::config::{self, Config};

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "search YouTube and download songs")]
    Song(String),
}

impl Command {
    /// Parses `/start` and `/song <query>`, tolerating a `@botname` suffix
    /// and any letter case.
    ///
    /// Unlike `BotCommands::parse`, extra arguments to `/start` (deep-link
    /// payloads) are accepted and ignored.
    pub fn from_text(text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head);
        match name.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "song" => Some(Command::Song(args.trim().to_string())),
            _ => None,
        }
    }
}

/// Creates a bot instance with the configured token.
///
/// Uses the custom Bot API server from `BOT_API_URL` when set.
pub fn create_bot(config: &Config) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new()
        .connect_timeout(config::network::connect_timeout())
        .timeout(config::network::bot_api_timeout())
        .build()?;
    let bot = Bot::with_client(config.bot_token.expose_secret(), client);

    Ok(match &config.bot_api_url {
        Some(url) => {
            log::info!("Using custom Bot API URL: {}", url);
            bot.set_api_url(url.clone())
        }
        None => bot,
    })
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "show the welcome message"),
        BotCommand::new("song", "search YouTube and download songs"),
    ])
    .await?;

    Ok(())
}

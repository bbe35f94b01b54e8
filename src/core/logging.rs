//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A one-shot dump of the effective configuration (secrets redacted)

use anyhow::Result;
use simplelog::*;
use std::fs::File;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective configuration at startup.
///
/// The bot token is never printed; only whether one is present.
pub fn log_configuration(config: &crate::core::config::Config) {
    use secrecy::ExposeSecret;

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("⚙️  Configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if config.bot_token.expose_secret().is_empty() {
        log::warn!("⚠️  BOT_TOKEN: not set");
    } else {
        log::info!("✅ BOT_TOKEN: set");
    }

    match config.owner_id {
        Some(id) => log::info!("✅ OWNER_ID: {} (admin panel enabled)", id),
        None => log::warn!("⚠️  OWNER_ID: not set (admin panel disabled)"),
    }

    log::info!("   Inline upload limit: {} MiB", config.max_inline_mib());
    log::info!("   Redirect page: {}", config.redirect_base_url);
    log::info!(
        "   Adapter timeout: {}s, request ceiling: {}s",
        config.attempt_timeout.as_secs(),
        config.request_ceiling.as_secs()
    );
    log::info!("   Media read timeout: {}s", config.media_read_timeout.as_secs());
    log::info!("   yt-dlp binary: {}", config.ytdl_bin);
    if let Some(ref api) = config.bot_api_url {
        log::info!("   Custom Bot API: {}", api);
    }
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

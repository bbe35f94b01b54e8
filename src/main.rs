use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use tokio::time::sleep;
use url::Url;

use mediarelay::cli::{Cli, Commands};
use mediarelay::core::utils::strip_html_tags;
use mediarelay::core::{init_logger, log_configuration, AppError, Config};
use mediarelay::download::caption::{format_caption, format_duration};
use mediarelay::download::redirect::{decode_redirect_query, encode_redirect_url, RedirectFields};
use mediarelay::download::ytdlp::{clamp_limit, SongSource};
use mediarelay::download::{
    DeliveryExecutor, HttpMediaFetcher, MediaPipeline, MediaRequest, RequestedMode, Resolver, ResolverPolicy,
    SourceRegistry, YtDlpCli,
};
use mediarelay::storage::{create_pool, SqliteSongHistory, SqliteUserStore};
use mediarelay::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps, MessengerGateway, TelegramGateway};

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (config, logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    dotenv().ok();

    let config = Config::from_env()?;

    // Dispatch to appropriate command
    match cli.command {
        Some(Commands::Run) | None => {
            // Initialize logger (console + file)
            init_logger(&config.log_file_path)?;
            log_configuration(&config);
            run_bot(config).await
        }
        Some(Commands::Resolve { url, json }) => run_cli_resolve(&config, &url, json).await,
        Some(Commands::Search { query, limit }) => run_cli_search(&config, &query, limit).await,
    }
}

/// Run the bot with long polling until Ctrl+C
async fn run_bot(config: Config) -> Result<()> {
    use secrecy::ExposeSecret;

    if config.bot_token.expose_secret().is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN environment variable not set"));
    }
    let config = Arc::new(config);

    let db_pool = Arc::new(
        create_pool(&config.database_path).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    let store = Arc::new(SqliteUserStore::new(Arc::clone(&db_pool)));
    let song_history = Arc::new(SqliteSongHistory::new(db_pool));

    // Create bot instance
    let bot = create_bot(&config)?;

    // Retry if Bot API is still initializing (local server returns "restart")
    let bot_info = {
        let startup_max_retries = 60; // Up to 5 minutes (60 * 5s)
        let mut startup_retry = 0;
        loop {
            match bot.get_me().await {
                Ok(info) => break info,
                Err(e) => {
                    let err_str = e.to_string();
                    let is_retryable = err_str.contains("restart")
                        || err_str.contains("network")
                        || err_str.contains("connection")
                        || err_str.contains("timed out")
                        || err_str.contains("Connection refused");

                    startup_retry += 1;
                    if startup_retry >= startup_max_retries || !is_retryable {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to Bot API after {} retries: {}",
                            startup_retry,
                            e
                        ));
                    }

                    log::warn!(
                        "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                        startup_retry,
                        startup_max_retries,
                        err_str
                    );
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    };
    log::info!("Bot username: {:?}, Bot ID: {}", bot_info.username.as_deref(), bot_info.id);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let gateway: Arc<dyn MessengerGateway> = Arc::new(TelegramGateway::new(bot.clone()));
    let registry = Arc::new(SourceRegistry::default_registry(&config)?);
    let resolver = Resolver::new(registry, ResolverPolicy::from(config.as_ref()));
    let fetcher = Arc::new(HttpMediaFetcher::from_config(&config)?);
    let executor = DeliveryExecutor::from_config(Arc::clone(&gateway), fetcher, &config);
    let pipeline = MediaPipeline::new(Arc::clone(&gateway), resolver, executor);
    let songs = Arc::new(YtDlpCli::new(config.ytdl_bin.clone()));

    let deps = HandlerDeps::new(Arc::clone(&config), gateway, store, pipeline, songs, song_history);
    let handler = schema(deps);

    log::info!("🚀 Starting long polling");

    // Create polling listener that drops pending updates on start
    let listener = Polling::builder(bot.clone()).drop_pending_updates().build();

    // Requests are independent, so updates are not serialized per chat
    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .distribution_function(|_| None::<std::convert::Infallible>)
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}

/// Resolve a link from the command line, or decode a redirect-page link
async fn run_cli_resolve(config: &Config, raw_url: &str, json: bool) -> Result<()> {
    if let Some(link) = as_redirect_link(config, raw_url) {
        let fields = decode_redirect_query(&link)?;
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "url": fields.url,
                    "title": fields.title,
                    "uploader": fields.uploader,
                    "duration": fields.duration,
                    "views": fields.views,
                    "date": fields.date,
                }))?
            );
        } else {
            println!("URL:      {}", fields.url);
            println!("Title:    {}", fields.title);
            println!("Uploader: {}", fields.uploader);
            println!("Duration: {}", fields.duration);
            println!("Views:    {}", fields.views);
            println!("Date:     {}", fields.date);
        }
        return Ok(());
    }

    let request = MediaRequest::new(raw_url, RequestedMode::VideoOnly).map_err(AppError::from)?;
    let registry = Arc::new(SourceRegistry::default_registry(config)?);
    let resolver = Resolver::new(registry, ResolverPolicy::from(config));

    let media = match resolver.resolve(&request).await {
        Ok(media) => media,
        Err(failure) => {
            for attempt in &failure.attempts {
                eprintln!("  {}", attempt);
            }
            return Err(anyhow::anyhow!("{}", failure));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&media)?);
    } else {
        println!("{}", strip_html_tags(&format_caption(&media.metadata)));
        println!();
        println!("Playable: {}", media.playable_url());
        if let Some(ref alternate) = media.alternate_quality_url {
            println!("Alternate: {}", alternate);
        }
        let link = encode_redirect_url(
            &config.redirect_base_url,
            &RedirectFields::from_media(&media, media.playable_url()),
        );
        println!("Redirect: {}", link);
    }
    Ok(())
}

/// Returns the parsed URL when it points at the configured redirect page.
fn as_redirect_link(config: &Config, raw_url: &str) -> Option<Url> {
    let url = Url::parse(raw_url.trim()).ok()?;
    let base = &config.redirect_base_url;
    (url.host_str() == base.host_str() && url.path() == base.path() && url.query().is_some()).then_some(url)
}

/// List YouTube search hits
async fn run_cli_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let source = YtDlpCli::new(config.ytdl_bin.clone());
    let results = source.search(query, clamp_limit(limit)).await?;

    if results.is_empty() {
        println!("No results for {:?}", query);
        return Ok(());
    }
    for (index, result) in results.iter().enumerate() {
        let duration = format_duration(result.duration_seconds);
        println!("{:>2}. [{}] {}  {}", index + 1, duration, result.title, result.url);
    }
    Ok(())
}

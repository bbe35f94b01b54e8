//! Runtime configuration.
//!
//! Deployment settings (token, owner, limits, endpoints) are read once at
//! startup into an immutable [`Config`] that is passed to whoever needs it.
//! Policy constants that are not meant to vary per deployment are grouped in
//! the nested modules below.

use secrecy::SecretString;
use std::env;
use std::time::Duration;
use url::Url;

use crate::core::error::{AppError, AppResult};

/// Telegram's upload ceiling for bots talking to the public Bot API.
pub const DEFAULT_MAX_INLINE_BYTES: u64 = 50 * 1024 * 1024;

/// Static page that decodes the base64 query and offers the direct link.
pub const DEFAULT_REDIRECT_BASE_URL: &str = "https://mediarelay.github.io/download/";

/// JSON metadata endpoint for Facebook videos.
pub const DEFAULT_FACEBOOK_METADATA_API: &str = "https://fdown.isuru.eu.org/info";

pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 25;
pub const DEFAULT_REQUEST_CEILING_SECS: u64 = 100;

/// Longest silence tolerated while streaming media bytes from a CDN.
pub const DEFAULT_MEDIA_READ_TIMEOUT_SECS: u64 = 60;

/// Immutable bot configuration, built once and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot API token (BOT_TOKEN or TELOXIDE_TOKEN)
    pub bot_token: SecretString,
    /// Chat id of the bot owner; enables the admin panel
    pub owner_id: Option<i64>,
    /// Media above this size is never uploaded inline
    pub max_inline_bytes: u64,
    /// Base URL of the static redirect page
    pub redirect_base_url: Url,
    /// SQLite file backing the user store
    pub database_path: String,
    /// Log file written next to the terminal output
    pub log_file_path: String,
    /// yt-dlp binary used for YouTube resolution and song downloads
    pub ytdl_bin: String,
    /// Facebook JSON metadata endpoint
    pub facebook_metadata_api: String,
    /// Hard bound for a single adapter attempt
    pub attempt_timeout: Duration,
    /// Soft bound for a whole resolution
    pub request_ceiling: Duration,
    /// Per-read bound while downloading media for an inline upload
    pub media_read_timeout: Duration,
    /// Custom (local) Bot API server
    pub bot_api_url: Option<Url>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: SecretString::from(String::new()),
            owner_id: None,
            max_inline_bytes: DEFAULT_MAX_INLINE_BYTES,
            redirect_base_url: default_redirect_base_url(),
            database_path: "users.sqlite".to_string(),
            log_file_path: "mediarelay.log".to_string(),
            ytdl_bin: "yt-dlp".to_string(),
            facebook_metadata_api: DEFAULT_FACEBOOK_METADATA_API.to_string(),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            request_ceiling: Duration::from_secs(DEFAULT_REQUEST_CEILING_SECS),
            media_read_timeout: Duration::from_secs(DEFAULT_MEDIA_READ_TIMEOUT_SECS),
            bot_api_url: None,
        }
    }
}

#[allow(clippy::expect_used)]
fn default_redirect_base_url() -> Url {
    Url::parse(DEFAULT_REDIRECT_BASE_URL).expect("DEFAULT_REDIRECT_BASE_URL is a valid absolute URL")
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Numeric values that fail to parse fall back to their default with a
    /// warning; an unparsable `REDIRECT_BASE_URL` or `BOT_API_URL` is an error
    /// because links built from it would be broken for every user.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = non_empty("BOT_TOKEN")
            .or_else(|| non_empty("TELOXIDE_TOKEN"))
            .map(SecretString::from)
            .unwrap_or(defaults.bot_token);

        let owner_id = non_empty("OWNER_ID").and_then(|raw| match raw.parse::<i64>() {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Ignoring invalid OWNER_ID {:?}: {}", raw, e);
                None
            }
        });

        let max_inline_bytes = parse_or_default(&non_empty, "MAX_FILE_SIZE_BYTES", defaults.max_inline_bytes);

        let redirect_base_url = match non_empty("REDIRECT_BASE_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| AppError::Config(format!("REDIRECT_BASE_URL {:?}: {}", raw, e)))?,
            None => defaults.redirect_base_url,
        };

        let bot_api_url = match non_empty("BOT_API_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| AppError::Config(format!("BOT_API_URL {:?}: {}", raw, e)))?),
            None => None,
        };

        let attempt_timeout = timeout_or_default(&non_empty, "ATTEMPT_TIMEOUT_SECS", DEFAULT_ATTEMPT_TIMEOUT_SECS);
        let request_ceiling = timeout_or_default(&non_empty, "REQUEST_CEILING_SECS", DEFAULT_REQUEST_CEILING_SECS);
        let media_read_timeout =
            timeout_or_default(&non_empty, "MEDIA_READ_TIMEOUT_SECS", DEFAULT_MEDIA_READ_TIMEOUT_SECS);

        Ok(Self {
            bot_token,
            owner_id,
            max_inline_bytes,
            redirect_base_url,
            database_path: non_empty("DATABASE_PATH").unwrap_or(defaults.database_path),
            log_file_path: non_empty("LOG_FILE_PATH").unwrap_or(defaults.log_file_path),
            ytdl_bin: non_empty("YTDL_BIN").unwrap_or(defaults.ytdl_bin),
            facebook_metadata_api: non_empty("FB_METADATA_API_URL").unwrap_or(defaults.facebook_metadata_api),
            attempt_timeout,
            request_ceiling,
            media_read_timeout,
            bot_api_url,
        })
    }

    /// Whether `chat_id` belongs to the configured owner.
    pub fn is_owner(&self, chat_id: i64) -> bool {
        self.owner_id == Some(chat_id)
    }

    /// Inline upload limit in whole MiB, for user-facing copy.
    pub fn max_inline_mib(&self) -> u64 {
        self.max_inline_bytes / (1024 * 1024)
    }
}

fn parse_or_default<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.parse::<u64>().unwrap_or_else(|e| {
            log::warn!("Invalid {} value {:?} ({}), using default {}", key, raw, e, default);
            default
        }),
        None => default,
    }
}

/// Like [`parse_or_default`], but zero is rejected too: a zero timeout
/// would fail every attempt before it starts.
fn timeout_or_default<F>(lookup: &F, key: &str, default: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_or_default(lookup, key, default);
    if secs == 0 {
        log::warn!("{} must be positive, using default {}", key, default);
        return Duration::from_secs(default);
    }
    Duration::from_secs(secs)
}

/// Progress animation configuration
pub mod animation {
    use super::Duration;

    /// Interval between cosmetic edits of the status message (in milliseconds)
    pub const FRAME_INTERVAL_MS: u64 = 800;

    /// Number of edits issued before the animation stops on its own
    pub const TICKS: usize = 9;

    /// Frame texts, HTML formatted. The first one is shown with the initial
    /// status message, the last one is never animated to.
    pub const FRAMES: [&str; 11] = [
        "⏳ <b>Loading</b>...▒▒▒▒▒▒▒▒▒▒",
        "📥 <b>Fetching</b>...█▒▒▒▒▒▒▒▒▒",
        "📥 <b>Fetching</b>...██▒▒▒▒▒▒▒▒",
        "📥 <b>Fetching</b>...███▒▒▒▒▒▒▒",
        "📤 <b>Uploading</b>...████▒▒▒▒▒▒",
        "📤 <b>Uploading</b>...█████▒▒▒▒▒",
        "📤 <b>Uploading</b>...██████▒▒▒▒",
        "📤 <b>Uploading</b>...███████▒▒▒",
        "✨ <b>Finalizing</b>...████████▒▒",
        "✨ <b>Finalizing</b>...█████████▒",
        "✅ <b>Done!</b> ██████████",
    ];

    /// Frame interval duration
    pub fn frame_interval() -> Duration {
        Duration::from_millis(FRAME_INTERVAL_MS)
    }
}

/// Admin broadcast configuration
pub mod broadcast {
    use super::Duration;

    /// Recipients handled concurrently per batch
    pub const BATCH_SIZE: usize = 30;

    /// Pause between batches (in milliseconds), keeps us under the Bot API flood limit
    pub const BATCH_DELAY_MS: u64 = 1000;

    /// Inter-batch delay duration
    pub fn batch_delay() -> Duration {
        Duration::from_millis(BATCH_DELAY_MS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Connect timeout for upstream scraping requests (in seconds)
    pub const CONNECT_TIMEOUT_SECS: u64 = 15;

    /// Request timeout for Bot API calls (in seconds); uploads by URL can take a while
    pub const BOT_API_TIMEOUT_SECS: u64 = 300;

    /// Connect timeout duration
    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    /// Bot API timeout duration
    pub fn bot_api_timeout() -> Duration {
        Duration::from_secs(BOT_API_TIMEOUT_SECS)
    }
}

/// YouTube search and batch download configuration
pub mod youtube {
    use super::Duration;

    /// Results requested when `/song` gets no explicit count
    pub const DEFAULT_SEARCH_LIMIT: usize = 10;

    /// Upper bound on results per search
    pub const MAX_SEARCH_LIMIT: usize = 50;

    /// Timeout for `ytsearch` listing (in seconds)
    pub const SEARCH_TIMEOUT_SECS: u64 = 60;

    /// Timeout for a single audio download (in seconds)
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

    /// Passed to yt-dlp `--max-filesize`
    pub const MAX_FILESIZE: &str = "50M";

    /// Songs downloaded concurrently per batch
    pub const DOWNLOAD_BATCH_SIZE: usize = 3;

    /// Pause between download batches (in milliseconds)
    pub const BATCH_DELAY_MS: u64 = 1000;

    /// Inter-batch pause duration
    pub fn batch_delay() -> Duration {
        Duration::from_millis(BATCH_DELAY_MS)
    }

    /// Search timeout duration
    pub fn search_timeout() -> Duration {
        Duration::from_secs(SEARCH_TIMEOUT_SECS)
    }

    /// Per-item download timeout duration
    pub fn download_timeout() -> Duration {
        Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)
    }

    /// Counts offered on the `/song` keyboard
    pub const SONG_COUNT_OPTIONS: [usize; 4] = [1, 5, 15, 50];

    /// How long a `/song` query waits for its count button (in seconds)
    pub const PENDING_QUERY_TTL_SECS: u64 = 600;

    /// Pending query lifetime
    pub fn pending_query_ttl() -> Duration {
        Duration::from_secs(PENDING_QUERY_TTL_SECS)
    }
}

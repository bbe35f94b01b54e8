//! Inbound link classification.
//!
//! A [`MediaRequest`] is only ever built from a URL that passed the
//! per-platform host/path allowlist, so adapters never see arbitrary links.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Platforms the bot can resolve media for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    Facebook,
    TikTok,
    YouTube,
}

impl Platform {
    /// Human-readable name for status messages and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Facebook => "Facebook",
            Platform::TikTok => "TikTok",
            Platform::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the user wants out of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RequestedMode {
    #[default]
    VideoOnly,
    /// Send the soundtrack as audio (TikTok only)
    AudioExtract,
}

/// Why a chat message could not become a [`MediaRequest`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("message does not contain a link")]
    NoLink,
    #[error("unsupported link: {0}")]
    UnsupportedLink(String),
}

/// One inbound resolution request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    source_url: Url,
    platform: Platform,
    requested_mode: RequestedMode,
}

impl MediaRequest {
    /// Validates `raw_url` against the allowlists and derives the platform.
    pub fn new(raw_url: &str, requested_mode: RequestedMode) -> Result<Self, RequestError> {
        let url = Url::parse(raw_url.trim()).map_err(|_| RequestError::UnsupportedLink(raw_url.to_string()))?;
        let platform = classify(&url).ok_or_else(|| RequestError::UnsupportedLink(raw_url.to_string()))?;

        let requested_mode = if platform == Platform::TikTok {
            requested_mode
        } else {
            RequestedMode::VideoOnly
        };

        Ok(Self {
            source_url: url,
            platform,
            requested_mode,
        })
    }

    /// Parses a chat message: the first http(s) token is the link, and an
    /// `audio <url>` prefix or `<url> /audio` suffix asks for audio.
    pub fn from_message_text(text: &str) -> Result<Self, RequestError> {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();
        let wants_audio = lower.starts_with("audio ") || lower.ends_with(" /audio");

        let link = trimmed
            .split_whitespace()
            .find(|token| {
                let token = token.to_lowercase();
                token.starts_with("http://") || token.starts_with("https://")
            })
            .ok_or(RequestError::NoLink)?;

        let mode = if wants_audio {
            RequestedMode::AudioExtract
        } else {
            RequestedMode::VideoOnly
        };
        Self::new(link, mode)
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn requested_mode(&self) -> RequestedMode {
        self.requested_mode
    }
}

const FACEBOOK_HOSTS: &[&str] = &[
    "facebook.com",
    "www.facebook.com",
    "m.facebook.com",
    "web.facebook.com",
    "mbasic.facebook.com",
    "fb.watch",
    "fb.me",
    "fb.com",
    "www.fb.com",
];

const TIKTOK_HOSTS: &[&str] = &[
    "tiktok.com",
    "www.tiktok.com",
    "m.tiktok.com",
    "vm.tiktok.com",
    "vt.tiktok.com",
];

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "music.youtube.com"];

/// Maps a URL to its platform, or `None` when it fails every allowlist.
///
/// Bare host links (`https://facebook.com/`) are rejected: there is nothing
/// to resolve without a path.
pub fn classify(url: &Url) -> Option<Platform> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?.to_lowercase();
    let path = url.path().trim_matches('/');

    if FACEBOOK_HOSTS.contains(&host.as_str()) {
        return (!path.is_empty()).then_some(Platform::Facebook);
    }

    if TIKTOK_HOSTS.contains(&host.as_str()) {
        return (!path.is_empty()).then_some(Platform::TikTok);
    }

    if host == "youtu.be" {
        return (!path.is_empty()).then_some(Platform::YouTube);
    }

    if YOUTUBE_HOSTS.contains(&host.as_str()) {
        let is_watch = path == "watch" && url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty());
        let is_short = path.strip_prefix("shorts/").is_some_and(|id| !id.is_empty());
        return (is_watch || is_short).then_some(Platform::YouTube);
    }

    None
}

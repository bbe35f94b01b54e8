//! Upstream source abstraction layer.
//!
//! Every provider method (an HTML scraper, a JSON API, yt-dlp) implements
//! [`UpstreamSource`] and turns a link into a [`ResolvedMedia`] or a classified
//! [`AdapterFailure`]. The [`SourceRegistry`] holds the per-platform priority
//! order that the resolver walks.
//!
//! Built-in backends:
//! - Facebook: `fdown` scrape, `getfvid` scrape, JSON metadata API, raw page
//! - TikTok: `v3` (tikwm), `v2` (JSON API), `v1` (ttsave scrape)
//! - YouTube: `yt-dlp -j`

pub mod facebook;
pub mod fields;
pub mod tiktok;
pub mod youtube;

use crate::core::config::{self, Config};
use crate::core::error::AppError;
use crate::download::platform::Platform;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Browser user agent sent to scraping endpoints; several reject non-browser agents.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Identifies one adapter by its (platform, method) pair, e.g. `Facebook/fdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceId {
    pub platform: Platform,
    pub method: &'static str,
}

impl SourceId {
    pub const fn new(platform: Platform, method: &'static str) -> Self {
        Self { platform, method }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.method)
    }
}

/// Why a single adapter attempt did not produce media.
///
/// Display strings are for logs only; they may contain upstream detail and
/// never reach the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterFailure {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("no playable media in upstream response")]
    NoMediaFound,

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl AdapterFailure {
    /// Short stable label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterFailure::Unreachable(_) => "unreachable",
            AdapterFailure::Rejected { .. } => "rejected",
            AdapterFailure::NoMediaFound => "no_media",
            AdapterFailure::Malformed(_) => "malformed",
        }
    }

    /// `NoMediaFound` usually means a private or deleted post, which the
    /// user can act on. Everything else is operational noise.
    pub fn is_actionable(&self) -> bool {
        matches!(self, AdapterFailure::NoMediaFound)
    }
}

impl From<reqwest::Error> for AdapterFailure {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            AdapterFailure::Rejected {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            AdapterFailure::Malformed(err.to_string())
        } else {
            AdapterFailure::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterFailure {
    fn from(err: serde_json::Error) -> Self {
        AdapterFailure::Malformed(err.to_string())
    }
}

/// Optional display metadata. Every field is independently nullable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
    pub uploader_name: Option<String>,
    pub duration_seconds: Option<u64>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    pub estimated_size_bytes: Option<u64>,
}

impl MediaMetadata {
    /// Fills every empty field from `other`; fields already set are kept.
    pub fn fill_from(&mut self, other: &MediaMetadata) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
        fill(&mut self.thumbnail_url, &other.thumbnail_url);
        fill(&mut self.title, &other.title);
        fill(&mut self.uploader_name, &other.uploader_name);
        fill(&mut self.duration_seconds, &other.duration_seconds);
        fill(&mut self.view_count, &other.view_count);
        fill(&mut self.upload_date, &other.upload_date);
        fill(&mut self.estimated_size_bytes, &other.estimated_size_bytes);
    }

    /// Whether a supplementary metadata lookup could still add something
    /// worth showing (thumbnail or title).
    pub fn is_incomplete(&self) -> bool {
        self.thumbnail_url.is_none() || self.title.is_none()
    }
}

/// Result of a successful adapter attempt.
///
/// `playable_url` is always a non-empty absolute URL; construct through
/// [`ResolvedMedia::from_playable`] so adapters cannot report a success
/// without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMedia {
    playable_url: String,
    pub alternate_quality_url: Option<String>,
    /// Separate soundtrack link, when the provider exposes one
    pub audio_url: Option<String>,
    #[serde(flatten)]
    pub metadata: MediaMetadata,
}

impl ResolvedMedia {
    /// Builds a result around `playable_url`, or `NoMediaFound` if it is
    /// empty or not an http(s) URL.
    pub fn from_playable(playable_url: impl Into<String>) -> Result<Self, AdapterFailure> {
        let playable_url = playable_url.into().trim().to_string();
        match Url::parse(&playable_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(Self {
                playable_url,
                alternate_quality_url: None,
                audio_url: None,
                metadata: MediaMetadata::default(),
            }),
            _ => Err(AdapterFailure::NoMediaFound),
        }
    }

    /// Picks the first usable candidate as the playable URL and the next
    /// distinct one as the alternate quality.
    pub fn from_candidates<I>(candidates: I) -> Result<Self, AdapterFailure>
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let mut usable = candidates
            .into_iter()
            .flatten()
            .filter_map(|c| Self::from_playable(c).ok().map(|m| m.playable_url));

        let primary = usable.next().ok_or(AdapterFailure::NoMediaFound)?;
        let alternate = usable.find(|c| *c != primary);

        let mut media = Self::from_playable(primary)?;
        media.alternate_quality_url = alternate;
        Ok(media)
    }

    pub fn playable_url(&self) -> &str {
        &self.playable_url
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Merges metadata from a secondary lookup. Never touches the playable
    /// or alternate URL: the first successful adapter owns those.
    pub fn merge_metadata(&mut self, other: &MediaMetadata) {
        self.metadata.fill_from(other);
    }
}

/// One strategy for resolving a link on one provider.
///
/// Implementations must be total: network errors, non-2xx statuses and
/// unparsable bodies are all returned as [`AdapterFailure`], never panics.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    fn id(&self) -> SourceId;

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure>;
}

/// A source that can return display metadata without a playable link.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn id(&self) -> SourceId;

    async fn metadata(&self, source_url: &Url) -> Result<MediaMetadata, AdapterFailure>;
}

/// Per-platform ordered adapter chains.
///
/// Sources are tried in registration order, so register the most reliable
/// method first.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    chains: HashMap<Platform, Vec<Arc<dyn UpstreamSource>>>,
    metadata: HashMap<Platform, Arc<dyn MetadataSource>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `source` to the chain of its own platform.
    pub fn register(&mut self, source: Arc<dyn UpstreamSource>) {
        self.chains.entry(source.id().platform).or_default().push(source);
    }

    /// Sets the supplementary metadata source for its platform.
    pub fn register_metadata(&mut self, source: Arc<dyn MetadataSource>) {
        self.metadata.insert(source.id().platform, source);
    }

    /// Adapters for `platform` in priority order (empty if none registered).
    pub fn chain(&self, platform: Platform) -> &[Arc<dyn UpstreamSource>] {
        self.chains.get(&platform).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn metadata_source(&self, platform: Platform) -> Option<Arc<dyn MetadataSource>> {
        self.metadata.get(&platform).cloned()
    }

    /// Builds the production registry with every built-in adapter.
    pub fn default_registry(config: &Config) -> Result<Self, AppError> {
        let client = build_http_client(config)?;
        let mut registry = Self::new();

        let fb_metadata = Arc::new(facebook::MetadataApiSource::new(
            client.clone(),
            &config.facebook_metadata_api,
        ));
        registry.register(Arc::new(facebook::FdownSource::new(client.clone())));
        registry.register(Arc::new(facebook::GetfvidSource::new(client.clone())));
        registry.register(fb_metadata.clone());
        registry.register(Arc::new(facebook::RawPageSource::new(client.clone())));
        registry.register_metadata(fb_metadata);

        registry.register(Arc::new(tiktok::TikTokV3Source::new(client.clone())));
        registry.register(Arc::new(tiktok::TikTokV2Source::new(client.clone())));
        registry.register(Arc::new(tiktok::TikTokV1Source::new(client)));

        registry.register(Arc::new(youtube::YtDlpJsonSource::new(&config.ytdl_bin)));

        Ok(registry)
    }
}

/// Shared HTTP client for all scraping adapters.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client, AppError> {
    let client = reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(config.attempt_timeout)
        .connect_timeout(config::network::connect_timeout())
        .build()?;
    Ok(client)
}

/// Reads a response body as text, mapping non-2xx statuses to `Rejected`.
pub(crate) async fn read_text(response: reqwest::Response) -> Result<String, AdapterFailure> {
    let status = response.status();
    if !status.is_success() {
        return Err(AdapterFailure::Rejected {
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

/// Reads a response body as JSON, mapping non-2xx statuses to `Rejected`
/// and unparsable bodies to `Malformed`.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, AdapterFailure> {
    let body = read_text(response).await?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedSource(SourceId);

    #[async_trait]
    impl UpstreamSource for NamedSource {
        fn id(&self) -> SourceId {
            self.0
        }

        async fn attempt(&self, _source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
            Err(AdapterFailure::NoMediaFound)
        }
    }

    #[test]
    fn test_from_playable_rejects_empty_and_relative() {
        assert_eq!(ResolvedMedia::from_playable(""), Err(AdapterFailure::NoMediaFound));
        assert_eq!(ResolvedMedia::from_playable("/video.mp4"), Err(AdapterFailure::NoMediaFound));
        assert_eq!(
            ResolvedMedia::from_playable("javascript:alert(1)"),
            Err(AdapterFailure::NoMediaFound)
        );
        let media = ResolvedMedia::from_playable(" https://cdn.example/v.mp4 ").unwrap();
        assert_eq!(media.playable_url(), "https://cdn.example/v.mp4");
    }

    #[test]
    fn test_from_candidates_picks_first_and_distinct_alternate() {
        let media = ResolvedMedia::from_candidates([
            None,
            Some("https://cdn.example/hd.mp4".to_string()),
            Some("https://cdn.example/hd.mp4".to_string()),
            Some("https://cdn.example/sd.mp4".to_string()),
        ])
        .unwrap();
        assert_eq!(media.playable_url(), "https://cdn.example/hd.mp4");
        assert_eq!(media.alternate_quality_url.as_deref(), Some("https://cdn.example/sd.mp4"));

        assert_eq!(
            ResolvedMedia::from_candidates([None, Some(String::new())]),
            Err(AdapterFailure::NoMediaFound)
        );
    }

    #[test]
    fn test_merge_metadata_keeps_existing_fields() {
        let mut media = ResolvedMedia::from_playable("https://cdn.example/v.mp4")
            .unwrap()
            .with_metadata(MediaMetadata {
                title: Some("Original".to_string()),
                ..Default::default()
            });
        media.merge_metadata(&MediaMetadata {
            title: Some("Other".to_string()),
            thumbnail_url: Some("https://cdn.example/t.jpg".to_string()),
            ..Default::default()
        });
        assert_eq!(media.metadata.title.as_deref(), Some("Original"));
        assert_eq!(media.metadata.thumbnail_url.as_deref(), Some("https://cdn.example/t.jpg"));
        assert_eq!(media.playable_url(), "https://cdn.example/v.mp4");
    }

    #[test]
    fn test_failure_kinds() {
        assert!(AdapterFailure::NoMediaFound.is_actionable());
        assert!(!AdapterFailure::Rejected { status: 403 }.is_actionable());
        assert_eq!(AdapterFailure::Malformed("x".into()).kind(), "malformed");
        assert_eq!(AdapterFailure::Unreachable("x".into()).kind(), "unreachable");
    }

    #[test]
    fn test_registry_keeps_registration_order_per_platform() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(NamedSource(SourceId::new(Platform::TikTok, "v3"))));
        registry.register(Arc::new(NamedSource(SourceId::new(Platform::Facebook, "fdown"))));
        registry.register(Arc::new(NamedSource(SourceId::new(Platform::TikTok, "v2"))));

        let methods: Vec<_> = registry.chain(Platform::TikTok).iter().map(|s| s.id().method).collect();
        assert_eq!(methods, vec!["v3", "v2"]);
        assert_eq!(registry.chain(Platform::Facebook).len(), 1);
        assert!(registry.chain(Platform::YouTube).is_empty());
    }

    #[test]
    fn test_default_registry_order() {
        let registry = SourceRegistry::default_registry(&Config::default()).unwrap();
        let fb: Vec<_> = registry.chain(Platform::Facebook).iter().map(|s| s.id().method).collect();
        assert_eq!(fb, vec!["fdown", "getfvid", "metadata_api", "raw_page"]);
        let tt: Vec<_> = registry.chain(Platform::TikTok).iter().map(|s| s.id().method).collect();
        assert_eq!(tt, vec!["v3", "v2", "v1"]);
        assert!(registry.metadata_source(Platform::Facebook).is_some());
        assert!(registry.metadata_source(Platform::TikTok).is_none());
    }

    #[test]
    fn test_source_id_display() {
        assert_eq!(SourceId::new(Platform::Facebook, "fdown").to_string(), "Facebook/fdown");
    }
}

//! TikTok adapters, newest API first.
//!
//! - [`TikTokV3Source`]: tikwm-style form API with `code == 0` envelope
//! - [`TikTokV2Source`]: JSON GET API whose field names drift between releases
//! - [`TikTokV1Source`]: ttsave page scrape, link text "Without Watermark"

use super::fields::{self, find_anchor_by_label};
use super::{read_json, read_text, AdapterFailure, MediaMetadata, ResolvedMedia, SourceId, UpstreamSource};
use crate::download::platform::Platform;
use async_trait::async_trait;
use select::document::Document;
use serde_json::Value;
use url::Url;

pub const V3_ENDPOINT: &str = "https://www.tikwm.com/api/";
pub const V2_ENDPOINT: &str = "https://api.tiklydown.eu.org/api/download";
pub const V1_ENDPOINT: &str = "https://ttsave.app/download";

// Field fallbacks for the v2 API, most recent schema first
const V2_PRIMARY_VIDEO: &[&str] = &[
    "video.noWatermark",
    "video.playAddr",
    "video.downloadAddr",
    "videoHD",
    "video",
    "video.0",
];
const V2_ALTERNATE_VIDEO: &[&str] = &["videoSD", "video.watermark", "videoWatermark"];
const V2_PLAY_COUNT: &[&str] = &["playCount", "play_count", "statistics.playCount", "stats.playCount"];
const V2_AUTHOR: &[&str] = &["author.nickname", "author.name", "author.unique_id", "author"];
const V2_COVER: &[&str] = &["cover", "video.cover", "video.origin_cover", "thumbnail"];
const V2_DURATION: &[&str] = &["duration", "video.duration"];
const V2_CREATED: &[&str] = &["created_at", "create_time", "createTime"];
const V2_AUDIO: &[&str] = &["music.play_url", "music.playUrl", "music.url"];

/// Resolves a possibly site-relative link against the API endpoint.
fn absolutize(endpoint: &str, candidate: Option<String>) -> Option<String> {
    let candidate = candidate?;
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return Some(candidate);
    }
    Url::parse(endpoint)
        .ok()?
        .join(&candidate)
        .ok()
        .map(String::from)
}

/// v3: `POST url=<link>&hd=1`, answer `{code, msg, data}`.
pub struct TikTokV3Source {
    client: reqwest::Client,
    endpoint: String,
}

impl TikTokV3Source {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, V3_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for TikTokV3Source {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::TikTok, "v3")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("url", source_url.as_str()), ("hd", "1")])
            .send()
            .await?;
        parse_v3(&read_json(response).await?, &self.endpoint)
    }
}

pub fn parse_v3(body: &Value, endpoint: &str) -> Result<ResolvedMedia, AdapterFailure> {
    let code = body
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| AdapterFailure::Malformed("missing `code` in v3 response".to_string()))?;
    if code != 0 {
        log::debug!(
            "TikTok v3 answered code {}: {}",
            code,
            body.get("msg").and_then(Value::as_str).unwrap_or("")
        );
        return Err(AdapterFailure::NoMediaFound);
    }
    let data = body
        .get("data")
        .filter(|d| d.is_object())
        .ok_or(AdapterFailure::NoMediaFound)?;

    let hd = absolutize(endpoint, fields::first_str(data, &["hdplay"]));
    let has_hd = hd.is_some();
    let mut media = ResolvedMedia::from_candidates([
        hd,
        absolutize(endpoint, fields::first_str(data, &["play"])),
        absolutize(endpoint, fields::first_str(data, &["wmplay"])),
    ])?;

    media.audio_url = absolutize(endpoint, fields::first_str(data, &["music", "music_info.play"]));
    let size_paths: &[&str] = if has_hd { &["hd_size", "size"] } else { &["size"] };
    media.metadata = MediaMetadata {
        thumbnail_url: absolutize(endpoint, fields::first_str(data, &["cover", "origin_cover"])),
        title: fields::first_str(data, &["title"]),
        uploader_name: fields::first_str(data, &["author.nickname", "author.unique_id"]),
        duration_seconds: fields::first_u64(data, &["duration"]).filter(|d| *d > 0),
        view_count: fields::first_u64(data, &["play_count"]),
        upload_date: fields::first_date(data, &["create_time"]),
        estimated_size_bytes: fields::first_u64(data, size_paths).filter(|s| *s > 0),
    };
    Ok(media)
}

/// v2: `GET ?url=<link>`, payload under `result`, `data`, or the root.
pub struct TikTokV2Source {
    client: reqwest::Client,
    endpoint: String,
}

impl TikTokV2Source {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, V2_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for TikTokV2Source {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::TikTok, "v2")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", source_url.as_str())])
            .send()
            .await?;
        parse_v2(&read_json(response).await?)
    }
}

pub fn parse_v2(body: &Value) -> Result<ResolvedMedia, AdapterFailure> {
    if !body.is_object() {
        return Err(AdapterFailure::Malformed("v2 response is not an object".to_string()));
    }
    if body.get("status").and_then(Value::as_bool) == Some(false) {
        return Err(AdapterFailure::NoMediaFound);
    }
    let result = ["result", "data"]
        .iter()
        .find_map(|key| body.get(key).filter(|v| v.is_object()))
        .unwrap_or(body);

    let mut media = ResolvedMedia::from_candidates([
        fields::first_str(result, V2_PRIMARY_VIDEO),
        fields::first_str(result, V2_ALTERNATE_VIDEO),
    ])?;
    media.audio_url = fields::first_str(result, V2_AUDIO);
    media.metadata = MediaMetadata {
        thumbnail_url: fields::first_str(result, V2_COVER),
        title: fields::first_str(result, &["title", "desc", "description"]),
        uploader_name: fields::first_str(result, V2_AUTHOR),
        duration_seconds: fields::first_u64(result, V2_DURATION).filter(|d| *d > 0),
        view_count: fields::first_u64(result, V2_PLAY_COUNT),
        upload_date: fields::first_date(result, V2_CREATED),
        estimated_size_bytes: fields::first_u64(result, &["size", "video.size"]).filter(|s| *s > 0),
    };
    Ok(media)
}

/// v1: ttsave download page, `GET ?mode=video&key=<link>`.
pub struct TikTokV1Source {
    client: reqwest::Client,
    endpoint: String,
}

impl TikTokV1Source {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, V1_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for TikTokV1Source {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::TikTok, "v1")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("mode", "video"), ("key", source_url.as_str())])
            .send()
            .await?;
        parse_v1_html(&read_text(response).await?)
    }
}

pub fn parse_v1_html(html: &str) -> Result<ResolvedMedia, AdapterFailure> {
    let document = Document::from(html);
    let mut media = ResolvedMedia::from_candidates([
        find_anchor_by_label(&document, &["Without Watermark"]),
        find_anchor_by_label(&document, &["With Watermark"]),
    ])?;
    media.audio_url = find_anchor_by_label(&document, &["Download MP3", "Download Audio"]);
    Ok(media)
}

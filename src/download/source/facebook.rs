//! Facebook adapters.
//!
//! Priority order in the registry:
//! 1. [`FdownSource`] - fdown.net form scrape (HD + normal links, thumbnail)
//! 2. [`GetfvidSource`] - getfvid.com form scrape
//! 3. [`MetadataApiSource`] - JSON metadata API; also the supplementary
//!    metadata lookup when an earlier scrape found a link but no title
//! 4. [`RawPageSource`] - the public video page itself, `playable_url` keys
//!
//! Each adapter splits into a request step and a pure `parse_*` function so
//! extraction can be tested against captured bodies.

use super::fields::{self, find_anchor_by_label, image_src_by_class, meta_property};
use super::{read_json, read_text, AdapterFailure, MediaMetadata, MetadataSource, ResolvedMedia, SourceId, UpstreamSource};
use crate::download::platform::{classify, Platform};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, REFERER};
use select::document::Document;
use serde_json::{json, Value};
use url::Url;

pub const FDOWN_ENDPOINT: &str = "https://fdown.net/download.php";
pub const GETFVID_ENDPOINT: &str = "https://getfvid.com/downloader";

const FDOWN_HD_LABELS: &[&str] = &["Download Video in HD Quality", "Download High Quality"];
const FDOWN_SD_LABELS: &[&str] = &[
    "Download Video in Normal Quality",
    "Download Normal Quality",
    "Download Standard Quality",
    "Download Low Quality",
];
const GETFVID_HD_LABELS: &[&str] = &["Download in HD", "Download in High"];
const GETFVID_SD_LABELS: &[&str] = &["Download in SD", "Download in Normal"];

static PLAYABLE_HD_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#""(?:playable_url_quality_hd|browser_native_hd_url)":"(https?:[^"]+)""#)
        .expect("playable hd regex is valid")
});

static PLAYABLE_SD_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#""(?:playable_url|browser_native_sd_url)":"(https?:[^"]+)""#).expect("playable sd regex is valid")
});

/// fdown.net: form POST with the link in `URLz`.
pub struct FdownSource {
    client: reqwest::Client,
    endpoint: String,
}

impl FdownSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, FDOWN_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for FdownSource {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::Facebook, "fdown")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(REFERER, "https://fdown.net/")
            .form(&[("URLz", source_url.as_str())])
            .send()
            .await?;
        parse_fdown_html(&read_text(response).await?)
    }
}

/// Extracts the HD and normal links plus the `fb_img` thumbnail.
pub fn parse_fdown_html(html: &str) -> Result<ResolvedMedia, AdapterFailure> {
    let document = Document::from(html);
    let mut media = ResolvedMedia::from_candidates([
        find_anchor_by_label(&document, FDOWN_HD_LABELS),
        find_anchor_by_label(&document, FDOWN_SD_LABELS),
    ])?;
    media.metadata.thumbnail_url = image_src_by_class(&document, "fb_img");
    Ok(media)
}

/// getfvid.com: form POST with the link in `url`.
pub struct GetfvidSource {
    client: reqwest::Client,
    endpoint: String,
}

impl GetfvidSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, GETFVID_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for GetfvidSource {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::Facebook, "getfvid")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("url", source_url.as_str())])
            .send()
            .await?;
        parse_getfvid_html(&read_text(response).await?)
    }
}

pub fn parse_getfvid_html(html: &str) -> Result<ResolvedMedia, AdapterFailure> {
    let document = Document::from(html);
    ResolvedMedia::from_candidates([
        find_anchor_by_label(&document, GETFVID_HD_LABELS),
        find_anchor_by_label(&document, GETFVID_SD_LABELS),
    ])
}

/// JSON metadata API: `POST {"url": link}`.
///
/// The payload sits under `video_info`, `data`, or the root object depending
/// on the deployment.
pub struct MetadataApiSource {
    client: reqwest::Client,
    endpoint: String,
}

impl MetadataApiSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn fetch(&self, source_url: &Url) -> Result<Value, AdapterFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "url": source_url.as_str() }))
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl UpstreamSource for MetadataApiSource {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::Facebook, "metadata_api")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let body = self.fetch(source_url).await?;
        parse_metadata_api_media(&body)
    }
}

#[async_trait]
impl MetadataSource for MetadataApiSource {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::Facebook, "metadata_api")
    }

    async fn metadata(&self, source_url: &Url) -> Result<MediaMetadata, AdapterFailure> {
        let body = self.fetch(source_url).await?;
        parse_metadata_api(&body)
    }
}

fn metadata_api_info(body: &Value) -> &Value {
    ["video_info", "data"]
        .iter()
        .find_map(|key| body.get(key).filter(|v| v.is_object()))
        .unwrap_or(body)
}

/// Display metadata from the API body. A body with neither title nor
/// thumbnail is `NoMediaFound`.
pub fn parse_metadata_api(body: &Value) -> Result<MediaMetadata, AdapterFailure> {
    if !body.is_object() {
        return Err(AdapterFailure::Malformed("metadata API did not return an object".to_string()));
    }
    let info = metadata_api_info(body);

    let metadata = MediaMetadata {
        thumbnail_url: fields::first_str(info, &["thumbnail", "thumbnail_url", "picture"])
            .map(|t| fields::unescape_html(&t)),
        title: fields::first_str(info, &["title", "description"]),
        uploader_name: fields::first_str(info, &["uploader", "page_name", "author"]),
        duration_seconds: fields::first_u64(info, &["duration", "duration_seconds"]).filter(|d| *d > 0),
        view_count: fields::first_u64(info, &["view_count", "views"]),
        upload_date: fields::first_date(info, &["upload_date", "created_time"]),
        estimated_size_bytes: fields::first_u64(info, &["filesize", "filesize_approx"]).filter(|s| *s > 0),
    };

    if metadata.title.is_none() && metadata.thumbnail_url.is_none() {
        return Err(AdapterFailure::NoMediaFound);
    }
    Ok(metadata)
}

/// Playable link plus metadata. Links that point back at a Facebook page
/// (the API echoing the input) do not count as playable.
pub fn parse_metadata_api_media(body: &Value) -> Result<ResolvedMedia, AdapterFailure> {
    if !body.is_object() {
        return Err(AdapterFailure::Malformed("metadata API did not return an object".to_string()));
    }
    let info = metadata_api_info(body);
    let is_direct = |candidate: &String| match Url::parse(candidate) {
        Ok(url) => classify(&url) != Some(Platform::Facebook),
        Err(_) => false,
    };

    let candidates = ["hd", "url", "sd", "video_url"]
        .iter()
        .map(|key| fields::first_str(info, &[*key]).filter(is_direct));
    let media = ResolvedMedia::from_candidates(candidates)?;

    let metadata = parse_metadata_api(body).unwrap_or_default();
    Ok(media.with_metadata(metadata))
}

/// Last resort: the public page embeds `playable_url` keys in inline JSON.
pub struct RawPageSource {
    client: reqwest::Client,
}

impl RawPageSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamSource for RawPageSource {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::Facebook, "raw_page")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let response = self
            .client
            .get(source_url.clone())
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await?;
        parse_raw_page(&read_text(response).await?)
    }
}

pub fn parse_raw_page(html: &str) -> Result<ResolvedMedia, AdapterFailure> {
    let mut media = ResolvedMedia::from_candidates([
        PLAYABLE_HD_REGEX.captures(html).map(|c| unescape_json_url(&c[1])),
        PLAYABLE_SD_REGEX.captures(html).map(|c| unescape_json_url(&c[1])),
    ])?;
    let document = Document::from(html);
    media.metadata.title = meta_property(&document, "og:title");
    media.metadata.thumbnail_url = meta_property(&document, "og:image");
    Ok(media)
}

/// Undoes the escaping Facebook applies to URLs inside inline JSON.
pub fn unescape_json_url(raw: &str) -> String {
    raw.replace("\\u0025", "%")
        .replace("\\u0026", "&")
        .replace("\\u003d", "=")
        .replace("\\/", "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FDOWN_PAGE: &str = r#"
        <div class="container">
          <img class="fb_img" src="https://scontent.example/thumb.jpg?a=1&amp;b=2">
          <a href="https://video.example/sd.mp4" download>Download Video in Normal Quality</a>
          <a href="https://video.example/hd.mp4" download>Download Video in HD Quality</a>
        </div>
    "#;

    #[test]
    fn test_parse_fdown_hd_and_sd() {
        let media = parse_fdown_html(FDOWN_PAGE).unwrap();
        assert_eq!(media.playable_url(), "https://video.example/hd.mp4");
        assert_eq!(media.alternate_quality_url.as_deref(), Some("https://video.example/sd.mp4"));
        assert_eq!(
            media.metadata.thumbnail_url.as_deref(),
            Some("https://scontent.example/thumb.jpg?a=1&b=2")
        );
    }

    #[test]
    fn test_parse_fdown_sd_only() {
        let html = r#"<a href="https://video.example/sd.mp4">Download Video in Normal Quality</a>"#;
        let media = parse_fdown_html(html).unwrap();
        assert_eq!(media.playable_url(), "https://video.example/sd.mp4");
        assert_eq!(media.alternate_quality_url, None);
    }

    #[test]
    fn test_parse_fdown_private_video() {
        let html = "<p>This video is private or not available.</p>";
        assert_eq!(parse_fdown_html(html), Err(AdapterFailure::NoMediaFound));
    }

    #[test]
    fn test_parse_getfvid() {
        let html = r#"
            <a href="https://video.example/hd.mp4" class="btn">Download in HD Quality</a>
            <a href="https://video.example/sd.mp4" class="btn">Download in SD Quality</a>
        "#;
        let media = parse_getfvid_html(html).unwrap();
        assert_eq!(media.playable_url(), "https://video.example/hd.mp4");
        assert_eq!(media.alternate_quality_url.as_deref(), Some("https://video.example/sd.mp4"));
    }

    #[test]
    fn test_parse_metadata_api_nested() {
        let body = json!({
            "video_info": {
                "title": "Sunset at Galle",
                "page_name": "Travel LK",
                "duration": 95.4,
                "views": "1520",
                "upload_date": "20240315",
                "filesize": 80000000,
                "thumbnail": "https://scontent.example/t.jpg?x=1&amp;y=2"
            }
        });
        let metadata = parse_metadata_api(&body).unwrap();
        assert_eq!(
            metadata,
            MediaMetadata {
                thumbnail_url: Some("https://scontent.example/t.jpg?x=1&y=2".to_string()),
                title: Some("Sunset at Galle".to_string()),
                uploader_name: Some("Travel LK".to_string()),
                duration_seconds: Some(95),
                view_count: Some(1520),
                upload_date: Some("2024-03-15".to_string()),
                estimated_size_bytes: Some(80_000_000),
            }
        );
    }

    #[test]
    fn test_parse_metadata_api_empty_is_no_media() {
        assert_eq!(parse_metadata_api(&json!({"data": {}})), Err(AdapterFailure::NoMediaFound));
        assert!(matches!(parse_metadata_api(&json!([1, 2])), Err(AdapterFailure::Malformed(_))));
    }

    #[test]
    fn test_parse_metadata_api_media_ignores_echoed_page_link() {
        let body = json!({
            "title": "Clip",
            "url": "https://www.facebook.com/watch/?v=1",
            "sd": "https://video.example/sd.mp4"
        });
        let media = parse_metadata_api_media(&body).unwrap();
        assert_eq!(media.playable_url(), "https://video.example/sd.mp4");
        assert_eq!(media.metadata.title.as_deref(), Some("Clip"));

        let only_echo = json!({"title": "Clip", "url": "https://www.facebook.com/watch/?v=1"});
        assert_eq!(parse_metadata_api_media(&only_echo), Err(AdapterFailure::NoMediaFound));
    }

    #[test]
    fn test_parse_raw_page_unescapes() {
        let html = r#"
            <meta property="og:title" content="Family trip" />
            <script>{"playable_url":"https:\/\/video.example\/sd.mp4?x=1%2C","playable_url_quality_hd":"https:\/\/video.example\/hd.mp4"}</script>
        "#;
        let media = parse_raw_page(html).unwrap();
        assert_eq!(media.playable_url(), "https://video.example/hd.mp4");
        assert_eq!(
            media.alternate_quality_url.as_deref(),
            Some("https://video.example/sd.mp4?x=1%2C")
        );
        assert_eq!(media.metadata.title.as_deref(), Some("Family trip"));
    }

    #[test]
    fn test_parse_raw_page_login_wall() {
        assert_eq!(
            parse_raw_page("<html><body>Log in to continue</body></html>"),
            Err(AdapterFailure::NoMediaFound)
        );
    }
}

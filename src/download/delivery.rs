//! Executes a [`DeliveryMachine`] against the messaging gateway.
//!
//! Video is fetched by us and uploaded as bytes, so an oversized or broken
//! CDN response is caught here rather than by Telegram. Audio links are
//! handed to Telegram by URL. Every failed step feeds the machine, which
//! decides between the alternate quality, the redirect link and giving up.

use crate::core::config::{self, Config};
use crate::core::error::AppError;
use crate::core::utils::escape_filename;
use crate::download::caption;
use crate::download::planner::{DeliveryEvent, DeliveryMachine, DeliveryMode, DeliveryPolicy, DeliveryState};
use crate::download::platform::Platform;
use crate::download::redirect::{
    encode_redirect_url, redirect_message_text, RedirectFields, RedirectReason, REDIRECT_BUTTON_TEXT,
};
use crate::download::source::{ResolvedMedia, BROWSER_USER_AGENT};
use crate::telegram::gateway::{
    Button, Keyboard, MediaKind, MediaPayload, MessengerGateway, OutgoingMedia, TransportFailure,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{REFERER, USER_AGENT};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Why fetching media bytes failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("media is larger than {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("CDN answered with status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Downloads media bytes for an inline upload.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetches `url`, refusing anything above `max_bytes`.
    async fn fetch(&self, url: &str, referer: &str, max_bytes: u64) -> Result<Bytes, FetchError>;
}

/// [`MediaFetcher`] over reqwest that streams the body and stops at the limit.
pub struct HttpMediaFetcher {
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetcher on a [`build_media_client`] client.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Ok(Self::new(build_media_client(config)?))
    }
}

/// HTTP client for media downloads.
///
/// Unlike the adapter client there is no whole-request deadline: a large
/// file from a slow CDN may take minutes, so only the connect phase and
/// each individual read are bounded.
pub fn build_media_client(config: &Config) -> Result<reqwest::Client, AppError> {
    let client = reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .connect_timeout(config::network::connect_timeout())
        .read_timeout(config.media_read_timeout)
        .build()?;
    Ok(client)
}

/// Why one upload attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
enum UploadError {
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Transport(#[from] TransportFailure),
    #[error("invalid media URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl UploadError {
    fn is_size_limit(&self) -> bool {
        matches!(self, UploadError::Fetch(FetchError::TooLarge { .. }))
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str, referer: &str, max_bytes: u64) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(REFERER, referer)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(FetchError::TooLarge { limit: max_bytes });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(FetchError::TooLarge { limit: max_bytes });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }
}

/// Resolution succeeded but neither upload nor redirect reached the chat.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("delivery failed after {}: {last_error}", .trail.join(" → "))]
pub struct DeliveryFailure {
    pub trail: Vec<&'static str>,
    pub last_error: String,
}

impl DeliveryFailure {
    /// HTML text shown in place of the status message.
    pub fn user_message(&self) -> String {
        format!(
            "{}\n\nPlease try again later.",
            crate::core::utils::html_bold("❌ Could not send this video.")
        )
    }
}

/// How a delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub mode: DeliveryMode,
    pub trail: Vec<&'static str>,
}

/// One media item to deliver to one chat.
#[derive(Debug, Clone)]
pub struct DeliveryRequest<'a> {
    pub chat_id: i64,
    pub reply_to: Option<i32>,
    pub platform: Platform,
    pub kind: MediaKind,
    pub media: &'a ResolvedMedia,
}

/// Drives delivery attempts through the gateway.
#[derive(Clone)]
pub struct DeliveryExecutor {
    gateway: Arc<dyn MessengerGateway>,
    fetcher: Arc<dyn MediaFetcher>,
    policy: DeliveryPolicy,
    redirect_base_url: Url,
}

impl DeliveryExecutor {
    pub fn new(
        gateway: Arc<dyn MessengerGateway>,
        fetcher: Arc<dyn MediaFetcher>,
        policy: DeliveryPolicy,
        redirect_base_url: Url,
    ) -> Self {
        Self {
            gateway,
            fetcher,
            policy,
            redirect_base_url,
        }
    }

    pub fn from_config(gateway: Arc<dyn MessengerGateway>, fetcher: Arc<dyn MediaFetcher>, config: &Config) -> Self {
        Self::new(
            gateway,
            fetcher,
            DeliveryPolicy::from(config),
            config.redirect_base_url.clone(),
        )
    }

    /// Runs the state machine to a terminal state.
    pub async fn deliver(&self, request: &DeliveryRequest<'_>) -> Result<DeliveryReport, DeliveryFailure> {
        let mut machine = match request.kind {
            MediaKind::Video => DeliveryMachine::new(request.media, &self.policy),
            MediaKind::Audio => DeliveryMachine::for_audio(request.media, &self.policy),
        };
        let caption = caption::format_caption(&request.media.metadata);
        let mut last_error = String::from("nothing attempted");
        // Stays SizeLimit when the plan skipped uploading or a fetch hit the cap
        let mut redirect_reason = RedirectReason::SizeLimit;
        let mut hit_size_limit = false;

        machine.advance(DeliveryEvent::Begin);
        loop {
            let event = match machine.state().clone() {
                DeliveryState::Uploading { url } | DeliveryState::QualityDowngraded { url } => {
                    match self.upload(request, &url, &caption).await {
                        Ok(()) => DeliveryEvent::UploadSucceeded,
                        Err(e) => {
                            log::warn!("Upload of {} to chat {} failed: {}", url, request.chat_id, e);
                            hit_size_limit |= e.is_size_limit();
                            redirect_reason = if hit_size_limit {
                                RedirectReason::SizeLimit
                            } else {
                                RedirectReason::UploadFailed
                            };
                            last_error = e.to_string();
                            DeliveryEvent::UploadFailed
                        }
                    }
                }
                DeliveryState::RedirectFallback { url } => match self.send_redirect(request, &url, redirect_reason).await {
                    Ok(()) => DeliveryEvent::RedirectSent,
                    Err(e) => {
                        log::warn!("Redirect link for chat {} failed: {}", request.chat_id, e);
                        last_error = e;
                        DeliveryEvent::RedirectFailed
                    }
                },
                DeliveryState::Delivered { mode } => {
                    log::info!(
                        "📦 Delivered {} media to chat {} via {:?} ({})",
                        request.platform,
                        request.chat_id,
                        mode,
                        machine.trail().join(" → ")
                    );
                    return Ok(DeliveryReport {
                        mode,
                        trail: machine.trail().to_vec(),
                    });
                }
                DeliveryState::Failed | DeliveryState::Planned(_) => {
                    let failure = DeliveryFailure {
                        trail: machine.trail().to_vec(),
                        last_error,
                    };
                    log::error!("❌ Chat {}: {}", request.chat_id, failure);
                    return Err(failure);
                }
            };
            machine.advance(event);
        }
    }

    async fn upload(&self, request: &DeliveryRequest<'_>, url: &str, caption: &str) -> Result<(), UploadError> {
        let payload = match request.kind {
            MediaKind::Audio => MediaPayload::Url(Url::parse(url)?),
            MediaKind::Video => {
                let data = self
                    .fetcher
                    .fetch(url, referer_for(request.platform), self.policy.max_inline_bytes)
                    .await?;
                MediaPayload::Bytes {
                    data,
                    file_name: format!("{}.mp4", escape_filename(&caption::display_title(&request.media.metadata))),
                }
            }
        };

        let mut media = OutgoingMedia::new(request.kind, payload);
        media.caption = Some(caption.to_string());
        media.reply_to = request.reply_to;
        media.title = Some(caption::display_title(&request.media.metadata));
        media.thumbnail = request
            .media
            .metadata
            .thumbnail_url
            .as_deref()
            .and_then(|t| Url::parse(t).ok());

        match self.gateway.send_media(request.chat_id, media.clone()).await {
            Ok(_) => Ok(()),
            // A thumbnail Telegram cannot fetch sinks the whole upload; retry without it
            Err(e) if media.thumbnail.is_some() => {
                log::debug!("Upload with thumbnail failed ({}), retrying without", e);
                media.thumbnail = None;
                self.gateway.send_media(request.chat_id, media).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send_redirect(
        &self,
        request: &DeliveryRequest<'_>,
        url: &str,
        reason: RedirectReason,
    ) -> Result<(), String> {
        let fields = RedirectFields::from_media(request.media, url);
        let link = encode_redirect_url(&self.redirect_base_url, &fields);
        let text = redirect_message_text(
            reason,
            self.policy.max_inline_bytes / (1024 * 1024),
            &caption::display_title(&request.media.metadata),
        );
        let keyboard = Keyboard::single(Button::link(REDIRECT_BUTTON_TEXT, link));

        log::info!("🔗 Sending redirect link to chat {} ({:?})", request.chat_id, reason);
        self.gateway
            .send_text(request.chat_id, &text, request.reply_to, Some(&keyboard))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Referer some CDNs insist on before serving bytes.
pub fn referer_for(platform: Platform) -> &'static str {
    match platform {
        Platform::Facebook => "https://www.facebook.com/",
        Platform::TikTok => "https://www.tiktok.com/",
        Platform::YouTube => "https://www.youtube.com/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::source::MediaMetadata;
    use crate::testing::{GatewayCall, RecordingGateway};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Serves fixed bodies; unknown URLs answer 404.
    struct StaticFetcher {
        bodies: HashMap<String, usize>,
    }

    #[async_trait]
    impl MediaFetcher for StaticFetcher {
        async fn fetch(&self, url: &str, _referer: &str, max_bytes: u64) -> Result<Bytes, FetchError> {
            match self.bodies.get(url) {
                Some(len) if *len as u64 > max_bytes => Err(FetchError::TooLarge { limit: max_bytes }),
                Some(len) => Ok(Bytes::from(vec![0u8; *len])),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    fn executor(gateway: Arc<RecordingGateway>, bodies: &[(&str, usize)]) -> DeliveryExecutor {
        let fetcher = StaticFetcher {
            bodies: bodies.iter().map(|(u, l)| (u.to_string(), *l)).collect(),
        };
        DeliveryExecutor::new(
            gateway,
            Arc::new(fetcher),
            DeliveryPolicy { max_inline_bytes: 1_000 },
            Url::parse("https://redirect.example/dl/").unwrap(),
        )
    }

    fn media(alternate: Option<&str>) -> ResolvedMedia {
        let mut media = ResolvedMedia::from_playable("https://cdn.example/hd.mp4")
            .unwrap()
            .with_metadata(MediaMetadata {
                title: Some("Clip".to_string()),
                ..Default::default()
            });
        media.alternate_quality_url = alternate.map(str::to_string);
        media
    }

    fn request(media: &ResolvedMedia) -> DeliveryRequest<'_> {
        DeliveryRequest {
            chat_id: 42,
            reply_to: Some(5),
            platform: Platform::Facebook,
            kind: MediaKind::Video,
            media,
        }
    }

    #[tokio::test]
    async fn test_inline_upload() {
        let gateway = Arc::new(RecordingGateway::new());
        let media = media(None);
        let report = executor(gateway.clone(), &[("https://cdn.example/hd.mp4", 10)])
            .deliver(&request(&media))
            .await
            .unwrap();
        assert_eq!(report.mode, DeliveryMode::InlineUpload);
        let sent = gateway.media_sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].caption.as_deref().unwrap().starts_with("<b>Title:</b> Clip"));
        assert!(matches!(&sent[0].payload, MediaPayload::Bytes { file_name, .. } if file_name == "Clip.mp4"));
    }

    #[tokio::test]
    async fn test_hd_too_large_falls_back_to_sd() {
        let gateway = Arc::new(RecordingGateway::new());
        let media = media(Some("https://cdn.example/sd.mp4"));
        let report = executor(
            gateway.clone(),
            &[("https://cdn.example/hd.mp4", 5_000), ("https://cdn.example/sd.mp4", 10)],
        )
        .deliver(&request(&media))
        .await
        .unwrap();
        assert_eq!(report.mode, DeliveryMode::QualityFallbackUpload);
        assert_eq!(report.trail, vec!["planned", "uploading", "quality_downgraded", "delivered"]);
    }

    #[tokio::test]
    async fn test_both_fail_sends_redirect_link() {
        let gateway = Arc::new(RecordingGateway::new());
        let media = media(Some("https://cdn.example/sd.mp4"));
        let report = executor(gateway.clone(), &[]).deliver(&request(&media)).await.unwrap();
        assert_eq!(report.mode, DeliveryMode::RedirectLink);

        let calls = gateway.calls();
        let Some(GatewayCall::SendText { text, keyboard, .. }) = calls.last() else {
            panic!("expected redirect message, got {:?}", calls);
        };
        assert!(text.contains("Upload Failed"));
        assert!(!text.contains("File Size Limit"));
        let keyboard = keyboard.as_ref().unwrap();
        let Button::Link { text, url } = &keyboard.rows[0][0] else {
            panic!("expected link button");
        };
        assert_eq!(text, REDIRECT_BUTTON_TEXT);
        let fields = crate::download::redirect::decode_redirect_query(url).unwrap();
        assert_eq!(fields.url, "https://cdn.example/hd.mp4");
        assert_eq!(fields.title, "Clip");
    }

    #[tokio::test]
    async fn test_oversized_file_redirect_mentions_size_limit() {
        let gateway = Arc::new(RecordingGateway::new());
        let media = media(None);
        let report = executor(gateway.clone(), &[("https://cdn.example/hd.mp4", 5_000)])
            .deliver(&request(&media))
            .await
            .unwrap();
        assert_eq!(report.mode, DeliveryMode::RedirectLink);
        assert!(gateway.texts_sent().iter().any(|t| t.contains("File Size Limit Reached")));
    }

    #[tokio::test]
    async fn test_rejected_upload_redirect_says_upload_failed() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.fail_byte_uploads();
        let media = media(None);
        let report = executor(gateway.clone(), &[("https://cdn.example/hd.mp4", 10)])
            .deliver(&request(&media))
            .await
            .unwrap();
        assert_eq!(report.mode, DeliveryMode::RedirectLink);
        let texts = gateway.texts_sent();
        assert!(texts.iter().any(|t| t.contains("Upload Failed")));
        assert!(!texts.iter().any(|t| t.contains("File Size Limit")));
    }

    #[tokio::test]
    async fn test_everything_fails() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.fail_text();
        let media = media(None);
        let failure = executor(gateway.clone(), &[]).deliver(&request(&media)).await.unwrap_err();
        assert_eq!(failure.trail, vec!["planned", "uploading", "redirect_fallback", "failed"]);
        assert!(failure.last_error.contains("text rejected"));
        assert!(!failure.user_message().contains("text rejected"));
    }

    #[tokio::test]
    async fn test_bad_thumbnail_is_dropped_silently() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.fail_thumbnails();
        let mut media = media(None);
        media.metadata.thumbnail_url = Some("https://thumbs.example/t.jpg".to_string());
        let report = executor(gateway.clone(), &[("https://cdn.example/hd.mp4", 10)])
            .deliver(&request(&media))
            .await
            .unwrap();
        assert_eq!(report.mode, DeliveryMode::InlineUpload);
        let sent = gateway.media_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].thumbnail, None);
    }

    #[tokio::test]
    async fn test_audio_is_sent_by_url() {
        let gateway = Arc::new(RecordingGateway::new());
        let mut media = media(None);
        media.audio_url = Some("https://cdn.example/music.mp3".to_string());
        let mut req = request(&media);
        req.kind = MediaKind::Audio;
        req.platform = Platform::TikTok;
        executor(gateway.clone(), &[]).deliver(&req).await.unwrap();
        let sent = gateway.media_sent();
        assert_eq!(sent[0].kind, MediaKind::Audio);
        assert_eq!(
            sent[0].payload,
            MediaPayload::Url(Url::parse("https://cdn.example/music.mp3").unwrap())
        );
    }
}

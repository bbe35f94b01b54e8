//! Per-message media pipeline.
//!
//! status message → animation → resolve → cancel animation → deliver →
//! replace the status message with the outcome.
//!
//! Exactly one terminal message reaches the chat per request: the media, the
//! redirect link, or an error that replaces the status message.

use crate::download::delivery::{DeliveryExecutor, DeliveryFailure, DeliveryReport, DeliveryRequest};
use crate::download::platform::{MediaRequest, RequestedMode};
use crate::download::progress::{frame_keyboard, frame_text, ProgressAnimation};
use crate::download::resolver::{ResolutionFailure, Resolver};
use crate::telegram::gateway::{EditOutcome, MediaKind, MessengerGateway, TransportFailure};
use std::sync::Arc;

/// How one request ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    Delivered(DeliveryReport),
    ResolutionFailed(ResolutionFailure),
    DeliveryFailed(DeliveryFailure),
    /// The status message could not even be posted
    ChatUnavailable(TransportFailure),
}

#[derive(Clone)]
pub struct MediaPipeline {
    gateway: Arc<dyn MessengerGateway>,
    resolver: Resolver,
    executor: DeliveryExecutor,
}

impl MediaPipeline {
    pub fn new(gateway: Arc<dyn MessengerGateway>, resolver: Resolver, executor: DeliveryExecutor) -> Self {
        Self {
            gateway,
            resolver,
            executor,
        }
    }

    /// Handles one link sent as `message_id` in `chat_id`.
    pub async fn handle(&self, chat_id: i64, message_id: i32, request: MediaRequest) -> PipelineOutcome {
        log::info!(
            "▶️ Chat {}: {} link {} ({:?})",
            chat_id,
            request.platform(),
            request.source_url(),
            request.requested_mode()
        );

        let status_id = match self
            .gateway
            .send_text(chat_id, frame_text(0), Some(message_id), Some(&frame_keyboard(0)))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Chat {}: could not post status message: {}", chat_id, e);
                return PipelineOutcome::ChatUnavailable(e);
            }
        };

        let animation = ProgressAnimation::start(Arc::clone(&self.gateway), chat_id, status_id);
        let resolved = self.resolver.resolve(&request).await;
        animation.cancel().await;

        let media = match resolved {
            Ok(media) => media,
            Err(failure) => {
                self.replace_status(chat_id, status_id, &failure.user_message()).await;
                return PipelineOutcome::ResolutionFailed(failure);
            }
        };

        let kind = match request.requested_mode() {
            RequestedMode::AudioExtract => MediaKind::Audio,
            RequestedMode::VideoOnly => MediaKind::Video,
        };
        let delivery = DeliveryRequest {
            chat_id,
            reply_to: Some(message_id),
            platform: request.platform(),
            kind,
            media: &media,
        };

        match self.executor.deliver(&delivery).await {
            Ok(report) => {
                self.gateway.delete_message(chat_id, status_id).await;
                PipelineOutcome::Delivered(report)
            }
            Err(failure) => {
                self.replace_status(chat_id, status_id, &failure.user_message()).await;
                PipelineOutcome::DeliveryFailed(failure)
            }
        }
    }

    /// Edits the status message to `text`, posting it fresh if the status
    /// message is gone.
    async fn replace_status(&self, chat_id: i64, status_id: i32, text: &str) {
        match self.gateway.edit_text(chat_id, status_id, text, None).await {
            Ok(EditOutcome::Edited) => {}
            Ok(EditOutcome::NotFound) => {
                if let Err(e) = self.gateway.send_text(chat_id, text, None, None).await {
                    log::warn!("Chat {}: could not send failure message: {}", chat_id, e);
                }
            }
            Err(e) => log::warn!("Chat {}: could not edit status message: {}", chat_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::delivery::{FetchError, MediaFetcher};
    use crate::download::planner::{DeliveryMode, DeliveryPolicy};
    use crate::download::platform::Platform;
    use crate::download::resolver::ResolverPolicy;
    use crate::download::source::{AdapterFailure, ResolvedMedia, SourceId, SourceRegistry, UpstreamSource};
    use crate::testing::{GatewayCall, RecordingGateway};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;
    use url::Url;

    struct Fixed(Result<ResolvedMedia, AdapterFailure>);

    #[async_trait]
    impl UpstreamSource for Fixed {
        fn id(&self) -> SourceId {
            SourceId::new(Platform::TikTok, "fixed")
        }

        async fn attempt(&self, _source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
            self.0.clone()
        }
    }

    struct OkFetcher;

    #[async_trait]
    impl MediaFetcher for OkFetcher {
        async fn fetch(&self, _url: &str, _referer: &str, _max_bytes: u64) -> Result<Bytes, FetchError> {
            Ok(Bytes::from_static(b"mp4"))
        }
    }

    fn pipeline(gateway: Arc<RecordingGateway>, outcome: Result<ResolvedMedia, AdapterFailure>) -> MediaPipeline {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Fixed(outcome)));
        let resolver = Resolver::new(
            Arc::new(registry),
            ResolverPolicy {
                attempt_timeout: Duration::from_secs(1),
                request_ceiling: Duration::from_secs(5),
            },
        );
        let executor = DeliveryExecutor::new(
            gateway.clone(),
            Arc::new(OkFetcher),
            DeliveryPolicy {
                max_inline_bytes: 1_000_000,
            },
            Url::parse("https://redirect.example/").unwrap(),
        );
        MediaPipeline::new(gateway, resolver, executor)
    }

    fn tiktok(text: &str) -> MediaRequest {
        MediaRequest::from_message_text(text).unwrap()
    }

    #[tokio::test]
    async fn test_success_deletes_status_after_media() {
        let gateway = Arc::new(RecordingGateway::new());
        let media = ResolvedMedia::from_playable("https://cdn.example/v.mp4").unwrap();
        let outcome = pipeline(gateway.clone(), Ok(media))
            .handle(9, 1, tiktok("https://www.tiktok.com/@a/video/1"))
            .await;
        assert!(matches!(
            outcome,
            PipelineOutcome::Delivered(DeliveryReport {
                mode: DeliveryMode::InlineUpload,
                ..
            })
        ));

        let calls = gateway.calls();
        assert!(matches!(calls.first(), Some(GatewayCall::SendText { text, .. }) if text.contains("Loading")));
        assert!(matches!(calls.last(), Some(GatewayCall::Delete { .. })));
        assert_eq!(gateway.media_sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_replaces_status_message() {
        let gateway = Arc::new(RecordingGateway::new());
        let outcome = pipeline(gateway.clone(), Err(AdapterFailure::NoMediaFound))
            .handle(9, 1, tiktok("https://vm.tiktok.com/ZMabc/"))
            .await;
        assert!(matches!(outcome, PipelineOutcome::ResolutionFailed(_)));

        let calls = gateway.calls();
        let Some(GatewayCall::EditText { text, keyboard, .. }) = calls.last() else {
            panic!("expected the status message to be edited, got {:?}", calls);
        };
        assert!(text.contains("Failed to fetch TikTok video"));
        assert!(keyboard.is_none());
        assert_eq!(gateway.texts_sent().len(), 1);
    }

    #[tokio::test]
    async fn test_audio_mode_sends_audio() {
        let gateway = Arc::new(RecordingGateway::new());
        let mut media = ResolvedMedia::from_playable("https://cdn.example/v.mp4").unwrap();
        media.audio_url = Some("https://cdn.example/a.mp3".to_string());
        pipeline(gateway.clone(), Ok(media))
            .handle(9, 1, tiktok("audio https://www.tiktok.com/@a/video/1"))
            .await;
        assert_eq!(gateway.media_sent()[0].kind, MediaKind::Audio);
    }

    #[tokio::test]
    async fn test_blocked_chat_stops_early() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.block_chat(9);
        let outcome = pipeline(gateway.clone(), Err(AdapterFailure::NoMediaFound))
            .handle(9, 1, tiktok("https://www.tiktok.com/@a/video/1"))
            .await;
        assert!(matches!(outcome, PipelineOutcome::ChatUnavailable(TransportFailure::Blocked)));
        assert!(gateway.calls().is_empty());
    }
}

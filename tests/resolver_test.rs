//! Resolver scenarios with scripted adapters
//!
//! Run with: cargo test --test resolver_test

mod common;

use common::{media, ScriptedMetadata, ScriptedSource};
use mediarelay::download::resolver::AttemptOutcome;
use mediarelay::download::source::{AdapterFailure, MediaMetadata};
use mediarelay::download::{MediaRequest, Platform, Resolver, ResolverPolicy, SourceRegistry};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn policy(attempt_secs: u64, ceiling_secs: u64) -> ResolverPolicy {
    ResolverPolicy {
        attempt_timeout: Duration::from_secs(attempt_secs),
        request_ceiling: Duration::from_secs(ceiling_secs),
    }
}

fn request(url: &str) -> MediaRequest {
    MediaRequest::from_message_text(url).unwrap()
}

#[tokio::test]
async fn test_first_success_stops_the_chain() {
    let first = Arc::new(ScriptedSource::failing(
        Platform::TikTok,
        "v3",
        AdapterFailure::Unreachable("dns".to_string()),
    ));
    let second = Arc::new(ScriptedSource::succeeding(
        Platform::TikTok,
        "v2",
        media("https://cdn.example/v2.mp4"),
    ));
    let third = Arc::new(ScriptedSource::succeeding(
        Platform::TikTok,
        "v1",
        media("https://cdn.example/v1.mp4"),
    ));

    let mut registry = SourceRegistry::new();
    registry.register(first.clone());
    registry.register(second.clone());
    registry.register(third.clone());
    let resolver = Resolver::new(Arc::new(registry), policy(5, 60));

    let resolved = resolver
        .resolve(&request("https://www.tiktok.com/@a/video/1"))
        .await
        .unwrap();

    assert_eq!(resolved.playable_url(), "https://cdn.example/v2.mp4");
    assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 0));
}

#[tokio::test]
async fn test_other_platform_chains_are_untouched() {
    let facebook = Arc::new(ScriptedSource::succeeding(
        Platform::Facebook,
        "fdown",
        media("https://cdn.example/fb.mp4"),
    ));
    let tiktok = Arc::new(ScriptedSource::failing(
        Platform::TikTok,
        "v3",
        AdapterFailure::NoMediaFound,
    ));
    let mut registry = SourceRegistry::new();
    registry.register(facebook.clone());
    registry.register(tiktok.clone());
    let resolver = Resolver::new(Arc::new(registry), policy(5, 60));

    let failure = resolver
        .resolve(&request("https://vm.tiktok.com/ZMabc/"))
        .await
        .unwrap_err();

    assert_eq!(failure.platform, Platform::TikTok);
    assert_eq!(failure.attempts.len(), 1);
    assert_eq!(facebook.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_no_media_then_success_with_metadata() {
    let slow = Arc::new(
        ScriptedSource::succeeding(Platform::Facebook, "fdown", media("https://cdn.example/slow.mp4"))
            .delayed(Duration::from_secs(30)),
    );
    let empty = Arc::new(ScriptedSource::failing(
        Platform::Facebook,
        "getfvid",
        AdapterFailure::NoMediaFound,
    ));
    let good = Arc::new(ScriptedSource::succeeding(
        Platform::Facebook,
        "raw_page",
        media("https://cdn.example/good.mp4"),
    ));
    let metadata = Arc::new(ScriptedMetadata::new(
        Platform::Facebook,
        "metadata_api",
        MediaMetadata {
            title: Some("Sunset".to_string()),
            thumbnail_url: Some("https://cdn.example/t.jpg".to_string()),
            view_count: Some(42),
            ..Default::default()
        },
    ));

    let mut registry = SourceRegistry::new();
    registry.register(slow.clone());
    registry.register(empty.clone());
    registry.register(good.clone());
    registry.register_metadata(metadata.clone());
    let resolver = Resolver::new(Arc::new(registry), policy(10, 100));

    let resolved = resolver
        .resolve(&request("https://www.facebook.com/watch?v=123"))
        .await
        .unwrap();

    assert_eq!(resolved.playable_url(), "https://cdn.example/good.mp4");
    assert_eq!(resolved.metadata.title.as_deref(), Some("Sunset"));
    assert_eq!(resolved.metadata.view_count, Some(42));
    assert_eq!(metadata.calls(), 1);
    assert_eq!((slow.calls(), empty.calls(), good.calls()), (1, 1, 1));
}

#[tokio::test]
async fn test_exhausted_tiktok_chain_reports_every_attempt() {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(ScriptedSource::failing(
        Platform::TikTok,
        "v3",
        AdapterFailure::Rejected { status: 429 },
    )));
    registry.register(Arc::new(ScriptedSource::failing(
        Platform::TikTok,
        "v2",
        AdapterFailure::Malformed("html instead of json".to_string()),
    )));
    registry.register(Arc::new(ScriptedSource::failing(
        Platform::TikTok,
        "v1",
        AdapterFailure::NoMediaFound,
    )));
    let resolver = Resolver::new(Arc::new(registry), policy(5, 60));

    let failure = resolver
        .resolve(&request("https://vt.tiktok.com/ZSabc/"))
        .await
        .unwrap_err();

    let methods: Vec<&str> = failure.attempts.iter().map(|a| a.adapter_id.method).collect();
    assert_eq!(methods, vec!["v3", "v2", "v1"]);
    assert!(failure.saw_no_media());
    assert!(!failure.timed_out_overall);

    // Upstream detail never reaches the user-facing text
    let text = failure.user_message();
    assert!(text.contains("Failed to fetch TikTok video"));
    assert!(!text.contains("html instead of json"));
    assert!(!failure.to_string().contains("429"));
}

#[tokio::test(start_paused = true)]
async fn test_request_ceiling_skips_remaining_adapters() {
    let slow_a = Arc::new(
        ScriptedSource::failing(Platform::YouTube, "a", AdapterFailure::NoMediaFound).delayed(Duration::from_secs(60)),
    );
    let slow_b = Arc::new(
        ScriptedSource::failing(Platform::YouTube, "b", AdapterFailure::NoMediaFound).delayed(Duration::from_secs(60)),
    );
    let never = Arc::new(ScriptedSource::succeeding(
        Platform::YouTube,
        "c",
        media("https://cdn.example/yt.mp4"),
    ));

    let mut registry = SourceRegistry::new();
    registry.register(slow_a.clone());
    registry.register(slow_b.clone());
    registry.register(never.clone());
    let resolver = Resolver::new(Arc::new(registry), policy(25, 40));

    let failure = resolver
        .resolve(&request("https://youtu.be/dQw4w9WgXcQ"))
        .await
        .unwrap_err();

    assert!(failure.timed_out_overall);
    assert_eq!(never.calls(), 0);
    assert!(failure
        .attempts
        .iter()
        .all(|a| matches!(a.outcome, AttemptOutcome::Timeout)));
    assert!(failure.user_message().contains("try again in a few minutes"));
}

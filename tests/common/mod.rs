//! Common test utilities
//!
//! This module is shared across all integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mediarelay::download::source::{AdapterFailure, MediaMetadata, MetadataSource, ResolvedMedia, SourceId, UpstreamSource};
use mediarelay::download::Platform;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Scripted adapter that counts its calls.
pub struct ScriptedSource {
    id: SourceId,
    delay: Duration,
    outcome: Result<ResolvedMedia, AdapterFailure>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn succeeding(platform: Platform, method: &'static str, media: ResolvedMedia) -> Self {
        Self::new(platform, method, Ok(media))
    }

    pub fn failing(platform: Platform, method: &'static str, failure: AdapterFailure) -> Self {
        Self::new(platform, method, Err(failure))
    }

    fn new(platform: Platform, method: &'static str, outcome: Result<ResolvedMedia, AdapterFailure>) -> Self {
        Self {
            id: SourceId::new(platform, method),
            delay: Duration::ZERO,
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamSource for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn attempt(&self, _source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

/// Metadata-only source returning fixed metadata.
pub struct ScriptedMetadata {
    pub id: SourceId,
    pub metadata: MediaMetadata,
    pub calls: AtomicUsize,
}

impl ScriptedMetadata {
    pub fn new(platform: Platform, method: &'static str, metadata: MediaMetadata) -> Self {
        Self {
            id: SourceId::new(platform, method),
            metadata,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for ScriptedMetadata {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn metadata(&self, _source_url: &Url) -> Result<MediaMetadata, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }
}

pub fn media(url: &str) -> ResolvedMedia {
    ResolvedMedia::from_playable(url).unwrap()
}

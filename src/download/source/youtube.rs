//! YouTube adapter backed by `yt-dlp -j`.
//!
//! yt-dlp prints one JSON document describing the selected format; nothing
//! is downloaded. The process is spawned with `kill_on_drop` so the
//! resolver's per-attempt timeout also reaps it.

use super::fields;
use super::{AdapterFailure, MediaMetadata, ResolvedMedia, SourceId, UpstreamSource};
use crate::download::platform::Platform;
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use url::Url;

/// Progressive MP4 first (audio and video in one file), anything else after.
const FORMAT_SELECTOR: &str = "best[ext=mp4][vcodec!=none][acodec!=none]/best[vcodec!=none][acodec!=none]/best";

pub struct YtDlpJsonSource {
    ytdl_bin: String,
}

impl YtDlpJsonSource {
    pub fn new(ytdl_bin: impl Into<String>) -> Self {
        Self {
            ytdl_bin: ytdl_bin.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for YtDlpJsonSource {
    fn id(&self) -> SourceId {
        SourceId::new(Platform::YouTube, "yt-dlp")
    }

    async fn attempt(&self, source_url: &Url) -> Result<ResolvedMedia, AdapterFailure> {
        let output = Command::new(&self.ytdl_bin)
            .args(["-j", "--no-playlist", "--no-warnings", "-f", FORMAT_SELECTOR])
            .arg(source_url.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AdapterFailure::Unreachable(format!("failed to run {}: {}", self.ytdl_bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        let body: Value = serde_json::from_slice(&output.stdout)?;
        parse_ytdlp_json(&body)
    }
}

/// Maps yt-dlp's stderr to a failure kind.
pub fn classify_stderr(stderr: &str) -> AdapterFailure {
    let lower = stderr.to_lowercase();
    if lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("video is private")
        || lower.contains("has been removed")
        || lower.contains("does not exist")
        || lower.contains("is not available")
    {
        return AdapterFailure::NoMediaFound;
    }
    if lower.contains("http error 403") || lower.contains("sign in to confirm") {
        return AdapterFailure::Rejected { status: 403 };
    }
    if lower.contains("timed out") || lower.contains("connection") || lower.contains("network") {
        return AdapterFailure::Unreachable(last_line(stderr));
    }
    AdapterFailure::Malformed(last_line(stderr))
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("yt-dlp failed")
        .trim()
        .to_string()
}

/// Picks the selected format's `url`, falling back to the best progressive
/// entry of `formats`; the runner-up becomes the alternate quality.
pub fn parse_ytdlp_json(body: &Value) -> Result<ResolvedMedia, AdapterFailure> {
    if !body.is_object() {
        return Err(AdapterFailure::Malformed("yt-dlp output is not an object".to_string()));
    }

    let mut progressive: Vec<&Value> = body
        .get("formats")
        .and_then(Value::as_array)
        .map(|formats| formats.iter().filter(|f| is_progressive_http(f)).collect())
        .unwrap_or_default();
    progressive.sort_by_key(|f| std::cmp::Reverse(fields::first_u64(f, &["height"]).unwrap_or(0)));

    let selected = fields::first_str(body, &["url"]);
    let candidates = std::iter::once(selected).chain(progressive.iter().map(|f| fields::first_str(f, &["url"])));
    let mut media = ResolvedMedia::from_candidates(candidates)?;

    let size_paths = &["filesize", "filesize_approx"];
    let estimated_size_bytes = fields::first_u64(body, size_paths).or_else(|| {
        progressive
            .iter()
            .find(|f| fields::first_str(f, &["url"]).as_deref() == Some(media.playable_url()))
            .and_then(|f| fields::first_u64(f, size_paths))
    });

    media.metadata = MediaMetadata {
        thumbnail_url: fields::first_str(body, &["thumbnail"]),
        title: fields::first_str(body, &["title", "fulltitle"]),
        uploader_name: fields::first_str(body, &["uploader", "channel", "creator"]),
        duration_seconds: fields::first_u64(body, &["duration"]).filter(|d| *d > 0),
        view_count: fields::first_u64(body, &["view_count"]),
        upload_date: fields::first_date(body, &["upload_date", "timestamp"]),
        estimated_size_bytes: estimated_size_bytes.filter(|s| *s > 0),
    };
    Ok(media)
}

fn is_progressive_http(format: &Value) -> bool {
    let has = |key: &str| {
        format
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|codec| codec != "none")
    };
    let protocol = format.get("protocol").and_then(Value::as_str).unwrap_or("https");
    has("vcodec") && has("acodec") && (protocol == "https" || protocol == "http")
}

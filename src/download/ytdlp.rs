//! YouTube song search and batch audio download through yt-dlp.
//!
//! `/song <query>` lists up to N search hits with `--flat-playlist`, then
//! downloads each as MP3 in small concurrent batches, sending every file as
//! soon as it is ready. One failed song never aborts the batch. Songs in the
//! history are skipped. `/song <youtube link>` downloads that one video.

use crate::core::config;
use crate::core::error::AppError;
use crate::core::utils::{escape_html, html_bold};
use crate::storage::{SongHistory, SongRecord};
use crate::telegram::gateway::{MediaKind, MediaPayload, MessengerGateway, OutgoingMedia};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use url::Url;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub duration_seconds: Option<u64>,
    pub url: String,
}

/// Clamps a requested result count to `1..=MAX_SEARCH_LIMIT`.
pub fn clamp_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(config::youtube::DEFAULT_SEARCH_LIMIT)
        .clamp(1, config::youtube::MAX_SEARCH_LIMIT)
}

/// Parses `%(id)s|%(title)s|%(duration)s` lines.
///
/// Titles may themselves contain `|`, so the id is taken from the front and
/// the duration from the back.
pub fn parse_search_output(stdout: &str) -> Vec<SearchResult> {
    stdout
        .lines()
        .filter_map(|line| {
            let (id, rest) = line.trim().split_once('|')?;
            let id = id.trim();
            if id.is_empty() {
                return None;
            }
            let (title, duration) = match rest.rsplit_once('|') {
                Some((title, duration)) => (title, duration.trim().parse::<f64>().ok()),
                None => (rest, None),
            };
            let title = title.trim();
            Some(SearchResult {
                id: id.to_string(),
                title: if title.is_empty() { "Unknown" } else { title }.to_string(),
                duration_seconds: duration.filter(|d| *d > 0.0).map(|d| d as u64),
                url: format!("https://www.youtube.com/watch?v={}", id),
            })
        })
        .collect()
}

/// Search and download backend.
#[async_trait]
pub trait SongSource: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, AppError>;

    /// Downloads `url` as MP3 into `dir` and returns the file path.
    async fn download_audio(&self, url: &str, dir: &Path, stem: &str) -> Result<PathBuf, AppError>;

    /// Title of the single video at `url`.
    async fn video_title(&self, url: &str) -> Result<String, AppError>;
}

/// [`SongSource`] that shells out to the yt-dlp binary.
pub struct YtDlpCli {
    bin: String,
}

impl YtDlpCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl SongSource for YtDlpCli {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, AppError> {
        log::info!("🔍 YouTube search: {:?} (limit {})", query, limit);
        let output = timeout(
            config::youtube::search_timeout(),
            TokioCommand::new(&self.bin)
                .args([
                    "--flat-playlist",
                    "--print",
                    "%(id)s|%(title)s|%(duration)s",
                    "--no-warnings",
                ])
                .arg(format!("ytsearch{}:{}", limit, query))
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AppError::YtDlp("search timed out".to_string()))?
        .map_err(|e| AppError::YtDlp(format!("failed to run {}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::YtDlp(stderr.trim().to_string()));
        }
        let results = parse_search_output(&String::from_utf8_lossy(&output.stdout));
        log::info!("Found {} result(s) for {:?}", results.len(), query);
        Ok(results)
    }

    async fn download_audio(&self, url: &str, dir: &Path, stem: &str) -> Result<PathBuf, AppError> {
        let template = dir.join(format!("{}.%(ext)s", stem));
        let target = dir.join(format!("{}.mp3", stem));

        let output = timeout(
            config::youtube::download_timeout(),
            TokioCommand::new(&self.bin)
                .args(["-x", "--audio-format", "mp3", "--audio-quality", "128K"])
                .arg("-o")
                .arg(&template)
                .args([
                    "--no-playlist",
                    "--no-warnings",
                    "--quiet",
                    "--max-filesize",
                    config::youtube::MAX_FILESIZE,
                ])
                .arg(url)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AppError::YtDlp(format!("download of {} timed out", url)))?
        .map_err(|e| AppError::YtDlp(format!("failed to run {}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::YtDlp(stderr.trim().to_string()));
        }
        if !target.exists() {
            // --max-filesize skips silently with exit code 0
            return Err(AppError::YtDlp(format!("no file produced for {}", url)));
        }
        Ok(target)
    }

    async fn video_title(&self, url: &str) -> Result<String, AppError> {
        let output = timeout(
            config::youtube::search_timeout(),
            TokioCommand::new(&self.bin)
                .args(["--skip-download", "--no-playlist", "--no-warnings", "--print", "%(title)s"])
                .arg(url)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AppError::YtDlp(format!("title lookup for {} timed out", url)))?
        .map_err(|e| AppError::YtDlp(format!("failed to run {}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::YtDlp(stderr.trim().to_string()));
        }
        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if title.is_empty() {
            return Err(AppError::YtDlp(format!("no title for {}", url)));
        }
        Ok(title)
    }
}

/// Counts for one `/song` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Hits already in the song history
    pub skipped: usize,
}

impl BatchReport {
    fn processed(&self) -> usize {
        self.successful + self.failed + self.skipped
    }
}

/// Extracts the video id from a YouTube watch, short, embed or `youtu.be` link.
pub fn youtube_video_id(text: &str) -> Option<String> {
    let url = Url::parse(text.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let id = match host {
        "youtu.be" => segments.next()?.to_string(),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            match segments.next()? {
                "watch" => url.query_pairs().find(|(k, _)| k == "v")?.1.into_owned(),
                "shorts" | "embed" | "v" | "e" | "live" => segments.next()?.to_string(),
                _ => return None,
            }
        }
        _ => return None,
    };
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

pub fn starting_text(query: &str, count: usize) -> String {
    format!(
        "{}\n\n🔍 Query: <i>{}</i>\n📥 Downloading {} song(s)...",
        html_bold("🎵 Starting YouTube search..."),
        escape_html(query),
        count
    )
}

pub fn usage_text() -> String {
    format!(
        "{}\n\nUsage: <code>/song [name or url]</code>\n\nExamples:\n\
         • <code>/song new sinhala dj song</code>\n\
         • <code>/song alan walker faded</code>\n\
         • <code>/song https://youtube.com/watch?v=xxx</code>",
        html_bold("🎵 YouTube Song Downloader")
    )
}

pub fn no_results_text(query: &str) -> String {
    format!("{} {}", html_bold("❌ No songs found for:"), escape_html(query))
}

pub fn progress_text(report: &BatchReport, batch_number: usize) -> String {
    format!(
        "{}\n\n📥 Progress: {}/{}\n✅ Success: {}\n⏭️ Skipped: {}\n❌ Failed: {}\n\n🔄 Processing batch {}...",
        html_bold("🎵 Downloading songs..."),
        report.processed(),
        report.total,
        report.successful,
        report.skipped,
        report.failed,
        batch_number
    )
}

pub fn done_text(query: &str, report: &BatchReport) -> String {
    format!(
        "{}\n\n🔍 Query: <i>{}</i>\n📊 Total: {} songs\n✅ Success: {}\n⏭️ Skipped (duplicates): {}\n❌ Failed: {}",
        html_bold("✅ Download Complete!"),
        escape_html(query),
        report.total,
        report.successful,
        report.skipped,
        report.failed
    )
}

pub fn already_downloaded_text() -> String {
    html_bold("⏭️ This song was already downloaded!")
}

pub fn fetching_info_text() -> String {
    format!("{}\n\n🔄 Processing...", html_bold("🎵 Fetching song info..."))
}

pub fn downloading_audio_text() -> String {
    format!("{}\n\n🔄 Please wait...", html_bold("🎵 Downloading audio..."))
}

pub fn url_done_text(title: &str) -> String {
    format!("{}\n\n🎵 {}", html_bold("✅ Download Complete!"), escape_html(title))
}

pub fn url_failed_text() -> String {
    html_bold("❌ Failed to download from URL")
}

/// Searches, then downloads and sends every hit not yet in `history`,
/// editing `status_id` as it goes.
pub async fn download_and_send_songs(
    source: &dyn SongSource,
    gateway: &dyn MessengerGateway,
    history: &dyn SongHistory,
    chat_id: i64,
    status_id: i32,
    query: &str,
    limit: usize,
) -> BatchReport {
    let results = match source.search(query, limit).await {
        Ok(results) => results,
        Err(e) => {
            log::warn!("YouTube search for {:?} failed: {}", query, e);
            Vec::new()
        }
    };

    let mut report = BatchReport {
        total: results.len(),
        ..Default::default()
    };
    if results.is_empty() {
        edit_status(gateway, chat_id, status_id, &no_results_text(query)).await;
        return report;
    }

    let mut fresh = Vec::with_capacity(results.len());
    for song in results {
        if already_downloaded(history, &song.id).await {
            log::info!("⏭️ Skipping duplicate: {}", song.title);
            report.skipped += 1;
        } else {
            fresh.push(song);
        }
    }

    let dir = std::env::temp_dir();
    let batch_id = run_id();
    let batch_size = config::youtube::DOWNLOAD_BATCH_SIZE;

    for (batch_index, batch) in fresh.chunks(batch_size).enumerate() {
        edit_status(gateway, chat_id, status_id, &progress_text(&report, batch_index + 1)).await;

        let outcomes = join_all(batch.iter().enumerate().map(|(i, song)| {
            let stem = format!("song_{}_{}", batch_id, batch_index * batch_size + i);
            download_and_send_one(source, gateway, history, chat_id, song, &dir, stem)
        }))
        .await;

        for ok in outcomes {
            if ok {
                report.successful += 1;
            } else {
                report.failed += 1;
            }
        }

        if (batch_index + 1) * batch_size < fresh.len() {
            tokio::time::sleep(config::youtube::batch_delay()).await;
        }
    }

    log::info!(
        "🎵 /song {:?} for chat {}: {}/{} sent, {} skipped, {} failed",
        query,
        chat_id,
        report.successful,
        report.total,
        report.skipped,
        report.failed
    );
    edit_status(gateway, chat_id, status_id, &done_text(query, &report)).await;
    report
}

/// Downloads and sends the single video behind a YouTube link.
pub async fn download_song_url(
    source: &dyn SongSource,
    gateway: &dyn MessengerGateway,
    history: &dyn SongHistory,
    chat_id: i64,
    status_id: i32,
    url: &str,
    video_id: &str,
) -> BatchReport {
    let mut report = BatchReport {
        total: 1,
        ..Default::default()
    };
    if already_downloaded(history, video_id).await || already_downloaded(history, url).await {
        edit_status(gateway, chat_id, status_id, &already_downloaded_text()).await;
        report.skipped = 1;
        return report;
    }

    edit_status(gateway, chat_id, status_id, &fetching_info_text()).await;
    let title = match source.video_title(url).await {
        Ok(title) => title,
        Err(e) => {
            log::warn!("Could not read title of {}: {}", url, e);
            "Unknown Song".to_string()
        }
    };

    edit_status(gateway, chat_id, status_id, &downloading_audio_text()).await;
    let song = SearchResult {
        id: video_id.to_string(),
        title,
        duration_seconds: None,
        url: url.to_string(),
    };
    let stem = format!("song_url_{}", run_id());
    if download_and_send_one(source, gateway, history, chat_id, &song, &std::env::temp_dir(), stem).await {
        report.successful = 1;
        edit_status(gateway, chat_id, status_id, &url_done_text(&song.title)).await;
    } else {
        report.failed = 1;
        edit_status(gateway, chat_id, status_id, &url_failed_text()).await;
    }
    report
}

/// Unique per call, so concurrent runs never share temp file names.
fn run_id() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    format!(
        "{}_{}",
        chrono::Utc::now().timestamp_millis(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// History lookup failures count as "not downloaded".
async fn already_downloaded(history: &dyn SongHistory, identifier: &str) -> bool {
    history.is_downloaded(identifier).await.unwrap_or_else(|e| {
        log::warn!("Song history lookup for {} failed: {}", identifier, e);
        false
    })
}

async fn download_and_send_one(
    source: &dyn SongSource,
    gateway: &dyn MessengerGateway,
    history: &dyn SongHistory,
    chat_id: i64,
    song: &SearchResult,
    dir: &Path,
    stem: String,
) -> bool {
    let path = match source.download_audio(&song.url, dir, &stem).await {
        Ok(path) => path,
        Err(e) => {
            log::warn!("Failed to download {:?}: {}", song.title, e);
            return false;
        }
    };

    let sent = match tokio::fs::read(&path).await {
        Ok(data) => {
            let mut media = OutgoingMedia::new(
                MediaKind::Audio,
                MediaPayload::Bytes {
                    data: Bytes::from(data),
                    file_name: format!("{}.mp3", crate::core::utils::escape_filename(&song.title)),
                },
            );
            media.title = Some(song.title.clone());
            match gateway.send_media(chat_id, media).await {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("Failed to send {:?}: {}", song.title, e);
                    false
                }
            }
        }
        Err(e) => {
            log::warn!("Failed to read {}: {}", path.display(), e);
            false
        }
    };

    if let Err(e) = tokio::fs::remove_file(&path).await {
        log::debug!("Could not remove {}: {}", path.display(), e);
    }
    if sent {
        let record = SongRecord {
            video_id: song.id.clone(),
            title: song.title.clone(),
            url: song.url.clone(),
        };
        if let Err(e) = history.add(&record).await {
            log::warn!("Failed to record {:?} in song history: {}", song.title, e);
        }
    }
    sent
}

async fn edit_status(gateway: &dyn MessengerGateway, chat_id: i64, status_id: i32, text: &str) {
    if let Err(e) = gateway.edit_text(chat_id, status_id, text, None).await {
        log::debug!("Could not update /song status: {}", e);
    }
}

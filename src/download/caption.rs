//! Caption rendering for delivered media.
//!
//! Every line is always present; missing values render a fixed placeholder
//! so the layout is the same whichever adapter produced the metadata.

use crate::core::utils::{escape_html, html_bold, truncate_chars};
use crate::download::source::MediaMetadata;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_UPLOADER: &str = "Unknown Uploader";
pub const NOT_AVAILABLE: &str = "N/A";
pub const SEPARATOR: &str = "◇───────────────◇";

/// Titles longer than this are cut and suffixed with `...`.
pub const MAX_TITLE_CHARS: usize = 100;

/// Renders the HTML caption:
///
/// ```text
/// <b>Title:</b> Sunset at Galle
/// 👤 <b>Uploader:</b> Travel LK
/// ⏱️ <b>Duration:</b> 1:35
/// 👁️ <b>Views:</b> 1.5K
/// 📅 <b>Uploaded:</b> 2024-03-15
/// ◇───────────────◇
/// ```
pub fn format_caption(metadata: &MediaMetadata) -> String {
    let title = display_title(metadata);
    let uploader = metadata
        .uploader_name
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(UNKNOWN_UPLOADER);
    let date = metadata
        .upload_date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(NOT_AVAILABLE);

    format!(
        "{} {}\n👤 {} {}\n⏱️ {} {}\n👁️ {} {}\n📅 {} {}\n{}",
        html_bold("Title:"),
        escape_html(&title),
        html_bold("Uploader:"),
        escape_html(uploader),
        html_bold("Duration:"),
        format_duration(metadata.duration_seconds),
        html_bold("Views:"),
        format_count(metadata.view_count.unwrap_or(0)),
        html_bold("Uploaded:"),
        escape_html(date),
        SEPARATOR
    )
}

/// Title as shown to users (truncated, placeholder when missing), unescaped.
pub fn display_title(metadata: &MediaMetadata) -> String {
    metadata
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| truncate_chars(t, MAX_TITLE_CHARS))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}

/// `H:MM:SS` from one hour up, `M:SS` below, `N/A` when unknown.
pub fn format_duration(seconds: Option<u64>) -> String {
    let Some(total) = seconds else {
        return NOT_AVAILABLE.to_string();
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Abbreviates counts: `999`, `1.5K`, `2.3M` (one decimal, truncated).
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{}.{}M", count / 1_000_000, (count % 1_000_000) / 100_000)
    } else if count >= 1_000 {
        format!("{}.{}K", count / 1_000, (count % 1_000) / 100)
    } else {
        count.to_string()
    }
}

//! Redirect-link codec for media too large to upload.
//!
//! The static redirect page reads six query parameters (`url`, `title`,
//! `uploader`, `duration`, `views`, `date`), each holding the standard padded
//! base64 of the UTF-8 value. Both ends must change together.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use url::Url;

use crate::core::utils::{escape_html, html_bold};
use crate::download::caption::{self, NOT_AVAILABLE, UNKNOWN_UPLOADER};
use crate::download::source::ResolvedMedia;

const KEYS: [&str; 6] = ["url", "title", "uploader", "duration", "views", "date"];

/// Values carried to the redirect page, already display-formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectFields {
    pub url: String,
    pub title: String,
    pub uploader: String,
    pub duration: String,
    pub views: String,
    pub date: String,
}

impl RedirectFields {
    /// Fields for `target_url`, filled from the media's metadata with the
    /// same placeholders the caption uses.
    pub fn from_media(media: &ResolvedMedia, target_url: &str) -> Self {
        let metadata = &media.metadata;
        Self {
            url: target_url.to_string(),
            title: caption::display_title(metadata),
            uploader: metadata
                .uploader_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
            duration: caption::format_duration(metadata.duration_seconds),
            views: metadata.view_count.unwrap_or(0).to_string(),
            date: metadata.upload_date.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }

    fn values(&self) -> [&str; 6] {
        [
            &self.url,
            &self.title,
            &self.uploader,
            &self.duration,
            &self.views,
            &self.date,
        ]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedirectDecodeError {
    #[error("missing query parameter `{0}`")]
    Missing(&'static str),
    #[error("parameter `{0}` is not valid base64")]
    Base64(&'static str),
    #[error("parameter `{0}` is not valid UTF-8")]
    Utf8(&'static str),
}

/// Appends the encoded fields to `base` as its query string.
pub fn encode_redirect_url(base: &Url, fields: &RedirectFields) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in KEYS.iter().zip(fields.values()) {
            query.append_pair(key, &STANDARD.encode(value.as_bytes()));
        }
    }
    url
}

/// Inverse of [`encode_redirect_url`].
pub fn decode_redirect_query(url: &Url) -> Result<RedirectFields, RedirectDecodeError> {
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let decode = |key: &'static str| -> Result<String, RedirectDecodeError> {
        let raw = pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or(RedirectDecodeError::Missing(key))?;
        let bytes = STANDARD.decode(raw).map_err(|_| RedirectDecodeError::Base64(key))?;
        String::from_utf8(bytes).map_err(|_| RedirectDecodeError::Utf8(key))
    };

    Ok(RedirectFields {
        url: decode("url")?,
        title: decode("title")?,
        uploader: decode("uploader")?,
        duration: decode("duration")?,
        views: decode("views")?,
        date: decode("date")?,
    })
}

/// Why a chat gets the link instead of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// Known or measured size above the upload limit
    SizeLimit,
    /// Every upload attempt failed for another reason
    UploadFailed,
}

/// HTML body of the message sent next to the link button.
pub fn redirect_message_text(reason: RedirectReason, max_inline_mib: u64, title: &str) -> String {
    let (heading, explanation) = match reason {
        RedirectReason::SizeLimit => (
            "⚠️ File Size Limit Reached!",
            format!("The video file exceeds the Telegram upload limit ({}MB).", max_inline_mib),
        ),
        RedirectReason::UploadFailed => (
            "⚠️ Upload Failed!",
            "Telegram could not accept this video right now.".to_string(),
        ),
    };
    format!(
        "{}\n\n{}\n\
         Please click the button below to get the direct download link from our website.\n\n{} {}",
        html_bold(heading),
        explanation,
        html_bold("Title:"),
        escape_html(title)
    )
}

/// Label of the URL button under the redirect message.
pub const REDIRECT_BUTTON_TEXT: &str = "🌐 Get Download Link";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::source::MediaMetadata;
    use pretty_assertions::assert_eq;

    fn base() -> Url {
        Url::parse("https://mediarelay.github.io/download/").unwrap()
    }

    #[test]
    fn test_round_trip_with_reserved_and_sinhala_text() {
        let fields = RedirectFields {
            url: "https://cdn.example/v.mp4?a=1&b=2==".to_string(),
            title: "සිංහල ගීතය & more = fun".to_string(),
            uploader: "ලංකා TV".to_string(),
            duration: "1:02:05".to_string(),
            views: "1520".to_string(),
            date: "2024-03-15".to_string(),
        };
        let url = encode_redirect_url(&base(), &fields);
        assert!(url.as_str().starts_with("https://mediarelay.github.io/download/?url="));
        assert_eq!(decode_redirect_query(&url).unwrap(), fields);
    }

    #[test]
    fn test_each_value_is_standard_base64() {
        let fields = RedirectFields {
            url: "https://cdn.example/v.mp4".to_string(),
            title: "a".to_string(),
            uploader: "b".to_string(),
            duration: "N/A".to_string(),
            views: "0".to_string(),
            date: "N/A".to_string(),
        };
        let url = encode_redirect_url(&base(), &fields);
        let title = url.query_pairs().find(|(k, _)| k == "title").map(|(_, v)| v.into_owned());
        assert_eq!(title.as_deref(), Some("YQ=="));
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, KEYS.to_vec());
    }

    #[test]
    fn test_decode_errors() {
        let missing = Url::parse("https://x.example/?url=YQ==").unwrap();
        assert_eq!(decode_redirect_query(&missing), Err(RedirectDecodeError::Missing("title")));

        let garbage = Url::parse("https://x.example/?url=***").unwrap();
        assert_eq!(decode_redirect_query(&garbage), Err(RedirectDecodeError::Base64("url")));
    }

    #[test]
    fn test_fields_from_media_use_placeholders() {
        let media = ResolvedMedia::from_playable("https://cdn.example/v.mp4")
            .unwrap()
            .with_metadata(MediaMetadata {
                duration_seconds: Some(95),
                ..Default::default()
            });
        let fields = RedirectFields::from_media(&media, media.playable_url());
        assert_eq!(fields.uploader, "Unknown Uploader");
        assert_eq!(fields.duration, "1:35");
        assert_eq!(fields.views, "0");
        assert_eq!(fields.date, "N/A");
    }

    #[test]
    fn test_redirect_message_text() {
        let text = redirect_message_text(RedirectReason::SizeLimit, 50, "A <b> title");
        assert!(text.starts_with("<b>⚠️ File Size Limit Reached!</b>"));
        assert!(text.contains("(50MB)"));
        assert!(text.ends_with("<b>Title:</b> A &lt;b&gt; title"));

        let text = redirect_message_text(RedirectReason::UploadFailed, 50, "Clip");
        assert!(text.starts_with("<b>⚠️ Upload Failed!</b>"));
        assert!(!text.contains("exceeds"));
        assert!(text.ends_with("<b>Title:</b> Clip"));
    }
}

//! Extraction helpers shared by the adapters.
//!
//! Upstream APIs rename fields between releases (`playCount`, `play_count`,
//! `statistics.playCount`). Adapters keep their own ordered path lists and
//! use these helpers to take the first path that yields a usable value.
//! The HTML helpers walk a parsed [`Document`] of the scraped download
//! pages, which label their links with visible text rather than stable ids.

use chrono::{DateTime, NaiveDate};
use select::document::Document;
use select::predicate::{Attr, Class, Name, Predicate};
use serde_json::Value;

/// Follows a dotted path (`author.nickname`) through nested objects.
/// Numeric segments index into arrays (`images.0`).
pub fn at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// First non-empty string among `paths`. Numbers are accepted and rendered.
pub fn first_str(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match at(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First value among `paths` that reads as a non-negative integer.
/// Accepts JSON numbers (floats are truncated) and numeric strings.
pub fn first_u64(value: &Value, paths: &[&str]) -> Option<u64> {
    paths.iter().find_map(|path| as_u64(at(value, path)?))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
        }
        _ => None,
    }
}

/// First upload date among `paths`, normalised by [`normalize_upload_date`].
pub fn first_date(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match at(value, path)? {
        Value::String(s) => normalize_upload_date(s),
        Value::Number(n) => n.as_i64().and_then(date_from_timestamp),
        _ => None,
    })
}

/// `YYYYMMDD` and unix timestamps become `YYYY-MM-DD`; anything else
/// non-empty is kept verbatim.
pub fn normalize_upload_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") {
        return None;
    }

    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y%m%d") {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }

    // Ten-digit strings are seconds since epoch (tikwm `create_time`)
    if raw.len() == 10 && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(date) = raw.parse::<i64>().ok().and_then(date_from_timestamp) {
            return Some(date);
        }
    }

    Some(raw.to_string())
}

fn date_from_timestamp(secs: i64) -> Option<String> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Href of the first absolute `<a>` whose visible text contains one of
/// `labels` (case-insensitive, whitespace collapsed). Labels are tried in
/// order, so earlier labels win even if a later one appears first in the page.
pub fn find_anchor_by_label(document: &Document, labels: &[&str]) -> Option<String> {
    let anchors: Vec<(String, String)> = document
        .find(Name("a"))
        .filter_map(|node| {
            let href = node.attr("href")?.trim();
            if !href.starts_with("http") {
                return None;
            }
            let text = node.text().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            Some((href.to_string(), text))
        })
        .collect();

    labels.iter().find_map(|label| {
        let label = label.to_lowercase();
        anchors
            .iter()
            .find(|(_, text)| text.contains(&label))
            .map(|(href, _)| href.clone())
    })
}

/// `content` of the first `<meta property="{property}">`.
pub fn meta_property(document: &Document, property: &str) -> Option<String> {
    document
        .find(Name("meta").and(Attr("property", property)))
        .filter_map(|node| node.attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

/// `src` of the first `<img>` carrying `class`.
pub fn image_src_by_class(document: &Document, class: &str) -> Option<String> {
    document
        .find(Name("img").and(Class(class)))
        .filter_map(|node| node.attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_string)
}

/// Decodes HTML entities in a value some APIs return still escaped
/// (`?x=1&amp;y=2`).
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    Document::from(text)
        .find(Name("body"))
        .next()
        .map(|body| body.text())
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_at_nested_paths() {
        let v = json!({"data": {"author": {"nickname": "kasun"}, "images": ["a", "b"]}});
        assert_eq!(at(&v, "data.author.nickname"), Some(&json!("kasun")));
        assert_eq!(at(&v, "data.images.1"), Some(&json!("b")));
        assert_eq!(at(&v, "data.missing.deeper"), None);
    }

    #[test]
    fn test_first_str_skips_empty_and_missing() {
        let v = json!({"hdplay": "", "play": "https://cdn.example/p.mp4", "wmplay": "https://cdn.example/w.mp4"});
        assert_eq!(
            first_str(&v, &["nothing", "hdplay", "play", "wmplay"]).as_deref(),
            Some("https://cdn.example/p.mp4")
        );
        assert_eq!(first_str(&v, &["nothing"]), None);
    }

    #[test]
    fn test_first_u64_legacy_field_names() {
        let v = json!({"statistics": {"playCount": "1520"}});
        assert_eq!(first_u64(&v, &["playCount", "play_count", "statistics.playCount"]), Some(1520));

        let v = json!({"play_count": 12.9});
        assert_eq!(first_u64(&v, &["playCount", "play_count"]), Some(12));

        let v = json!({"playCount": -4, "play_count": "lots"});
        assert_eq!(first_u64(&v, &["playCount", "play_count"]), None);
    }

    #[test]
    fn test_normalize_upload_date() {
        assert_eq!(normalize_upload_date("20240315").as_deref(), Some("2024-03-15"));
        assert_eq!(normalize_upload_date("1700000000").as_deref(), Some("2023-11-14"));
        assert_eq!(normalize_upload_date("3 days ago").as_deref(), Some("3 days ago"));
        assert_eq!(normalize_upload_date("N/A"), None);
        assert_eq!(normalize_upload_date("  "), None);
    }

    #[test]
    fn test_find_anchor_by_label_prefers_label_order() {
        let html = r#"
            <a href="https://cdn.example/sd.mp4?a=1&amp;b=2" class="btn">Download Video in <b>Normal</b> Quality</a>
            <a class="btn" href='https://cdn.example/hd.mp4'>
                Download Video in HD Quality
            </a>
        "#;
        let document = Document::from(html);
        assert_eq!(
            find_anchor_by_label(&document, &["Download Video in HD Quality", "Download Video in Normal Quality"])
                .as_deref(),
            Some("https://cdn.example/hd.mp4")
        );
        assert_eq!(
            find_anchor_by_label(&document, &["Download Video in Normal Quality"]).as_deref(),
            Some("https://cdn.example/sd.mp4?a=1&b=2")
        );
        assert_eq!(find_anchor_by_label(&document, &["Without Watermark"]), None);
    }

    #[test]
    fn test_find_anchor_ignores_relative_links() {
        let document = Document::from(r#"<a href="/help">Download Video in HD Quality</a>"#);
        assert_eq!(find_anchor_by_label(&document, &["Download Video in HD Quality"]), None);
    }

    #[test]
    fn test_meta_and_image_lookups_decode_entities() {
        let document = Document::from(
            r#"<head>
                 <meta property="og:title" content="Tom &amp; Jerry">
                 <meta property="og:image" content="https://cdn.example/t.jpg?a=1&amp;b=2">
               </head>
               <body><img class="thumb fb_img" src="https://cdn.example/i.jpg?x=1&amp;y=2"></body>"#,
        );
        assert_eq!(meta_property(&document, "og:title").as_deref(), Some("Tom & Jerry"));
        assert_eq!(
            meta_property(&document, "og:image").as_deref(),
            Some("https://cdn.example/t.jpg?a=1&b=2")
        );
        assert_eq!(meta_property(&document, "og:video"), None);
        assert_eq!(
            image_src_by_class(&document, "fb_img").as_deref(),
            Some("https://cdn.example/i.jpg?x=1&y=2")
        );
    }

    #[test]
    fn test_unescape_html() {
        assert_eq!(unescape_html("https://cdn.example/t.jpg?x=1&amp;y=2"), "https://cdn.example/t.jpg?x=1&y=2");
        assert_eq!(unescape_html("plain"), "plain");
    }

    #[test]
    fn test_first_date_from_number() {
        let v = json!({"create_time": 1700000000});
        assert_eq!(first_date(&v, &["create_time"]).as_deref(), Some("2023-11-14"));
    }
}

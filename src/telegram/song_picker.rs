//! Count keyboard shown after `/song <query>`.
//!
//! The query waits in a [`PendingSongs`] cache until a `songcount_<n>_<id>`
//! button is pressed. Each entry is taken once; stale or unknown ids answer
//! "Request expired".

use crate::core::config;
use crate::core::utils::{escape_html, html_bold};
use crate::telegram::gateway::{Button, Keyboard};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const SONG_COUNT_PREFIX: &str = "songcount_";

/// A `/song` query waiting for its count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSong {
    pub query: String,
    pub chat_id: i64,
    created: Instant,
}

/// Queries keyed by `song_<chat>_<millis>`.
pub struct PendingSongs {
    entries: DashMap<String, PendingSong>,
    ttl: Duration,
}

impl Default for PendingSongs {
    fn default() -> Self {
        Self::new(config::youtube::pending_query_ttl())
    }
}

impl PendingSongs {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Stores `query` and returns the id to embed in the buttons.
    pub fn insert(&self, chat_id: i64, query: &str) -> String {
        self.prune();
        let mut millis = chrono::Utc::now().timestamp_millis();
        loop {
            let id = format!("song_{}_{}", chat_id, millis);
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.entries.entry(id.clone()) {
                slot.insert(PendingSong {
                    query: query.to_string(),
                    chat_id,
                    created: Instant::now(),
                });
                return id;
            }
            millis += 1;
        }
    }

    /// Removes and returns the query if it is still fresh and belongs to `chat_id`.
    pub fn take(&self, query_id: &str, chat_id: i64) -> Option<PendingSong> {
        let (_, pending) = self
            .entries
            .remove_if(query_id, |_, pending| pending.chat_id == chat_id)?;
        (pending.created.elapsed() < self.ttl).then_some(pending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, pending| pending.created.elapsed() < ttl);
    }
}

/// Splits `songcount_<n>_<query id>`.
pub fn parse_count_callback(data: &str) -> Option<(usize, &str)> {
    let rest = data.strip_prefix(SONG_COUNT_PREFIX)?;
    let (count, query_id) = rest.split_once('_')?;
    let count = count.parse().ok().filter(|n| *n > 0)?;
    (!query_id.is_empty()).then_some((count, query_id))
}

pub fn count_callback(count: usize, query_id: &str) -> String {
    format!("{}{}_{}", SONG_COUNT_PREFIX, count, query_id)
}

/// Two rows of two count buttons.
pub fn count_keyboard(query_id: &str) -> Keyboard {
    let buttons: Vec<Button> = config::youtube::SONG_COUNT_OPTIONS
        .iter()
        .map(|&n| {
            let label = if n == 1 { "1 Song".to_string() } else { format!("{} Songs", n) };
            Button::callback(label, count_callback(n, query_id))
        })
        .collect();
    Keyboard {
        rows: buttons.chunks(2).map(|row| row.to_vec()).collect(),
    }
}

pub fn prompt_text(query: &str) -> String {
    format!(
        "{}\n\n🔍 Query: <i>{}</i>\n\n{}",
        html_bold("🎵 YouTube Song Downloader"),
        escape_html(query),
        html_bold("How many songs do you want to download?")
    )
}

pub const EXPIRED_ANSWER: &str = "❌ Request expired";

pub fn expired_text() -> String {
    html_bold("❌ Request expired. Please send the /song command again.")
}

pub fn downloading_answer(count: usize) -> String {
    format!("🎵 Downloading {} song(s)...", count)
}

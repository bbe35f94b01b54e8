//! In-memory gateway that records calls instead of talking to Telegram

use crate::telegram::gateway::{EditOutcome, Keyboard, MediaPayload, MessengerGateway, OutgoingMedia, TransportFailure};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    SendText {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    EditText {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
    SendMedia {
        chat_id: i64,
        media: OutgoingMedia,
    },
    AnswerCallback {
        callback_id: String,
        text: Option<String>,
        alert: bool,
    },
    Copy {
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    },
}

#[derive(Default)]
struct Failures {
    media_urls: HashSet<String>,
    media_bytes: bool,
    blocked_chats: HashSet<i64>,
    fail_text: bool,
    missing_edits: bool,
    thumbnails: bool,
}

/// Records calls; failures are opt-in per URL or chat.
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    failures: Mutex<Failures>,
    next_id: AtomicI32,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            next_id: AtomicI32::new(100),
        }
    }

    /// `send_media` with this URL payload is rejected.
    pub fn fail_media_for(&self, url: &str) {
        self.with_failures(|f| {
            f.media_urls.insert(url.to_string());
        });
    }

    /// Every `send_media` with a byte payload is rejected.
    pub fn fail_byte_uploads(&self) {
        self.with_failures(|f| f.media_bytes = true);
    }

    /// Every call targeting `chat_id` reports [`TransportFailure::Blocked`].
    pub fn block_chat(&self, chat_id: i64) {
        self.with_failures(|f| {
            f.blocked_chats.insert(chat_id);
        });
    }

    /// `send_media` carrying a thumbnail is rejected.
    pub fn fail_thumbnails(&self) {
        self.with_failures(|f| f.thumbnails = true);
    }

    /// `send_text` is rejected for every chat.
    pub fn fail_text(&self) {
        self.with_failures(|f| f.fail_text = true);
    }

    /// `edit_text` reports the message as gone.
    pub fn lose_edits(&self) {
        self.with_failures(|f| f.missing_edits = true);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn media_sent(&self) -> Vec<OutgoingMedia> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::SendMedia { media, .. } => Some(media),
                _ => None,
            })
            .collect()
    }

    pub fn texts_sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::SendText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::EditText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn with_failures<R>(&self, f: impl FnOnce(&mut Failures) -> R) -> Option<R> {
        self.failures.lock().ok().map(|mut guard| f(&mut guard))
    }

    fn record(&self, call: GatewayCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn is_blocked(&self, chat_id: i64) -> bool {
        self.with_failures(|f| f.blocked_chats.contains(&chat_id)).unwrap_or(false)
    }

    fn next_message_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl MessengerGateway for RecordingGateway {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        _reply_to: Option<i32>,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32, TransportFailure> {
        if self.is_blocked(chat_id) {
            return Err(TransportFailure::Blocked);
        }
        if self.with_failures(|f| f.fail_text).unwrap_or(false) {
            return Err(TransportFailure::Rejected {
                description: "Bad Request: text rejected".to_string(),
            });
        }
        let message_id = self.next_message_id();
        self.record(GatewayCall::SendText {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(message_id)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<EditOutcome, TransportFailure> {
        self.record(GatewayCall::EditText {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        if self.with_failures(|f| f.missing_edits).unwrap_or(false) {
            return Ok(EditOutcome::NotFound);
        }
        Ok(EditOutcome::Edited)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) {
        self.record(GatewayCall::Delete { chat_id, message_id });
    }

    async fn send_media(&self, chat_id: i64, media: OutgoingMedia) -> Result<i32, TransportFailure> {
        if self.is_blocked(chat_id) {
            return Err(TransportFailure::Blocked);
        }
        let rejected = self
            .with_failures(|f| {
                let payload_rejected = match &media.payload {
                    MediaPayload::Url(url) => f.media_urls.contains(url.as_str()),
                    MediaPayload::Bytes { .. } => f.media_bytes,
                };
                payload_rejected || (f.thumbnails && media.thumbnail.is_some())
            })
            .unwrap_or(false);
        if rejected {
            return Err(TransportFailure::Rejected {
                description: "Bad Request: failed to get HTTP URL content".to_string(),
            });
        }
        self.record(GatewayCall::SendMedia { chat_id, media });
        Ok(self.next_message_id())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), TransportFailure> {
        self.record(GatewayCall::AnswerCallback {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
            alert,
        });
        Ok(())
    }

    async fn copy_message(&self, to_chat: i64, from_chat: i64, message_id: i32) -> Result<i32, TransportFailure> {
        if self.is_blocked(to_chat) {
            return Err(TransportFailure::Blocked);
        }
        self.record(GatewayCall::Copy {
            to_chat,
            from_chat,
            message_id,
        });
        Ok(self.next_message_id())
    }
}

//! Narrow messaging surface used by the media pipeline, admin panel and
//! broadcast service.
//!
//! Nothing outside this module and `telegram::handlers` touches teloxide
//! types. Keyboards, media payloads and errors are expressed with the small
//! neutral types below, which keeps the pipeline testable against
//! [`crate::testing::RecordingGateway`].

use async_trait::async_trait;
use bytes::Bytes;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode, ReplyParameters,
};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use url::Url;

/// One inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Callback { text: String, data: String },
    Link { text: String, url: Url },
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Button::Callback {
            text: text.into(),
            data: data.into(),
        }
    }

    pub fn link(text: impl Into<String>, url: Url) -> Self {
        Button::Link { text: text.into(), url }
    }
}

/// Inline keyboard, row by row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn single(button: Button) -> Self {
        Self {
            rows: vec![vec![button]],
        }
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    fn to_markup(&self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(self.rows.iter().map(|row| {
            row.iter()
                .map(|button| match button {
                    Button::Callback { text, data } => InlineKeyboardButton::callback(text.clone(), data.clone()),
                    Button::Link { text, url } => InlineKeyboardButton::url(text.clone(), url.clone()),
                })
                .collect::<Vec<_>>()
        }))
    }
}

/// Where the media bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload {
    /// Telegram fetches the URL itself
    Url(Url),
    /// Bytes already fetched by us, sent as multipart
    Bytes { data: Bytes, file_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A media message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    pub payload: MediaPayload,
    /// HTML caption
    pub caption: Option<String>,
    pub thumbnail: Option<Url>,
    pub reply_to: Option<i32>,
    pub title: Option<String>,
}

impl OutgoingMedia {
    pub fn new(kind: MediaKind, payload: MediaPayload) -> Self {
        Self {
            kind,
            payload,
            caption: None,
            thumbnail: None,
            reply_to: None,
            title: None,
        }
    }
}

/// A messaging call itself failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    /// The user blocked the bot or deactivated the account
    #[error("recipient blocked the bot")]
    Blocked,
    #[error("message not found")]
    MessageNotFound,
    /// The API refused the call; `description` is the provider's text
    #[error("request rejected: {description}")]
    Rejected { description: String },
    #[error("network error: {0}")]
    Network(String),
}

impl From<RequestError> for TransportFailure {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Api(ApiError::BotBlocked | ApiError::UserDeactivated | ApiError::BotKicked) => {
                TransportFailure::Blocked
            }
            RequestError::Api(ApiError::MessageToEditNotFound | ApiError::MessageToDeleteNotFound) => {
                TransportFailure::MessageNotFound
            }
            RequestError::Network(e) => TransportFailure::Network(e.to_string()),
            other => TransportFailure::Rejected {
                description: other.to_string(),
            },
        }
    }
}

/// Result of an edit; a vanished message is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Edited,
    NotFound,
}

/// Messaging operations the bot needs. All text is HTML.
#[async_trait]
pub trait MessengerGateway: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32, TransportFailure>;

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<EditOutcome, TransportFailure>;

    /// Best effort; failures are logged and swallowed.
    async fn delete_message(&self, chat_id: i64, message_id: i32);

    async fn send_media(&self, chat_id: i64, media: OutgoingMedia) -> Result<i32, TransportFailure>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool)
        -> Result<(), TransportFailure>;

    /// Re-sends an existing message to another chat without the forward header.
    async fn copy_message(&self, to_chat: i64, from_chat: i64, message_id: i32) -> Result<i32, TransportFailure>;
}

/// [`MessengerGateway`] over a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

fn input_file(payload: MediaPayload) -> InputFile {
    match payload {
        MediaPayload::Url(url) => InputFile::url(url),
        MediaPayload::Bytes { data, file_name } => InputFile::memory(data.to_vec()).file_name(file_name),
    }
}

#[async_trait]
impl MessengerGateway for TelegramGateway {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32, TransportFailure> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(id)).allow_sending_without_reply());
        }
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard.to_markup());
        }
        Ok(request.await?.id.0)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<EditOutcome, TransportFailure> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard.to_markup());
        }
        match request.await {
            Ok(_) => Ok(EditOutcome::Edited),
            // Same text twice; the message is there
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(EditOutcome::Edited),
            Err(e) => match TransportFailure::from(e) {
                TransportFailure::MessageNotFound => Ok(EditOutcome::NotFound),
                other => Err(other),
            },
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) {
        if let Err(e) = self.bot.delete_message(ChatId(chat_id), MessageId(message_id)).await {
            log::debug!("Could not delete message {} in chat {}: {}", message_id, chat_id, e);
        }
    }

    async fn send_media(&self, chat_id: i64, media: OutgoingMedia) -> Result<i32, TransportFailure> {
        let reply = media
            .reply_to
            .map(|id| ReplyParameters::new(MessageId(id)).allow_sending_without_reply());
        let file = input_file(media.payload);

        let sent = match media.kind {
            MediaKind::Video => {
                let mut request = self.bot.send_video(ChatId(chat_id), file).supports_streaming(true);
                if let Some(caption) = media.caption {
                    request = request.caption(caption).parse_mode(ParseMode::Html);
                }
                if let Some(thumbnail) = media.thumbnail {
                    request = request.thumbnail(InputFile::url(thumbnail));
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await?
            }
            MediaKind::Audio => {
                let mut request = self.bot.send_audio(ChatId(chat_id), file);
                if let Some(caption) = media.caption {
                    request = request.caption(caption).parse_mode(ParseMode::Html);
                }
                if let Some(thumbnail) = media.thumbnail {
                    request = request.thumbnail(InputFile::url(thumbnail));
                }
                if let Some(title) = media.title {
                    request = request.title(title);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await?
            }
        };
        Ok(sent.id.0)
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), TransportFailure> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .show_alert(alert);
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await?;
        Ok(())
    }

    async fn copy_message(&self, to_chat: i64, from_chat: i64, message_id: i32) -> Result<i32, TransportFailure> {
        let copied = self
            .bot
            .copy_message(ChatId(to_chat), ChatId(from_chat), MessageId(message_id))
            .await?;
        Ok(copied.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_markup_shape() {
        let keyboard = Keyboard::single(Button::callback("📊 Users Count", "admin_users_count"))
            .row(vec![Button::link("🌐 Open", Url::parse("https://example.com/").unwrap())]);
        let markup = keyboard.to_markup();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].text, "📊 Users Count");
    }

    #[test]
    fn test_request_error_mapping() {
        assert_eq!(
            TransportFailure::from(RequestError::Api(ApiError::BotBlocked)),
            TransportFailure::Blocked
        );
        assert_eq!(
            TransportFailure::from(RequestError::Api(ApiError::MessageToEditNotFound)),
            TransportFailure::MessageNotFound
        );
        assert!(matches!(
            TransportFailure::from(RequestError::Api(ApiError::Unknown("Bad Request: wrong file".into()))),
            TransportFailure::Rejected { .. }
        ));
    }
}

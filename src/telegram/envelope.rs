//! Decoded inbound updates.
//!
//! Handlers route on an [`InboundEnvelope`] instead of raw teloxide types so
//! that routing can be driven from tests without a Bot API.

use teloxide::types::{CallbackQuery, Message};

/// Button press attached to an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData {
    pub id: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub chat_id: i64,
    pub message_id: i32,
    /// Message text, or the caption of a media message
    pub text: Option<String>,
    /// Text of the message this one replies to
    pub reply_to_text: Option<String>,
    pub first_name: Option<String>,
    pub callback: Option<CallbackData>,
}

impl InboundEnvelope {
    pub fn from_message(msg: &Message) -> Self {
        let reply_to_text = msg
            .reply_to_message()
            .and_then(|reply| reply.text().or_else(|| reply.caption()))
            .map(str::to_string);
        Self {
            chat_id: msg.chat.id.0,
            message_id: msg.id.0,
            text: msg.text().or_else(|| msg.caption()).map(str::to_string),
            reply_to_text,
            first_name: msg.from.as_ref().map(|user| user.first_name.clone()),
            callback: None,
        }
    }

    /// Returns `None` for inline-mode callbacks, which carry no chat message.
    pub fn from_callback(q: &CallbackQuery) -> Option<Self> {
        let message = q.message.as_ref()?;
        Some(Self {
            chat_id: message.chat().id.0,
            message_id: message.id().0,
            text: message.regular_message().and_then(|m| m.text()).map(str::to_string),
            reply_to_text: None,
            first_name: Some(q.from.first_name.clone()),
            callback: Some(CallbackData {
                id: q.id.0.clone(),
                data: q.data.clone().unwrap_or_default(),
            }),
        })
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to_text.is_some()
    }

    /// Private chats have positive ids; groups and channels are negative.
    pub fn is_private(&self) -> bool {
        self.chat_id > 0
    }
}

//! Owner-only admin panel: user count and broadcast.

use crate::core::config::Config;
use crate::core::error::AppResult;
use crate::core::utils::{escape_html, html_bold};
use crate::storage::UserStore;
use crate::telegram::broadcast::{BroadcastReport, BroadcastService};
use crate::telegram::envelope::InboundEnvelope;
use crate::telegram::gateway::{Button, EditOutcome, Keyboard, MessengerGateway};

pub const USERS_COUNT_CALLBACK: &str = "admin_users_count";
pub const BROADCAST_CALLBACK: &str = "admin_broadcast";

/// Replies to a prompt containing this text are broadcast.
pub const BROADCAST_PROMPT_MARKER: &str = "Please reply with the message you want to broadcast";

const SEPARATOR: &str = "◇───────────────◇";

pub fn panel_text() -> String {
    format!(
        "{}\n\nThis is your Admin Control Panel.",
        html_bold("👑 Welcome Back, Admin!")
    )
}

pub fn panel_keyboard() -> Keyboard {
    Keyboard::single(Button::callback("📊 Users Count", USERS_COUNT_CALLBACK))
        .row(vec![Button::callback("📣 Broadcast", BROADCAST_CALLBACK)])
}

pub fn welcome_text(first_name: Option<&str>) -> String {
    let name = first_name.filter(|n| !n.trim().is_empty()).unwrap_or("User");
    format!(
        "👋 <b>Hello {}!</b>\n\n\
         🎬 Welcome to <b>MediaRelay</b>!\n\n\
         📌 <b>How to use:</b>\n\n\
         <b>🎥 Send a link</b>\n\
         Facebook, TikTok or YouTube videos\n\
         Add <code>audio</code> before a TikTok link to get the sound only\n\n\
         <b>🎵 /song [name or url]</b>\n\
         Download songs from YouTube\n\
         Example: <code>/song new sinhala dj song</code>\n\
         Example: <code>/song https://youtube.com/watch?v=xxx</code>\n\n\
         {}",
        escape_html(name),
        SEPARATOR
    )
}

pub fn broadcast_prompt_text() -> String {
    format!(
        "{}\n\n{}.",
        html_bold("📣 Broadcast Message"),
        html_bold(&format!("{} (Text, Photo, or Video)", BROADCAST_PROMPT_MARKER))
    )
}

pub fn users_count_text(count: u64) -> String {
    html_bold(&format!("📊 Current Users in the Bot: {}", count))
}

/// True when the owner replied to the broadcast prompt.
pub fn is_broadcast_reply(config: &Config, envelope: &InboundEnvelope) -> bool {
    config.is_owner(envelope.chat_id)
        && envelope
            .reply_to_text
            .as_deref()
            .is_some_and(|text| text.contains(BROADCAST_PROMPT_MARKER))
}

/// Handles an admin panel button press.
///
/// Returns `false` if `data` is not an admin callback.
pub async fn handle_admin_callback(
    config: &Config,
    gateway: &dyn MessengerGateway,
    store: &dyn UserStore,
    envelope: &InboundEnvelope,
    callback_id: &str,
    data: &str,
) -> AppResult<bool> {
    if data != USERS_COUNT_CALLBACK && data != BROADCAST_CALLBACK {
        return Ok(false);
    }

    if !config.is_owner(envelope.chat_id) {
        log::warn!("Chat {} pressed admin button {:?}", envelope.chat_id, data);
        answer(gateway, callback_id, Some("❌ You cannot use this command."), true).await;
        return Ok(true);
    }

    if data == USERS_COUNT_CALLBACK {
        let count = store.count().await?;
        answer(gateway, callback_id, Some(&format!("📊 Total Users: {}", count)), false).await;
        let text = users_count_text(count);
        let edited = gateway
            .edit_text(envelope.chat_id, envelope.message_id, &text, Some(&panel_keyboard()))
            .await;
        if !matches!(edited, Ok(EditOutcome::Edited)) {
            gateway.send_text(envelope.chat_id, &text, None, None).await?;
        }
    } else {
        answer(gateway, callback_id, Some("📣 Broadcast Mode"), false).await;
        gateway
            .send_text(
                envelope.chat_id,
                &broadcast_prompt_text(),
                Some(envelope.message_id),
                None,
            )
            .await?;
    }
    Ok(true)
}

/// Broadcasts the owner's reply to every other known chat.
pub async fn handle_broadcast_reply(
    config: &Config,
    gateway: &dyn MessengerGateway,
    store: &dyn UserStore,
    envelope: &InboundEnvelope,
) -> AppResult<BroadcastReport> {
    let status_id = gateway
        .send_text(
            envelope.chat_id,
            &html_bold("📤 Broadcasting started..."),
            Some(envelope.message_id),
            None,
        )
        .await?;

    let report = BroadcastService::new(gateway, store)
        .broadcast(envelope.chat_id, envelope.message_id, config.owner_id)
        .await?;
    log::info!(
        "📣 Broadcast finished: {} ok, {} failed, {} removed",
        report.successful,
        report.failed,
        report.removed
    );

    let summary = report.summary_text();
    match gateway.edit_text(envelope.chat_id, status_id, &summary, None).await {
        Ok(EditOutcome::Edited) => {}
        _ => {
            gateway.send_text(envelope.chat_id, &summary, None, None).await?;
        }
    }
    Ok(report)
}

async fn answer(gateway: &dyn MessengerGateway, callback_id: &str, text: Option<&str>, alert: bool) {
    if let Err(e) = gateway.answer_callback(callback_id, text, alert).await {
        log::debug!("answer_callback failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryUserStore;
    use crate::testing::{GatewayCall, RecordingGateway};

    fn owner_config() -> Config {
        Config {
            owner_id: Some(1),
            ..Config::default()
        }
    }

    fn envelope(chat_id: i64) -> InboundEnvelope {
        InboundEnvelope {
            chat_id,
            message_id: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_prompt_contains_marker() {
        assert!(broadcast_prompt_text().contains(BROADCAST_PROMPT_MARKER));
    }

    #[test]
    fn test_broadcast_reply_requires_owner() {
        let config = owner_config();
        let mut reply = envelope(1);
        reply.reply_to_text = Some(broadcast_prompt_text());
        assert!(is_broadcast_reply(&config, &reply));

        reply.chat_id = 2;
        assert!(!is_broadcast_reply(&config, &reply));

        let mut unrelated = envelope(1);
        unrelated.reply_to_text = Some("hello".to_string());
        assert!(!is_broadcast_reply(&config, &unrelated));
    }

    #[test]
    fn test_welcome_escapes_name() {
        assert!(welcome_text(Some("<Bob>")).contains("Hello &lt;Bob&gt;!"));
        assert!(welcome_text(None).contains("Hello User!"));
    }

    #[tokio::test]
    async fn test_non_owner_gets_alert() {
        let gateway = RecordingGateway::new();
        let store = MemoryUserStore::new();
        let handled = handle_admin_callback(
            &owner_config(),
            &gateway,
            &store,
            &envelope(2),
            "cb",
            USERS_COUNT_CALLBACK,
        )
        .await
        .unwrap();
        assert!(handled);
        assert_eq!(
            gateway.calls(),
            vec![GatewayCall::AnswerCallback {
                callback_id: "cb".to_string(),
                text: Some("❌ You cannot use this command.".to_string()),
                alert: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_users_count_edits_panel() {
        let gateway = RecordingGateway::new();
        let store = MemoryUserStore::with_chats([1, 2, 3]);
        handle_admin_callback(&owner_config(), &gateway, &store, &envelope(1), "cb", USERS_COUNT_CALLBACK)
            .await
            .unwrap();
        assert_eq!(gateway.edits(), vec![users_count_text(3)]);
    }

    #[tokio::test]
    async fn test_unknown_callback_is_not_handled() {
        let gateway = RecordingGateway::new();
        let store = MemoryUserStore::new();
        let handled = handle_admin_callback(&owner_config(), &gateway, &store, &envelope(1), "cb", "other")
            .await
            .unwrap();
        assert!(!handled);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_reply_skips_owner() {
        let gateway = RecordingGateway::new();
        let store = MemoryUserStore::with_chats([1, 2, 3]);
        let report = handle_broadcast_reply(&owner_config(), &gateway, &store, &envelope(1))
            .await
            .unwrap();
        assert_eq!(report.successful, 2);

        let copies: Vec<i64> = gateway
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Copy { to_chat, .. } => Some(to_chat),
                _ => None,
            })
            .collect();
        assert_eq!(copies.len(), 2);
        assert!(!copies.contains(&1));
        assert!(gateway.edits()[0].contains("Broadcast Complete"));
    }
}

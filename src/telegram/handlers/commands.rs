//! Update routing: commands, links, admin replies and button presses.

use super::types::{HandlerDeps, HandlerError};
use crate::core::utils::html_bold;
use crate::download::platform::RequestError;
use crate::download::progress::NOOP_CALLBACK;
use crate::download::ytdlp::{self, download_and_send_songs, download_song_url};
use crate::download::{MediaRequest, PipelineOutcome};
use crate::telegram::admin;
use crate::telegram::bot::Command;
use crate::telegram::envelope::InboundEnvelope;
use crate::telegram::gateway::TransportFailure;
use crate::telegram::song_picker;

/// Handles one inbound chat message.
pub async fn handle_message(deps: &HandlerDeps, envelope: InboundEnvelope) -> Result<(), HandlerError> {
    if let Err(e) = deps.store.record_if_new(envelope.chat_id).await {
        log::error!("Failed to record chat {}: {}", envelope.chat_id, e);
    }

    if admin::is_broadcast_reply(&deps.config, &envelope) {
        admin::handle_broadcast_reply(&deps.config, deps.gateway.as_ref(), deps.store.as_ref(), &envelope).await?;
        return Ok(());
    }

    match Command::from_text(envelope.text()) {
        Some(cmd) => {
            log::info!("🎯 Received command: {:?} from chat {}", cmd, envelope.chat_id);
            match cmd {
                Command::Start => handle_start_command(deps, &envelope).await,
                Command::Song(query) => handle_song_command(deps, &envelope, &query).await,
            }
        }
        None => handle_link_message(deps, &envelope).await,
    }
}

/// Handles one inline keyboard button press.
pub async fn handle_callback(deps: &HandlerDeps, envelope: InboundEnvelope) -> Result<(), HandlerError> {
    let Some(callback) = envelope.callback.clone() else {
        return Ok(());
    };

    if callback.data == NOOP_CALLBACK {
        deps.gateway.answer_callback(&callback.id, None, false).await?;
        return Ok(());
    }

    if let Some((count, query_id)) = song_picker::parse_count_callback(&callback.data) {
        return handle_song_count(deps, &envelope, &callback.id, count, query_id).await;
    }

    let handled = admin::handle_admin_callback(
        &deps.config,
        deps.gateway.as_ref(),
        deps.store.as_ref(),
        &envelope,
        &callback.id,
        &callback.data,
    )
    .await?;
    if !handled {
        log::debug!("Ignoring callback {:?} from chat {}", callback.data, envelope.chat_id);
        deps.gateway.answer_callback(&callback.id, None, false).await?;
    }
    Ok(())
}

async fn handle_start_command(deps: &HandlerDeps, envelope: &InboundEnvelope) -> Result<(), HandlerError> {
    if deps.config.is_owner(envelope.chat_id) {
        deps.gateway
            .send_text(
                envelope.chat_id,
                &admin::panel_text(),
                Some(envelope.message_id),
                Some(&admin::panel_keyboard()),
            )
            .await?;
    } else {
        deps.gateway
            .send_text(
                envelope.chat_id,
                &admin::welcome_text(envelope.first_name.as_deref()),
                Some(envelope.message_id),
                None,
            )
            .await?;
    }
    Ok(())
}

async fn handle_song_command(deps: &HandlerDeps, envelope: &InboundEnvelope, query: &str) -> Result<(), HandlerError> {
    if query.is_empty() {
        deps.gateway
            .send_text(envelope.chat_id, &ytdlp::usage_text(), Some(envelope.message_id), None)
            .await?;
        return Ok(());
    }

    if let Some(video_id) = ytdlp::youtube_video_id(query) {
        let status_id = deps
            .gateway
            .send_text(
                envelope.chat_id,
                &ytdlp::fetching_info_text(),
                Some(envelope.message_id),
                None,
            )
            .await?;
        download_song_url(
            deps.songs.as_ref(),
            deps.gateway.as_ref(),
            deps.song_history.as_ref(),
            envelope.chat_id,
            status_id,
            query,
            &video_id,
        )
        .await;
        return Ok(());
    }

    let query_id = deps.pending_songs.insert(envelope.chat_id, query);
    deps.gateway
        .send_text(
            envelope.chat_id,
            &song_picker::prompt_text(query),
            Some(envelope.message_id),
            Some(&song_picker::count_keyboard(&query_id)),
        )
        .await?;
    Ok(())
}

async fn handle_song_count(
    deps: &HandlerDeps,
    envelope: &InboundEnvelope,
    callback_id: &str,
    count: usize,
    query_id: &str,
) -> Result<(), HandlerError> {
    let Some(pending) = deps.pending_songs.take(query_id, envelope.chat_id) else {
        log::info!("Chat {}: /song request {} expired", envelope.chat_id, query_id);
        deps.gateway
            .answer_callback(callback_id, Some(song_picker::EXPIRED_ANSWER), false)
            .await?;
        deps.gateway
            .edit_text(envelope.chat_id, envelope.message_id, &song_picker::expired_text(), None)
            .await?;
        return Ok(());
    };

    let limit = ytdlp::clamp_limit(Some(count));
    deps.gateway
        .answer_callback(callback_id, Some(&song_picker::downloading_answer(limit)), false)
        .await?;
    deps.gateway
        .edit_text(
            envelope.chat_id,
            envelope.message_id,
            &ytdlp::starting_text(&pending.query, limit),
            None,
        )
        .await?;

    download_and_send_songs(
        deps.songs.as_ref(),
        deps.gateway.as_ref(),
        deps.song_history.as_ref(),
        envelope.chat_id,
        envelope.message_id,
        &pending.query,
        limit,
    )
    .await;
    Ok(())
}

async fn handle_link_message(deps: &HandlerDeps, envelope: &InboundEnvelope) -> Result<(), HandlerError> {
    let request = match MediaRequest::from_message_text(envelope.text()) {
        Ok(request) => request,
        Err(RequestError::UnsupportedLink(link)) => {
            log::info!("Chat {}: unsupported link {}", envelope.chat_id, link);
            deps.gateway
                .send_text(
                    envelope.chat_id,
                    &format!(
                        "{}\n\nSupported: Facebook, TikTok and YouTube.",
                        html_bold("❌ This link is not supported.")
                    ),
                    Some(envelope.message_id),
                    None,
                )
                .await?;
            return Ok(());
        }
        Err(RequestError::NoLink) => {
            if envelope.is_private() && envelope.text.is_some() {
                deps.gateway
                    .send_text(
                        envelope.chat_id,
                        &format!(
                            "{}\n\nExample: https://www.tiktok.com/@user/video/123456789",
                            html_bold("❌ Please send a valid Facebook, TikTok or YouTube video link.")
                        ),
                        Some(envelope.message_id),
                        None,
                    )
                    .await?;
            }
            return Ok(());
        }
    };

    match deps.pipeline.handle(envelope.chat_id, envelope.message_id, request).await {
        PipelineOutcome::Delivered(report) => {
            log::info!("✅ Chat {}: delivered via {:?}", envelope.chat_id, report.mode);
        }
        PipelineOutcome::ResolutionFailed(failure) => {
            log::warn!("Chat {}: {}", envelope.chat_id, failure);
        }
        PipelineOutcome::DeliveryFailed(failure) => {
            log::warn!("Chat {}: {}", envelope.chat_id, failure);
        }
        PipelineOutcome::ChatUnavailable(e) => {
            log::warn!("Chat {} unavailable: {}", envelope.chat_id, e);
            if e == TransportFailure::Blocked {
                deps.store.remove(envelope.chat_id).await?;
            }
        }
    }
    Ok(())
}

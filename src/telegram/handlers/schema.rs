//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::commands::{handle_callback, handle_message};
use super::types::{HandlerDeps, HandlerError};
use crate::telegram::envelope::InboundEnvelope;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// Updates are decoded into an [`InboundEnvelope`] here; everything below
/// this point talks to Telegram through `deps.gateway` only.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Message handler for commands, links and admin replies
        .branch(message_handler(deps_messages))
        // Callback query handler
        .branch(callback_handler(deps_callback))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.from.as_ref().is_some_and(|user| !user.is_bot))
        .endpoint(move |msg: Message| {
            let deps = deps.clone();
            async move {
                let envelope = InboundEnvelope::from_message(&msg);
                if let Err(e) = handle_message(&deps, envelope).await {
                    log::error!("❌ Message handler failed for chat {}: {}", msg.chat.id, e);
                    return Err(e);
                }
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            match InboundEnvelope::from_callback(&q) {
                Some(envelope) => handle_callback(&deps, envelope).await,
                None => {
                    log::debug!("Ignoring callback {} without a message", q.id.0);
                    Ok(())
                }
            }
        }
    })
}

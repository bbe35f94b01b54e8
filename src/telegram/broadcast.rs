//! Owner broadcast fan-out.
//!
//! Copies one message to every known chat in batches. Sends inside a batch
//! run concurrently; batches are separated by a short pause to stay under
//! the Bot API rate limits. Chats that blocked the bot are dropped from the
//! store.

use crate::core::config;
use crate::core::error::AppResult;
use crate::core::utils::html_bold;
use crate::storage::UserStore;
use crate::telegram::gateway::{MessengerGateway, TransportFailure};
use futures_util::future::join_all;
use std::time::Duration;

/// Totals of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub successful: usize,
    pub failed: usize,
    /// Chats removed from the store because they blocked the bot
    pub removed: usize,
}

impl BroadcastReport {
    pub fn summary_text(&self) -> String {
        format!(
            "{}\n\nSuccessful sends: {}\nFailed sends: {}\nRemoved (blocked the bot): {}",
            html_bold("✅ Broadcast Complete!"),
            self.successful,
            self.failed,
            self.removed
        )
    }
}

pub struct BroadcastService<'a> {
    gateway: &'a dyn MessengerGateway,
    store: &'a dyn UserStore,
    batch_size: usize,
    batch_delay: Duration,
}

impl<'a> BroadcastService<'a> {
    pub fn new(gateway: &'a dyn MessengerGateway, store: &'a dyn UserStore) -> Self {
        Self {
            gateway,
            store,
            batch_size: config::broadcast::BATCH_SIZE,
            batch_delay: config::broadcast::batch_delay(),
        }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    /// Copies `message_id` from `from_chat` to every stored chat except `skip`.
    pub async fn broadcast(&self, from_chat: i64, message_id: i32, skip: Option<i64>) -> AppResult<BroadcastReport> {
        let recipients: Vec<i64> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|chat| Some(*chat) != skip)
            .collect();
        log::info!(
            "📣 Broadcasting message {} to {} chat(s) in batches of {}",
            message_id,
            recipients.len(),
            self.batch_size
        );

        let mut report = BroadcastReport::default();
        let batches: Vec<&[i64]> = recipients.chunks(self.batch_size).collect();
        for (index, batch) in batches.iter().enumerate() {
            let results = join_all(
                batch
                    .iter()
                    .map(|chat| async move { (*chat, self.gateway.copy_message(*chat, from_chat, message_id).await) }),
            )
            .await;

            for (chat, result) in results {
                match result {
                    Ok(_) => report.successful += 1,
                    Err(TransportFailure::Blocked) => {
                        report.failed += 1;
                        match self.store.remove(chat).await {
                            Ok(()) => report.removed += 1,
                            Err(e) => log::warn!("Could not remove blocked chat {}: {}", chat, e),
                        }
                    }
                    Err(e) => {
                        log::debug!("Broadcast to {} failed: {}", chat, e);
                        report.failed += 1;
                    }
                }
            }

            if index + 1 < batches.len() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        log::info!(
            "📣 Broadcast done: {} sent, {} failed, {} removed",
            report.successful,
            report.failed,
            report.removed
        );
        Ok(report)
    }
}

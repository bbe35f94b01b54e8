//! Cosmetic progress animation on the status message.
//!
//! The animation runs as its own task next to the resolver. It edits the
//! status message a fixed number of times and checks a shared `active` flag
//! before every edit. The owning request must call
//! [`ProgressAnimation::cancel`] and await it before posting its terminal
//! message, so no frame can land after the result.

use crate::core::config::animation;
use crate::telegram::gateway::{Button, EditOutcome, Keyboard, MessengerGateway};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Callback data of the single frame button; pressing it does nothing.
pub const NOOP_CALLBACK: &str = "progress_noop";

/// Text of frame `index`, clamped to the last frame.
pub fn frame_text(index: usize) -> &'static str {
    animation::FRAMES[index.min(animation::FRAMES.len() - 1)]
}

/// The frame repeated as a single inert button under the message.
pub fn frame_keyboard(index: usize) -> Keyboard {
    Keyboard::single(Button::callback(
        crate::core::utils::strip_html_tags(frame_text(index)),
        NOOP_CALLBACK,
    ))
}

struct Shared {
    active: AtomicBool,
    wake: Notify,
}

/// Handle to a running animation.
pub struct ProgressAnimation {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressAnimation {
    /// Starts animating `message_id` with the configured interval and tick count.
    pub fn start(gateway: Arc<dyn MessengerGateway>, chat_id: i64, message_id: i32) -> Self {
        Self::start_with(
            gateway,
            chat_id,
            message_id,
            animation::frame_interval(),
            animation::TICKS,
        )
    }

    pub fn start_with(
        gateway: Arc<dyn MessengerGateway>,
        chat_id: i64,
        message_id: i32,
        interval: Duration,
        ticks: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            active: AtomicBool::new(true),
            wake: Notify::new(),
        });
        let task_shared = Arc::clone(&shared);

        let handle = tokio::spawn(async move {
            for tick in 1..=ticks {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = task_shared.wake.notified() => {}
                }
                if !task_shared.active.load(Ordering::SeqCst) {
                    break;
                }
                let keyboard = frame_keyboard(tick);
                match gateway
                    .edit_text(chat_id, message_id, frame_text(tick), Some(&keyboard))
                    .await
                {
                    Ok(EditOutcome::Edited) => {}
                    Ok(EditOutcome::NotFound) => {
                        log::debug!("Status message {} vanished, stopping animation", message_id);
                        break;
                    }
                    Err(e) => log::debug!("Animation frame {} not shown: {}", tick, e),
                }
            }
            task_shared.active.store(false, Ordering::SeqCst);
        });

        Self {
            shared,
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Stops the animation and waits until no edit is in flight.
    pub async fn cancel(mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("Progress animation task failed: {}", e);
            }
        }
    }
}

impl Drop for ProgressAnimation {
    fn drop(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GatewayCall, RecordingGateway};

    #[test]
    fn test_frames() {
        assert_eq!(animation::FRAMES.len(), 11);
        assert!(frame_text(0).contains("Loading"));
        assert!(frame_text(99).contains("Done"));
        let keyboard = frame_keyboard(1);
        assert_eq!(keyboard.rows.len(), 1);
        assert_eq!(
            keyboard.rows[0][0],
            Button::callback("📥 Fetching...█▒▒▒▒▒▒▒▒▒", NOOP_CALLBACK)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_all_ticks_then_stops() {
        let gateway = Arc::new(RecordingGateway::new());
        let animation = ProgressAnimation::start(gateway.clone(), 1, 7);
        tokio::time::sleep(Duration::from_millis(800 * 12)).await;
        assert!(!animation.is_active());
        assert_eq!(gateway.edits().len(), animation::TICKS);
        assert_eq!(gateway.edits().last().map(String::as_str), Some(animation::FRAMES[9]));
        animation.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_edits() {
        let gateway = Arc::new(RecordingGateway::new());
        let animation = ProgressAnimation::start(gateway.clone(), 1, 7);
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        animation.cancel().await;
        let after_cancel = gateway.edits().len();
        assert_eq!(after_cancel, 2);

        gateway.send_text(1, "result", None, None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gateway.edits().len(), after_cancel);
        assert!(matches!(gateway.calls().last(), Some(GatewayCall::SendText { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_message_ends_animation() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.lose_edits();
        let animation = ProgressAnimation::start(gateway.clone(), 1, 7);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(gateway.edits().len(), 1);
        assert!(!animation.is_active());
    }
}

//! Handler types and dependencies

use std::sync::Arc;

use crate::core::config::Config;
use crate::download::{MediaPipeline, SongSource};
use crate::storage::{SongHistory, UserStore};
use crate::telegram::gateway::MessengerGateway;
use crate::telegram::song_picker::PendingSongs;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub config: Arc<Config>,
    pub gateway: Arc<dyn MessengerGateway>,
    pub store: Arc<dyn UserStore>,
    pub pipeline: MediaPipeline,
    pub songs: Arc<dyn SongSource>,
    pub song_history: Arc<dyn SongHistory>,
    /// `/song` queries waiting for a count button
    pub pending_songs: Arc<PendingSongs>,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(
        config: Arc<Config>,
        gateway: Arc<dyn MessengerGateway>,
        store: Arc<dyn UserStore>,
        pipeline: MediaPipeline,
        songs: Arc<dyn SongSource>,
        song_history: Arc<dyn SongHistory>,
    ) -> Self {
        Self {
            config,
            gateway,
            store,
            pipeline,
            songs,
            song_history,
            pending_songs: Arc::new(PendingSongs::default()),
        }
    }
}

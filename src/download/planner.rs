//! Delivery planning and the upload/downgrade/redirect state machine.
//!
//! [`plan`] makes the optimistic up-front decision from what is known before
//! any bytes move. [`DeliveryMachine`] then reacts to what actually happens
//! during delivery:
//!
//! ```text
//! Planned ──Begin──► Uploading ──ok──► Delivered(InlineUpload)
//!    │                   │ fail
//!    │                   ├─(alternate)──► QualityDowngraded ──ok──► Delivered(QualityFallbackUpload)
//!    │                   │                      │ fail
//!    │                   ▼                      ▼
//!    └─(oversized)──► RedirectFallback ◄────────┘
//!                        ├──sent──► Delivered(RedirectLink)
//!                        └──fail──► Failed
//! ```

use crate::core::config::Config;
use crate::download::source::ResolvedMedia;

/// How the media reaches the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    InlineUpload,
    QualityFallbackUpload,
    RedirectLink,
    Failure,
}

/// Output of [`plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryDecision {
    pub mode: DeliveryMode,
    pub chosen_url: String,
}

/// Size policy for inline uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_inline_bytes: u64,
}

impl From<&Config> for DeliveryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_inline_bytes: config.max_inline_bytes,
        }
    }
}

/// Decides the first delivery step.
///
/// A known size above the limit goes straight to a redirect link. An unknown
/// size is always tried inline; the state machine handles a rejection.
pub fn plan(media: &ResolvedMedia, policy: &DeliveryPolicy) -> DeliveryDecision {
    let oversized = media
        .metadata
        .estimated_size_bytes
        .is_some_and(|size| size > policy.max_inline_bytes);

    DeliveryDecision {
        mode: if oversized {
            DeliveryMode::RedirectLink
        } else {
            DeliveryMode::InlineUpload
        },
        chosen_url: media.playable_url().to_string(),
    }
}

/// States of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Planned(DeliveryDecision),
    Uploading { url: String },
    QualityDowngraded { url: String },
    RedirectFallback { url: String },
    Delivered { mode: DeliveryMode },
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered { .. } | DeliveryState::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeliveryState::Planned(_) => "planned",
            DeliveryState::Uploading { .. } => "uploading",
            DeliveryState::QualityDowngraded { .. } => "quality_downgraded",
            DeliveryState::RedirectFallback { .. } => "redirect_fallback",
            DeliveryState::Delivered { .. } => "delivered",
            DeliveryState::Failed => "failed",
        }
    }
}

/// What the executor reports back after acting on a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEvent {
    Begin,
    UploadSucceeded,
    UploadFailed,
    RedirectSent,
    RedirectFailed,
}

/// Drives one delivery from [`DeliveryState::Planned`] to a terminal state.
#[derive(Debug, Clone)]
pub struct DeliveryMachine {
    state: DeliveryState,
    primary_url: String,
    alternate_url: Option<String>,
    redirect_url: String,
    trail: Vec<&'static str>,
}

impl DeliveryMachine {
    /// Video delivery: playable URL first, alternate quality on failure.
    pub fn new(media: &ResolvedMedia, policy: &DeliveryPolicy) -> Self {
        let decision = plan(media, policy);
        Self {
            primary_url: decision.chosen_url.clone(),
            alternate_url: media.alternate_quality_url.clone(),
            redirect_url: media.playable_url().to_string(),
            trail: vec!["planned"],
            state: DeliveryState::Planned(decision),
        }
    }

    /// Audio delivery: the soundtrack link if the provider gave one, else
    /// the playable URL. No quality downgrade; the redirect still points at
    /// the playable URL.
    pub fn for_audio(media: &ResolvedMedia, policy: &DeliveryPolicy) -> Self {
        let decision = match &media.audio_url {
            // Soundtracks are small; the video size says nothing about them
            Some(audio) => DeliveryDecision {
                mode: DeliveryMode::InlineUpload,
                chosen_url: audio.clone(),
            },
            None => plan(media, policy),
        };
        Self {
            primary_url: decision.chosen_url.clone(),
            alternate_url: None,
            redirect_url: media.playable_url().to_string(),
            trail: vec!["planned"],
            state: DeliveryState::Planned(decision),
        }
    }

    pub fn state(&self) -> &DeliveryState {
        &self.state
    }

    /// Names of every state visited so far, for logs and tests.
    pub fn trail(&self) -> &[&'static str] {
        &self.trail
    }

    /// Applies `event`. Events that do not fit the current state are logged
    /// and leave it unchanged.
    pub fn advance(&mut self, event: DeliveryEvent) -> &DeliveryState {
        let next = match (&self.state, event) {
            (DeliveryState::Planned(decision), DeliveryEvent::Begin) => match decision.mode {
                DeliveryMode::RedirectLink => DeliveryState::RedirectFallback {
                    url: decision.chosen_url.clone(),
                },
                DeliveryMode::Failure => DeliveryState::Failed,
                DeliveryMode::InlineUpload | DeliveryMode::QualityFallbackUpload => DeliveryState::Uploading {
                    url: self.primary_url.clone(),
                },
            },
            (DeliveryState::Uploading { .. }, DeliveryEvent::UploadSucceeded) => DeliveryState::Delivered {
                mode: DeliveryMode::InlineUpload,
            },
            (DeliveryState::Uploading { .. }, DeliveryEvent::UploadFailed) => match &self.alternate_url {
                Some(alternate) if *alternate != self.primary_url => DeliveryState::QualityDowngraded {
                    url: alternate.clone(),
                },
                _ => DeliveryState::RedirectFallback {
                    url: self.redirect_url.clone(),
                },
            },
            (DeliveryState::QualityDowngraded { .. }, DeliveryEvent::UploadSucceeded) => DeliveryState::Delivered {
                mode: DeliveryMode::QualityFallbackUpload,
            },
            (DeliveryState::QualityDowngraded { .. }, DeliveryEvent::UploadFailed) => {
                DeliveryState::RedirectFallback {
                    url: self.redirect_url.clone(),
                }
            }
            (DeliveryState::RedirectFallback { .. }, DeliveryEvent::RedirectSent) => DeliveryState::Delivered {
                mode: DeliveryMode::RedirectLink,
            },
            (DeliveryState::RedirectFallback { .. }, DeliveryEvent::RedirectFailed) => DeliveryState::Failed,
            (state, event) => {
                log::warn!("Ignoring delivery event {:?} in state {}", event, state.name());
                return &self.state;
            }
        };

        self.trail.push(next.name());
        self.state = next;
        &self.state
    }
}

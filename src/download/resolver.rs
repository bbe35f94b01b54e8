//! Ordered fallback across upstream adapters.
//!
//! The resolver walks a platform's adapter chain in priority order, giving
//! each attempt its own hard timeout inside an overall request ceiling. The
//! first adapter that yields a playable URL wins; later adapters are never
//! called. If the winner left the title or thumbnail empty, one
//! supplementary metadata lookup may fill them in, but its outcome never
//! decides success.

use crate::core::config::Config;
use crate::core::utils::html_bold;
use crate::download::platform::{MediaRequest, Platform};
use crate::download::source::{AdapterFailure, MetadataSource, ResolvedMedia, SourceId, SourceRegistry, UpstreamSource};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use url::Url;

/// Outcome of one adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure(AdapterFailure),
    Timeout,
}

/// Bookkeeping for one adapter invocation; only ever logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionAttempt {
    pub adapter_id: SourceId,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl ResolutionAttempt {
    /// Adapter error text, if any. Not for user-facing copy.
    pub fn error_detail(&self) -> Option<String> {
        match &self.outcome {
            AttemptOutcome::Success => None,
            AttemptOutcome::Failure(failure) => Some(failure.to_string()),
            AttemptOutcome::Timeout => Some(format!("timed out after {:?}", self.elapsed)),
        }
    }
}

impl fmt::Display for ResolutionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Success => write!(f, "{} ok ({} ms)", self.adapter_id, self.elapsed.as_millis()),
            AttemptOutcome::Failure(failure) => write!(
                f,
                "{} failed [{}] ({} ms): {}",
                self.adapter_id,
                failure.kind(),
                self.elapsed.as_millis(),
                failure
            ),
            AttemptOutcome::Timeout => write!(f, "{} timed out ({} ms)", self.adapter_id, self.elapsed.as_millis()),
        }
    }
}

/// Every adapter for the platform failed, or the ceiling ran out.
///
/// `Display` names only the platform and attempt count; adapter detail
/// stays in `attempts`.
#[derive(Debug, Clone, Error)]
#[error("could not resolve {platform} media ({} attempts)", .attempts.len())]
pub struct ResolutionFailure {
    pub platform: Platform,
    pub attempts: Vec<ResolutionAttempt>,
    pub timed_out_overall: bool,
}

impl ResolutionFailure {
    /// HTML message shown in place of the progress indicator.
    pub fn user_message(&self) -> String {
        let mut text = match self.platform {
            Platform::Facebook => format!(
                "{}\n\nThe video might be private, deleted, or temporarily unavailable.",
                html_bold("❌ Could not fetch this Facebook video.")
            ),
            Platform::TikTok => format!(
                "{}\n\nThe video might be private or unavailable. Please check the link and try again.",
                html_bold("❌ Failed to fetch TikTok video.")
            ),
            Platform::YouTube => format!(
                "{}\n\nIt may be private, age-restricted, or not available in this region.",
                html_bold("❌ Could not fetch this YouTube video.")
            ),
        };
        if self.timed_out_overall {
            text.push_str("\n\n⏱️ The download services are slow right now, please try again in a few minutes.");
        }
        text
    }

    /// Whether some adapter positively saw "no media" (private/deleted).
    pub fn saw_no_media(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(&a.outcome, AttemptOutcome::Failure(f) if f.is_actionable()))
    }
}

/// Timeouts applied by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Hard bound for one adapter attempt
    pub attempt_timeout: Duration,
    /// Soft bound for the whole request; remaining adapters are skipped once spent
    pub request_ceiling: Duration,
}

impl From<&Config> for ResolverPolicy {
    fn from(config: &Config) -> Self {
        Self {
            attempt_timeout: config.attempt_timeout,
            request_ceiling: config.request_ceiling,
        }
    }
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Platform-aware front end over [`resolve_chain`].
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<SourceRegistry>,
    policy: ResolverPolicy,
}

impl Resolver {
    pub fn new(registry: Arc<SourceRegistry>, policy: ResolverPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn policy(&self) -> ResolverPolicy {
        self.policy
    }

    pub async fn resolve(&self, request: &MediaRequest) -> Result<ResolvedMedia, ResolutionFailure> {
        let platform = request.platform();
        let metadata = self.registry.metadata_source(platform);
        resolve_chain(
            request.source_url(),
            platform,
            self.registry.chain(platform),
            metadata.as_deref(),
            self.policy,
        )
        .await
    }
}

/// Tries `adapters` in order and returns the first success.
pub async fn resolve_chain(
    source_url: &Url,
    platform: Platform,
    adapters: &[Arc<dyn UpstreamSource>],
    metadata: Option<&dyn MetadataSource>,
    policy: ResolverPolicy,
) -> Result<ResolvedMedia, ResolutionFailure> {
    let deadline = Instant::now() + policy.request_ceiling;
    let mut attempts = Vec::with_capacity(adapters.len());
    let mut timed_out_overall = false;

    log::info!("🔎 Resolving {} link via {} adapter(s)", platform, adapters.len());

    for adapter in adapters {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::warn!(
                "Request ceiling of {:?} reached, skipping {} and later adapters",
                policy.request_ceiling,
                adapter.id()
            );
            timed_out_overall = true;
            break;
        }
        let bound = policy.attempt_timeout.min(remaining);

        let started = Instant::now();
        let result = timeout(bound, adapter.attempt(source_url)).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(Ok(mut media)) => {
                let attempt = ResolutionAttempt {
                    adapter_id: adapter.id(),
                    outcome: AttemptOutcome::Success,
                    elapsed,
                };
                log::info!("✅ {}", attempt);
                attempts.push(attempt);

                if let Some(source) = metadata {
                    supplement_metadata(&mut media, adapter.id(), source, source_url, policy, deadline).await;
                }
                log::debug!("Attempt log: {}", format_attempts(&attempts));
                return Ok(media);
            }
            Ok(Err(failure)) => AttemptOutcome::Failure(failure),
            Err(_) => {
                if bound < policy.attempt_timeout {
                    timed_out_overall = true;
                }
                AttemptOutcome::Timeout
            }
        };

        let attempt = ResolutionAttempt {
            adapter_id: adapter.id(),
            outcome,
            elapsed,
        };
        log::warn!("⚠️ {}", attempt);
        attempts.push(attempt);
    }

    let failure = ResolutionFailure {
        platform,
        attempts,
        timed_out_overall,
    };
    log::warn!(
        "❌ {} (no_media seen: {}): {}",
        failure,
        failure.saw_no_media(),
        format_attempts(&failure.attempts)
    );
    Err(failure)
}

/// One bounded metadata-only lookup. Failures are logged and ignored.
async fn supplement_metadata(
    media: &mut ResolvedMedia,
    winner: SourceId,
    source: &dyn MetadataSource,
    source_url: &Url,
    policy: ResolverPolicy,
    deadline: Instant,
) {
    if !media.metadata.is_incomplete() || source.id() == winner {
        return;
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return;
    }

    match timeout(policy.attempt_timeout.min(remaining), source.metadata(source_url)).await {
        Ok(Ok(extra)) => {
            log::debug!("Metadata supplemented from {}", source.id());
            media.merge_metadata(&extra);
        }
        Ok(Err(failure)) => log::debug!("Metadata lookup via {} failed: {}", source.id(), failure),
        Err(_) => log::debug!("Metadata lookup via {} timed out", source.id()),
    }
}

fn format_attempts(attempts: &[ResolutionAttempt]) -> String {
    attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(platform: Platform, timed_out_overall: bool) -> ResolutionFailure {
        ResolutionFailure {
            platform,
            attempts: vec![ResolutionAttempt {
                adapter_id: SourceId::new(platform, "x"),
                outcome: AttemptOutcome::Failure(AdapterFailure::Malformed("<html>secret</html>".into())),
                elapsed: Duration::from_millis(5),
            }],
            timed_out_overall,
        }
    }

    #[test]
    fn test_user_message_is_platform_specific() {
        let fb = failure(Platform::Facebook, false).user_message();
        let tt = failure(Platform::TikTok, false).user_message();
        assert_ne!(fb, tt);
        assert!(fb.contains("Facebook"));
        assert!(tt.contains("TikTok"));
    }

    #[test]
    fn test_user_message_never_leaks_adapter_detail() {
        let f = failure(Platform::YouTube, true);
        assert!(!f.user_message().contains("secret"));
        assert!(!f.to_string().contains("secret"));
        assert!(f.user_message().contains("slow right now"));
    }

    #[test]
    fn test_attempt_display_and_detail() {
        let attempt = ResolutionAttempt {
            adapter_id: SourceId::new(Platform::TikTok, "v3"),
            outcome: AttemptOutcome::Failure(AdapterFailure::Rejected { status: 429 }),
            elapsed: Duration::from_millis(120),
        };
        assert_eq!(
            attempt.to_string(),
            "TikTok/v3 failed [rejected] (120 ms): upstream rejected the request with status 429"
        );
        assert!(attempt.error_detail().is_some());
    }

    #[test]
    fn test_saw_no_media() {
        let mut f = failure(Platform::Facebook, false);
        assert!(!f.saw_no_media());
        f.attempts[0].outcome = AttemptOutcome::Failure(AdapterFailure::NoMediaFound);
        assert!(f.saw_no_media());
    }
}

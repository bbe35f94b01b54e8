//! Media resolution and delivery

pub mod caption;
pub mod delivery;
pub mod pipeline;
pub mod planner;
pub mod platform;
pub mod progress;
pub mod redirect;
pub mod resolver;
pub mod source;
pub mod ytdlp;

// Re-exports for convenience
pub use delivery::{DeliveryExecutor, HttpMediaFetcher, MediaFetcher};
pub use pipeline::{MediaPipeline, PipelineOutcome};
pub use planner::{plan, DeliveryDecision, DeliveryMode, DeliveryPolicy};
pub use platform::{MediaRequest, Platform, RequestedMode};
pub use resolver::{ResolutionFailure, Resolver, ResolverPolicy};
pub use source::{ResolvedMedia, SourceRegistry};
pub use ytdlp::{SongSource, YtDlpCli};

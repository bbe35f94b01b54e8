//! Test doubles for the messaging surface.
//!
//! [`RecordingGateway`] records every call made through
//! [`MessengerGateway`](crate::telegram::gateway::MessengerGateway) so tests
//! can assert on exactly what a chat would have seen, in order.
//!
//! ```rust,ignore
//! let gateway = RecordingGateway::new();
//! gateway.fail_media_for("https://cdn.example/hd.mp4");
//! // drive the pipeline...
//! assert_eq!(gateway.calls().len(), 3);
//! ```

pub mod recorder;

pub use recorder::{GatewayCall, RecordingGateway};

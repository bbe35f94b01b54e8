use thiserror::Error;

/// Centralized error types for the application boundary
///
/// Pipeline-level failures (adapter, resolution, delivery) have their own
/// types in `download`; they only become an `AppError` once they leave the
/// pipeline (CLI output, dispatcher endpoints, startup).
///
/// # Example
///
/// ```no_run
/// use mediarelay::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// A gateway call failed (blocked chat, rejected request, network)
    #[error("Transport error: {0}")]
    Transport(#[from] crate::telegram::gateway::TransportFailure),

    /// HTTP/Fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// yt-dlp execution failures
    #[error("yt-dlp error: {0}")]
    YtDlp(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<crate::download::platform::RequestError> for AppError {
    fn from(err: crate::download::platform::RequestError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = AppError::Config("BOT_TOKEN is not set".into());
        assert_eq!(err.to_string(), "Configuration error: BOT_TOKEN is not set");
    }

    #[test]
    fn test_rejected_link_is_a_validation_error() {
        use crate::download::platform::{MediaRequest, RequestedMode};

        let err: AppError = MediaRequest::new("https://example.com/watch", RequestedMode::VideoOnly)
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().starts_with("Validation error: "));
    }

    #[test]
    fn test_from_url_parse_error() {
        let err: AppError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, AppError::Url(_)));
    }
}

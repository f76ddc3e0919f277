use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the Bot API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error ({code}): {description}")]
    Telegram { code: i64, description: String },

    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Errors that polling must not retry: bad token, unknown bot, or a
    /// competing consumer (another poller or a registered webhook).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApiError::Telegram { code: 401 | 404 | 409, .. })
    }
}

/// Errors surfaced by the dispatch engine and the lifecycle controller.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("update {update_id} was not handled within {timeout:?}")]
    Timeout { update_id: i64, timeout: Duration },

    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),

    #[error("bot is not running")]
    NotRunning,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("api error: {0}")]
    Api(#[source] Arc<ApiError>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ApiError> for BotError {
    fn from(err: ApiError) -> Self {
        BotError::Api(Arc::new(err))
    }
}

impl From<Arc<ApiError>> for BotError {
    fn from(err: Arc<ApiError>) -> Self {
        BotError::Api(err)
    }
}

pub type Result<T, E = BotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_api_errors() {
        let conflict = ApiError::Telegram {
            code: 409,
            description: "Conflict: terminated by other getUpdates request".to_string(),
        };
        assert!(conflict.is_terminal());

        let flood = ApiError::Telegram {
            code: 429,
            description: "Too Many Requests".to_string(),
        };
        assert!(!flood.is_terminal());
    }

    #[test]
    fn test_timeout_message_mentions_update() {
        let err = BotError::Timeout {
            update_id: 42,
            timeout: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("update 42"));
    }
}

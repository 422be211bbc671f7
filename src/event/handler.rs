use async_trait::async_trait;
use thiserror::Error;

use super::events::ScoringEvent;

/// Errors that can occur when handling events
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Handler timed out")]
    Timeout,

    #[error("Retryable error: {0}")]
    Retryable(String),

    #[error("Non-retryable error: {0}")]
    NonRetryable(String),
}

impl EventError {
    /// Whether this error indicates the operation should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventError::Retryable(_) | EventError::Timeout)
    }

    pub fn retryable(msg: impl Into<String>) -> Self {
        EventError::Retryable(msg.into())
    }

    pub fn non_retryable(msg: impl Into<String>) -> Self {
        EventError::NonRetryable(msg.into())
    }
}

/// Trait for components that react to scoring events
///
/// Handlers must be idempotent: the dispatcher delivers at least once and
/// retries on retryable failures.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ScoringEvent) -> Result<(), EventError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

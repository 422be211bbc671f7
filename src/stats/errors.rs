use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The update depends on another update that has not been applied yet
    #[error("Not ready: {0}")]
    NotReady(String),
}

impl From<crate::shared::AppError> for StatsError {
    fn from(err: crate::shared::AppError) -> Self {
        StatsError::Repository(err.to_string())
    }
}

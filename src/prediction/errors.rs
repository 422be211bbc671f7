use axum::http::StatusCode;
use thiserror::Error;

/// Business-rule rejections from the prediction engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PredictionError {
    #[error("Prediction not found: {0}")]
    NotFound(String),

    #[error("Prediction is not open for picks")]
    NotOpen,

    #[error("Prediction is locked; picks closed at its lock time")]
    Locked,

    #[error("You have already made a pick for this prediction. Picks cannot be changed once submitted.")]
    DuplicatePick,

    #[error("Option {option_id} does not belong to prediction {prediction_id}")]
    InvalidOption {
        prediction_id: String,
        option_id: String,
    },

    #[error("Prediction is {state} and cannot be {action}")]
    InvalidTransition { state: String, action: String },

    #[error("Lock time cannot change once picks exist")]
    LockTimeFrozen,
}

impl PredictionError {
    pub fn code(&self) -> &'static str {
        match self {
            PredictionError::NotFound(_) => "prediction_not_found",
            PredictionError::NotOpen => "prediction_not_open",
            PredictionError::Locked => "prediction_locked",
            PredictionError::DuplicatePick => "duplicate_pick",
            PredictionError::InvalidOption { .. } => "invalid_option",
            PredictionError::InvalidTransition { .. } => "invalid_state_transition",
            PredictionError::LockTimeFrozen => "lock_time_frozen",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PredictionError::NotFound(_) => StatusCode::NOT_FOUND,
            PredictionError::InvalidOption { .. } => StatusCode::BAD_REQUEST,
            PredictionError::NotOpen
            | PredictionError::Locked
            | PredictionError::DuplicatePick
            | PredictionError::InvalidTransition { .. }
            | PredictionError::LockTimeFrozen => StatusCode::CONFLICT,
        }
    }
}

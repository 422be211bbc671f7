// Prediction engine: lifecycle state machine, pick valuation and settlement
pub use handlers::{
    create_prediction, get_episode_predictions, get_hot_predictions, get_prediction,
    get_user_predictions, lock_prediction, reconcile_option_stats, reschedule_lock,
    resolve_prediction, submit_pick, void_prediction,
};

pub mod errors;
mod handlers;
pub mod models;
pub mod repository;
pub mod scoring;
pub mod service;
pub mod types;

pub use errors::PredictionError;
pub use service::PredictionService;

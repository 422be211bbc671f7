// Library crate for the speculation scoring server
// This file exposes the public API for integration tests

pub mod auth;
pub mod catalog;
pub mod clock;
pub mod comment;
pub mod config;
pub mod event;
pub mod leaderboard;
pub mod points;
pub mod prediction;
pub mod routes;
pub mod scheduler;
pub mod shared;
pub mod stats;

// Re-export commonly used types for easier access in tests
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use event::{EventBus, EventDispatcher, ScoringEvent};
pub use routes::build_router;
pub use shared::{AppError, AppState, Repositories};
pub use stats::StatsEventHandler;

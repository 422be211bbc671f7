// Denormalized user stats, kept current from scoring events
pub use handlers::{get_user_show_stats, get_user_stats};

mod errors;
mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod subscriber;
pub mod types;

pub use errors::StatsError;
pub use models::*;
pub use repository::{InMemoryStatsRepository, StatsRepository};
pub use service::StatsService;
pub use subscriber::StatsEventHandler;

// Periodic ranked snapshots over stats and the ledger
pub use handlers::{get_leaderboard, rebuild_leaderboards};

pub mod aggregator;
mod handlers;
pub mod models;
pub mod period;
pub mod repository;
pub mod service;

pub use service::LeaderboardService;

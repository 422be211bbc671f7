// Points ledger: balance mutations outside of pick resolution, and ledger queries
pub use handlers::{
    adjust_points, get_points_breakdown, get_points_history, process_tournament_payout,
    rebuild_user_stats, run_stats_rebuild_job, run_streak_bonus_job, spend_points,
};

mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod types;

pub use models::{LedgerEntry, LedgerReason};
pub use service::PointsService;

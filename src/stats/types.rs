use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::models::{Level, UserStats};

/// User stats as shown on a profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatsView {
    pub user_id: String,
    pub total_picks: i64,
    pub correct_picks: i64,
    pub accuracy: f64,
    pub points_balance: i64,
    pub lifetime_points: i64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_active_day: Option<NaiveDate>,
    #[serde(flatten)]
    pub level: Level,
    /// Position in the current all-time snapshot, if ranked
    pub rank: Option<u32>,
}

impl UserStatsView {
    pub fn new(stats: UserStats, rank: Option<u32>) -> Self {
        let level = Level::for_lifetime_points(stats.lifetime_points);
        Self {
            user_id: stats.user_id,
            total_picks: stats.total_picks,
            correct_picks: stats.correct_picks,
            accuracy: stats.accuracy,
            points_balance: stats.points_balance,
            lifetime_points: stats.lifetime_points,
            current_streak: stats.current_streak,
            best_streak: stats.best_streak,
            last_active_day: stats.last_active_day,
            level,
            rank,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShowStatsQuery {
    pub show_id: Option<String>,
}

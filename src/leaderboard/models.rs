use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaderboardKind {
    Daily,
    Weekly,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub score: i64,
    pub rating: Option<f64>,
}

/// Ranked top-N for one (kind, period key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub id: String,
    pub kind: LeaderboardKind,
    pub period_key: String,
    pub top: Vec<LeaderboardEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaderboardSnapshot {
    pub fn rank_of(&self, user_id: &str) -> Option<u32> {
        self.top
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.rank)
    }
}

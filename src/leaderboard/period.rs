use chrono::{DateTime, Datelike, Duration, Utc};

use super::models::LeaderboardKind;

pub const ALL_TIME_KEY: &str = "all_time";

/// ISO-8601 week identifier, e.g. `2025-W02`; the year is the ISO week-numbering year
pub fn weekly_key(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// UTC calendar date, e.g. `2025-03-10`
pub fn daily_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

impl LeaderboardKind {
    /// Key of the period containing `now`
    pub fn period_key(&self, now: DateTime<Utc>) -> String {
        match self {
            LeaderboardKind::Global => ALL_TIME_KEY.to_string(),
            LeaderboardKind::Weekly => weekly_key(now),
            LeaderboardKind::Daily => daily_key(now),
        }
    }

    /// Trailing ledger window summed for this kind; `None` ranks by lifetime points
    pub fn window(&self) -> Option<Duration> {
        match self {
            LeaderboardKind::Global => None,
            LeaderboardKind::Weekly => Some(Duration::days(7)),
            LeaderboardKind::Daily => Some(Duration::days(1)),
        }
    }
}

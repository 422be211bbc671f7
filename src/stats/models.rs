use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Denormalized per-user totals, maintained incrementally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub total_picks: i64,
    pub correct_picks: i64,
    pub accuracy: f64,
    pub points_balance: i64,
    pub lifetime_points: i64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_active_day: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl UserStats {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_picks: 0,
            correct_picks: 0,
            accuracy: 0.0,
            points_balance: 0,
            lifetime_points: 0,
            current_streak: 0,
            best_streak: 0,
            last_active_day: None,
            updated_at: now,
        }
    }

    /// Applies one day of picking activity to the streak counters
    ///
    /// Repeat activity on the same day leaves the streak alone, the day after
    /// the last active day extends it, a later gap starts over at 1. A day
    /// earlier than the last active one arrived out of order and is ignored.
    pub fn register_activity(&mut self, day: NaiveDate) {
        if self.last_active_day.is_some_and(|last| day < last) {
            return;
        }
        if self.last_active_day != Some(day) {
            let yesterday = day.checked_sub_days(Days::new(1));
            if self.last_active_day.is_some() && self.last_active_day == yesterday {
                self.current_streak += 1;
            } else {
                self.current_streak = 1;
            }
        }
        self.best_streak = self.best_streak.max(self.current_streak);
        self.last_active_day = Some(day);
    }

    pub fn recompute_accuracy(&mut self) {
        self.accuracy = ratio(self.correct_picks, self.total_picks);
    }
}

/// Per-user, per-show totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserShowStats {
    pub user_id: String,
    pub show_id: String,
    pub total_predictions: i64,
    pub correct_predictions: i64,
    pub accuracy: f64,
    pub updated_at: DateTime<Utc>,
}

impl UserShowStats {
    pub fn new(user_id: &str, show_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            show_id: show_id.to_string(),
            total_predictions: 0,
            correct_predictions: 0,
            accuracy: 0.0,
            updated_at: now,
        }
    }

    pub fn recompute_accuracy(&mut self) {
        self.accuracy = ratio(self.correct_predictions, self.total_predictions);
    }
}

/// What the resolve path last applied to a user's stats for one prediction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCredit {
    pub correct: bool,
    pub earned_points: i64,
}

/// Every cached row for one user, rebuilt from picks and the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct UserStatsRebuild {
    pub stats: UserStats,
    pub shows: Vec<UserShowStats>,
    /// Prediction ids whose pick activity is included in the totals
    pub counted_picks: Vec<String>,
    /// Resolution credit per prediction id
    pub credits: Vec<(String, ResolutionCredit)>,
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub current: i64,
    pub required: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level {
    #[serde(rename = "level")]
    pub name: &'static str,
    #[serde(rename = "level_progress")]
    pub progress: LevelProgress,
}

const LEVELS: [(&str, i64); 7] = [
    ("Novice", 0),
    ("Apprentice", 100),
    ("Investigator", 500),
    ("Detective", 1500),
    ("Expert Detective", 3500),
    ("Master Detective", 7500),
    ("Legendary", 15000),
];

impl Level {
    /// Level reached with the given lifetime points; the top level reports progress against itself
    pub fn for_lifetime_points(lifetime_points: i64) -> Self {
        let index = LEVELS
            .iter()
            .rposition(|(_, min)| lifetime_points >= *min)
            .unwrap_or(0);
        let (name, min) = LEVELS[index];

        let required = match LEVELS.get(index + 1) {
            Some((_, next_min)) => next_min - min,
            None => 0,
        };

        Self {
            name,
            progress: LevelProgress {
                current: lifetime_points - min,
                required,
            },
        }
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: String,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub show_id: String,
    pub season_number: u32,
    pub episode_number: u32,
    pub title: Option<String>,
    pub air_date_utc: Option<DateTime<Utc>>,
}

impl Episode {
    pub fn has_aired(&self, now: DateTime<Utc>) -> bool {
        self.air_date_utc.is_some_and(|air| air <= now)
    }

    /// Spoilers about this episode stay hidden until an hour after broadcast
    pub fn spoiler_window_end(&self) -> Option<DateTime<Utc>> {
        self.air_date_utc.map(|air| air + Duration::hours(1))
    }
}

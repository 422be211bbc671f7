use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Why points moved
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LedgerReason {
    PickCorrect,
    EarlyBonus,
    ContrarianBonus,
    StreakBonus,
    TournamentPayout,
    AdminAdjustment,
    Refund,
    Spend,
    ResolutionCorrection,
}

/// Immutable record of one point movement for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub points: i64,
    pub reason: LedgerReason,
    pub prediction_id: Option<String>,
    pub pick_id: Option<String>,
    pub tournament_id: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(user_id: &str, points: i64, reason: LedgerReason, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            points,
            reason,
            prediction_id: None,
            pick_id: None,
            tournament_id: None,
            metadata: Value::Null,
            created_at,
        }
    }

    pub fn for_pick(mut self, prediction_id: &str, pick_id: &str) -> Self {
        self.prediction_id = Some(prediction_id.to_string());
        self.pick_id = Some(pick_id.to_string());
        self
    }

    pub fn for_tournament(mut self, tournament_id: &str) -> Self {
        self.tournament_id = Some(tournament_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Amount this entry adds to the user's lifetime total
    pub fn lifetime_contribution(&self) -> i64 {
        lifetime_contribution(self.reason, self.points)
    }
}

pub fn lifetime_contribution(reason: LedgerReason, points: i64) -> i64 {
    match reason {
        LedgerReason::AdminAdjustment => points.max(0),
        LedgerReason::Spend => 0,
        _ => points,
    }
}

/// Balance and lifetime totals derived from a user's full ledger
pub fn totals_from_ledger(entries: &[LedgerEntry]) -> (i64, i64) {
    entries.iter().fold((0, 0), |(balance, lifetime), entry| {
        (balance + entry.points, lifetime + entry.lifetime_contribution())
    })
}

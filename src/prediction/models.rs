use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionState {
    Open,
    Locked,
    Resolved,
    Void,
}

impl PredictionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PredictionState::Resolved | PredictionState::Void)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionScope {
    Episode,
    Season,
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionKind {
    Binary,
    MultipleChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolverType {
    Auto,
    Assisted,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceSource {
    Subtitle,
    Cast,
    Recap,
    Official,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    PredictionResolved,
    PredictionVoided,
    PredictionLocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub author_id: String,
    pub template_key: String,
    pub scope: PredictionScope,
    pub show_id: String,
    pub season_number: Option<u32>,
    pub episode_id: Option<String>,
    pub params: Value,
    pub kind: PredictionKind,
    pub state: PredictionState,
    pub lock_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub outcome_option_id: Option<String>,
    pub confidence: Option<f64>,
    pub resolver_type: Option<ResolverType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prediction {
    /// Picks are accepted only while open and strictly before lock time
    pub fn accepts_picks_at(&self, now: DateTime<Utc>) -> bool {
        self.state == PredictionState::Open && now < self.lock_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionOption {
    pub id: String,
    pub prediction_id: String,
    pub label: String,
    pub value: String,
    pub ordinal: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPick {
    pub id: String,
    pub prediction_id: String,
    pub option_id: String,
    pub user_id: String,
    pub pre_lock_community_probability: f64,
    pub potential_points: i64,
    pub earned_points: i64,
    pub picked_at: DateTime<Utc>,
    /// Calendar day the pick counts toward for streaks
    pub activity_day: NaiveDate,
}

impl PredictionPick {
    pub fn new(
        prediction_id: &str,
        option_id: &str,
        user_id: &str,
        probability: f64,
        potential_points: i64,
        picked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prediction_id: prediction_id.to_string(),
            option_id: option_id.to_string(),
            user_id: user_id.to_string(),
            pre_lock_community_probability: probability,
            potential_points,
            earned_points: 0,
            picked_at,
            activity_day: picked_at.date_naive(),
        }
    }
}

/// Live pick counter for one option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionStats {
    pub prediction_id: String,
    pub option_id: String,
    pub picks_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvidence {
    pub id: String,
    pub prediction_id: String,
    pub source_type: EvidenceSource,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub timestamp_sec: Option<u32>,
    pub added_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_id: Option<String>,
    pub action: AuditAction,
    pub entity_kind: String,
    pub entity_id: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn for_prediction(
        actor_id: Option<&str>,
        action: AuditAction,
        prediction_id: &str,
        metadata: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id: actor_id.map(str::to_string),
            action,
            entity_kind: "prediction".to_string(),
            entity_id: prediction_id.to_string(),
            metadata,
            created_at,
        }
    }
}

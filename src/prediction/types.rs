use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

use super::models::{
    EvidenceSource, Prediction, PredictionKind, PredictionScope, PredictionState,
    ResolutionEvidence,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionInput {
    pub label: String,
    /// Machine value used by automated resolvers; defaults to the label
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePredictionRequest {
    pub show_id: String,
    pub scope: PredictionScope,
    #[serde(default)]
    pub episode_id: Option<String>,
    #[serde(default)]
    pub season_number: Option<u32>,
    pub template_key: String,
    #[serde(default)]
    pub params: Value,
    pub kind: PredictionKind,
    pub options: Vec<OptionInput>,
    /// Defaults to the episode's air time
    #[serde(default)]
    pub lock_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitPickRequest {
    pub option_id: String,
    /// Picker's local calendar day, used for streaks across timezones
    #[serde(default)]
    pub client_local_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickReceipt {
    pub pick_id: String,
    pub potential_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceInput {
    pub source_type: EvidenceSource,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub timestamp_sec: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub winning_option_id: String,
    #[serde(default)]
    pub evidence: Option<EvidenceInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub total_picks: usize,
    pub correct_picks: usize,
    pub points_awarded: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleLockRequest {
    pub lock_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionStatus {
    pub id: String,
    pub state: PredictionState,
    pub lock_at: DateTime<Utc>,
}

impl From<&Prediction> for PredictionStatus {
    fn from(prediction: &Prediction) -> Self {
        Self {
            id: prediction.id.clone(),
            state: prediction.state,
            lock_at: prediction.lock_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub predictions_checked: usize,
    pub counters_corrected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: String,
    pub label: String,
    pub value: String,
    pub ordinal: u32,
    pub picks_count: i64,
    /// Share of all picks, rounded to a whole percent
    pub percentage: u32,
    pub is_viewer_pick: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerPick {
    pub pick_id: String,
    pub option_id: String,
    pub potential_points: i64,
    pub earned_points: i64,
    pub picked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionView {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub options: Vec<OptionView>,
    pub total_picks: i64,
    pub my_pick: Option<ViewerPick>,
    pub evidence: Vec<ResolutionEvidence>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpisodePredictionsQuery {
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodePredictionView {
    #[serde(flatten)]
    pub view: PredictionView,
    /// "5h 12m" or "12m" while the prediction is still open
    pub time_left: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HotPredictionsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Open prediction locking within a day, ranked by pick momentum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotPrediction {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub show_title: String,
    pub show_slug: Option<String>,
    pub total_picks: i64,
    pub urgency_score: f64,
    /// Hours until lock, at least 1, to one decimal place
    pub hours_left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PickStatus {
    Pending,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPredictionsQuery {
    #[serde(default)]
    pub show_id: Option<String>,
    #[serde(default)]
    pub status: Option<PickStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One row of a user's pick history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPredictionItem {
    pub pick_id: String,
    pub picked_at: DateTime<Utc>,
    pub prediction_id: String,
    pub show_title: Option<String>,
    pub show_slug: Option<String>,
    pub episode_title: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub template_key: String,
    pub picked_option: Option<String>,
    pub winning_option: Option<String>,
    pub status: PickStatus,
    pub potential_points: i64,
    pub earned_points: i64,
    pub prediction_state: PredictionState,
}

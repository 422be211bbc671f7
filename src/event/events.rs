use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Facts about the scoring pipeline that drive the derived stats
///
/// Events carry identifiers, not deltas: handlers re-read the authoritative
/// pick rows, so redelivering an event is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringEvent {
    /// A pick was persisted
    PickSubmitted {
        user_id: String,
        prediction_id: String,
        show_id: String,
        /// Calendar day of the activity, in the picker's own timezone when supplied
        activity_day: NaiveDate,
    },

    /// A prediction the user picked on was resolved (or re-resolved)
    PickResolved {
        user_id: String,
        prediction_id: String,
        show_id: String,
    },
}

impl ScoringEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ScoringEvent::PickSubmitted { .. } => "PickSubmitted",
            ScoringEvent::PickResolved { .. } => "PickResolved",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            ScoringEvent::PickSubmitted { user_id, .. }
            | ScoringEvent::PickResolved { user_id, .. } => user_id,
        }
    }

    pub fn prediction_id(&self) -> &str {
        match self {
            ScoringEvent::PickSubmitted { prediction_id, .. }
            | ScoringEvent::PickResolved { prediction_id, .. } => prediction_id,
        }
    }
}

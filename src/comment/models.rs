use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub body: String,
    pub prediction_id: Option<String>,
    pub episode_id: Option<String>,
    pub parent_id: Option<String>,
    pub is_spoiler: bool,
    /// Hidden from everyone but the author until this time
    pub visible_after: Option<DateTime<Utc>>,
    pub upvotes: i64,
    pub downvotes: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_visible_to(&self, viewer_id: &str, now: DateTime<Utc>) -> bool {
        self.author_id == viewer_id || self.visible_after.map_or(true, |after| after <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentVote {
    pub comment_id: String,
    pub user_id: String,
    /// -1 or 1
    pub value: i8,
    pub created_at: DateTime<Utc>,
}

/// What a comment thread hangs off
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentTarget {
    Prediction(String),
    Episode(String),
}

impl CommentTarget {
    pub fn matches(&self, comment: &Comment) -> bool {
        match self {
            CommentTarget::Prediction(id) => comment.prediction_id.as_deref() == Some(id.as_str()),
            CommentTarget::Episode(id) => comment.episode_id.as_deref() == Some(id.as_str()),
        }
    }
}

const SPOILER_MARKERS: [&str; 3] = ["spoiler", "dies", "kills"];

/// Case-insensitive keyword check for plot-revealing comments
pub fn looks_like_spoiler(body: &str) -> bool {
    let lowered = body.to_lowercase();
    SPOILER_MARKERS.iter().any(|marker| lowered.contains(marker))
}

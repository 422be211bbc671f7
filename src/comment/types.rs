use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::Comment;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
    #[serde(default)]
    pub prediction_id: Option<String>,
    #[serde(default)]
    pub episode_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentQuery {
    pub prediction_id: Option<String>,
    pub episode_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub value: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub comment_id: String,
    pub upvotes: i64,
    pub downvotes: i64,
}

pub const DELETED_BODY: &str = "[deleted]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: String,
    pub author_id: String,
    pub body: String,
    pub parent_id: Option<String>,
    pub is_spoiler: bool,
    pub is_deleted: bool,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        let is_deleted = comment.deleted_at.is_some();
        Self {
            id: comment.id,
            author_id: comment.author_id,
            body: if is_deleted {
                DELETED_BODY.to_string()
            } else {
                comment.body
            },
            parent_id: comment.parent_id,
            is_spoiler: comment.is_spoiler,
            is_deleted,
            upvotes: comment.upvotes,
            downvotes: comment.downvotes,
            created_at: comment.created_at,
        }
    }
}

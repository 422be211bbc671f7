use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::models::{Comment, CommentTarget, CommentVote};
use crate::shared::AppError;

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create_comment(&self, comment: &Comment) -> Result<(), AppError>;
    async fn get_comment(&self, comment_id: &str) -> Result<Option<Comment>, AppError>;
    async fn update_comment(&self, comment: &Comment) -> Result<(), AppError>;
    /// Comments on the target, oldest first
    async fn list_comments(&self, target: &CommentTarget) -> Result<Vec<Comment>, AppError>;

    /// Upserts the user's vote; a value of 0 removes it
    async fn set_vote(
        &self,
        comment_id: &str,
        user_id: &str,
        value: i8,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;
    async fn list_votes(&self, comment_id: &str) -> Result<Vec<CommentVote>, AppError>;
}

#[derive(Debug, Default)]
struct CommentStore {
    comments: HashMap<String, Comment>,
    /// (comment_id, user_id) -> vote
    votes: HashMap<(String, String), CommentVote>,
}

#[derive(Debug, Default)]
pub struct InMemoryCommentRepository {
    store: RwLock<CommentStore>,
}

impl InMemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    #[instrument(skip(self, comment), fields(comment_id = %comment.id))]
    async fn create_comment(&self, comment: &Comment) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        store.comments.insert(comment.id.clone(), comment.clone());
        debug!("Comment stored in memory");
        Ok(())
    }

    async fn get_comment(&self, comment_id: &str) -> Result<Option<Comment>, AppError> {
        Ok(self.store.read().await.comments.get(comment_id).cloned())
    }

    async fn update_comment(&self, comment: &Comment) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        match store.comments.get_mut(&comment.id) {
            Some(existing) => {
                *existing = comment.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Comment {} not found",
                comment.id
            ))),
        }
    }

    async fn list_comments(&self, target: &CommentTarget) -> Result<Vec<Comment>, AppError> {
        let store = self.store.read().await;
        let mut comments: Vec<Comment> = store
            .comments
            .values()
            .filter(|c| target.matches(c))
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn set_vote(
        &self,
        comment_id: &str,
        user_id: &str,
        value: i8,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        let key = (comment_id.to_string(), user_id.to_string());
        if value == 0 {
            store.votes.remove(&key);
        } else {
            store.votes.insert(
                key,
                CommentVote {
                    comment_id: comment_id.to_string(),
                    user_id: user_id.to_string(),
                    value,
                    created_at: now,
                },
            );
        }
        Ok(())
    }

    async fn list_votes(&self, comment_id: &str) -> Result<Vec<CommentVote>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .votes
            .values()
            .filter(|v| v.comment_id == comment_id)
            .cloned()
            .collect())
    }
}

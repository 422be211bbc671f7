use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    models::{looks_like_spoiler, Comment, CommentTarget},
    repository::CommentRepository,
    types::{CommentView, CreateCommentRequest, VoteTally},
};
use crate::catalog::CatalogRepository;
use crate::clock::Clock;
use crate::prediction::{errors::PredictionError, repository::PredictionRepository};
use crate::shared::AppError;

const MAX_BODY_CHARS: usize = 2000;

pub struct CommentService {
    repository: Arc<dyn CommentRepository>,
    catalog: Arc<dyn CatalogRepository>,
    predictions: Arc<dyn PredictionRepository>,
    clock: Arc<dyn Clock>,
}

impl CommentService {
    pub fn new(
        repository: Arc<dyn CommentRepository>,
        catalog: Arc<dyn CatalogRepository>,
        predictions: Arc<dyn PredictionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            catalog,
            predictions,
            clock,
        }
    }

    /// Posts a comment, holding back likely spoilers until the episode has aired
    #[instrument(skip(self, request))]
    pub async fn create_comment(
        &self,
        author_id: &str,
        request: CreateCommentRequest,
    ) -> Result<Comment, AppError> {
        let body = request.body.trim().to_string();
        if body.is_empty() {
            return Err(AppError::Validation("Comment body is required".to_string()));
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(AppError::Validation(format!(
                "Comment body is limited to {} characters",
                MAX_BODY_CHARS
            )));
        }
        if request.prediction_id.is_none() && request.episode_id.is_none() {
            return Err(AppError::Validation(
                "A comment needs a prediction_id or an episode_id".to_string(),
            ));
        }

        // The spoiler window follows the episode the thread is about
        let mut episode_id = request.episode_id.clone();
        if let Some(prediction_id) = &request.prediction_id {
            let prediction = self
                .predictions
                .get_prediction(prediction_id)
                .await?
                .ok_or_else(|| PredictionError::NotFound(prediction_id.clone()))?;
            if episode_id.is_none() {
                episode_id = prediction.episode_id;
            }
        }

        if let Some(parent_id) = &request.parent_id {
            if self.repository.get_comment(parent_id).await?.is_none() {
                return Err(AppError::NotFound(format!(
                    "Parent comment {} not found",
                    parent_id
                )));
            }
        }

        let now = self.clock.now();
        let is_spoiler = looks_like_spoiler(&body);
        let visible_after = match (&episode_id, is_spoiler) {
            (Some(episode_id), true) => self
                .catalog
                .get_episode(episode_id)
                .await?
                .filter(|episode| !episode.has_aired(now))
                .and_then(|episode| episode.spoiler_window_end()),
            _ => None,
        };

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            body,
            prediction_id: request.prediction_id,
            episode_id: request.episode_id,
            parent_id: request.parent_id,
            is_spoiler,
            visible_after,
            upvotes: 0,
            downvotes: 0,
            deleted_at: None,
            created_at: now,
        };
        self.repository.create_comment(&comment).await?;

        info!(
            comment_id = %comment.id,
            is_spoiler,
            gated = visible_after.is_some(),
            "Comment created"
        );
        Ok(comment)
    }

    /// Comments the viewer may see on the target, oldest first
    #[instrument(skip(self))]
    pub async fn list_comments(
        &self,
        viewer_id: &str,
        target: &CommentTarget,
    ) -> Result<Vec<CommentView>, AppError> {
        let now = self.clock.now();
        let comments = self.repository.list_comments(target).await?;
        let total = comments.len();

        let visible: Vec<CommentView> = comments
            .into_iter()
            .filter(|c| c.is_visible_to(viewer_id, now))
            .map(CommentView::from)
            .collect();

        debug!(total, visible = visible.len(), "Comments listed");
        Ok(visible)
    }

    /// Records the user's vote and recounts the tallies from the vote rows
    #[instrument(skip(self))]
    pub async fn vote(
        &self,
        user_id: &str,
        comment_id: &str,
        value: i8,
    ) -> Result<VoteTally, AppError> {
        if !(-1..=1).contains(&value) {
            return Err(AppError::Validation(
                "Vote value must be -1, 0 or 1".to_string(),
            ));
        }

        let mut comment = self.load(comment_id).await?;
        if comment.deleted_at.is_some() {
            return Err(AppError::StateConflict(
                "Cannot vote on a deleted comment".to_string(),
            ));
        }

        let now = self.clock.now();
        self.repository
            .set_vote(comment_id, user_id, value, now)
            .await?;

        let votes = self.repository.list_votes(comment_id).await?;
        comment.upvotes = votes.iter().filter(|v| v.value > 0).count() as i64;
        comment.downvotes = votes.iter().filter(|v| v.value < 0).count() as i64;
        self.repository.update_comment(&comment).await?;

        Ok(VoteTally {
            comment_id: comment.id,
            upvotes: comment.upvotes,
            downvotes: comment.downvotes,
        })
    }

    /// Soft delete; only the author may delete
    #[instrument(skip(self))]
    pub async fn delete_comment(&self, user_id: &str, comment_id: &str) -> Result<(), AppError> {
        let mut comment = self.load(comment_id).await?;
        if comment.author_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can delete a comment".to_string(),
            ));
        }
        if comment.deleted_at.is_some() {
            return Ok(());
        }

        comment.deleted_at = Some(self.clock.now());
        self.repository.update_comment(&comment).await?;
        info!("Comment deleted");
        Ok(())
    }

    async fn load(&self, comment_id: &str) -> Result<Comment, AppError> {
        self.repository
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Episode, InMemoryCatalogRepository};
    use crate::clock::FixedClock;
    use crate::comment::{repository::InMemoryCommentRepository, types::DELETED_BODY};
    use crate::prediction::repository::InMemoryPredictionRepository;
    use crate::shared::test_utils::fixed_clock;
    use chrono::Duration;

    struct Fixture {
        service: CommentService,
        clock: Arc<FixedClock>,
    }

    async fn fixture() -> Fixture {
        let catalog = Arc::new(InMemoryCatalogRepository::new());
        let clock = fixed_clock();
        catalog
            .upsert_episode(Episode {
                id: "ep-upcoming".to_string(),
                show_id: "show-1".to_string(),
                season_number: 1,
                episode_number: 9,
                title: None,
                air_date_utc: Some(clock.now() + Duration::hours(2)),
            })
            .await
            .unwrap();
        catalog
            .upsert_episode(Episode {
                id: "ep-aired".to_string(),
                show_id: "show-1".to_string(),
                season_number: 1,
                episode_number: 8,
                title: None,
                air_date_utc: Some(clock.now() - Duration::days(7)),
            })
            .await
            .unwrap();

        let service = CommentService::new(
            Arc::new(InMemoryCommentRepository::new()),
            catalog,
            Arc::new(InMemoryPredictionRepository::new()),
            clock.clone(),
        );
        Fixture { service, clock }
    }

    fn on_episode(episode_id: &str, body: &str) -> CreateCommentRequest {
        CreateCommentRequest {
            body: body.to_string(),
            episode_id: Some(episode_id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn spoiler_on_unaired_episode_waits_for_window() {
        let f = fixture().await;
        let comment = f
            .service
            .create_comment("alice", on_episode("ep-upcoming", "The mentor dies"))
            .await
            .unwrap();
        assert!(comment.is_spoiler);
        assert_eq!(
            comment.visible_after,
            Some(f.clock.now() + Duration::hours(3))
        );

        let target = CommentTarget::Episode("ep-upcoming".to_string());
        assert!(f.service.list_comments("bob", &target).await.unwrap().is_empty());
        assert_eq!(f.service.list_comments("alice", &target).await.unwrap().len(), 1);

        f.clock.advance(Duration::hours(3));
        assert_eq!(f.service.list_comments("bob", &target).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aired_episode_and_plain_comments_are_not_gated() {
        let f = fixture().await;
        let spoiler = f
            .service
            .create_comment("alice", on_episode("ep-aired", "Spoiler: twins"))
            .await
            .unwrap();
        assert!(spoiler.visible_after.is_none());

        let plain = f
            .service
            .create_comment("alice", on_episode("ep-upcoming", "Can't wait"))
            .await
            .unwrap();
        assert!(!plain.is_spoiler);
        assert!(plain.visible_after.is_none());
    }

    #[tokio::test]
    async fn comment_needs_target_and_existing_parent() {
        let f = fixture().await;
        let result = f
            .service
            .create_comment(
                "alice",
                CreateCommentRequest {
                    body: "hello".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let mut reply = on_episode("ep-aired", "reply");
        reply.parent_id = Some("missing".to_string());
        let result = f.service.create_comment("alice", reply).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = f
            .service
            .create_comment(
                "alice",
                CreateCommentRequest {
                    body: "on a prediction".to_string(),
                    prediction_id: Some("nope".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(AppError::Prediction(PredictionError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn votes_are_recounted_from_rows() {
        let f = fixture().await;
        let comment = f
            .service
            .create_comment("alice", on_episode("ep-aired", "Great reveal"))
            .await
            .unwrap();

        f.service.vote("bob", &comment.id, 1).await.unwrap();
        f.service.vote("bob", &comment.id, 1).await.unwrap();
        f.service.vote("carol", &comment.id, -1).await.unwrap();
        let tally = f.service.vote("dave", &comment.id, 1).await.unwrap();
        assert_eq!((tally.upvotes, tally.downvotes), (2, 1));

        let tally = f.service.vote("bob", &comment.id, 0).await.unwrap();
        assert_eq!((tally.upvotes, tally.downvotes), (1, 1));

        let result = f.service.vote("bob", &comment.id, 2).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn only_author_deletes_and_body_is_masked() {
        let f = fixture().await;
        let comment = f
            .service
            .create_comment("alice", on_episode("ep-aired", "First!"))
            .await
            .unwrap();

        let result = f.service.delete_comment("bob", &comment.id).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        f.service.delete_comment("alice", &comment.id).await.unwrap();
        let target = CommentTarget::Episode("ep-aired".to_string());
        let listed = f.service.list_comments("bob", &target).await.unwrap();
        assert_eq!(listed[0].body, DELETED_BODY);
        assert!(listed[0].is_deleted);
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;

use super::{
    models::{Comment, CommentTarget},
    types::{CommentQuery, CommentView, CreateCommentRequest, VoteRequest, VoteTally},
};
use crate::auth::Identity;
use crate::shared::{AppError, AppState};

/// POST /comments
#[instrument(name = "create_comment", skip(state, identity, request), fields(user_id = %identity.user_id))]
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<Json<Comment>, AppError> {
    let comment = state
        .comment_service
        .create_comment(&identity.user_id, request)
        .await?;
    Ok(Json(comment))
}

/// GET /comments?prediction_id=|episode_id=
#[instrument(name = "list_comments", skip(state, identity, query))]
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<CommentQuery>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    let target = match (query.prediction_id, query.episode_id) {
        (Some(prediction_id), None) => CommentTarget::Prediction(prediction_id),
        (None, Some(episode_id)) => CommentTarget::Episode(episode_id),
        _ => {
            return Err(AppError::Validation(
                "Exactly one of prediction_id or episode_id is required".to_string(),
            ))
        }
    };

    let comments = state
        .comment_service
        .list_comments(&identity.user_id, &target)
        .await?;
    Ok(Json(comments))
}

/// POST /comments/:id/vote
#[instrument(name = "vote_comment", skip(state, identity, request))]
pub async fn vote_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(comment_id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteTally>, AppError> {
    let tally = state
        .comment_service
        .vote(&identity.user_id, &comment_id, request.value)
        .await?;
    Ok(Json(tally))
}

/// DELETE /comments/:id
#[instrument(name = "delete_comment", skip(state, identity))]
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(comment_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .comment_service
        .delete_comment(&identity.user_id, &comment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

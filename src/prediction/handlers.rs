use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use tracing::{info, instrument};

use super::types::{
    CreatePredictionRequest, EpisodePredictionView, EpisodePredictionsQuery, HotPrediction,
    HotPredictionsQuery, PickReceipt, PredictionStatus, PredictionView, ResolutionSummary,
    ResolveRequest, RescheduleLockRequest, SubmitPickRequest, UserPredictionItem,
    UserPredictionsQuery,
};
use crate::auth::Identity;
use crate::points::types::RefundSummary;
use crate::shared::{AppError, AppState};

/// POST /predictions
#[instrument(name = "create_prediction", skip(state, identity, request), fields(author_id = %identity.user_id))]
pub async fn create_prediction(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreatePredictionRequest>,
) -> Result<Json<PredictionView>, AppError> {
    let view = state
        .prediction_service
        .create_prediction(&identity, request)
        .await?;
    Ok(Json(view))
}

/// GET /predictions/:id
///
/// Includes the caller's own pick when they have one
#[instrument(name = "get_prediction", skip(state, identity))]
pub async fn get_prediction(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(prediction_id): Path<String>,
) -> Result<Json<PredictionView>, AppError> {
    let view = state
        .prediction_service
        .get_prediction(&prediction_id, Some(&identity.user_id))
        .await?;
    Ok(Json(view))
}

/// GET /episodes/:id/predictions?include_resolved=
#[instrument(name = "get_episode_predictions", skip(state, identity, query))]
pub async fn get_episode_predictions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(episode_id): Path<String>,
    Query(query): Query<EpisodePredictionsQuery>,
) -> Result<Json<Vec<EpisodePredictionView>>, AppError> {
    let views = state
        .prediction_service
        .get_episode_predictions(&episode_id, Some(&identity.user_id), query.include_resolved)
        .await?;
    Ok(Json(views))
}

/// GET /predictions/hot?limit=
#[instrument(name = "get_hot_predictions", skip(state, _identity, query))]
pub async fn get_hot_predictions(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Query(query): Query<HotPredictionsQuery>,
) -> Result<Json<Vec<HotPrediction>>, AppError> {
    let hot = state
        .prediction_service
        .get_hot_predictions(query.limit)
        .await?;
    Ok(Json(hot))
}

/// GET /users/:id/predictions?show_id=&status=&limit=
#[instrument(name = "get_user_predictions", skip(state, _identity, query))]
pub async fn get_user_predictions(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(user_id): Path<String>,
    Query(query): Query<UserPredictionsQuery>,
) -> Result<Json<Vec<UserPredictionItem>>, AppError> {
    let items = state
        .prediction_service
        .get_user_predictions(&user_id, &query)
        .await?;
    Ok(Json(items))
}

/// POST /predictions/:id/picks
#[instrument(name = "submit_pick", skip(state, identity, request), fields(user_id = %identity.user_id))]
pub async fn submit_pick(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(prediction_id): Path<String>,
    Json(request): Json<SubmitPickRequest>,
) -> Result<Json<PickReceipt>, AppError> {
    let receipt = state
        .prediction_service
        .submit_pick(
            &identity.user_id,
            &prediction_id,
            &request.option_id,
            request.client_local_date,
        )
        .await?;
    Ok(Json(receipt))
}

/// POST /predictions/:id/lock
#[instrument(name = "lock_prediction", skip(state, identity))]
pub async fn lock_prediction(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(prediction_id): Path<String>,
) -> Result<Json<PredictionStatus>, AppError> {
    let prediction = state
        .prediction_service
        .lock(&identity, &prediction_id)
        .await?;
    Ok(Json(PredictionStatus::from(&prediction)))
}

/// POST /predictions/:id/resolve
#[instrument(name = "resolve_prediction", skip(state, identity, request), fields(resolver_id = %identity.user_id))]
pub async fn resolve_prediction(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(prediction_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolutionSummary>, AppError> {
    info!(winning_option_id = %request.winning_option_id, "Resolving prediction");
    let summary = state
        .prediction_service
        .resolve(
            &identity,
            &prediction_id,
            &request.winning_option_id,
            request.evidence,
        )
        .await?;
    Ok(Json(summary))
}

/// POST /predictions/:id/void
#[instrument(name = "void_prediction", skip(state, identity))]
pub async fn void_prediction(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(prediction_id): Path<String>,
) -> Result<Json<RefundSummary>, AppError> {
    let refund = state
        .prediction_service
        .void(&identity, &prediction_id)
        .await?;
    Ok(Json(refund))
}

/// PUT /predictions/:id/lock-at
#[instrument(name = "reschedule_lock", skip(state, identity, request))]
pub async fn reschedule_lock(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(prediction_id): Path<String>,
    Json(request): Json<RescheduleLockRequest>,
) -> Result<Json<PredictionStatus>, AppError> {
    let prediction = state
        .prediction_service
        .reschedule_lock(&identity, &prediction_id, request.lock_at)
        .await?;
    Ok(Json(PredictionStatus::from(&prediction)))
}

/// POST /predictions/:id/reconcile
#[instrument(name = "reconcile_option_stats", skip(state, identity))]
pub async fn reconcile_option_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(prediction_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    identity.require_moderator()?;
    let corrected = state
        .prediction_service
        .reconcile_option_stats(&prediction_id)
        .await?;
    Ok(Json(serde_json::json!({ "counters_corrected": corrected })))
}

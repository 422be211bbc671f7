use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use tracing::instrument;

use super::{
    models::UserShowStats,
    types::{ShowStatsQuery, UserStatsView},
};
use crate::auth::Identity;
use crate::shared::{AppError, AppState};

/// GET /users/:id/stats
#[instrument(name = "get_user_stats", skip(state, _identity))]
pub async fn get_user_stats(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStatsView>, AppError> {
    let view = state.stats_service.get_user_stats(&user_id).await?;
    Ok(Json(view))
}

/// GET /users/:id/show-stats?show_id=
#[instrument(name = "get_user_show_stats", skip(state, _identity, query))]
pub async fn get_user_show_stats(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(user_id): Path<String>,
    Query(query): Query<ShowStatsQuery>,
) -> Result<Json<Vec<UserShowStats>>, AppError> {
    let rows = state
        .stats_service
        .get_user_show_stats(&user_id, query.show_id.as_deref())
        .await?;
    Ok(Json(rows))
}

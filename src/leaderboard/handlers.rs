use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{info, instrument};

use super::{models::LeaderboardKind, service::LeaderboardView};
use crate::auth::Identity;
use crate::shared::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub period_key: Option<String>,
}

/// GET /leaderboards/:kind?period_key=
#[instrument(name = "get_leaderboard", skip(state, _identity, query))]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(kind): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardView>, AppError> {
    let kind = LeaderboardKind::from_str(&kind)
        .map_err(|_| AppError::Validation(format!("Unknown leaderboard kind: {}", kind)))?;

    let view = state
        .leaderboard_service
        .get_leaderboard(kind, query.period_key.as_deref())
        .await?;
    Ok(Json(view))
}

/// POST /admin/leaderboards/rebuild
#[instrument(name = "rebuild_leaderboards", skip(state, identity))]
pub async fn rebuild_leaderboards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<LeaderboardView>>, AppError> {
    identity.require_admin()?;

    let snapshots = state.leaderboard_service.compute_all().await;
    info!(snapshots = snapshots.len(), "Leaderboards rebuilt on demand");
    Ok(Json(snapshots.into_iter().map(LeaderboardView::from).collect()))
}

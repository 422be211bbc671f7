use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use tracing::{info, instrument};

use super::types::{
    AdminAdjustRequest, BalanceResponse, BreakdownQuery, HistoryQuery, PayoutSummary,
    PointsBreakdown, PointsHistory, SpendReceipt, SpendRequest, StatsRebuildSummary,
    StreakJobSummary, TournamentPayoutRequest,
};
use crate::auth::Identity;
use crate::shared::{AppError, AppState};
use crate::stats::UserStats;

/// GET /users/:id/points?reason=&limit=
#[instrument(name = "get_points_history", skip(state, _identity, query))]
pub async fn get_points_history(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PointsHistory>, AppError> {
    let history = state
        .points_service
        .get_points_history(&user_id, query.reason, query.limit)
        .await?;
    Ok(Json(history))
}

/// GET /users/:id/points/breakdown?period=
#[instrument(name = "get_points_breakdown", skip(state, _identity, query))]
pub async fn get_points_breakdown(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(user_id): Path<String>,
    Query(query): Query<BreakdownQuery>,
) -> Result<Json<PointsBreakdown>, AppError> {
    let breakdown = state
        .points_service
        .get_points_breakdown(&user_id, query.period)
        .await?;
    Ok(Json(breakdown))
}

/// POST /points/spend
///
/// Spends from the caller's own balance
#[instrument(name = "spend_points", skip(state, identity, request), fields(user_id = %identity.user_id))]
pub async fn spend_points(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<SpendRequest>,
) -> Result<Json<SpendReceipt>, AppError> {
    let receipt = state
        .points_service
        .spend(
            &identity.user_id,
            request.amount,
            &request.reason,
            request.metadata,
        )
        .await?;

    info!(amount = request.amount, new_balance = receipt.new_balance, "Points spent");
    Ok(Json(receipt))
}

/// POST /admin/points/adjust
#[instrument(name = "adjust_points", skip(state, identity, request), fields(admin_id = %identity.user_id))]
pub async fn adjust_points(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<AdminAdjustRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let stats = state
        .points_service
        .admin_adjust(&identity, &request.user_id, request.points, &request.note)
        .await?;

    Ok(Json(BalanceResponse {
        user_id: stats.user_id,
        points_balance: stats.points_balance,
        lifetime_points: stats.lifetime_points,
    }))
}

/// POST /admin/tournaments/:id/payout
#[instrument(name = "process_tournament_payout", skip(state, identity, request))]
pub async fn process_tournament_payout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(tournament_id): Path<String>,
    Json(request): Json<TournamentPayoutRequest>,
) -> Result<Json<PayoutSummary>, AppError> {
    let summary = state
        .points_service
        .process_tournament_payout(&identity, &tournament_id, &request.payouts)
        .await?;
    Ok(Json(summary))
}

/// POST /admin/jobs/streak-bonus
#[instrument(name = "run_streak_bonus_job", skip(state, identity))]
pub async fn run_streak_bonus_job(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<StreakJobSummary>, AppError> {
    identity.require_admin()?;
    let summary = state.points_service.run_streak_bonus_job().await?;
    Ok(Json(summary))
}

/// POST /admin/jobs/stats-rebuild
#[instrument(name = "run_stats_rebuild_job", skip(state, identity))]
pub async fn run_stats_rebuild_job(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<StatsRebuildSummary>, AppError> {
    identity.require_admin()?;
    let summary = state.points_service.rebuild_all_user_stats().await?;
    Ok(Json(summary))
}

/// POST /admin/users/:id/rebuild-stats
#[instrument(name = "rebuild_user_stats", skip(state, identity))]
pub async fn rebuild_user_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, AppError> {
    identity.require_admin()?;
    let stats = state.points_service.rebuild_user_stats(&user_id).await?;
    Ok(Json(stats))
}

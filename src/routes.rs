use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::jwt_auth;
use crate::shared::AppState;
use crate::{comment, leaderboard, points, prediction, stats};

/// Full HTTP surface; everything except `/health` requires a bearer token
pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/predictions", post(prediction::create_prediction))
        .route("/predictions/hot", get(prediction::get_hot_predictions))
        .route("/predictions/:id", get(prediction::get_prediction))
        .route("/predictions/:id/picks", post(prediction::submit_pick))
        .route("/predictions/:id/lock", post(prediction::lock_prediction))
        .route("/predictions/:id/resolve", post(prediction::resolve_prediction))
        .route("/predictions/:id/void", post(prediction::void_prediction))
        .route("/predictions/:id/lock-at", put(prediction::reschedule_lock))
        .route(
            "/predictions/:id/reconcile",
            post(prediction::reconcile_option_stats),
        )
        .route(
            "/episodes/:id/predictions",
            get(prediction::get_episode_predictions),
        )
        .route("/leaderboards/:kind", get(leaderboard::get_leaderboard))
        .route(
            "/admin/leaderboards/rebuild",
            post(leaderboard::rebuild_leaderboards),
        )
        .route("/users/:id/stats", get(stats::get_user_stats))
        .route("/users/:id/show-stats", get(stats::get_user_show_stats))
        .route(
            "/users/:id/predictions",
            get(prediction::get_user_predictions),
        )
        .route("/users/:id/points", get(points::get_points_history))
        .route(
            "/users/:id/points/breakdown",
            get(points::get_points_breakdown),
        )
        .route("/points/spend", post(points::spend_points))
        .route("/admin/points/adjust", post(points::adjust_points))
        .route(
            "/admin/tournaments/:id/payout",
            post(points::process_tournament_payout),
        )
        .route(
            "/admin/jobs/streak-bonus",
            post(points::run_streak_bonus_job),
        )
        .route(
            "/admin/jobs/stats-rebuild",
            post(points::run_stats_rebuild_job),
        )
        .route(
            "/admin/users/:id/rebuild-stats",
            post(points::rebuild_user_stats),
        )
        .route(
            "/comments",
            post(comment::create_comment).get(comment::list_comments),
        )
        .route("/comments/:id/vote", post(comment::vote_comment))
        .route(
            "/comments/:id",
            delete(comment::delete_comment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), jwt_auth));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::auth::TokenConfig;
use crate::catalog::repository::{CatalogRepository, InMemoryCatalogRepository};
use crate::clock::Clock;
use crate::comment::{
    repository::{CommentRepository, InMemoryCommentRepository},
    service::CommentService,
};
use crate::config::AppConfig;
use crate::event::EventBus;
use crate::leaderboard::{
    repository::{InMemoryLeaderboardRepository, LeaderboardRepository},
    service::LeaderboardService,
};
use crate::points::{
    repository::{InMemoryLedgerRepository, LedgerRepository},
    service::PointsService,
};
use crate::prediction::{
    errors::PredictionError,
    repository::{InMemoryPredictionRepository, PredictionRepository},
    service::PredictionService,
};
use crate::stats::{
    repository::{InMemoryStatsRepository, StatsRepository},
    service::StatsService,
    StatsError,
};

/// Storage backends for every aggregate the core owns
#[derive(Clone)]
pub struct Repositories {
    pub catalog: Arc<dyn CatalogRepository>,
    pub predictions: Arc<dyn PredictionRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub stats: Arc<dyn StatsRepository>,
    pub leaderboards: Arc<dyn LeaderboardRepository>,
    pub comments: Arc<dyn CommentRepository>,
}

impl Repositories {
    /// Everything held in process memory; used for development and tests
    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalogRepository::new()),
            predictions: Arc::new(InMemoryPredictionRepository::new()),
            ledger: Arc::new(InMemoryLedgerRepository::new()),
            stats: Arc::new(InMemoryStatsRepository::new()),
            leaderboards: Arc::new(InMemoryLeaderboardRepository::new()),
            comments: Arc::new(InMemoryCommentRepository::new()),
        }
    }
}

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub token_config: TokenConfig,
    pub repositories: Repositories,
    pub event_bus: EventBus,
    pub clock: Arc<dyn Clock>,
    pub prediction_service: Arc<PredictionService>,
    pub points_service: Arc<PointsService>,
    pub stats_service: Arc<StatsService>,
    pub leaderboard_service: Arc<LeaderboardService>,
    pub comment_service: Arc<CommentService>,
}

impl AppState {
    /// Wires the service graph on top of the given repositories
    pub fn new(
        config: &AppConfig,
        repositories: Repositories,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        let points_service = Arc::new(PointsService::new(
            repositories.ledger.clone(),
            repositories.stats.clone(),
            repositories.predictions.clone(),
            repositories.catalog.clone(),
            clock.clone(),
        ));

        let prediction_service = Arc::new(PredictionService::new(
            repositories.predictions.clone(),
            repositories.catalog.clone(),
            points_service.clone(),
            event_bus.clone(),
            clock.clone(),
            config.scoring.clone(),
        ));

        let stats_service = Arc::new(StatsService::new(
            repositories.stats.clone(),
            repositories.predictions.clone(),
            repositories.leaderboards.clone(),
            clock.clone(),
        ));

        let leaderboard_service = Arc::new(LeaderboardService::new(
            repositories.leaderboards.clone(),
            repositories.stats.clone(),
            repositories.ledger.clone(),
            clock.clone(),
            config.leaderboard_top_n,
        ));

        let comment_service = Arc::new(CommentService::new(
            repositories.comments.clone(),
            repositories.catalog.clone(),
            repositories.predictions.clone(),
            clock.clone(),
        ));

        Self {
            token_config: TokenConfig::new(config.jwt_secret.clone()),
            repositories,
            event_bus,
            clock,
            prediction_service,
            points_service,
            stats_service,
            leaderboard_service,
            comment_service,
        }
    }
}

/// Per-key async mutexes, used to give one writer at a time to a prediction or user
///
/// An entry lives only while some task holds or waits on it.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let mutex = {
            let mut locks = self.entries();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds one key of a [`KeyedLocks`]; the entry is pruned on drop when nobody else wants it
#[derive(Debug)]
pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining clone when idle
        self.guard.take();
        let mut locks = self.owner.entries();
        let idle = locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1);
        if idle {
            locks.remove(&self.key);
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    StateConflict(String),

    #[error("Insufficient points balance: have {balance}, need {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("{0}")]
    Prediction(#[from] PredictionError),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Stable machine-readable code for clients rendering specific messages
    pub fn code(&self) -> &'static str {
        match self {
            AppError::JwtError(_) => "invalid_token",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::StateConflict(_) => "state_conflict",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::Prediction(e) => e.code(),
            AppError::DatabaseError(_) => "database_error",
            AppError::Internal => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::JwtError(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StateConflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Prediction(e) => e.status(),
            AppError::DatabaseError(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StatsError> for AppError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::Validation(msg) => AppError::Validation(msg),
            StatsError::Repository(msg) => AppError::DatabaseError(msg),
            StatsError::NotReady(msg) => AppError::StateConflict(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::DatabaseError(_) | AppError::Internal => {
                tracing::error!(error = %self, "Request failed with server error");
                "Internal server error".to_string()
            }
            AppError::Prediction(e) => e.to_string(),
            AppError::JwtError(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::StateConflict(msg) => msg.clone(),
            AppError::InsufficientBalance { .. } => self.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::auth::{Identity, Role};
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    pub fn user(id: &str) -> Identity {
        Identity::new(id, Role::User)
    }

    pub fn moderator(id: &str) -> Identity {
        Identity::new(id, Role::Moderator)
    }

    pub fn admin(id: &str) -> Identity {
        Identity::new(id, Role::Admin)
    }

    /// Monday 2025-03-10 12:00 UTC, ISO week 2025-W11
    pub fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
        ))
    }

    /// Builder for creating AppState with overrides for testing
    pub struct AppStateBuilder {
        repositories: Repositories,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    }

    impl AppStateBuilder {
        pub fn new() -> Self {
            Self {
                repositories: Repositories::in_memory(),
                clock: fixed_clock(),
                config: AppConfig::default(),
            }
        }

        pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
            self.clock = clock;
            self
        }

        pub fn with_repositories(mut self, repositories: Repositories) -> Self {
            self.repositories = repositories;
            self
        }

        pub fn build(self) -> AppState {
            AppState::new(
                &self.config,
                self.repositories,
                self.clock,
                EventBus::new(self.config.event_bus_capacity),
            )
        }
    }

    impl Default for AppStateBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}

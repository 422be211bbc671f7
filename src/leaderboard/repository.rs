use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, types::Json, PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::models::{LeaderboardEntry, LeaderboardKind, LeaderboardSnapshot};
use crate::shared::AppError;

#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Replaces the snapshot for (kind, period_key) in place, or inserts it
    async fn upsert_snapshot(
        &self,
        kind: LeaderboardKind,
        period_key: &str,
        top: Vec<LeaderboardEntry>,
        now: DateTime<Utc>,
    ) -> Result<LeaderboardSnapshot, AppError>;
    async fn get_snapshot(
        &self,
        kind: LeaderboardKind,
        period_key: &str,
    ) -> Result<Option<LeaderboardSnapshot>, AppError>;
    /// Every retained snapshot of a kind, oldest period first
    async fn list_snapshots(
        &self,
        kind: LeaderboardKind,
    ) -> Result<Vec<LeaderboardSnapshot>, AppError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLeaderboardRepository {
    snapshots: RwLock<HashMap<(LeaderboardKind, String), LeaderboardSnapshot>>,
}

impl InMemoryLeaderboardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaderboardRepository for InMemoryLeaderboardRepository {
    #[instrument(skip(self, top, now), fields(entries = top.len()))]
    async fn upsert_snapshot(
        &self,
        kind: LeaderboardKind,
        period_key: &str,
        top: Vec<LeaderboardEntry>,
        now: DateTime<Utc>,
    ) -> Result<LeaderboardSnapshot, AppError> {
        let mut snapshots = self.snapshots.write().await;
        let snapshot = snapshots
            .entry((kind, period_key.to_string()))
            .and_modify(|existing| {
                debug!("Overwriting existing snapshot");
                existing.top = top.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| LeaderboardSnapshot {
                id: Uuid::new_v4().to_string(),
                kind,
                period_key: period_key.to_string(),
                top: top.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(snapshot.clone())
    }

    async fn get_snapshot(
        &self,
        kind: LeaderboardKind,
        period_key: &str,
    ) -> Result<Option<LeaderboardSnapshot>, AppError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(&(kind, period_key.to_string()))
            .cloned())
    }

    async fn list_snapshots(
        &self,
        kind: LeaderboardKind,
    ) -> Result<Vec<LeaderboardSnapshot>, AppError> {
        let snapshots = self.snapshots.read().await;
        let mut of_kind: Vec<LeaderboardSnapshot> = snapshots
            .values()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect();
        of_kind.sort_by(|a, b| a.period_key.cmp(&b.period_key));
        Ok(of_kind)
    }
}

/// PostgreSQL implementation of leaderboard snapshot storage
pub struct PostgresLeaderboardRepository {
    pool: PgPool,
}

impl PostgresLeaderboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn snapshot_from_row(row: &PgRow) -> Result<LeaderboardSnapshot, AppError> {
        let kind: String = row.try_get("kind").map_err(db_error)?;
        let top: Json<Vec<LeaderboardEntry>> = row.try_get("top").map_err(db_error)?;
        Ok(LeaderboardSnapshot {
            id: row.try_get("id").map_err(db_error)?,
            kind: LeaderboardKind::from_str(&kind)
                .map_err(|e| AppError::DatabaseError(format!("Unknown leaderboard kind {}: {}", kind, e)))?,
            period_key: row.try_get("period_key").map_err(db_error)?,
            top: top.0,
            created_at: row.try_get("created_at").map_err(db_error)?,
            updated_at: row.try_get("updated_at").map_err(db_error)?,
        })
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

#[async_trait]
impl LeaderboardRepository for PostgresLeaderboardRepository {
    #[instrument(skip(self, top, now), fields(entries = top.len()))]
    async fn upsert_snapshot(
        &self,
        kind: LeaderboardKind,
        period_key: &str,
        top: Vec<LeaderboardEntry>,
        now: DateTime<Utc>,
    ) -> Result<LeaderboardSnapshot, AppError> {
        let row = sqlx::query(
            "INSERT INTO leaderboard_snapshots (id, kind, period_key, top, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (kind, period_key) DO UPDATE SET top = EXCLUDED.top, updated_at = EXCLUDED.updated_at \
             RETURNING id, kind, period_key, top, created_at, updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(kind.to_string())
        .bind(period_key)
        .bind(Json(&top))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to upsert leaderboard snapshot");
            db_error(e)
        })?;

        Self::snapshot_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn get_snapshot(
        &self,
        kind: LeaderboardKind,
        period_key: &str,
    ) -> Result<Option<LeaderboardSnapshot>, AppError> {
        let row = sqlx::query(
            "SELECT id, kind, period_key, top, created_at, updated_at \
             FROM leaderboard_snapshots WHERE kind = $1 AND period_key = $2",
        )
        .bind(kind.to_string())
        .bind(period_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch leaderboard snapshot");
            db_error(e)
        })?;

        row.as_ref().map(Self::snapshot_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_snapshots(
        &self,
        kind: LeaderboardKind,
    ) -> Result<Vec<LeaderboardSnapshot>, AppError> {
        let rows = sqlx::query(
            "SELECT id, kind, period_key, top, created_at, updated_at \
             FROM leaderboard_snapshots WHERE kind = $1 ORDER BY period_key",
        )
        .bind(kind.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to list leaderboard snapshots");
            db_error(e)
        })?;

        rows.iter().map(Self::snapshot_from_row).collect()
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::BTreeSet;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{LedgerEntry, LedgerReason};
use crate::shared::AppError;

/// Append-only store of point movements
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), AppError>;

    /// A user's entries, newest first, optionally filtered by reason
    async fn list_for_user(
        &self,
        user_id: &str,
        reason: Option<LedgerReason>,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, AppError>;

    /// All users' entries created at or after `since`, oldest first
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>, AppError>;

    async fn list_for_prediction(&self, prediction_id: &str)
        -> Result<Vec<LedgerEntry>, AppError>;

    async fn has_entry_since(
        &self,
        user_id: &str,
        reason: LedgerReason,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Every user with at least one entry, sorted
    async fn list_user_ids(&self) -> Result<Vec<String>, AppError>;
}

/// In-memory ledger for development and testing
#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, reason = %entry.reason, points = entry.points))]
    async fn append(&self, entry: &LedgerEntry) -> Result<(), AppError> {
        self.entries.write().await.push(entry.clone());
        debug!("Ledger entry appended in memory");
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        reason: Option<LedgerReason>,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let entries = self.entries.read().await;
        // Appends are chronological, so reverse insertion order is newest first
        let matching = entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .filter(|e| reason.map_or(true, |r| e.reason == r))
            .cloned();

        Ok(match limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.created_at >= since)
            .cloned()
            .collect())
    }

    async fn list_for_prediction(
        &self,
        prediction_id: &str,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.prediction_id.as_deref() == Some(prediction_id))
            .cloned()
            .collect())
    }

    async fn has_entry_since(
        &self,
        user_id: &str,
        reason: LedgerReason,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .any(|e| e.user_id == user_id && e.reason == reason && e.created_at >= since))
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, AppError> {
        let entries = self.entries.read().await;
        let users: BTreeSet<String> = entries.iter().map(|e| e.user_id.clone()).collect();
        Ok(users.into_iter().collect())
    }
}

/// PostgreSQL implementation of the points ledger
pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, AppError> {
        let reason: String = row.try_get("reason").map_err(db_error)?;
        let metadata: Option<Value> = row.try_get("metadata").map_err(db_error)?;
        Ok(LedgerEntry {
            id: row.try_get("id").map_err(db_error)?,
            user_id: row.try_get("user_id").map_err(db_error)?,
            points: row.try_get("points").map_err(db_error)?,
            reason: LedgerReason::from_str(&reason).map_err(|e| {
                AppError::DatabaseError(format!("Unknown ledger reason {}: {}", reason, e))
            })?,
            prediction_id: row.try_get("prediction_id").map_err(db_error)?,
            pick_id: row.try_get("pick_id").map_err(db_error)?,
            tournament_id: row.try_get("tournament_id").map_err(db_error)?,
            metadata: metadata.unwrap_or(Value::Null),
            created_at: row.try_get("created_at").map_err(db_error)?,
        })
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, points, reason, prediction_id, pick_id, \
     tournament_id, metadata, created_at FROM points_ledger";

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, reason = %entry.reason, points = entry.points))]
    async fn append(&self, entry: &LedgerEntry) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO points_ledger (id, user_id, points, reason, prediction_id, pick_id, tournament_id, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(entry.points)
        .bind(entry.reason.to_string())
        .bind(&entry.prediction_id)
        .bind(&entry.pick_id)
        .bind(&entry.tournament_id)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to append ledger entry");
            db_error(e)
        })?;

        debug!("Ledger entry appended in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_for_user(
        &self,
        user_id: &str,
        reason: Option<LedgerReason>,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let sql = format!(
            "{} WHERE user_id = $1 AND ($2::TEXT IS NULL OR reason = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(reason.map(|r| r.to_string()))
            .bind(limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list ledger entries for user");
                db_error(e)
            })?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>, AppError> {
        let sql = format!("{} WHERE created_at >= $1 ORDER BY created_at", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list recent ledger entries");
                db_error(e)
            })?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_for_prediction(
        &self,
        prediction_id: &str,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let sql = format!(
            "{} WHERE prediction_id = $1 ORDER BY created_at",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(prediction_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list ledger entries for prediction");
                db_error(e)
            })?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn has_entry_since(
        &self,
        user_id: &str,
        reason: LedgerReason,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM points_ledger WHERE user_id = $1 AND reason = $2 AND created_at >= $3) AS found",
        )
        .bind(user_id)
        .bind(reason.to_string())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to check ledger entry existence");
            db_error(e)
        })?;

        row.try_get("found").map_err(db_error)
    }

    #[instrument(skip(self))]
    async fn list_user_ids(&self) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT DISTINCT user_id FROM points_ledger ORDER BY user_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list ledger users");
                db_error(e)
            })?;

        rows.iter()
            .map(|row| row.try_get("user_id").map_err(db_error))
            .collect()
    }
}

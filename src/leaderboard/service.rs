use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{info, instrument, warn};

use super::{
    aggregator::{rank_by_lifetime, rank_by_window},
    models::{LeaderboardEntry, LeaderboardKind, LeaderboardSnapshot},
    repository::LeaderboardRepository,
};
use crate::clock::Clock;
use crate::points::repository::LedgerRepository;
use crate::shared::AppError;
use crate::stats::StatsRepository;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub kind: LeaderboardKind,
    pub period_key: String,
    pub entries: Vec<LeaderboardEntry>,
    /// When the snapshot was last computed; `None` if it never was
    pub as_of: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<LeaderboardSnapshot> for LeaderboardView {
    fn from(snapshot: LeaderboardSnapshot) -> Self {
        Self {
            kind: snapshot.kind,
            period_key: snapshot.period_key,
            entries: snapshot.top,
            as_of: Some(snapshot.updated_at),
        }
    }
}

/// Recomputes ranked snapshots from stats and the ledger
pub struct LeaderboardService {
    repository: Arc<dyn LeaderboardRepository>,
    stats: Arc<dyn StatsRepository>,
    ledger: Arc<dyn LedgerRepository>,
    clock: Arc<dyn Clock>,
    top_n: usize,
}

impl LeaderboardService {
    pub fn new(
        repository: Arc<dyn LeaderboardRepository>,
        stats: Arc<dyn StatsRepository>,
        ledger: Arc<dyn LedgerRepository>,
        clock: Arc<dyn Clock>,
        top_n: usize,
    ) -> Self {
        Self {
            repository,
            stats,
            ledger,
            clock,
            top_n,
        }
    }

    /// Computes the snapshot for the period containing now and upserts it
    #[instrument(skip(self))]
    pub async fn compute(&self, kind: LeaderboardKind) -> Result<LeaderboardSnapshot, AppError> {
        let now = self.clock.now();
        let period_key = kind.period_key(now);
        let all_stats = self.stats.list_user_stats().await?;

        let top = match kind.window() {
            None => rank_by_lifetime(&all_stats, self.top_n),
            Some(window) => {
                let since = now - window;
                let accuracy: HashMap<String, f64> = all_stats
                    .iter()
                    .map(|s| (s.user_id.clone(), s.accuracy))
                    .collect();
                let entries = self.ledger.list_since(since).await?;
                rank_by_window(&entries, since, &accuracy, self.top_n)
            }
        };

        let snapshot = self
            .repository
            .upsert_snapshot(kind, &period_key, top, now)
            .await?;
        info!(
            kind = %kind,
            period_key = %snapshot.period_key,
            entries = snapshot.top.len(),
            "Leaderboard snapshot computed"
        );
        Ok(snapshot)
    }

    /// Daily job: every kind at once; one failing kind does not stop the others
    #[instrument(skip(self))]
    pub async fn compute_all(&self) -> Vec<LeaderboardSnapshot> {
        let kinds: Vec<LeaderboardKind> = LeaderboardKind::iter().collect();
        let results = join_all(kinds.iter().map(|kind| self.compute(*kind))).await;

        let mut snapshots = Vec::new();
        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(kind = %kind, error = %e, "Leaderboard computation failed"),
            }
        }
        snapshots
    }

    /// Stored snapshot for `period_key`, defaulting to the current period
    #[instrument(skip(self))]
    pub async fn get_leaderboard(
        &self,
        kind: LeaderboardKind,
        period_key: Option<&str>,
    ) -> Result<LeaderboardView, AppError> {
        let period_key = period_key
            .map(str::to_string)
            .unwrap_or_else(|| kind.period_key(self.clock.now()));

        Ok(match self.repository.get_snapshot(kind, &period_key).await? {
            Some(snapshot) => snapshot.into(),
            None => LeaderboardView {
                kind,
                period_key,
                entries: Vec::new(),
                as_of: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::leaderboard::{period::ALL_TIME_KEY, repository::InMemoryLeaderboardRepository};
    use crate::points::{
        models::{LedgerEntry, LedgerReason},
        repository::InMemoryLedgerRepository,
    };
    use crate::shared::test_utils::fixed_clock;
    use crate::stats::InMemoryStatsRepository;
    use chrono::Duration;

    struct Fixture {
        service: LeaderboardService,
        repository: Arc<InMemoryLeaderboardRepository>,
        stats: Arc<InMemoryStatsRepository>,
        ledger: Arc<InMemoryLedgerRepository>,
        clock: Arc<FixedClock>,
    }

    fn fixture(top_n: usize) -> Fixture {
        let repository = Arc::new(InMemoryLeaderboardRepository::new());
        let stats = Arc::new(InMemoryStatsRepository::new());
        let ledger = Arc::new(InMemoryLedgerRepository::new());
        let clock = fixed_clock();
        let service = LeaderboardService::new(
            repository.clone(),
            stats.clone(),
            ledger.clone(),
            clock.clone(),
            top_n,
        );
        Fixture {
            service,
            repository,
            stats,
            ledger,
            clock,
        }
    }

    async fn earn(f: &Fixture, user_id: &str, points: i64, age: Duration) {
        let at = f.clock.now() - age;
        f.ledger
            .append(&LedgerEntry::new(user_id, points, LedgerReason::PickCorrect, at))
            .await
            .unwrap();
        f.stats.apply_points(user_id, points, points, at).await.unwrap();
    }

    #[tokio::test]
    async fn global_ranks_lifetime_with_user_id_tie_break() {
        let f = fixture(100);
        earn(&f, "carol", 50, Duration::days(30)).await;
        earn(&f, "bob", 80, Duration::days(30)).await;
        earn(&f, "alice", 80, Duration::days(30)).await;

        let snapshot = f.service.compute(LeaderboardKind::Global).await.unwrap();
        assert_eq!(snapshot.period_key, ALL_TIME_KEY);
        let order: Vec<(&str, u32)> = snapshot
            .top
            .iter()
            .map(|e| (e.user_id.as_str(), e.rank))
            .collect();
        assert_eq!(order, vec![("alice", 1), ("bob", 2), ("carol", 3)]);
    }

    #[tokio::test]
    async fn weekly_counts_only_the_trailing_window() {
        let f = fixture(100);
        earn(&f, "alice", 500, Duration::days(8)).await;
        earn(&f, "bob", 40, Duration::days(2)).await;
        earn(&f, "alice", 10, Duration::hours(3)).await;

        let weekly = f.service.compute(LeaderboardKind::Weekly).await.unwrap();
        assert_eq!(weekly.period_key, "2025-W11");
        assert_eq!(weekly.top[0].user_id, "bob");
        assert_eq!(weekly.top[1].score, 10);

        let daily = f.service.compute(LeaderboardKind::Daily).await.unwrap();
        assert_eq!(daily.period_key, "2025-03-10");
        assert_eq!(daily.top.len(), 1);
        assert_eq!(daily.top[0].user_id, "alice");
    }

    #[tokio::test]
    async fn recompute_replaces_snapshot_for_same_period() {
        let f = fixture(100);
        earn(&f, "alice", 10, Duration::hours(1)).await;
        f.service.compute(LeaderboardKind::Daily).await.unwrap();

        earn(&f, "bob", 30, Duration::hours(1)).await;
        f.service.compute(LeaderboardKind::Daily).await.unwrap();

        let snapshots = f.repository.list_snapshots(LeaderboardKind::Daily).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].top.len(), 2);

        f.clock.advance(Duration::days(1));
        f.service.compute(LeaderboardKind::Daily).await.unwrap();
        let snapshots = f.repository.list_snapshots(LeaderboardKind::Daily).await.unwrap();
        assert_eq!(snapshots.len(), 2);
    }

    #[tokio::test]
    async fn top_n_truncates() {
        let f = fixture(2);
        for (user, points) in [("a", 1), ("b", 2), ("c", 3)] {
            earn(&f, user, points, Duration::hours(1)).await;
        }
        let snapshot = f.service.compute(LeaderboardKind::Global).await.unwrap();
        assert_eq!(snapshot.top.len(), 2);
        assert_eq!(snapshot.top[0].user_id, "c");
    }

    #[tokio::test]
    async fn missing_snapshot_reads_as_empty() {
        let f = fixture(100);
        let view = f
            .service
            .get_leaderboard(LeaderboardKind::Weekly, None)
            .await
            .unwrap();
        assert_eq!(view.period_key, "2025-W11");
        assert!(view.entries.is_empty());
        assert!(view.as_of.is_none());

        assert_eq!(f.service.compute_all().await.len(), 3);
        let view = f
            .service
            .get_leaderboard(LeaderboardKind::Global, Some(ALL_TIME_KEY))
            .await
            .unwrap();
        assert_eq!(view.as_of, Some(f.clock.now()));
    }
}

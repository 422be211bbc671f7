use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{
    models::{ResolutionCredit, UserShowStats, UserStats, UserStatsRebuild},
    StatsError,
};

/// Storage for the derived per-user caches
///
/// Each method is one atomic read-modify-write against a single user's rows.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, StatsError>;
    async fn list_user_stats(&self) -> Result<Vec<UserStats>, StatsError>;

    /// Counts a pick and its streak activity once per (user, prediction).
    /// Returns false when the pick was already counted.
    async fn record_pick_activity(
        &self,
        user_id: &str,
        prediction_id: &str,
        show_id: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool, StatsError>;
    async fn has_pick_activity(&self, user_id: &str, prediction_id: &str)
        -> Result<bool, StatsError>;

    /// Moves the user's resolution credit for a prediction to `credit`,
    /// applying only the difference from what was credited before.
    /// Returns the previous credit.
    async fn record_resolution(
        &self,
        user_id: &str,
        prediction_id: &str,
        show_id: &str,
        credit: ResolutionCredit,
        now: DateTime<Utc>,
    ) -> Result<ResolutionCredit, StatsError>;

    /// Adds to the cached balance and lifetime totals, creating the row on demand
    async fn apply_points(
        &self,
        user_id: &str,
        balance_delta: i64,
        lifetime_delta: i64,
        now: DateTime<Utc>,
    ) -> Result<UserStats, StatsError>;

    /// Swaps every cached row of the user, pick markers and credits included, for `rebuild`
    async fn replace_user_stats(&self, rebuild: UserStatsRebuild)
        -> Result<UserStats, StatsError>;

    async fn get_show_stats(
        &self,
        user_id: &str,
        show_id: &str,
    ) -> Result<Option<UserShowStats>, StatsError>;
    async fn list_show_stats(&self, user_id: &str) -> Result<Vec<UserShowStats>, StatsError>;
}

#[derive(Debug, Default)]
struct StatsStore {
    users: HashMap<String, UserStats>,
    shows: HashMap<(String, String), UserShowStats>,
    counted_picks: HashSet<(String, String)>,
    credits: HashMap<(String, String), ResolutionCredit>,
}

#[derive(Debug, Default)]
pub struct InMemoryStatsRepository {
    store: RwLock<StatsStore>,
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsStore {
    fn user_mut(&mut self, user_id: &str, now: DateTime<Utc>) -> &mut UserStats {
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| UserStats::new(user_id, now))
    }

    fn show_mut(&mut self, user_id: &str, show_id: &str, now: DateTime<Utc>) -> &mut UserShowStats {
        self.shows
            .entry((user_id.to_string(), show_id.to_string()))
            .or_insert_with(|| UserShowStats::new(user_id, show_id, now))
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, StatsError> {
        Ok(self.store.read().await.users.get(user_id).cloned())
    }

    async fn list_user_stats(&self) -> Result<Vec<UserStats>, StatsError> {
        let store = self.store.read().await;
        let mut all: Vec<UserStats> = store.users.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }

    #[instrument(skip(self, now))]
    async fn record_pick_activity(
        &self,
        user_id: &str,
        prediction_id: &str,
        show_id: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool, StatsError> {
        let mut store = self.store.write().await;
        if !store
            .counted_picks
            .insert((user_id.to_string(), prediction_id.to_string()))
        {
            debug!("Pick already counted");
            return Ok(false);
        }

        let stats = store.user_mut(user_id, now);
        stats.total_picks += 1;
        stats.register_activity(day);
        stats.recompute_accuracy();
        stats.updated_at = now;
        debug!(
            total_picks = stats.total_picks,
            current_streak = stats.current_streak,
            "Pick activity recorded"
        );

        let show = store.show_mut(user_id, show_id, now);
        show.total_predictions += 1;
        show.recompute_accuracy();
        show.updated_at = now;

        Ok(true)
    }

    async fn has_pick_activity(
        &self,
        user_id: &str,
        prediction_id: &str,
    ) -> Result<bool, StatsError> {
        Ok(self
            .store
            .read()
            .await
            .counted_picks
            .contains(&(user_id.to_string(), prediction_id.to_string())))
    }

    #[instrument(skip(self, now))]
    async fn record_resolution(
        &self,
        user_id: &str,
        prediction_id: &str,
        show_id: &str,
        credit: ResolutionCredit,
        now: DateTime<Utc>,
    ) -> Result<ResolutionCredit, StatsError> {
        let mut store = self.store.write().await;
        let key = (user_id.to_string(), prediction_id.to_string());
        let previous = store.credits.get(&key).copied().unwrap_or_default();
        if previous == credit {
            return Ok(previous);
        }

        let correct_delta = i64::from(credit.correct) - i64::from(previous.correct);
        let points_delta = credit.earned_points - previous.earned_points;

        let stats = store.user_mut(user_id, now);
        stats.correct_picks += correct_delta;
        stats.recompute_accuracy();
        stats.points_balance += points_delta;
        stats.lifetime_points += points_delta;
        stats.updated_at = now;

        let show = store.show_mut(user_id, show_id, now);
        show.correct_predictions += correct_delta;
        show.recompute_accuracy();
        show.updated_at = now;

        store.credits.insert(key, credit);
        debug!(correct_delta, points_delta, "Resolution credit applied");
        Ok(previous)
    }

    async fn apply_points(
        &self,
        user_id: &str,
        balance_delta: i64,
        lifetime_delta: i64,
        now: DateTime<Utc>,
    ) -> Result<UserStats, StatsError> {
        let mut store = self.store.write().await;
        let stats = store.user_mut(user_id, now);
        stats.points_balance += balance_delta;
        stats.lifetime_points += lifetime_delta;
        stats.updated_at = now;
        Ok(stats.clone())
    }

    #[instrument(skip(self, rebuild), fields(user_id = %rebuild.stats.user_id))]
    async fn replace_user_stats(
        &self,
        rebuild: UserStatsRebuild,
    ) -> Result<UserStats, StatsError> {
        let mut store = self.store.write().await;
        let user_id = rebuild.stats.user_id.clone();

        store.shows.retain(|(user, _), _| *user != user_id);
        store.counted_picks.retain(|(user, _)| *user != user_id);
        store.credits.retain(|(user, _), _| *user != user_id);

        for show in rebuild.shows {
            store
                .shows
                .insert((user_id.clone(), show.show_id.clone()), show);
        }
        for prediction_id in rebuild.counted_picks {
            store.counted_picks.insert((user_id.clone(), prediction_id));
        }
        for (prediction_id, credit) in rebuild.credits {
            store.credits.insert((user_id.clone(), prediction_id), credit);
        }
        store.users.insert(user_id, rebuild.stats.clone());

        debug!("User stats replaced");
        Ok(rebuild.stats)
    }

    async fn get_show_stats(
        &self,
        user_id: &str,
        show_id: &str,
    ) -> Result<Option<UserShowStats>, StatsError> {
        Ok(self
            .store
            .read()
            .await
            .shows
            .get(&(user_id.to_string(), show_id.to_string()))
            .cloned())
    }

    async fn list_show_stats(&self, user_id: &str) -> Result<Vec<UserShowStats>, StatsError> {
        let store = self.store.read().await;
        Ok(store
            .shows
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[tokio::test]
    async fn first_pick_creates_rows_with_streak_one() {
        let repo = InMemoryStatsRepository::new();
        assert!(repo
            .record_pick_activity("alice", "p1", "show-1", day(10), now())
            .await
            .unwrap());

        let stats = repo.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(stats.total_picks, 1);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.best_streak, 1);

        let show = repo.get_show_stats("alice", "show-1").await.unwrap().unwrap();
        assert_eq!(show.total_predictions, 1);
    }

    #[tokio::test]
    async fn redelivered_pick_is_counted_once() {
        let repo = InMemoryStatsRepository::new();
        repo.record_pick_activity("alice", "p1", "show-1", day(10), now())
            .await
            .unwrap();
        let counted = repo
            .record_pick_activity("alice", "p1", "show-1", day(10), now())
            .await
            .unwrap();

        assert!(!counted);
        let stats = repo.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(stats.total_picks, 1);
    }

    #[tokio::test]
    async fn resolution_credit_applies_only_differences() {
        let repo = InMemoryStatsRepository::new();
        repo.record_pick_activity("alice", "p1", "show-1", day(10), now())
            .await
            .unwrap();

        let win = ResolutionCredit {
            correct: true,
            earned_points: 90,
        };
        repo.record_resolution("alice", "p1", "show-1", win, now())
            .await
            .unwrap();
        // Redelivery is a no-op
        repo.record_resolution("alice", "p1", "show-1", win, now())
            .await
            .unwrap();

        let stats = repo.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(stats.correct_picks, 1);
        assert_eq!(stats.accuracy, 1.0);
        assert_eq!(stats.points_balance, 90);
        assert_eq!(stats.lifetime_points, 90);

        // Correction to a different winner reverses the credit
        let previous = repo
            .record_resolution("alice", "p1", "show-1", ResolutionCredit::default(), now())
            .await
            .unwrap();
        assert_eq!(previous, win);

        let stats = repo.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(stats.correct_picks, 0);
        assert_eq!(stats.accuracy, 0.0);
        assert_eq!(stats.points_balance, 0);
        assert_eq!(stats.lifetime_points, 0);

        let show = repo.get_show_stats("alice", "show-1").await.unwrap().unwrap();
        assert_eq!(show.correct_predictions, 0);
    }

    #[tokio::test]
    async fn apply_points_creates_row_on_demand() {
        let repo = InMemoryStatsRepository::new();
        let stats = repo.apply_points("bob", -5, 0, now()).await.unwrap();
        assert_eq!(stats.points_balance, -5);
        assert_eq!(stats.lifetime_points, 0);
        assert_eq!(stats.total_picks, 0);
    }

    #[tokio::test]
    async fn replace_swaps_markers_with_totals() {
        let repo = InMemoryStatsRepository::new();
        repo.record_pick_activity("alice", "p1", "show-1", day(10), now())
            .await
            .unwrap();
        repo.record_pick_activity("bob", "p1", "show-1", day(10), now())
            .await
            .unwrap();

        let mut stats = UserStats::new("alice", now());
        stats.total_picks = 1;
        stats.correct_picks = 1;
        stats.points_balance = 40;
        let credit = ResolutionCredit {
            correct: true,
            earned_points: 40,
        };
        repo.replace_user_stats(UserStatsRebuild {
            stats,
            shows: vec![UserShowStats::new("alice", "show-2", now())],
            counted_picks: vec!["p2".to_string()],
            credits: vec![("p2".to_string(), credit)],
        })
        .await
        .unwrap();

        assert!(!repo.has_pick_activity("alice", "p1").await.unwrap());
        assert!(repo.has_pick_activity("alice", "p2").await.unwrap());
        assert!(repo.has_pick_activity("bob", "p1").await.unwrap());
        assert!(repo.get_show_stats("alice", "show-1").await.unwrap().is_none());

        // The stored credit makes a redelivered resolution a no-op
        let previous = repo
            .record_resolution("alice", "p2", "show-2", credit, now())
            .await
            .unwrap();
        assert_eq!(previous, credit);
        let stats = repo.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(stats.points_balance, 40);
        assert_eq!(stats.correct_picks, 1);
    }
}

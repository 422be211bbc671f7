use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    models::{ResolutionCredit, UserShowStats, UserStats},
    repository::StatsRepository,
    types::UserStatsView,
    StatsError,
};
use crate::clock::Clock;
use crate::leaderboard::{
    models::LeaderboardKind, period::ALL_TIME_KEY, repository::LeaderboardRepository,
};
use crate::prediction::repository::PredictionRepository;

/// Maintains the denormalized per-user and per-show totals
///
/// The two update paths are the only writers of pick counts, accuracy and
/// streak fields. Both re-read authoritative rows and are safe to redeliver.
pub struct StatsService {
    repository: Arc<dyn StatsRepository>,
    predictions: Arc<dyn PredictionRepository>,
    leaderboards: Arc<dyn LeaderboardRepository>,
    clock: Arc<dyn Clock>,
}

impl StatsService {
    pub fn new(
        repository: Arc<dyn StatsRepository>,
        predictions: Arc<dyn PredictionRepository>,
        leaderboards: Arc<dyn LeaderboardRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            predictions,
            leaderboards,
            clock,
        }
    }

    /// Counts one pick toward totals and the streak for `activity_day`
    #[instrument(skip(self))]
    pub async fn update_stats_after_pick(
        &self,
        user_id: &str,
        prediction_id: &str,
        show_id: &str,
        activity_day: NaiveDate,
    ) -> Result<(), StatsError> {
        let pick = self
            .predictions
            .get_user_pick(prediction_id, user_id)
            .await?;
        if pick.is_none() {
            return Err(StatsError::Validation(format!(
                "No pick by {} on prediction {}",
                user_id, prediction_id
            )));
        }

        let counted = self
            .repository
            .record_pick_activity(user_id, prediction_id, show_id, activity_day, self.clock.now())
            .await?;
        if !counted {
            debug!("Pick activity already applied");
        }
        Ok(())
    }

    /// Applies the user's resolved pick to accuracy and balances
    ///
    /// Reads the pick's current earned points and applies only the difference
    /// from what was last credited, so re-resolutions adjust rather than add.
    #[instrument(skip(self))]
    pub async fn update_stats_after_resolve(
        &self,
        user_id: &str,
        prediction_id: &str,
        show_id: &str,
    ) -> Result<(), StatsError> {
        let Some(pick) = self
            .predictions
            .get_user_pick(prediction_id, user_id)
            .await?
        else {
            debug!("No pick for user, nothing to apply");
            return Ok(());
        };

        // Accuracy divides by total picks, so the pick must be counted first
        if !self
            .repository
            .has_pick_activity(user_id, prediction_id)
            .await?
        {
            return Err(StatsError::NotReady(format!(
                "Pick activity for {} on {} not applied yet",
                user_id, prediction_id
            )));
        }

        let credit = ResolutionCredit {
            correct: pick.earned_points > 0,
            earned_points: pick.earned_points,
        };
        let previous = self
            .repository
            .record_resolution(user_id, prediction_id, show_id, credit, self.clock.now())
            .await?;

        debug!(
            correct = credit.correct,
            earned_points = credit.earned_points,
            previous_earned = previous.earned_points,
            "Resolution applied to stats"
        );
        Ok(())
    }

    /// Profile stats; unknown users get zeroed defaults
    #[instrument(skip(self))]
    pub async fn get_user_stats(&self, user_id: &str) -> Result<UserStatsView, StatsError> {
        let stats = self
            .repository
            .get_user_stats(user_id)
            .await?
            .unwrap_or_else(|| UserStats::new(user_id, self.clock.now()));

        let rank = self
            .leaderboards
            .get_snapshot(LeaderboardKind::Global, ALL_TIME_KEY)
            .await?
            .and_then(|snapshot| snapshot.rank_of(user_id));

        Ok(UserStatsView::new(stats, rank))
    }

    /// One show's row, or every show the user has picked on sorted by accuracy
    #[instrument(skip(self))]
    pub async fn get_user_show_stats(
        &self,
        user_id: &str,
        show_id: Option<&str>,
    ) -> Result<Vec<UserShowStats>, StatsError> {
        match show_id {
            Some(show_id) => Ok(self
                .repository
                .get_show_stats(user_id, show_id)
                .await?
                .into_iter()
                .collect()),
            None => {
                let mut rows = self.repository.list_show_stats(user_id).await?;
                rows.sort_by(|a, b| {
                    b.accuracy
                        .total_cmp(&a.accuracy)
                        .then_with(|| a.show_id.cmp(&b.show_id))
                });
                Ok(rows)
            }
        }
    }
}

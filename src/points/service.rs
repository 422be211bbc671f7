use chrono::{DateTime, Days, Duration, NaiveTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    models::{totals_from_ledger, LedgerEntry, LedgerReason},
    repository::LedgerRepository,
    types::{
        BreakdownDetails, BreakdownPeriod, BreakdownTotals, HistoryItem, PayoutSettlement,
        PayoutSummary, PointsBreakdown, PointsHistory, PredictionContext, RefundSummary,
        SpendReceipt, StatsRebuildSummary, StreakJobSummary, TournamentContext, TournamentPayout,
    },
};
use crate::auth::Identity;
use crate::catalog::CatalogRepository;
use crate::clock::Clock;
use crate::prediction::{models::PredictionPick, repository::PredictionRepository, scoring::ScoringRules};
use crate::shared::{AppError, KeyedLocks};
use crate::stats::{
    ResolutionCredit, StatsRepository, UserShowStats, UserStats, UserStatsRebuild,
};

/// Streak lengths that earn a one-time bonus, and the bonus paid
const STREAK_MILESTONES: [(u32, i64); 4] = [(3, 10), (7, 25), (14, 50), (30, 100)];

pub fn streak_milestone_bonus(streak_days: u32) -> Option<i64> {
    STREAK_MILESTONES
        .iter()
        .find(|(days, _)| *days == streak_days)
        .map(|(_, bonus)| *bonus)
}

/// Owns every write to the points ledger
///
/// Paths that move a user's balance outside of pick resolution append the
/// ledger entry and patch the cached balance together.
pub struct PointsService {
    ledger: Arc<dyn LedgerRepository>,
    stats: Arc<dyn StatsRepository>,
    predictions: Arc<dyn PredictionRepository>,
    catalog: Arc<dyn CatalogRepository>,
    clock: Arc<dyn Clock>,
    user_locks: KeyedLocks,
}

impl PointsService {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        stats: Arc<dyn StatsRepository>,
        predictions: Arc<dyn PredictionRepository>,
        catalog: Arc<dyn CatalogRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            stats,
            predictions,
            catalog,
            clock,
            user_locks: KeyedLocks::new(),
        }
    }

    /// Appends the entry and applies it to the cached totals
    async fn record(&self, entry: LedgerEntry) -> Result<UserStats, AppError> {
        self.ledger.append(&entry).await?;
        let stats = self
            .stats
            .apply_points(
                &entry.user_id,
                entry.points,
                entry.lifetime_contribution(),
                entry.created_at,
            )
            .await?;
        debug!(
            user_id = %entry.user_id,
            reason = %entry.reason,
            points = entry.points,
            balance = stats.points_balance,
            "Points recorded"
        );
        Ok(stats)
    }

    fn start_of_today(&self) -> DateTime<Utc> {
        self.clock.today().and_time(NaiveTime::MIN).and_utc()
    }

    #[instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn admin_adjust(
        &self,
        admin: &Identity,
        user_id: &str,
        points: i64,
        note: &str,
    ) -> Result<UserStats, AppError> {
        admin.require_admin()?;
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }
        if points == 0 {
            return Err(AppError::Validation(
                "Adjustment must be non-zero".to_string(),
            ));
        }
        if note.trim().is_empty() {
            return Err(AppError::Validation(
                "Adjustment note is required".to_string(),
            ));
        }

        let _guard = self.user_locks.lock(user_id).await;

        let entry = LedgerEntry::new(user_id, points, LedgerReason::AdminAdjustment, self.clock.now())
            .with_metadata(json!({ "admin_note": note, "admin_id": admin.user_id }));
        let stats = self.record(entry).await?;

        info!(user_id = %user_id, points, "Admin adjustment applied");
        Ok(stats)
    }

    #[instrument(skip(self, metadata))]
    pub async fn spend(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        metadata: Option<Value>,
    ) -> Result<SpendReceipt, AppError> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "Spend amount must be positive".to_string(),
            ));
        }

        let _guard = self.user_locks.lock(user_id).await;

        let balance = self
            .stats
            .get_user_stats(user_id)
            .await?
            .map(|s| s.points_balance)
            .unwrap_or(0);
        if balance < amount {
            debug!(balance, amount, "Spend rejected");
            return Err(AppError::InsufficientBalance {
                balance,
                requested: amount,
            });
        }

        let entry = LedgerEntry::new(user_id, -amount, LedgerReason::Spend, self.clock.now())
            .with_metadata(json!({ "spend_reason": reason, "details": metadata }));
        let stats = self.record(entry).await?;

        Ok(SpendReceipt {
            new_balance: stats.points_balance,
        })
    }

    /// Pays the milestone bonus for `streak_days` unless one was already paid today
    #[instrument(skip(self))]
    pub async fn award_streak_bonus(
        &self,
        user_id: &str,
        streak_days: u32,
    ) -> Result<Option<i64>, AppError> {
        let Some(bonus) = streak_milestone_bonus(streak_days) else {
            return Ok(None);
        };

        let _guard = self.user_locks.lock(user_id).await;

        if self
            .ledger
            .has_entry_since(user_id, LedgerReason::StreakBonus, self.start_of_today())
            .await?
        {
            debug!("Streak bonus already awarded today");
            return Ok(None);
        }

        let entry = LedgerEntry::new(user_id, bonus, LedgerReason::StreakBonus, self.clock.now())
            .with_metadata(json!({ "streak_days": streak_days }));
        self.record(entry).await?;
        Ok(Some(bonus))
    }

    /// Daily job: bonus every user still active as of yesterday who sits on a milestone
    #[instrument(skip(self))]
    pub async fn run_streak_bonus_job(&self) -> Result<StreakJobSummary, AppError> {
        let today = self.clock.today();
        let yesterday = today.checked_sub_days(Days::new(1));

        let active: Vec<UserStats> = self
            .stats
            .list_user_stats()
            .await?
            .into_iter()
            .filter(|s| s.last_active_day.is_some() && s.last_active_day == yesterday)
            .collect();

        let mut summary = StreakJobSummary {
            checked: active.len(),
            awarded: 0,
        };
        for stats in &active {
            match self
                .award_streak_bonus(&stats.user_id, stats.current_streak)
                .await
            {
                Ok(Some(_)) => summary.awarded += 1,
                Ok(None) => {}
                Err(e) => warn!(user_id = %stats.user_id, error = %e, "Streak bonus failed"),
            }
        }

        info!(checked = summary.checked, awarded = summary.awarded, "Streak bonus job finished");
        Ok(summary)
    }

    #[instrument(skip(self, admin, payouts), fields(admin_id = %admin.user_id, payouts = payouts.len()))]
    pub async fn process_tournament_payout(
        &self,
        admin: &Identity,
        tournament_id: &str,
        payouts: &[TournamentPayout],
    ) -> Result<PayoutSummary, AppError> {
        admin.require_admin()?;
        if let Some(bad) = payouts
            .iter()
            .find(|p| p.user_id.trim().is_empty() || p.points < 0)
        {
            return Err(AppError::Validation(format!(
                "Invalid payout for rank {}",
                bad.rank
            )));
        }

        let mut summary = PayoutSummary::default();
        for payout in payouts {
            let _guard = self.user_locks.lock(&payout.user_id).await;

            let already_paid = self
                .ledger
                .list_for_user(&payout.user_id, Some(LedgerReason::TournamentPayout), None)
                .await?
                .iter()
                .any(|e| e.tournament_id.as_deref() == Some(tournament_id));
            if already_paid {
                summary.already_paid += 1;
                continue;
            }

            let entry = LedgerEntry::new(
                &payout.user_id,
                payout.points,
                LedgerReason::TournamentPayout,
                self.clock.now(),
            )
            .for_tournament(tournament_id)
            .with_metadata(json!({ "rank": payout.rank }));
            self.record(entry).await?;

            summary.total_paid += 1;
            summary.points_paid += payout.points;
        }

        info!(
            total_paid = summary.total_paid,
            points_paid = summary.points_paid,
            "Tournament payout processed"
        );
        Ok(summary)
    }

    /// Refunds half of each pick's frozen potential; picks already refunded are skipped
    #[instrument(skip(self, picks), fields(picks = picks.len()))]
    pub async fn refund_void_picks(
        &self,
        prediction_id: &str,
        picks: &[PredictionPick],
    ) -> Result<RefundSummary, AppError> {
        let refunded: HashSet<String> = self
            .ledger
            .list_for_prediction(prediction_id)
            .await?
            .into_iter()
            .filter(|e| e.reason == LedgerReason::Refund)
            .filter_map(|e| e.pick_id)
            .collect();

        let mut summary = RefundSummary::default();
        for pick in picks {
            let amount = ScoringRules::void_refund(pick.potential_points);
            if amount == 0 || refunded.contains(&pick.id) {
                continue;
            }

            let _guard = self.user_locks.lock(&pick.user_id).await;

            let entry = LedgerEntry::new(&pick.user_id, amount, LedgerReason::Refund, self.clock.now())
                .for_pick(prediction_id, &pick.id)
                .with_metadata(json!({
                    "original_potential": pick.potential_points,
                    "refund_percentage": 50,
                }));
            self.record(entry).await?;

            summary.refunded_picks += 1;
            summary.points_refunded += amount;
        }
        Ok(summary)
    }

    /// Brings the ledger in line with each pick's current earned points
    ///
    /// The ledger already credited for a pick is diffed against its target; the
    /// first credit is `pick_correct`, later differences are signed
    /// `resolution_correction` entries. Cached balances are moved by the stats
    /// resolve handler from the same earned points, not here.
    #[instrument(skip(self, picks), fields(picks = picks.len()))]
    pub async fn settle_pick_payouts(
        &self,
        prediction_id: &str,
        picks: &[PredictionPick],
    ) -> Result<PayoutSettlement, AppError> {
        let mut credited: HashMap<String, (i64, usize)> = HashMap::new();
        for entry in self.ledger.list_for_prediction(prediction_id).await? {
            if !matches!(
                entry.reason,
                LedgerReason::PickCorrect | LedgerReason::ResolutionCorrection
            ) {
                continue;
            }
            if let Some(pick_id) = entry.pick_id {
                let slot = credited.entry(pick_id).or_insert((0, 0));
                slot.0 += entry.points;
                slot.1 += 1;
            }
        }

        let now = self.clock.now();
        let mut settlement = PayoutSettlement::default();
        for pick in picks {
            let (already, entries) = credited.get(&pick.id).copied().unwrap_or((0, 0));
            let diff = pick.earned_points - already;
            if diff == 0 {
                continue;
            }

            let reason = if entries == 0 {
                LedgerReason::PickCorrect
            } else {
                LedgerReason::ResolutionCorrection
            };
            let entry = LedgerEntry::new(&pick.user_id, diff, reason, now)
                .for_pick(prediction_id, &pick.id)
                .with_metadata(json!({
                    "option_id": pick.option_id,
                    "potential_points": pick.potential_points,
                    "previously_credited": already,
                }));
            self.ledger.append(&entry).await?;

            settlement.entries_written += 1;
            settlement.net_points += diff;
        }

        debug!(
            entries_written = settlement.entries_written,
            net_points = settlement.net_points,
            "Pick payouts settled"
        );
        Ok(settlement)
    }

    /// Rebuilds every cached stat of the user from pick rows and the ledger
    ///
    /// Pick rows give pick totals, show totals and the streak. The ledger gives
    /// balances and, per prediction, the credit already paid; that credit becomes
    /// the stored resolution marker, so a resolve event still in flight only
    /// applies what the ledger does not already hold. Pick markers cover every
    /// pick read here, so a pending pick event is a no-op.
    #[instrument(skip(self))]
    pub async fn rebuild_user_stats(&self, user_id: &str) -> Result<UserStats, AppError> {
        let _guard = self.user_locks.lock(user_id).await;
        let now = self.clock.now();

        let entries = self.ledger.list_for_user(user_id, None, None).await?;
        let (balance, lifetime) = totals_from_ledger(&entries);
        let mut credited: HashMap<&str, i64> = HashMap::new();
        for entry in &entries {
            if !matches!(
                entry.reason,
                LedgerReason::PickCorrect | LedgerReason::ResolutionCorrection
            ) {
                continue;
            }
            if let Some(prediction_id) = entry.prediction_id.as_deref() {
                *credited.entry(prediction_id).or_insert(0) += entry.points;
            }
        }

        let mut picks = self.predictions.list_user_picks(user_id).await?;
        picks.sort_by(|a, b| {
            a.activity_day
                .cmp(&b.activity_day)
                .then_with(|| a.picked_at.cmp(&b.picked_at))
        });

        let mut stats = UserStats::new(user_id, now);
        let mut shows: HashMap<String, UserShowStats> = HashMap::new();
        let mut counted_picks = Vec::with_capacity(picks.len());
        let mut credits = Vec::new();
        for pick in &picks {
            let Some(prediction) = self.predictions.get_prediction(&pick.prediction_id).await?
            else {
                warn!(prediction_id = %pick.prediction_id, "Pick without prediction skipped");
                continue;
            };

            stats.total_picks += 1;
            stats.register_activity(pick.activity_day);
            let show = shows
                .entry(prediction.show_id.clone())
                .or_insert_with(|| UserShowStats::new(user_id, &prediction.show_id, now));
            show.total_predictions += 1;

            if let Some(&earned_points) = credited.get(pick.prediction_id.as_str()) {
                let credit = ResolutionCredit {
                    correct: earned_points > 0,
                    earned_points,
                };
                if credit.correct {
                    stats.correct_picks += 1;
                    show.correct_predictions += 1;
                }
                credits.push((pick.prediction_id.clone(), credit));
            }
            counted_picks.push(pick.prediction_id.clone());
        }

        stats.points_balance = balance;
        stats.lifetime_points = lifetime;
        stats.recompute_accuracy();
        let shows: Vec<UserShowStats> = shows
            .into_values()
            .map(|mut show| {
                show.recompute_accuracy();
                show
            })
            .collect();

        let stats = self
            .stats
            .replace_user_stats(UserStatsRebuild {
                stats,
                shows,
                counted_picks,
                credits,
            })
            .await?;

        info!(
            total_picks = stats.total_picks,
            correct_picks = stats.correct_picks,
            balance,
            lifetime,
            "User stats rebuilt"
        );
        Ok(stats)
    }

    /// Rebuilds every user known to the ledger, the pick rows or the stats cache
    ///
    /// Runs at startup and on a schedule so caches converge even when a scoring
    /// event was dropped or its handler gave up.
    #[instrument(skip(self))]
    pub async fn rebuild_all_user_stats(&self) -> Result<StatsRebuildSummary, AppError> {
        let mut users: BTreeSet<String> = self.ledger.list_user_ids().await?.into_iter().collect();
        users.extend(self.predictions.list_picking_user_ids().await?);
        users.extend(
            self.stats
                .list_user_stats()
                .await?
                .into_iter()
                .map(|s| s.user_id),
        );

        let mut summary = StatsRebuildSummary::default();
        for user_id in &users {
            match self.rebuild_user_stats(user_id).await {
                Ok(_) => summary.rebuilt += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(user_id = %user_id, error = %e, "Stats rebuild failed");
                }
            }
        }

        info!(rebuilt = summary.rebuilt, failed = summary.failed, "Stats rebuild finished");
        Ok(summary)
    }

    #[instrument(skip(self))]
    pub async fn get_points_history(
        &self,
        user_id: &str,
        reason: Option<LedgerReason>,
        limit: Option<usize>,
    ) -> Result<PointsHistory, AppError> {
        let limit = limit.unwrap_or(50).clamp(1, 500);
        let entries = self.ledger.list_for_user(user_id, reason, Some(limit)).await?;

        let mut prediction_contexts: HashMap<String, Option<PredictionContext>> = HashMap::new();
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let prediction = match &entry.prediction_id {
                Some(prediction_id) => {
                    if !prediction_contexts.contains_key(prediction_id) {
                        let context = self.prediction_context(prediction_id).await?;
                        prediction_contexts.insert(prediction_id.clone(), context);
                    }
                    prediction_contexts.get(prediction_id).cloned().flatten()
                }
                None => None,
            };

            let tournament = entry.tournament_id.as_ref().map(|id| TournamentContext {
                id: id.clone(),
                rank: entry.metadata.get("rank").and_then(Value::as_u64),
            });

            items.push(HistoryItem {
                entry,
                prediction,
                tournament,
            });
        }

        let stats = self.stats.get_user_stats(user_id).await?;
        Ok(PointsHistory {
            entries: items,
            current_balance: stats.as_ref().map(|s| s.points_balance).unwrap_or(0),
            lifetime_earned: stats.as_ref().map(|s| s.lifetime_points).unwrap_or(0),
        })
    }

    async fn prediction_context(
        &self,
        prediction_id: &str,
    ) -> Result<Option<PredictionContext>, AppError> {
        let Some(prediction) = self.predictions.get_prediction(prediction_id).await? else {
            return Ok(None);
        };
        let show_title = self
            .catalog
            .get_show(&prediction.show_id)
            .await?
            .map(|show| show.title);

        Ok(Some(PredictionContext {
            id: prediction.id,
            template_key: prediction.template_key,
            show_title,
        }))
    }

    #[instrument(skip(self))]
    pub async fn get_points_breakdown(
        &self,
        user_id: &str,
        period: BreakdownPeriod,
    ) -> Result<PointsBreakdown, AppError> {
        let now = self.clock.now();
        let since = match period {
            BreakdownPeriod::AllTime => None,
            BreakdownPeriod::Today => Some(self.start_of_today()),
            BreakdownPeriod::ThisWeek => Some(now - Duration::days(7)),
            BreakdownPeriod::ThisMonth => Some(now - Duration::days(30)),
        };

        let entries: Vec<LedgerEntry> = self
            .ledger
            .list_for_user(user_id, None, None)
            .await?
            .into_iter()
            .filter(|e| since.map_or(true, |since| e.created_at >= since))
            .collect();

        let (breakdown, details) = summarize(&entries);
        Ok(PointsBreakdown {
            period,
            since,
            breakdown,
            details,
            entry_count: entries.len(),
        })
    }
}

fn summarize(entries: &[LedgerEntry]) -> (BreakdownTotals, BreakdownDetails) {
    let mut totals = BreakdownTotals::default();
    let mut details = BreakdownDetails::default();
    let mut win_total = 0;

    for entry in entries {
        totals.total += entry.points;
        match entry.reason {
            LedgerReason::PickCorrect => {
                totals.predictions += entry.points;
                details.predictions_count += 1;
                win_total += entry.points;
                details.largest_win = details.largest_win.max(entry.points);
            }
            LedgerReason::StreakBonus => {
                totals.streaks += entry.points;
                details.streak_bonuses += 1;
            }
            LedgerReason::TournamentPayout => {
                totals.tournaments += entry.points;
                details.tournaments_paid += 1;
            }
            LedgerReason::EarlyBonus | LedgerReason::ContrarianBonus => {
                totals.bonuses += entry.points
            }
            LedgerReason::Refund => totals.refunds += entry.points,
            LedgerReason::AdminAdjustment => totals.adjustments += entry.points,
            LedgerReason::Spend => totals.spends += entry.points,
            LedgerReason::ResolutionCorrection => totals.corrections += entry.points,
        }
    }

    if details.predictions_count > 0 {
        details.average_win =
            (win_total as f64 / details.predictions_count as f64).round() as i64;
    }
    (totals, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalogRepository;
    use crate::clock::FixedClock;
    use crate::points::models::lifetime_contribution;
    use crate::points::repository::InMemoryLedgerRepository;
    use crate::prediction::models::{Prediction, PredictionKind, PredictionScope, PredictionState};
    use crate::prediction::repository::InMemoryPredictionRepository;
    use crate::shared::test_utils::{admin, fixed_clock, user};
    use crate::stats::InMemoryStatsRepository;
    use chrono::NaiveDate;

    struct Fixture {
        service: PointsService,
        ledger: Arc<InMemoryLedgerRepository>,
        stats: Arc<InMemoryStatsRepository>,
        predictions: Arc<InMemoryPredictionRepository>,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerRepository::new());
        let stats = Arc::new(InMemoryStatsRepository::new());
        let predictions = Arc::new(InMemoryPredictionRepository::new());
        let clock = fixed_clock();
        let service = PointsService::new(
            ledger.clone(),
            stats.clone(),
            predictions.clone(),
            Arc::new(InMemoryCatalogRepository::new()),
            clock.clone(),
        );
        Fixture {
            service,
            ledger,
            stats,
            predictions,
            clock,
        }
    }

    async fn seed_prediction(f: &Fixture, id: &str, show_id: &str) {
        let now = f.clock.now();
        let prediction = Prediction {
            id: id.to_string(),
            author_id: "mod".to_string(),
            template_key: "who_wins".to_string(),
            scope: PredictionScope::Show,
            show_id: show_id.to_string(),
            season_number: None,
            episode_id: None,
            params: Value::Null,
            kind: PredictionKind::Binary,
            state: PredictionState::Open,
            lock_at: now + Duration::hours(12),
            resolved_at: None,
            outcome_option_id: None,
            confidence: None,
            resolver_type: None,
            created_at: now,
            updated_at: now,
        };
        f.predictions.create_prediction(&prediction, &[]).await.unwrap();
    }

    fn pick(id: &str, user_id: &str, potential: i64, earned: i64) -> PredictionPick {
        let mut pick = PredictionPick::new("p1", "opt-a", user_id, 0.5, potential, Utc::now());
        pick.id = id.to_string();
        pick.earned_points = earned;
        pick
    }

    #[test]
    fn milestones_are_exact() {
        assert_eq!(streak_milestone_bonus(2), None);
        assert_eq!(streak_milestone_bonus(3), Some(10));
        assert_eq!(streak_milestone_bonus(4), None);
        assert_eq!(streak_milestone_bonus(7), Some(25));
        assert_eq!(streak_milestone_bonus(14), Some(50));
        assert_eq!(streak_milestone_bonus(30), Some(100));
        assert_eq!(streak_milestone_bonus(31), None);
    }

    #[tokio::test]
    async fn admin_adjustment_only_raises_lifetime_for_positive_deltas() {
        let f = fixture();
        f.service
            .admin_adjust(&admin("root"), "alice", 100, "welcome")
            .await
            .unwrap();
        let stats = f
            .service
            .admin_adjust(&admin("root"), "alice", -30, "correction")
            .await
            .unwrap();

        assert_eq!(stats.points_balance, 70);
        assert_eq!(stats.lifetime_points, 100);
    }

    #[tokio::test]
    async fn admin_adjustment_requires_admin() {
        let f = fixture();
        let result = f.service.admin_adjust(&user("mallory"), "mallory", 1000, "free").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(f.ledger.list_for_user("mallory", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn spend_requires_sufficient_balance() {
        let f = fixture();
        f.service
            .admin_adjust(&admin("root"), "alice", 50, "seed")
            .await
            .unwrap();

        let result = f.service.spend("alice", 80, "power_up", None).await;
        assert!(matches!(
            result,
            Err(AppError::InsufficientBalance {
                balance: 50,
                requested: 80
            })
        ));

        let receipt = f.service.spend("alice", 20, "power_up", None).await.unwrap();
        assert_eq!(receipt.new_balance, 30);

        let spends = f
            .ledger
            .list_for_user("alice", Some(LedgerReason::Spend), None)
            .await
            .unwrap();
        assert_eq!(spends.len(), 1);
        assert_eq!(spends[0].points, -20);

        let stats = f.stats.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(stats.lifetime_points, 50);
    }

    #[tokio::test]
    async fn spend_for_unknown_user_fails() {
        let f = fixture();
        let result = f.service.spend("ghost", 1, "anything", None).await;
        assert!(matches!(result, Err(AppError::InsufficientBalance { balance: 0, .. })));
    }

    #[tokio::test]
    async fn streak_bonus_job_pays_milestones_once_per_day() {
        let f = fixture();
        let yesterday = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let now = f.clock.now();

        // alice: 3-day streak ending yesterday; bob: 2-day streak; carol: 7 days but lapsed
        for (offset, day) in (7..=9).enumerate() {
            f.stats
                .record_pick_activity(
                    "alice",
                    &format!("a{}", offset),
                    "show-1",
                    NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                    now,
                )
                .await
                .unwrap();
        }
        for day in [8, 9] {
            f.stats
                .record_pick_activity(
                    "bob",
                    &format!("b{}", day),
                    "show-1",
                    NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                    now,
                )
                .await
                .unwrap();
        }
        for day in 1..=7 {
            f.stats
                .record_pick_activity(
                    "carol",
                    &format!("c{}", day),
                    "show-1",
                    NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                    now,
                )
                .await
                .unwrap();
        }
        assert_eq!(
            f.stats.get_user_stats("alice").await.unwrap().unwrap().last_active_day,
            Some(yesterday)
        );

        let summary = f.service.run_streak_bonus_job().await.unwrap();
        assert_eq!(summary, StreakJobSummary { checked: 2, awarded: 1 });

        let again = f.service.run_streak_bonus_job().await.unwrap();
        assert_eq!(again.awarded, 0);

        let alice = f.stats.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(alice.points_balance, 10);
        assert_eq!(alice.lifetime_points, 10);
        assert!(f.stats.get_user_stats("carol").await.unwrap().unwrap().points_balance == 0);
    }

    #[tokio::test]
    async fn void_refund_pays_half_once() {
        let f = fixture();
        let picks = vec![pick("k1", "alice", 90, 0), pick("k2", "bob", 75, 0)];

        let summary = f.service.refund_void_picks("p1", &picks).await.unwrap();
        assert_eq!(
            summary,
            RefundSummary {
                refunded_picks: 2,
                points_refunded: 45 + 37
            }
        );

        let replay = f.service.refund_void_picks("p1", &picks).await.unwrap();
        assert_eq!(replay.refunded_picks, 0);

        let alice = f.stats.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(alice.points_balance, 45);
        assert_eq!(alice.lifetime_points, 45);
    }

    #[tokio::test]
    async fn settlement_diffs_against_credited_ledger() {
        let f = fixture();

        // First resolution: alice right, bob wrong
        let first = vec![pick("k1", "alice", 90, 90), pick("k2", "bob", 70, 0)];
        let settled = f.service.settle_pick_payouts("p1", &first).await.unwrap();
        assert_eq!(settled, PayoutSettlement { entries_written: 1, net_points: 90 });

        // Replaying the same outcome writes nothing
        let replay = f.service.settle_pick_payouts("p1", &first).await.unwrap();
        assert_eq!(replay.entries_written, 0);

        // Correction: bob right, alice wrong
        let corrected = vec![pick("k1", "alice", 90, 0), pick("k2", "bob", 70, 70)];
        let settled = f.service.settle_pick_payouts("p1", &corrected).await.unwrap();
        assert_eq!(settled, PayoutSettlement { entries_written: 2, net_points: -20 });

        let alice = f.ledger.list_for_user("alice", None, None).await.unwrap();
        assert_eq!(alice[0].reason, LedgerReason::ResolutionCorrection);
        assert_eq!(alice[0].points, -90);
        let bob = f.ledger.list_for_user("bob", None, None).await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].reason, LedgerReason::PickCorrect);
        assert_eq!(bob[0].points, 70);
    }

    #[tokio::test]
    async fn tournament_payout_is_idempotent_per_user() {
        let f = fixture();
        let payouts = vec![
            TournamentPayout {
                user_id: "alice".to_string(),
                rank: 1,
                points: 300,
            },
            TournamentPayout {
                user_id: "bob".to_string(),
                rank: 2,
                points: 150,
            },
        ];

        let summary = f
            .service
            .process_tournament_payout(&admin("root"), "t1", &payouts)
            .await
            .unwrap();
        assert_eq!(summary.total_paid, 2);
        assert_eq!(summary.points_paid, 450);

        let replay = f
            .service
            .process_tournament_payout(&admin("root"), "t1", &payouts)
            .await
            .unwrap();
        assert_eq!(replay.total_paid, 0);
        assert_eq!(replay.already_paid, 2);

        let history = f.service.get_points_history("alice", None, None).await.unwrap();
        assert_eq!(history.current_balance, 300);
        assert_eq!(
            history.entries[0].tournament,
            Some(TournamentContext {
                id: "t1".to_string(),
                rank: Some(1)
            })
        );
    }

    #[tokio::test]
    async fn rebuild_restores_parity_with_ledger() {
        let f = fixture();
        f.service
            .admin_adjust(&admin("root"), "alice", 40, "seed")
            .await
            .unwrap();
        f.stats
            .apply_points("alice", 959, 959, f.clock.now())
            .await
            .unwrap();

        let stats = f.service.rebuild_user_stats("alice").await.unwrap();
        assert_eq!(stats.points_balance, 40);
        assert_eq!(stats.lifetime_points, 40);
    }

    #[tokio::test]
    async fn rebuild_recovers_dropped_events_without_double_counting() {
        let f = fixture();
        seed_prediction(&f, "p1", "show-1").await;
        seed_prediction(&f, "p2", "show-2").await;

        let mut won = pick("k1", "alice", 90, 90);
        won.activity_day = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let mut pending = PredictionPick::new("p2", "opt-b", "alice", 0.5, 60, f.clock.now());
        pending.activity_day = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        f.predictions.insert_pick(&won).await.unwrap();
        f.predictions.insert_pick(&pending).await.unwrap();
        f.service
            .settle_pick_payouts("p1", std::slice::from_ref(&won))
            .await
            .unwrap();

        // No pick or resolve event reached the stats cache
        assert!(f.stats.get_user_stats("alice").await.unwrap().is_none());

        let stats = f.service.rebuild_user_stats("alice").await.unwrap();
        assert_eq!(stats.total_picks, 2);
        assert_eq!(stats.correct_picks, 1);
        assert_eq!(stats.accuracy, 0.5);
        assert_eq!(stats.points_balance, 90);
        assert_eq!(stats.lifetime_points, 90);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(
            stats.last_active_day,
            NaiveDate::from_ymd_opt(2025, 3, 9)
        );

        let show = f.stats.get_show_stats("alice", "show-1").await.unwrap().unwrap();
        assert_eq!(show.total_predictions, 1);
        assert_eq!(show.correct_predictions, 1);

        // Late deliveries of the same events change nothing
        let counted = f
            .stats
            .record_pick_activity("alice", "p2", "show-2", pending.activity_day, f.clock.now())
            .await
            .unwrap();
        assert!(!counted);
        let credit = ResolutionCredit {
            correct: true,
            earned_points: 90,
        };
        f.stats
            .record_resolution("alice", "p1", "show-1", credit, f.clock.now())
            .await
            .unwrap();

        let stats = f.stats.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!(stats.total_picks, 2);
        assert_eq!(stats.correct_picks, 1);
        assert_eq!(stats.points_balance, 90);
    }

    #[tokio::test]
    async fn rebuild_all_covers_ledger_pick_and_cached_users() {
        let f = fixture();
        seed_prediction(&f, "p1", "show-1").await;
        f.service
            .admin_adjust(&admin("root"), "alice", 10, "seed")
            .await
            .unwrap();
        f.predictions
            .insert_pick(&PredictionPick::new("p1", "opt-a", "bob", 0.5, 70, f.clock.now()))
            .await
            .unwrap();
        f.stats
            .apply_points("carol", 5, 5, f.clock.now())
            .await
            .unwrap();

        let summary = f.service.rebuild_all_user_stats().await.unwrap();
        assert_eq!(
            summary,
            StatsRebuildSummary {
                rebuilt: 3,
                failed: 0
            }
        );
        let bob = f.stats.get_user_stats("bob").await.unwrap().unwrap();
        assert_eq!(bob.total_picks, 1);
        let carol = f.stats.get_user_stats("carol").await.unwrap().unwrap();
        assert_eq!(carol.points_balance, 0);
    }

    #[tokio::test]
    async fn breakdown_groups_by_category_and_period() {
        let f = fixture();
        f.service
            .admin_adjust(&admin("root"), "alice", 10, "old")
            .await
            .unwrap();
        f.clock.advance(Duration::days(10));

        let picks = vec![pick("k1", "alice", 90, 90)];
        f.service.settle_pick_payouts("p1", &picks).await.unwrap();
        let picks = vec![pick("k2", "alice", 61, 61)];
        f.service.settle_pick_payouts("p2", &picks).await.unwrap();
        f.service.spend("alice", 5, "badge", None).await.unwrap();

        let week = f
            .service
            .get_points_breakdown("alice", BreakdownPeriod::ThisWeek)
            .await
            .unwrap();
        assert_eq!(week.entry_count, 3);
        assert_eq!(week.breakdown.predictions, 151);
        assert_eq!(week.breakdown.spends, -5);
        assert_eq!(week.breakdown.adjustments, 0);
        assert_eq!(week.breakdown.total, 146);
        assert_eq!(week.details.largest_win, 90);
        assert_eq!(week.details.average_win, 76);

        let all = f
            .service
            .get_points_breakdown("alice", BreakdownPeriod::AllTime)
            .await
            .unwrap();
        assert_eq!(all.breakdown.adjustments, 10);
        assert_eq!(all.entry_count, 4);
    }

    #[test]
    fn lifetime_rule_is_shared_with_ledger_model() {
        assert_eq!(lifetime_contribution(LedgerReason::AdminAdjustment, -5), 0);
        assert_eq!(lifetime_contribution(LedgerReason::Refund, 45), 45);
    }
}

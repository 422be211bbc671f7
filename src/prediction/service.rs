use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    errors::PredictionError,
    models::{
        AuditAction, AuditLogEntry, OptionStats, Prediction, PredictionKind, PredictionOption,
        PredictionPick, PredictionScope, PredictionState, ResolutionEvidence, ResolverType,
    },
    repository::{PickInsert, PredictionRepository},
    scoring::{community_probability, ScoringRules},
    types::{
        CreatePredictionRequest, EpisodePredictionView, EvidenceInput, HotPrediction,
        OptionView, PickReceipt, PickStatus, PredictionView, ReconcileSummary,
        ResolutionSummary, UserPredictionItem, UserPredictionsQuery, ViewerPick,
    },
};
use crate::auth::Identity;
use crate::catalog::{CatalogRepository, Show};
use crate::clock::Clock;
use crate::event::{EventBus, ScoringEvent};
use crate::points::{service::PointsService, types::RefundSummary};
use crate::shared::{AppError, KeyedLocks};

/// Owns the prediction state machine and pick valuation
///
/// Every mutation of one prediction runs under that prediction's lock, so
/// picks, locks, resolutions and voids on the same prediction never interleave.
/// Derived stats are handed off through the event bus after the primary write.
pub struct PredictionService {
    repo: Arc<dyn PredictionRepository>,
    catalog: Arc<dyn CatalogRepository>,
    points: Arc<PointsService>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    rules: ScoringRules,
    locks: KeyedLocks,
}

impl PredictionService {
    pub fn new(
        repo: Arc<dyn PredictionRepository>,
        catalog: Arc<dyn CatalogRepository>,
        points: Arc<PointsService>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        rules: ScoringRules,
    ) -> Self {
        Self {
            repo,
            catalog,
            points,
            event_bus,
            clock,
            rules,
            locks: KeyedLocks::new(),
        }
    }

    async fn load(&self, prediction_id: &str) -> Result<Prediction, AppError> {
        self.repo
            .get_prediction(prediction_id)
            .await?
            .ok_or_else(|| PredictionError::NotFound(prediction_id.to_string()).into())
    }

    #[instrument(skip(self, author, request), fields(author_id = %author.user_id, show_id = %request.show_id))]
    pub async fn create_prediction(
        &self,
        author: &Identity,
        request: CreatePredictionRequest,
    ) -> Result<PredictionView, AppError> {
        author.require_moderator()?;

        if request.show_id.trim().is_empty() {
            return Err(AppError::Validation("show_id is required".to_string()));
        }
        if request.template_key.trim().is_empty() {
            return Err(AppError::Validation("template_key is required".to_string()));
        }

        match request.kind {
            PredictionKind::Binary if request.options.len() != 2 => {
                return Err(AppError::Validation(
                    "Binary predictions need exactly 2 options".to_string(),
                ));
            }
            PredictionKind::MultipleChoice if request.options.len() < 2 => {
                return Err(AppError::Validation(
                    "Multiple choice predictions need at least 2 options".to_string(),
                ));
            }
            _ => {}
        }
        if request.options.iter().any(|o| o.label.trim().is_empty()) {
            return Err(AppError::Validation(
                "Option labels must not be empty".to_string(),
            ));
        }

        let episode = match &request.episode_id {
            Some(episode_id) => {
                let episode = self.catalog.get_episode(episode_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Episode {} not found", episode_id))
                })?;
                if episode.show_id != request.show_id {
                    return Err(AppError::Validation(format!(
                        "Episode {} does not belong to show {}",
                        episode_id, request.show_id
                    )));
                }
                Some(episode)
            }
            None => None,
        };

        match request.scope {
            PredictionScope::Episode if episode.is_none() => {
                return Err(AppError::Validation(
                    "Episode predictions need an episode_id".to_string(),
                ));
            }
            PredictionScope::Season
                if request.season_number.is_none() && episode.is_none() =>
            {
                return Err(AppError::Validation(
                    "Season predictions need a season_number".to_string(),
                ));
            }
            _ => {}
        }

        let now = self.clock.now();
        let lock_at = request
            .lock_at
            .or_else(|| episode.as_ref().and_then(|e| e.air_date_utc))
            .ok_or_else(|| {
                AppError::Validation(
                    "lock_at is required when the episode has no air date".to_string(),
                )
            })?;
        if lock_at <= now {
            return Err(AppError::Validation(
                "lock_at must be in the future".to_string(),
            ));
        }

        let prediction = Prediction {
            id: Uuid::new_v4().to_string(),
            author_id: author.user_id.clone(),
            template_key: request.template_key,
            scope: request.scope,
            show_id: request.show_id,
            season_number: request
                .season_number
                .or_else(|| episode.as_ref().map(|e| e.season_number)),
            episode_id: request.episode_id,
            params: request.params,
            kind: request.kind,
            state: PredictionState::Open,
            lock_at,
            resolved_at: None,
            outcome_option_id: None,
            confidence: None,
            resolver_type: None,
            created_at: now,
            updated_at: now,
        };

        let options: Vec<PredictionOption> = request
            .options
            .into_iter()
            .enumerate()
            .map(|(ordinal, input)| {
                let label = input.label.trim().to_string();
                PredictionOption {
                    id: Uuid::new_v4().to_string(),
                    prediction_id: prediction.id.clone(),
                    value: input.value.unwrap_or_else(|| label.clone()),
                    label,
                    ordinal: ordinal as u32,
                    created_at: now,
                }
            })
            .collect();

        self.repo.create_prediction(&prediction, &options).await?;
        info!(prediction_id = %prediction.id, lock_at = %lock_at, "Prediction created");

        self.get_prediction(&prediction.id, None).await
    }

    /// Read model: options in display order with live counts, plus the viewer's own pick
    #[instrument(skip(self))]
    pub async fn get_prediction(
        &self,
        prediction_id: &str,
        viewer_id: Option<&str>,
    ) -> Result<PredictionView, AppError> {
        let prediction = self.load(prediction_id).await?;
        let options = self.repo.list_options(prediction_id).await?;
        let counts: HashMap<String, i64> = self
            .repo
            .option_stats(prediction_id)
            .await?
            .into_iter()
            .map(|s| (s.option_id, s.picks_count))
            .collect();
        let total_picks: i64 = counts.values().sum();

        let my_pick = match viewer_id {
            Some(viewer_id) => self
                .repo
                .get_user_pick(prediction_id, viewer_id)
                .await?
                .map(|pick| ViewerPick {
                    pick_id: pick.id,
                    option_id: pick.option_id,
                    potential_points: pick.potential_points,
                    earned_points: pick.earned_points,
                    picked_at: pick.picked_at,
                }),
            None => None,
        };

        let options = options
            .into_iter()
            .map(|option| {
                let picks_count = counts.get(&option.id).copied().unwrap_or(0);
                let percentage = if total_picks > 0 {
                    (picks_count as f64 * 100.0 / total_picks as f64).round() as u32
                } else {
                    0
                };
                OptionView {
                    is_viewer_pick: my_pick.as_ref().is_some_and(|p| p.option_id == option.id),
                    id: option.id,
                    label: option.label,
                    value: option.value,
                    ordinal: option.ordinal,
                    picks_count,
                    percentage,
                }
            })
            .collect();

        let evidence = self.repo.list_evidence(prediction_id).await?;

        Ok(PredictionView {
            prediction,
            options,
            total_picks,
            my_pick,
            evidence,
        })
    }

    /// Every prediction on the episode with live counts and the viewer's pick
    ///
    /// Resolved predictions are left out unless `include_resolved` is set.
    #[instrument(skip(self))]
    pub async fn get_episode_predictions(
        &self,
        episode_id: &str,
        viewer_id: Option<&str>,
        include_resolved: bool,
    ) -> Result<Vec<EpisodePredictionView>, AppError> {
        let now = self.clock.now();
        let predictions = self.repo.list_predictions_by_episode(episode_id).await?;

        let mut views = Vec::with_capacity(predictions.len());
        for prediction in predictions {
            if !include_resolved && prediction.state == PredictionState::Resolved {
                continue;
            }
            let time_left = (prediction.state == PredictionState::Open)
                .then(|| time_left(prediction.lock_at, now))
                .flatten();
            let view = self.get_prediction(&prediction.id, viewer_id).await?;
            views.push(EpisodePredictionView { view, time_left });
        }
        Ok(views)
    }

    /// Open predictions locking within the next day, busiest first
    ///
    /// The `limit` soonest to lock are taken, then ranked by urgency score.
    #[instrument(skip(self))]
    pub async fn get_hot_predictions(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<HotPrediction>, AppError> {
        let limit = limit.unwrap_or(10).clamp(1, 50);
        let now = self.clock.now();
        let horizon = now + Duration::hours(24);

        // Already sorted by lock time
        let due: Vec<Prediction> = self
            .repo
            .list_predictions_by_state(PredictionState::Open)
            .await?
            .into_iter()
            .filter(|p| p.lock_at >= now && p.lock_at <= horizon)
            .take(limit)
            .collect();

        let mut shows: HashMap<String, Option<Show>> = HashMap::new();
        let mut hot = Vec::with_capacity(due.len());
        for prediction in due {
            let show = self.cached_show(&mut shows, &prediction.show_id).await?;
            let total_picks: i64 = self
                .repo
                .option_stats(&prediction.id)
                .await?
                .iter()
                .map(|s| s.picks_count)
                .sum();

            let hours_left = ((prediction.lock_at - now).num_seconds() as f64 / 3600.0).max(1.0);
            hot.push(HotPrediction {
                show_title: show
                    .as_ref()
                    .map_or_else(|| "Unknown Show".to_string(), |s| s.title.clone()),
                show_slug: show.map(|s| s.slug),
                total_picks,
                urgency_score: urgency_score(total_picks, hours_left),
                hours_left: (hours_left * 10.0).round() / 10.0,
                prediction,
            });
        }

        hot.sort_by(|a, b| b.urgency_score.total_cmp(&a.urgency_score));
        Ok(hot)
    }

    /// A user's pick history, newest first, with show, episode and outcome labels
    #[instrument(skip(self))]
    pub async fn get_user_predictions(
        &self,
        user_id: &str,
        query: &UserPredictionsQuery,
    ) -> Result<Vec<UserPredictionItem>, AppError> {
        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let picks = self.repo.list_user_picks(user_id).await?;

        let mut shows: HashMap<String, Option<Show>> = HashMap::new();
        let mut items = Vec::new();
        for pick in picks {
            if items.len() >= limit {
                break;
            }
            let Some(prediction) = self.repo.get_prediction(&pick.prediction_id).await? else {
                continue;
            };
            if query
                .show_id
                .as_deref()
                .is_some_and(|show_id| show_id != prediction.show_id)
            {
                continue;
            }

            let status = match (prediction.state, prediction.outcome_option_id.as_deref()) {
                (PredictionState::Resolved, Some(winner)) if winner == pick.option_id => {
                    PickStatus::Correct
                }
                (PredictionState::Resolved, _) => PickStatus::Incorrect,
                _ => PickStatus::Pending,
            };
            if query.status.is_some_and(|wanted| wanted != status) {
                continue;
            }

            let show = self.cached_show(&mut shows, &prediction.show_id).await?;
            let episode = match &prediction.episode_id {
                Some(episode_id) => self.catalog.get_episode(episode_id).await?,
                None => None,
            };
            let options = self.repo.list_options(&prediction.id).await?;
            let label_of = |option_id: &str| {
                options
                    .iter()
                    .find(|o| o.id == option_id)
                    .map(|o| o.label.clone())
            };

            items.push(UserPredictionItem {
                pick_id: pick.id.clone(),
                picked_at: pick.picked_at,
                prediction_id: prediction.id.clone(),
                show_title: show.as_ref().map(|s| s.title.clone()),
                show_slug: show.map(|s| s.slug),
                episode_title: episode.as_ref().and_then(|e| e.title.clone()),
                season_number: episode.as_ref().map(|e| e.season_number),
                episode_number: episode.as_ref().map(|e| e.episode_number),
                template_key: prediction.template_key.clone(),
                picked_option: label_of(&pick.option_id),
                winning_option: prediction.outcome_option_id.as_deref().and_then(label_of),
                status,
                potential_points: pick.potential_points,
                earned_points: pick.earned_points,
                prediction_state: prediction.state,
            });
        }
        Ok(items)
    }

    async fn cached_show(
        &self,
        cache: &mut HashMap<String, Option<Show>>,
        show_id: &str,
    ) -> Result<Option<Show>, AppError> {
        if let Some(show) = cache.get(show_id) {
            return Ok(show.clone());
        }
        let show = self.catalog.get_show(show_id).await?;
        cache.insert(show_id.to_string(), show.clone());
        Ok(show)
    }

    /// Records a user's one-time pick and freezes its valuation
    #[instrument(skip(self))]
    pub async fn submit_pick(
        &self,
        user_id: &str,
        prediction_id: &str,
        option_id: &str,
        client_local_date: Option<NaiveDate>,
    ) -> Result<PickReceipt, AppError> {
        // Unknown ids never take a lock slot
        self.load(prediction_id).await?;
        let _guard = self.locks.lock(prediction_id).await;

        let prediction = self.load(prediction_id).await?;
        let now = self.clock.now();

        if prediction.state != PredictionState::Open {
            return Err(PredictionError::NotOpen.into());
        }
        if now >= prediction.lock_at {
            return Err(PredictionError::Locked.into());
        }
        if self.repo.get_user_pick(prediction_id, user_id).await?.is_some() {
            return Err(PredictionError::DuplicatePick.into());
        }

        let options = self.repo.list_options(prediction_id).await?;
        if !options.iter().any(|o| o.id == option_id) {
            return Err(PredictionError::InvalidOption {
                prediction_id: prediction_id.to_string(),
                option_id: option_id.to_string(),
            }
            .into());
        }

        let stats = self.repo.option_stats(prediction_id).await?;
        let probability = community_probability(&stats, option_id);
        let valuation = self.rules.score_pick(probability, prediction.lock_at, now);

        let activity_day = self.activity_day(client_local_date);
        let mut pick = PredictionPick::new(
            prediction_id,
            option_id,
            user_id,
            probability,
            valuation.potential_points,
            now,
        );
        pick.activity_day = activity_day;
        let pick = match self.repo.insert_pick(&pick).await? {
            PickInsert::Inserted(pick) => pick,
            PickInsert::Duplicate(_) => return Err(PredictionError::DuplicatePick.into()),
        };
        let picks_count = self
            .repo
            .increment_option_stat(prediction_id, option_id)
            .await?;

        debug!(
            pick_id = %pick.id,
            probability,
            early_bonus = valuation.early_bonus,
            contrarian_bonus = valuation.contrarian_bonus,
            picks_count,
            "Pick valued"
        );

        self.event_bus.emit(ScoringEvent::PickSubmitted {
            user_id: user_id.to_string(),
            prediction_id: prediction_id.to_string(),
            show_id: prediction.show_id.clone(),
            activity_day,
        });

        info!(
            pick_id = %pick.id,
            potential_points = pick.potential_points,
            "Pick submitted"
        );
        Ok(PickReceipt {
            pick_id: pick.id,
            potential_points: pick.potential_points,
        })
    }

    /// Client-supplied local day when it is plausible for some timezone, else the UTC day
    fn activity_day(&self, client_local_date: Option<NaiveDate>) -> NaiveDate {
        let today = self.clock.today();
        match client_local_date {
            Some(day)
                if Some(day) >= today.checked_sub_days(Days::new(1))
                    && Some(day) <= today.checked_add_days(Days::new(1)) =>
            {
                day
            }
            Some(day) => {
                warn!(client_local_date = %day, server_day = %today, "Implausible client date, using UTC day");
                today
            }
            None => today,
        }
    }

    /// Declares the winning option and settles every pick
    ///
    /// Re-resolving with the same option returns the current totals without
    /// writing anything. Resolving with a different option recomputes earned
    /// points from scratch and settles only the difference in the ledger.
    /// The prediction's state is written after the payouts so a failed
    /// attempt can simply be retried.
    #[instrument(skip(self, resolver, evidence), fields(resolver_id = %resolver.user_id))]
    pub async fn resolve(
        &self,
        resolver: &Identity,
        prediction_id: &str,
        winning_option_id: &str,
        evidence: Option<EvidenceInput>,
    ) -> Result<ResolutionSummary, AppError> {
        resolver.require_moderator()?;

        let _guard = self.locks.lock(prediction_id).await;

        let mut prediction = self.load(prediction_id).await?;
        let options = self.repo.list_options(prediction_id).await?;
        if !options.iter().any(|o| o.id == winning_option_id) {
            return Err(PredictionError::InvalidOption {
                prediction_id: prediction_id.to_string(),
                option_id: winning_option_id.to_string(),
            }
            .into());
        }

        let previous_outcome = match prediction.state {
            PredictionState::Void => {
                return Err(PredictionError::InvalidTransition {
                    state: prediction.state.to_string(),
                    action: "resolved".to_string(),
                }
                .into());
            }
            PredictionState::Resolved
                if prediction.outcome_option_id.as_deref() == Some(winning_option_id) =>
            {
                debug!("Already resolved with this option");
                let picks = self.repo.list_picks(prediction_id).await?;
                return Ok(summarize_resolution(&picks));
            }
            PredictionState::Resolved => prediction.outcome_option_id.clone(),
            PredictionState::Open | PredictionState::Locked => None,
        };

        let mut picks = self.repo.list_picks(prediction_id).await?;
        for pick in picks.iter_mut() {
            let earned = if pick.option_id == winning_option_id {
                pick.potential_points
            } else {
                0
            };
            if pick.earned_points != earned {
                self.repo.set_earned_points(&pick.id, earned).await?;
                pick.earned_points = earned;
            }
        }

        let settlement = self
            .points
            .settle_pick_payouts(prediction_id, &picks)
            .await?;

        let now = self.clock.now();
        if let Some(input) = evidence {
            self.repo
                .add_evidence(&ResolutionEvidence {
                    id: Uuid::new_v4().to_string(),
                    prediction_id: prediction_id.to_string(),
                    source_type: input.source_type,
                    url: input.url,
                    snippet: input.snippet,
                    timestamp_sec: input.timestamp_sec,
                    added_by: Some(resolver.user_id.clone()),
                    created_at: now,
                })
                .await?;
        }

        prediction.state = PredictionState::Resolved;
        prediction.outcome_option_id = Some(winning_option_id.to_string());
        prediction.resolved_at = Some(now);
        prediction.resolver_type = Some(ResolverType::Manual);
        prediction.updated_at = now;
        self.repo.update_prediction(&prediction).await?;

        // Picks are unique per user, so this is one event per distinct picker
        let users: BTreeSet<&str> = picks.iter().map(|p| p.user_id.as_str()).collect();
        for user_id in users {
            self.event_bus.emit(ScoringEvent::PickResolved {
                user_id: user_id.to_string(),
                prediction_id: prediction_id.to_string(),
                show_id: prediction.show_id.clone(),
            });
        }

        let summary = summarize_resolution(&picks);
        self.audit(
            Some(&resolver.user_id),
            AuditAction::PredictionResolved,
            prediction_id,
            json!({
                "winning_option_id": winning_option_id,
                "previous_outcome_option_id": previous_outcome,
                "total_picks": summary.total_picks,
                "correct_picks": summary.correct_picks,
                "points_awarded": summary.points_awarded,
                "ledger_entries_written": settlement.entries_written,
                "net_ledger_points": settlement.net_points,
            }),
        )
        .await;

        info!(
            total_picks = summary.total_picks,
            correct_picks = summary.correct_picks,
            points_awarded = summary.points_awarded,
            correction = previous_outcome.is_some(),
            "Prediction resolved"
        );
        Ok(summary)
    }

    /// Manual early lock; a no-op for anything that is not open
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn lock(&self, actor: &Identity, prediction_id: &str) -> Result<Prediction, AppError> {
        actor.require_moderator()?;

        let _guard = self.locks.lock(prediction_id).await;

        let prediction = self.load(prediction_id).await?;
        if prediction.state != PredictionState::Open {
            debug!(state = %prediction.state, "Lock ignored");
            return Ok(prediction);
        }
        self.transition_to_locked(prediction, Some(&actor.user_id), "manual")
            .await
    }

    async fn transition_to_locked(
        &self,
        mut prediction: Prediction,
        actor_id: Option<&str>,
        trigger: &str,
    ) -> Result<Prediction, AppError> {
        prediction.state = PredictionState::Locked;
        prediction.updated_at = self.clock.now();
        self.repo.update_prediction(&prediction).await?;

        self.audit(
            actor_id,
            AuditAction::PredictionLocked,
            &prediction.id,
            json!({ "trigger": trigger, "lock_at": prediction.lock_at }),
        )
        .await;

        info!(prediction_id = %prediction.id, trigger, "Prediction locked");
        Ok(prediction)
    }

    /// Scheduled sweep: locks every open prediction whose lock time has passed
    #[instrument(skip(self))]
    pub async fn lock_due_predictions(&self) -> Result<usize, AppError> {
        let now = self.clock.now();
        let due: Vec<String> = self
            .repo
            .list_predictions_by_state(PredictionState::Open)
            .await?
            .into_iter()
            .filter(|p| p.lock_at <= now)
            .map(|p| p.id)
            .collect();

        let mut locked = 0;
        for prediction_id in due {
            let _guard = self.locks.lock(&prediction_id).await;

            // Re-read under the lock; a moderator may have acted meanwhile
            let prediction = self.load(&prediction_id).await?;
            if prediction.state == PredictionState::Open && prediction.lock_at <= now {
                self.transition_to_locked(prediction, None, "schedule").await?;
                locked += 1;
            }
        }

        if locked > 0 {
            info!(locked, "Lock sweep finished");
        }
        Ok(locked)
    }

    /// Cancels the prediction and refunds half of each pick's potential
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn void(
        &self,
        actor: &Identity,
        prediction_id: &str,
    ) -> Result<RefundSummary, AppError> {
        actor.require_moderator()?;

        let _guard = self.locks.lock(prediction_id).await;

        let mut prediction = self.load(prediction_id).await?;
        match prediction.state {
            PredictionState::Void => {
                debug!("Already void");
                return Ok(RefundSummary::default());
            }
            PredictionState::Resolved => {
                return Err(PredictionError::InvalidTransition {
                    state: prediction.state.to_string(),
                    action: "voided".to_string(),
                }
                .into());
            }
            PredictionState::Open | PredictionState::Locked => {}
        }

        let picks = self.repo.list_picks(prediction_id).await?;
        let refund = self.points.refund_void_picks(prediction_id, &picks).await?;

        prediction.state = PredictionState::Void;
        prediction.outcome_option_id = None;
        prediction.updated_at = self.clock.now();
        self.repo.update_prediction(&prediction).await?;

        self.audit(
            Some(&actor.user_id),
            AuditAction::PredictionVoided,
            prediction_id,
            json!({
                "refunded_picks": refund.refunded_picks,
                "points_refunded": refund.points_refunded,
            }),
        )
        .await;

        info!(
            refunded_picks = refund.refunded_picks,
            points_refunded = refund.points_refunded,
            "Prediction voided"
        );
        Ok(refund)
    }

    /// Moves the lock time of an open prediction that nobody has picked yet
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn reschedule_lock(
        &self,
        actor: &Identity,
        prediction_id: &str,
        lock_at: DateTime<Utc>,
    ) -> Result<Prediction, AppError> {
        actor.require_moderator()?;

        let _guard = self.locks.lock(prediction_id).await;

        let mut prediction = self.load(prediction_id).await?;
        if prediction.state != PredictionState::Open {
            return Err(PredictionError::InvalidTransition {
                state: prediction.state.to_string(),
                action: "rescheduled".to_string(),
            }
            .into());
        }
        if !self.repo.list_picks(prediction_id).await?.is_empty() {
            return Err(PredictionError::LockTimeFrozen.into());
        }

        let now = self.clock.now();
        if lock_at <= now {
            return Err(AppError::Validation(
                "lock_at must be in the future".to_string(),
            ));
        }

        prediction.lock_at = lock_at;
        prediction.updated_at = now;
        self.repo.update_prediction(&prediction).await?;
        Ok(prediction)
    }

    /// Recounts option counters from the pick rows; returns how many were wrong
    #[instrument(skip(self))]
    pub async fn reconcile_option_stats(&self, prediction_id: &str) -> Result<usize, AppError> {
        let _guard = self.locks.lock(prediction_id).await;

        let options = self.repo.list_options(prediction_id).await?;
        let mut actual: HashMap<String, i64> =
            options.iter().map(|o| (o.id.clone(), 0)).collect();
        for pick in self.repo.list_picks(prediction_id).await? {
            *actual.entry(pick.option_id).or_insert(0) += 1;
        }

        let current: HashMap<String, i64> = self
            .repo
            .option_stats(prediction_id)
            .await?
            .into_iter()
            .map(|s| (s.option_id, s.picks_count))
            .collect();

        let corrected = actual
            .iter()
            .filter(|(option_id, count)| current.get(*option_id) != Some(*count))
            .count()
            + current.keys().filter(|id| !actual.contains_key(*id)).count();
        if corrected == 0 {
            return Ok(0);
        }

        let mut stats: Vec<OptionStats> = actual
            .into_iter()
            .map(|(option_id, picks_count)| OptionStats {
                prediction_id: prediction_id.to_string(),
                option_id,
                picks_count,
            })
            .collect();
        stats.sort_by(|a, b| a.option_id.cmp(&b.option_id));
        self.repo.replace_option_stats(prediction_id, &stats).await?;

        warn!(corrected, "Option stats drifted from picks and were recounted");
        Ok(corrected)
    }

    /// Recounts option counters for every prediction that can still change
    #[instrument(skip(self))]
    pub async fn reconcile_all_option_stats(&self) -> Result<ReconcileSummary, AppError> {
        let mut summary = ReconcileSummary::default();
        for state in [PredictionState::Open, PredictionState::Locked] {
            for prediction in self.repo.list_predictions_by_state(state).await? {
                summary.predictions_checked += 1;
                summary.counters_corrected += self.reconcile_option_stats(&prediction.id).await?;
            }
        }
        Ok(summary)
    }

    /// Audit writes are best effort; the state change has already committed
    async fn audit(
        &self,
        actor_id: Option<&str>,
        action: AuditAction,
        prediction_id: &str,
        metadata: serde_json::Value,
    ) {
        let entry =
            AuditLogEntry::for_prediction(actor_id, action, prediction_id, metadata, self.clock.now());
        if let Err(e) = self.repo.append_audit(&entry).await {
            warn!(prediction_id, action = %action, error = %e, "Failed to write audit record");
        }
    }
}

fn summarize_resolution(picks: &[PredictionPick]) -> ResolutionSummary {
    let correct: Vec<&PredictionPick> = picks.iter().filter(|p| p.earned_points > 0).collect();
    ResolutionSummary {
        total_picks: picks.len(),
        correct_picks: correct.len(),
        points_awarded: correct.iter().map(|p| p.earned_points).sum(),
    }
}

/// Remaining time before `lock_at` as "5h 12m", or "12m" under an hour
fn time_left(lock_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<String> {
    if lock_at <= now {
        return None;
    }
    let minutes_left = (lock_at - now).num_minutes();
    let (hours, minutes) = (minutes_left / 60, minutes_left % 60);
    Some(if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    })
}

/// Picks per hour since the prediction entered its last day, weighted by up to six hours left
fn urgency_score(total_picks: i64, hours_left: f64) -> f64 {
    let picks_per_hour = total_picks as f64 / (24.0 - hours_left).max(1.0);
    picks_per_hour * hours_left.min(6.0)
}

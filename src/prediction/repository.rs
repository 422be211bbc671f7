use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{
    AuditLogEntry, OptionStats, Prediction, PredictionOption, PredictionPick, PredictionState,
    ResolutionEvidence,
};
use crate::shared::AppError;

/// Outcome of attempting to store a pick
#[derive(Debug, Clone, PartialEq)]
pub enum PickInsert {
    Inserted(PredictionPick),
    /// A pick by this user for this prediction already exists
    Duplicate(PredictionPick),
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn create_prediction(
        &self,
        prediction: &Prediction,
        options: &[PredictionOption],
    ) -> Result<(), AppError>;
    async fn get_prediction(&self, prediction_id: &str) -> Result<Option<Prediction>, AppError>;
    async fn update_prediction(&self, prediction: &Prediction) -> Result<(), AppError>;
    async fn list_predictions_by_state(
        &self,
        state: PredictionState,
    ) -> Result<Vec<Prediction>, AppError>;
    /// Every prediction attached to the episode, oldest first
    async fn list_predictions_by_episode(
        &self,
        episode_id: &str,
    ) -> Result<Vec<Prediction>, AppError>;

    /// Options ordered by ordinal
    async fn list_options(&self, prediction_id: &str) -> Result<Vec<PredictionOption>, AppError>;

    /// Stores the pick unless (user, prediction) already has one
    async fn insert_pick(&self, pick: &PredictionPick) -> Result<PickInsert, AppError>;
    async fn get_user_pick(
        &self,
        prediction_id: &str,
        user_id: &str,
    ) -> Result<Option<PredictionPick>, AppError>;
    async fn list_picks(&self, prediction_id: &str) -> Result<Vec<PredictionPick>, AppError>;
    /// The user's picks, newest first
    async fn list_user_picks(&self, user_id: &str) -> Result<Vec<PredictionPick>, AppError>;
    /// Every user with at least one pick, sorted
    async fn list_picking_user_ids(&self) -> Result<Vec<String>, AppError>;
    async fn set_earned_points(&self, pick_id: &str, earned_points: i64) -> Result<(), AppError>;

    async fn option_stats(&self, prediction_id: &str) -> Result<Vec<OptionStats>, AppError>;
    /// Atomic read-modify-write of one option counter; returns the new count
    async fn increment_option_stat(
        &self,
        prediction_id: &str,
        option_id: &str,
    ) -> Result<i64, AppError>;
    /// Overwrites every counter of the prediction with the given values
    async fn replace_option_stats(
        &self,
        prediction_id: &str,
        stats: &[OptionStats],
    ) -> Result<(), AppError>;

    async fn add_evidence(&self, evidence: &ResolutionEvidence) -> Result<(), AppError>;
    async fn list_evidence(&self, prediction_id: &str)
        -> Result<Vec<ResolutionEvidence>, AppError>;
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), AppError>;
    async fn list_audit(&self, entity_id: &str) -> Result<Vec<AuditLogEntry>, AppError>;
}

#[derive(Debug, Default)]
struct PredictionStore {
    predictions: HashMap<String, Prediction>,
    options: HashMap<String, Vec<PredictionOption>>,
    /// pick_id -> pick
    picks: HashMap<String, PredictionPick>,
    /// (prediction_id, user_id) -> pick_id
    pick_index: HashMap<(String, String), String>,
    option_stats: HashMap<(String, String), i64>,
    evidence: Vec<ResolutionEvidence>,
    audit: Vec<AuditLogEntry>,
}

/// In-memory implementation of PredictionRepository for development and testing
#[derive(Debug, Default)]
pub struct InMemoryPredictionRepository {
    store: RwLock<PredictionStore>,
}

impl InMemoryPredictionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionRepository for InMemoryPredictionRepository {
    #[instrument(skip(self, prediction, options), fields(prediction_id = %prediction.id))]
    async fn create_prediction(
        &self,
        prediction: &Prediction,
        options: &[PredictionOption],
    ) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        if store.predictions.contains_key(&prediction.id) {
            warn!("Prediction already exists in memory");
            return Err(AppError::DatabaseError(
                "Prediction already exists".to_string(),
            ));
        }

        let mut options = options.to_vec();
        options.sort_by_key(|o| o.ordinal);
        for option in &options {
            store
                .option_stats
                .insert((prediction.id.clone(), option.id.clone()), 0);
        }
        store.options.insert(prediction.id.clone(), options);
        store
            .predictions
            .insert(prediction.id.clone(), prediction.clone());

        debug!("Prediction created in memory");
        Ok(())
    }

    async fn get_prediction(&self, prediction_id: &str) -> Result<Option<Prediction>, AppError> {
        let store = self.store.read().await;
        Ok(store.predictions.get(prediction_id).cloned())
    }

    #[instrument(skip(self, prediction), fields(prediction_id = %prediction.id, state = %prediction.state))]
    async fn update_prediction(&self, prediction: &Prediction) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        match store.predictions.get_mut(&prediction.id) {
            Some(existing) => {
                *existing = prediction.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Prediction {} not found",
                prediction.id
            ))),
        }
    }

    async fn list_predictions_by_state(
        &self,
        state: PredictionState,
    ) -> Result<Vec<Prediction>, AppError> {
        let store = self.store.read().await;
        let mut predictions: Vec<Prediction> = store
            .predictions
            .values()
            .filter(|p| p.state == state)
            .cloned()
            .collect();
        predictions.sort_by(|a, b| a.lock_at.cmp(&b.lock_at).then_with(|| a.id.cmp(&b.id)));
        Ok(predictions)
    }

    async fn list_predictions_by_episode(
        &self,
        episode_id: &str,
    ) -> Result<Vec<Prediction>, AppError> {
        let store = self.store.read().await;
        let mut predictions: Vec<Prediction> = store
            .predictions
            .values()
            .filter(|p| p.episode_id.as_deref() == Some(episode_id))
            .cloned()
            .collect();
        predictions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(predictions)
    }

    async fn list_options(&self, prediction_id: &str) -> Result<Vec<PredictionOption>, AppError> {
        let store = self.store.read().await;
        Ok(store.options.get(prediction_id).cloned().unwrap_or_default())
    }

    #[instrument(skip(self, pick), fields(prediction_id = %pick.prediction_id, user_id = %pick.user_id))]
    async fn insert_pick(&self, pick: &PredictionPick) -> Result<PickInsert, AppError> {
        let mut store = self.store.write().await;
        let key = (pick.prediction_id.clone(), pick.user_id.clone());

        if let Some(existing) = store
            .pick_index
            .get(&key)
            .and_then(|pick_id| store.picks.get(pick_id))
        {
            debug!(existing_pick_id = %existing.id, "Duplicate pick rejected");
            return Ok(PickInsert::Duplicate(existing.clone()));
        }

        store.pick_index.insert(key, pick.id.clone());
        store.picks.insert(pick.id.clone(), pick.clone());
        Ok(PickInsert::Inserted(pick.clone()))
    }

    async fn get_user_pick(
        &self,
        prediction_id: &str,
        user_id: &str,
    ) -> Result<Option<PredictionPick>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .pick_index
            .get(&(prediction_id.to_string(), user_id.to_string()))
            .and_then(|pick_id| store.picks.get(pick_id))
            .cloned())
    }

    async fn list_picks(&self, prediction_id: &str) -> Result<Vec<PredictionPick>, AppError> {
        let store = self.store.read().await;
        let mut picks: Vec<PredictionPick> = store
            .picks
            .values()
            .filter(|p| p.prediction_id == prediction_id)
            .cloned()
            .collect();
        picks.sort_by(|a, b| a.picked_at.cmp(&b.picked_at).then_with(|| a.id.cmp(&b.id)));
        Ok(picks)
    }

    async fn list_user_picks(&self, user_id: &str) -> Result<Vec<PredictionPick>, AppError> {
        let store = self.store.read().await;
        let mut picks: Vec<PredictionPick> = store
            .picks
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        picks.sort_by(|a, b| b.picked_at.cmp(&a.picked_at).then_with(|| b.id.cmp(&a.id)));
        Ok(picks)
    }

    async fn list_picking_user_ids(&self) -> Result<Vec<String>, AppError> {
        let store = self.store.read().await;
        let users: BTreeSet<String> = store.picks.values().map(|p| p.user_id.clone()).collect();
        Ok(users.into_iter().collect())
    }

    async fn set_earned_points(&self, pick_id: &str, earned_points: i64) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        let pick = store
            .picks
            .get_mut(pick_id)
            .ok_or_else(|| AppError::NotFound(format!("Pick {} not found", pick_id)))?;
        pick.earned_points = earned_points;
        Ok(())
    }

    async fn option_stats(&self, prediction_id: &str) -> Result<Vec<OptionStats>, AppError> {
        let store = self.store.read().await;
        let mut stats: Vec<OptionStats> = store
            .option_stats
            .iter()
            .filter(|((pid, _), _)| pid == prediction_id)
            .map(|((pid, oid), count)| OptionStats {
                prediction_id: pid.clone(),
                option_id: oid.clone(),
                picks_count: *count,
            })
            .collect();
        stats.sort_by(|a, b| a.option_id.cmp(&b.option_id));
        Ok(stats)
    }

    async fn increment_option_stat(
        &self,
        prediction_id: &str,
        option_id: &str,
    ) -> Result<i64, AppError> {
        let mut store = self.store.write().await;
        let count = store
            .option_stats
            .entry((prediction_id.to_string(), option_id.to_string()))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    #[instrument(skip(self, stats))]
    async fn replace_option_stats(
        &self,
        prediction_id: &str,
        stats: &[OptionStats],
    ) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        store.option_stats.retain(|(pid, _), _| pid != prediction_id);
        for stat in stats {
            store.option_stats.insert(
                (prediction_id.to_string(), stat.option_id.clone()),
                stat.picks_count,
            );
        }
        Ok(())
    }

    async fn add_evidence(&self, evidence: &ResolutionEvidence) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        store.evidence.push(evidence.clone());
        Ok(())
    }

    async fn list_evidence(
        &self,
        prediction_id: &str,
    ) -> Result<Vec<ResolutionEvidence>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .evidence
            .iter()
            .filter(|e| e.prediction_id == prediction_id)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        store.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, entity_id: &str) -> Result<Vec<AuditLogEntry>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .audit
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

use async_trait::async_trait;
use std::sync::Arc;

use super::{service::StatsService, StatsError};
use crate::event::{EventError, EventHandler, ScoringEvent};

/// Applies scoring events to the stats aggregates in the background
pub struct StatsEventHandler {
    stats_service: Arc<StatsService>,
}

impl StatsEventHandler {
    pub fn new(stats_service: Arc<StatsService>) -> Self {
        Self { stats_service }
    }
}

impl From<StatsError> for EventError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::Repository(_) | StatsError::NotReady(_) => {
                EventError::retryable(err.to_string())
            }
            StatsError::Validation(_) => EventError::non_retryable(err.to_string()),
        }
    }
}

#[async_trait]
impl EventHandler for StatsEventHandler {
    async fn handle(&self, event: &ScoringEvent) -> Result<(), EventError> {
        match event {
            ScoringEvent::PickSubmitted {
                user_id,
                prediction_id,
                show_id,
                activity_day,
            } => {
                self.stats_service
                    .update_stats_after_pick(user_id, prediction_id, show_id, *activity_day)
                    .await?
            }
            ScoringEvent::PickResolved {
                user_id,
                prediction_id,
                show_id,
            } => {
                self.stats_service
                    .update_stats_after_resolve(user_id, prediction_id, show_id)
                    .await?
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "StatsEventHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_errors_are_retried() {
        let err: EventError = StatsError::NotReady("pick not counted".to_string()).into();
        assert!(err.is_retryable());

        let err: EventError = StatsError::Validation("bad".to_string()).into();
        assert!(!err.is_retryable());
    }
}

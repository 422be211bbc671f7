use chrono::{Duration, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;

use speculate::{
    auth::{Identity, Role},
    catalog::{Episode, Show},
    prediction::{
        models::{PredictionKind, PredictionScope},
        types::{CreatePredictionRequest, OptionInput, PredictionView},
    },
    stats::InMemoryStatsRepository,
    AppConfig, AppState, Clock, EventBus, EventDispatcher, FixedClock, Repositories, StatsEventHandler,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub _dispatcher_handle: Option<JoinHandle<()>>,
}

pub struct TestSetupBuilder {
    with_dispatcher: bool,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            with_dispatcher: true,
        }
    }

    /// Skip the background stats handler, for tests driving stats by hand
    #[allow(dead_code)]
    pub fn without_dispatcher(mut self) -> Self {
        self.with_dispatcher = false;
        self
    }

    pub async fn build(self) -> TestSetup {
        // Monday 2025-03-10 12:00 UTC
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
        ));
        let config = AppConfig::default();
        let event_bus = EventBus::new(config.event_bus_capacity);
        let state = AppState::new(
            &config,
            Repositories::in_memory(),
            clock.clone(),
            event_bus.clone(),
        );

        seed_catalog(&state, &clock).await;

        let dispatcher_handle = self.with_dispatcher.then(|| {
            let mut dispatcher = EventDispatcher::new(event_bus)
                .with_max_retries(5)
                .with_base_backoff(StdDuration::from_millis(10))
                .with_handler_timeout(StdDuration::from_secs(2));
            dispatcher.add_handler(Arc::new(StatsEventHandler::new(
                state.stats_service.clone(),
            )));
            dispatcher.start_listening()
        });

        TestSetup {
            state,
            clock,
            _dispatcher_handle: dispatcher_handle,
        }
    }
}

async fn seed_catalog(state: &AppState, clock: &FixedClock) {
    let catalog = &state.repositories.catalog;
    catalog
        .upsert_show(Show {
            id: "show-1".to_string(),
            title: "Harbor Lights".to_string(),
            slug: "harbor-lights".to_string(),
        })
        .await
        .unwrap();
    catalog
        .upsert_episode(Episode {
            id: "ep-5".to_string(),
            show_id: "show-1".to_string(),
            season_number: 2,
            episode_number: 5,
            title: Some("Low Tide".to_string()),
            air_date_utc: Some(clock.now() + Duration::hours(12)),
        })
        .await
        .unwrap();
}

#[allow(dead_code)]
impl TestSetup {
    pub fn moderator(&self) -> Identity {
        Identity::new("mod", Role::Moderator)
    }

    pub fn admin(&self) -> Identity {
        Identity::new("admin", Role::Admin)
    }

    /// A second process over the same stored data: every repository is shared
    /// except the stats cache, which starts empty and is rebuilt as at boot
    pub async fn restarted(&self) -> AppState {
        let repositories = Repositories {
            stats: Arc::new(InMemoryStatsRepository::new()),
            ..self.state.repositories.clone()
        };
        let config = AppConfig::default();
        let state = AppState::new(
            &config,
            repositories,
            self.clock.clone(),
            EventBus::new(config.event_bus_capacity),
        );
        state
            .points_service
            .rebuild_all_user_stats()
            .await
            .unwrap();
        state
    }

    pub fn token(&self, user_id: &str, role: Role) -> String {
        self.state
            .token_config
            .create_token(user_id, role, Duration::hours(1))
            .unwrap()
    }

    /// Binary show-scoped prediction locking `hours` from now
    pub async fn binary_prediction(&self, hours: i64) -> PredictionView {
        self.prediction(PredictionKind::Binary, &["Yes", "No"], hours)
            .await
    }

    pub async fn prediction(
        &self,
        kind: PredictionKind,
        labels: &[&str],
        hours: i64,
    ) -> PredictionView {
        let request = CreatePredictionRequest {
            show_id: "show-1".to_string(),
            scope: PredictionScope::Show,
            episode_id: None,
            season_number: None,
            template_key: "finale_twist".to_string(),
            params: serde_json::Value::Null,
            kind,
            options: labels
                .iter()
                .map(|label| OptionInput {
                    label: label.to_string(),
                    value: None,
                })
                .collect(),
            lock_at: Some(self.clock.now() + Duration::hours(hours)),
        };
        self.state
            .prediction_service
            .create_prediction(&self.moderator(), request)
            .await
            .unwrap()
    }
}

/// Polls `check` until it returns true, panicking after about two seconds
#[allow(dead_code)]
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

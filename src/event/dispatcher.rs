use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{
    bus::EventBus,
    events::ScoringEvent,
    handler::{EventError, EventHandler},
};

/// Routes events from the EventBus to registered handlers
///
/// Each delivery runs in its own task with a timeout and bounded retries,
/// so one failing handler never affects another or the emitting request.
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
    event_bus: EventBus,
    handler_timeout: Duration,
    max_retries: u32,
    base_backoff: Duration,
}

impl EventDispatcher {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            handlers: Vec::new(),
            event_bus,
            handler_timeout: Duration::from_secs(5),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        info!(handler_name = handler.name(), "Registering event handler");
        self.handlers.push(handler);
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Subscribes to the bus and spawns the dispatch loop
    ///
    /// The subscription is taken before this returns, so events emitted
    /// afterwards are never missed.
    pub fn start_listening(self) -> JoinHandle<()> {
        let handlers = self.handlers;
        let mut receiver = self.event_bus.subscribe();
        let handler_timeout = self.handler_timeout;
        let max_retries = self.max_retries;
        let base_backoff = self.base_backoff;

        info!(
            handler_count = handlers.len(),
            timeout_ms = handler_timeout.as_millis() as u64,
            max_retries = max_retries,
            "Starting event dispatcher"
        );

        tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Event dispatcher lagged; events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                debug!(
                    event_type = event.event_type(),
                    user_id = event.user_id(),
                    prediction_id = event.prediction_id(),
                    "Dispatching event to {} handlers",
                    handlers.len()
                );

                for handler in &handlers {
                    let event = event.clone();
                    let handler = handler.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_with_retry(
                            handler,
                            event,
                            handler_timeout,
                            max_retries,
                            base_backoff,
                        )
                        .await
                        {
                            error!(error = ?e, "Handler failed permanently");
                        }
                    });
                }
            }

            info!("Event dispatcher stopped listening");
        })
    }

    async fn handle_with_retry(
        handler: Arc<dyn EventHandler>,
        event: ScoringEvent,
        handler_timeout: Duration,
        max_retries: u32,
        base_backoff: Duration,
    ) -> Result<(), EventError> {
        let handler_name = handler.name();
        let event_type = event.event_type();

        let mut attempt = 0;
        loop {
            let error = match timeout(handler_timeout, handler.handle(&event)).await {
                Ok(Ok(())) => {
                    if attempt > 0 {
                        info!(
                            handler = handler_name,
                            event_type = event_type,
                            attempt = attempt + 1,
                            "Handler succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(_elapsed) => EventError::Timeout,
            };

            if !error.is_retryable() || attempt >= max_retries {
                error!(
                    handler = handler_name,
                    event_type = event_type,
                    user_id = event.user_id(),
                    attempt = attempt + 1,
                    error = %error,
                    "Handler gave up"
                );
                return Err(error);
            }

            warn!(
                handler = handler_name,
                event_type = event_type,
                attempt = attempt + 1,
                error = %error,
                "Handler failed, will retry"
            );
            tokio::time::sleep(backoff_delay(base_backoff, attempt)).await;
            attempt += 1;
        }
    }
}

/// Exponential backoff with up to 50% random jitter
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2_u32.saturating_pow(attempt.min(16)));
    let jitter_cap = (exponential.as_millis() as u64 / 2).max(1);
    let jitter = rand::rng().random_range(0..jitter_cap);
    exponential + Duration::from_millis(jitter)
}

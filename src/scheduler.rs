use chrono::{DateTime, Days, NaiveTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info, instrument};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::shared::{AppError, AppState};

/// Time from `now` until the next occurrence of `hour`:00 UTC
pub fn until_next_hour(now: DateTime<Utc>, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        now.date_naive()
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(at).and_utc())
            .unwrap_or(today)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Runs `job` once a day at `hour`:00 UTC, forever
#[instrument(skip(clock, job))]
pub async fn run_daily<F, Fut>(name: &'static str, hour: u32, clock: Arc<dyn Clock>, job: F)
where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = Result<String, AppError>> + Send,
{
    loop {
        let wait = until_next_hour(clock.now(), hour);
        info!(job = name, wait_secs = wait.as_secs(), "Daily job scheduled");
        sleep(wait).await;

        match job().await {
            Ok(summary) => info!(job = name, summary = %summary, "Daily job finished"),
            Err(e) => error!(job = name, error = %e, "Daily job failed"),
        }
    }
}

/// Runs `job` every `period`, forever
#[instrument(skip(job))]
pub async fn run_every<F, Fut>(name: &'static str, period: Duration, job: F)
where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = Result<String, AppError>> + Send,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = job().await {
            error!(job = name, error = %e, "Periodic job failed");
        }
    }
}

/// Spawns the streak bonus, leaderboard, lock sweep, option-stat and stats rebuild jobs
pub fn spawn_background_jobs(state: &AppState, config: &AppConfig) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    let points = state.points_service.clone();
    handles.push(tokio::spawn(run_daily(
        "streak_bonus",
        config.streak_bonus_hour_utc,
        state.clock.clone(),
        move || {
            let points = points.clone();
            async move {
                let summary = points.run_streak_bonus_job().await?;
                Ok(format!("{} checked, {} awarded", summary.checked, summary.awarded))
            }
        },
    )));

    let leaderboards = state.leaderboard_service.clone();
    handles.push(tokio::spawn(run_daily(
        "leaderboards",
        config.leaderboard_hour_utc,
        state.clock.clone(),
        move || {
            let leaderboards = leaderboards.clone();
            async move {
                let snapshots = leaderboards.compute_all().await;
                Ok(format!("{} snapshots", snapshots.len()))
            }
        },
    )));

    let predictions = state.prediction_service.clone();
    handles.push(tokio::spawn(run_every(
        "lock_sweep",
        config.lock_sweep_interval,
        move || {
            let predictions = predictions.clone();
            async move {
                let locked = predictions.lock_due_predictions().await?;
                Ok(format!("{} locked", locked))
            }
        },
    )));

    let predictions = state.prediction_service.clone();
    handles.push(tokio::spawn(run_every(
        "option_stats_reconcile",
        config.option_stats_reconcile_interval,
        move || {
            let predictions = predictions.clone();
            async move {
                let summary = predictions.reconcile_all_option_stats().await?;
                Ok(format!(
                    "{} predictions, {} counters corrected",
                    summary.predictions_checked, summary.counters_corrected
                ))
            }
        },
    )));

    let points = state.points_service.clone();
    handles.push(tokio::spawn(run_every(
        "stats_rebuild",
        config.stats_rebuild_interval,
        move || {
            let points = points.clone();
            async move {
                let summary = points.rebuild_all_user_stats().await?;
                Ok(format!("{} rebuilt, {} failed", summary.rebuilt, summary.failed))
            }
        },
    )));

    info!(jobs = handles.len(), "Background jobs started");
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(0, 30, 1, 30 * 60)]
    #[case(0, 0, 1, 60 * 60)]
    #[case(1, 0, 1, 24 * 60 * 60)]
    #[case(23, 0, 2, 3 * 60 * 60)]
    fn waits_until_next_occurrence(
        #[case] hour_now: u32,
        #[case] minute_now: u32,
        #[case] target: u32,
        #[case] expected_secs: u64,
    ) {
        let now = Utc
            .with_ymd_and_hms(2025, 3, 10, hour_now, minute_now, 0)
            .unwrap();
        assert_eq!(until_next_hour(now, target).as_secs(), expected_secs);
    }
}

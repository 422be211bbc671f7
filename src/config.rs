use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::prediction::scoring::ScoringRules;

/// Runtime configuration, read from the environment with defaults
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// When set, the points ledger and leaderboard snapshots are stored in Postgres
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub leaderboard_top_n: usize,
    pub streak_bonus_hour_utc: u32,
    pub leaderboard_hour_utc: u32,
    pub lock_sweep_interval: Duration,
    pub option_stats_reconcile_interval: Duration,
    /// How often every user's stats cache is rebuilt from picks and the ledger
    pub stats_rebuild_interval: Duration,
    pub event_bus_capacity: usize,
    pub stats_max_retries: u32,
    pub stats_handler_timeout: Duration,
    pub scoring: ScoringRules,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            jwt_secret: "your-secret-key-change-in-production".to_string(),
            leaderboard_top_n: 100,
            streak_bonus_hour_utc: 1,
            leaderboard_hour_utc: 2,
            lock_sweep_interval: Duration::from_secs(60),
            option_stats_reconcile_interval: Duration::from_secs(15 * 60),
            stats_rebuild_interval: Duration::from_secs(60 * 60),
            event_bus_capacity: 1024,
            stats_max_retries: 3,
            stats_handler_timeout: Duration::from_millis(5000),
            scoring: ScoringRules::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            leaderboard_top_n: parse_env("LEADERBOARD_TOP_N", defaults.leaderboard_top_n),
            streak_bonus_hour_utc: parse_env("STREAK_BONUS_HOUR_UTC", defaults.streak_bonus_hour_utc),
            leaderboard_hour_utc: parse_env("LEADERBOARD_HOUR_UTC", defaults.leaderboard_hour_utc),
            lock_sweep_interval: Duration::from_secs(parse_env(
                "LOCK_SWEEP_INTERVAL_SECS",
                defaults.lock_sweep_interval.as_secs(),
            )),
            option_stats_reconcile_interval: Duration::from_secs(parse_env(
                "OPTION_STATS_RECONCILE_INTERVAL_SECS",
                defaults.option_stats_reconcile_interval.as_secs(),
            )),
            stats_rebuild_interval: Duration::from_secs(parse_env(
                "STATS_REBUILD_INTERVAL_SECS",
                defaults.stats_rebuild_interval.as_secs(),
            )),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
            stats_max_retries: parse_env("STATS_MAX_RETRIES", defaults.stats_max_retries),
            stats_handler_timeout: Duration::from_millis(parse_env(
                "STATS_HANDLER_TIMEOUT_MS",
                defaults.stats_handler_timeout.as_millis() as u64,
            )),
            scoring: defaults.scoring,
        };

        config.validated()
    }

    fn validated(mut self) -> Self {
        if self.streak_bonus_hour_utc > 23 {
            warn!(hour = self.streak_bonus_hour_utc, "Invalid streak bonus hour, using 1");
            self.streak_bonus_hour_utc = 1;
        }
        if self.leaderboard_hour_utc > 23 {
            warn!(hour = self.leaderboard_hour_utc, "Invalid leaderboard hour, using 2");
            self.leaderboard_hour_utc = 2;
        }
        if self.leaderboard_top_n == 0 {
            warn!("LEADERBOARD_TOP_N must be positive, using 100");
            self.leaderboard_top_n = 100;
        }
        if self.stats_rebuild_interval.is_zero() {
            warn!("STATS_REBUILD_INTERVAL_SECS must be positive, using 3600");
            self.stats_rebuild_interval = Duration::from_secs(60 * 60);
        }
        if self.event_bus_capacity == 0 {
            self.event_bus_capacity = 1024;
        }
        self
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Could not parse environment variable, using default");
            default
        }),
        Err(_) => default,
    }
}

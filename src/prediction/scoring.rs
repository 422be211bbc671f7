use chrono::{DateTime, Utc};

use super::models::OptionStats;

/// Point constants for pick valuation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRules {
    pub base_points: i64,
    pub early_bonus_step_hours: i64,
    pub early_bonus_per_step: i64,
    /// Probability below which the large contrarian bonus applies
    pub strong_contrarian_below: f64,
    pub strong_contrarian_bonus: i64,
    pub contrarian_below: f64,
    pub contrarian_bonus: i64,
    pub max_points: i64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            base_points: 50,
            early_bonus_step_hours: 6,
            early_bonus_per_step: 10,
            strong_contrarian_below: 0.20,
            strong_contrarian_bonus: 40,
            contrarian_below: 0.40,
            contrarian_bonus: 20,
            max_points: 200,
        }
    }
}

/// Breakdown of a pick's frozen valuation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickValuation {
    pub probability: f64,
    pub early_bonus: i64,
    pub contrarian_bonus: i64,
    pub potential_points: i64,
}

/// Share of existing picks that chose `option_id`; 0.5 when nobody has picked yet
pub fn community_probability(stats: &[OptionStats], option_id: &str) -> f64 {
    let total: i64 = stats.iter().map(|s| s.picks_count).sum();
    if total <= 0 {
        return 0.5;
    }

    let chosen = stats
        .iter()
        .find(|s| s.option_id == option_id)
        .map(|s| s.picks_count)
        .unwrap_or(0);

    chosen as f64 / total as f64
}

impl ScoringRules {
    /// Values a pick made at `now` against a prediction locking at `lock_at`
    pub fn score_pick(
        &self,
        probability: f64,
        lock_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PickValuation {
        let whole_hours = (lock_at - now).num_hours().max(0);
        let early_bonus = if self.early_bonus_step_hours > 0 {
            (whole_hours / self.early_bonus_step_hours) * self.early_bonus_per_step
        } else {
            0
        };

        let contrarian_bonus = if probability < self.strong_contrarian_below {
            self.strong_contrarian_bonus
        } else if probability < self.contrarian_below {
            self.contrarian_bonus
        } else {
            0
        };

        let potential_points = (self.base_points + early_bonus + contrarian_bonus)
            .min(self.max_points)
            .max(0);

        PickValuation {
            probability,
            early_bonus,
            contrarian_bonus,
            potential_points,
        }
    }

    /// Half of the frozen potential, floored
    pub fn void_refund(potential_points: i64) -> i64 {
        potential_points.max(0) / 2
    }
}

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::models::LeaderboardEntry;
use crate::points::models::LedgerEntry;
use crate::stats::UserStats;

/// Orders by score descending, then user id ascending, and assigns ranks 1..=N
fn rank(mut scored: Vec<(String, i64, Option<f64>)>, top_n: usize) -> Vec<LeaderboardEntry> {
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(index, (user_id, score, rating))| LeaderboardEntry {
            rank: index as u32 + 1,
            user_id,
            score,
            rating,
        })
        .collect()
}

/// All-time ranking by lifetime points, rated by accuracy
pub fn rank_by_lifetime(stats: &[UserStats], top_n: usize) -> Vec<LeaderboardEntry> {
    rank(
        stats
            .iter()
            .map(|s| (s.user_id.clone(), s.lifetime_points, Some(s.accuracy)))
            .collect(),
        top_n,
    )
}

/// Ranking by the sum of ledger points created at or after `since`
///
/// The rating is each user's current global accuracy, not a historical value.
pub fn rank_by_window(
    entries: &[LedgerEntry],
    since: DateTime<Utc>,
    accuracy: &HashMap<String, f64>,
    top_n: usize,
) -> Vec<LeaderboardEntry> {
    let mut totals: HashMap<&str, i64> = HashMap::new();
    for entry in entries.iter().filter(|e| e.created_at >= since) {
        *totals.entry(entry.user_id.as_str()).or_insert(0) += entry.points;
    }

    rank(
        totals
            .into_iter()
            .map(|(user_id, score)| {
                let rating = accuracy.get(user_id).copied().unwrap_or(0.0);
                (user_id.to_string(), score, Some(rating))
            })
            .collect(),
        top_n,
    )
}

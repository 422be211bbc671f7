use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

use super::models::{LedgerEntry, LedgerReason};

#[derive(Debug, Clone, Deserialize)]
pub struct AdminAdjustRequest {
    pub user_id: String,
    pub points: i64,
    pub note: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpendRequest {
    pub amount: i64,
    pub reason: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpendReceipt {
    pub new_balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceResponse {
    pub user_id: String,
    pub points_balance: i64,
    pub lifetime_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentPayout {
    pub user_id: String,
    pub rank: u32,
    pub points: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TournamentPayoutRequest {
    pub payouts: Vec<TournamentPayout>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PayoutSummary {
    pub total_paid: usize,
    pub points_paid: i64,
    /// Users skipped because this tournament already paid them
    pub already_paid: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefundSummary {
    pub refunded_picks: usize,
    pub points_refunded: i64,
}

/// Ledger writes made while settling a resolution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PayoutSettlement {
    pub entries_written: usize,
    pub net_points: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreakJobSummary {
    pub checked: usize,
    pub awarded: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsRebuildSummary {
    pub rebuilt: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub reason: Option<LedgerReason>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionContext {
    pub id: String,
    pub template_key: String,
    pub show_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentContext {
    pub id: String,
    pub rank: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub prediction: Option<PredictionContext>,
    pub tournament: Option<TournamentContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointsHistory {
    pub entries: Vec<HistoryItem>,
    pub current_balance: i64,
    pub lifetime_earned: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreakdownPeriod {
    #[default]
    AllTime,
    ThisWeek,
    ThisMonth,
    Today,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakdownQuery {
    #[serde(default)]
    pub period: BreakdownPeriod,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakdownTotals {
    pub predictions: i64,
    pub streaks: i64,
    pub tournaments: i64,
    pub bonuses: i64,
    pub refunds: i64,
    pub adjustments: i64,
    pub spends: i64,
    pub corrections: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakdownDetails {
    pub predictions_count: usize,
    pub streak_bonuses: usize,
    pub tournaments_paid: usize,
    pub largest_win: i64,
    pub average_win: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointsBreakdown {
    pub period: BreakdownPeriod,
    pub since: Option<DateTime<Utc>>,
    pub breakdown: BreakdownTotals,
    pub details: BreakdownDetails,
    pub entry_count: usize,
}

//! Ledger summary metrics: pure functions over closed trades.
//!
//! Every metric takes a trade slice and returns a scalar. Nothing here
//! depends on the engine or on candle data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use exitlab_core::domain::{ExitReason, TradeRecord};

/// Cap for the profit factor when there are no losing trades.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Aggregate statistics for one replay's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub trade_count: usize,
    pub win_rate: f64,
    pub total_net_points: f64,
    pub avg_net_points: f64,
    pub avg_pnl_pct: f64,
    pub profit_factor: f64,
    pub total_commission: f64,
    pub total_swap: f64,
    pub exits_by_reason: BTreeMap<ExitReason, usize>,
    /// Share of trades that reached TP1, TP2 and TP3.
    pub tp_hit_rates: [f64; 3],
    pub trailing_rate: f64,
    pub avg_duration_hours: f64,
}

impl LedgerSummary {
    pub fn compute(trades: &[TradeRecord]) -> Self {
        Self {
            trade_count: trades.len(),
            win_rate: win_rate(trades),
            total_net_points: total_net_points(trades),
            avg_net_points: avg_net_points(trades),
            avg_pnl_pct: avg_pnl_pct(trades),
            profit_factor: profit_factor(trades),
            total_commission: trades.iter().map(|t| t.commission).sum(),
            total_swap: trades.iter().map(|t| t.swap).sum(),
            exits_by_reason: exits_by_reason(trades),
            tp_hit_rates: tp_hit_rates(trades),
            trailing_rate: rate(trades, |t| t.trailing_used),
            avg_duration_hours: avg_duration_hours(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of trades with positive net points.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    rate(trades, TradeRecord::is_winner)
}

pub fn total_net_points(trades: &[TradeRecord]) -> f64 {
    trades.iter().map(|t| t.pnl_points).sum()
}

pub fn avg_net_points(trades: &[TradeRecord]) -> f64 {
    mean(trades.iter().map(|t| t.pnl_points), trades.len())
}

pub fn avg_pnl_pct(trades: &[TradeRecord]) -> f64 {
    mean(trades.iter().map(|t| t.pnl_pct), trades.len())
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at [`PROFIT_FACTOR_CAP`] when there are winners but no losers.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.pnl_points > 0.0)
        .map(|t| t.pnl_points)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl_points < 0.0)
        .map(|t| t.pnl_points.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

pub fn exits_by_reason(trades: &[TradeRecord]) -> BTreeMap<ExitReason, usize> {
    let mut counts = BTreeMap::new();
    for trade in trades {
        *counts.entry(trade.exit_reason).or_insert(0) += 1;
    }
    counts
}

pub fn tp_hit_rates(trades: &[TradeRecord]) -> [f64; 3] {
    [
        rate(trades, |t| t.tp1_hit),
        rate(trades, |t| t.tp2_hit),
        rate(trades, |t| t.tp3_hit),
    ]
}

pub fn avg_duration_hours(trades: &[TradeRecord]) -> f64 {
    mean(trades.iter().map(TradeRecord::hours_held), trades.len())
}

// ─── Helpers ────────────────────────────────────────────────────────

fn rate(trades: &[TradeRecord], pred: impl Fn(&TradeRecord) -> bool) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|&t| pred(t)).count() as f64 / trades.len() as f64
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use exitlab_core::domain::{Direction, GroupId, PositionId, Regime};

    fn make_trade(pnl_points: f64, reason: ExitReason, hours: i64) -> TradeRecord {
        let entry = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        TradeRecord {
            position_id: PositionId(1),
            group_id: GroupId(1),
            direction: Direction::Long,
            regime_at_entry: Regime::Trend,
            entry_time: entry,
            exit_time: entry + Duration::hours(hours),
            entry_price: 100.0,
            exit_price: 100.0 + pnl_points,
            stop_loss_at_exit: 95.0,
            original_stop_loss: 95.0,
            tp1_hit: reason.is_take_profit(),
            tp2_hit: matches!(reason, ExitReason::Tp2 | ExitReason::Tp3),
            tp3_hit: reason == ExitReason::Tp3,
            trailing_used: reason == ExitReason::TrailingSl,
            exit_reason: reason,
            fill_count: 2,
            size: 1.0,
            gross_points: pnl_points,
            commission: 0.0,
            swap: 0.0,
            pnl_points,
            pnl_pct: pnl_points,
            duration: Duration::hours(hours),
        }
    }

    // ── Win rate ──

    #[test]
    fn win_rate_mixed() {
        let trades = vec![
            make_trade(5.0, ExitReason::Tp1, 1),
            make_trade(-2.0, ExitReason::Sl, 1),
            make_trade(3.0, ExitReason::Tp3, 1),
            make_trade(-1.0, ExitReason::Timeout, 1),
        ];
        assert!((win_rate(&trades) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn win_rate_empty() {
        assert_eq!(win_rate(&[]), 0.0);
    }

    // ── Profit factor ──

    #[test]
    fn profit_factor_mixed() {
        let trades = vec![
            make_trade(5.0, ExitReason::Tp1, 1),
            make_trade(-2.0, ExitReason::Sl, 1),
            make_trade(3.0, ExitReason::Tp3, 1),
        ];
        // Profit = 8, Loss = 2 → PF = 4.0
        assert!((profit_factor(&trades) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn profit_factor_all_winners_capped() {
        let trades = vec![make_trade(5.0, ExitReason::Tp3, 1)];
        assert!((profit_factor(&trades) - PROFIT_FACTOR_CAP).abs() < 1e-10);
    }

    #[test]
    fn profit_factor_all_losers() {
        let trades = vec![make_trade(-5.0, ExitReason::Sl, 1)];
        assert_eq!(profit_factor(&trades), 0.0);
    }

    // ── Exit mix ──

    #[test]
    fn exit_reasons_and_tp_rates() {
        let trades = vec![
            make_trade(5.0, ExitReason::Tp3, 2),
            make_trade(2.0, ExitReason::TrailingSl, 4),
            make_trade(-2.0, ExitReason::GroupSlCascade, 6),
            make_trade(-2.0, ExitReason::GroupSlCascade, 8),
        ];
        let counts = exits_by_reason(&trades);
        assert_eq!(counts.get(&ExitReason::GroupSlCascade), Some(&2));
        assert_eq!(counts.get(&ExitReason::Sl), None);

        let rates = tp_hit_rates(&trades);
        assert!((rates[0] - 0.25).abs() < 1e-10);
        assert!((rates[2] - 0.25).abs() < 1e-10);
        assert!((avg_duration_hours(&trades) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn summary_of_empty_ledger_is_zeroed() {
        let summary = LedgerSummary::compute(&[]);
        assert_eq!(summary.trade_count, 0);
        assert_eq!(summary.avg_net_points, 0.0);
        assert_eq!(summary.profit_factor, 0.0);
        assert!(summary.exits_by_reason.is_empty());
    }

    #[test]
    fn summary_totals() {
        let trades = vec![
            make_trade(6.0, ExitReason::Tp2, 1),
            make_trade(-2.0, ExitReason::Sl, 3),
        ];
        let summary = LedgerSummary::compute(&trades);
        assert_eq!(summary.trade_count, 2);
        assert!((summary.total_net_points - 4.0).abs() < 1e-10);
        assert!((summary.avg_net_points - 2.0).abs() < 1e-10);
        assert!((summary.trailing_rate - 0.0).abs() < 1e-10);
    }
}

//! TradeRecord: the immutable output of a closed position.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{GroupId, PositionId};
use super::signal::{Direction, Regime};

/// Why a position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// Original (or breakeven-free) stop-loss hit before trailing activated.
    Sl,
    /// Stop hit after TP1 activated trailing.
    TrailingSl,
    /// Remaining size fell to dust after TP1 filled.
    Tp1,
    /// Remaining size fell to dust after TP2 filled.
    Tp2,
    /// All tiers filled.
    Tp3,
    /// Held for the profile's timeout duration.
    Timeout,
    /// A sibling sharing the group stop was stopped out on the same bar.
    GroupSlCascade,
    /// Still open when the candle stream ended.
    EndOfStream,
}

impl ExitReason {
    pub fn is_stop(self) -> bool {
        matches!(
            self,
            ExitReason::Sl | ExitReason::TrailingSl | ExitReason::GroupSlCascade
        )
    }

    pub fn is_take_profit(self) -> bool {
        matches!(self, ExitReason::Tp1 | ExitReason::Tp2 | ExitReason::Tp3)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::Sl => "SL",
            ExitReason::TrailingSl => "TRAILING_SL",
            ExitReason::Tp1 => "TP1",
            ExitReason::Tp2 => "TP2",
            ExitReason::Tp3 => "TP3",
            ExitReason::Timeout => "TIMEOUT",
            ExitReason::GroupSlCascade => "GROUP_SL_CASCADE",
            ExitReason::EndOfStream => "END_OF_STREAM",
        };
        f.write_str(s)
    }
}

/// A completed position: entry → (partial fills) → exit.
///
/// All price fields are absolute price units. `exit_price` is the price of the
/// final fill; earlier partial fills are folded into the P&L figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub position_id: PositionId,
    pub group_id: GroupId,
    pub direction: Direction,
    pub regime_at_entry: Regime,

    // ── Entry / exit ──
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,

    // ── Risk ──
    pub stop_loss_at_exit: f64,
    pub original_stop_loss: f64,

    // ── Fill state ──
    pub tp1_hit: bool,
    pub tp2_hit: bool,
    pub tp3_hit: bool,
    pub trailing_used: bool,
    pub exit_reason: ExitReason,
    pub fill_count: u32,

    // ── Size ──
    pub size: f64,

    // ── P&L ──
    /// Realized points per unit size before costs.
    pub gross_points: f64,
    /// Commission charged over all fills, in points.
    pub commission: f64,
    /// Swap charged (positive) or credited (negative), in points.
    pub swap: f64,
    /// Net points: `gross_points * size - commission - swap`.
    pub pnl_points: f64,
    /// `pnl_points / (entry_price * size) * 100`.
    pub pnl_pct: f64,

    // ── Duration ──
    #[serde(with = "super::duration_secs")]
    pub duration: Duration,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl_points > 0.0
    }

    /// Holding time in fractional hours.
    pub fn hours_held(&self) -> f64 {
        self.duration.num_seconds() as f64 / 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_trade() -> TradeRecord {
        let entry = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        TradeRecord {
            position_id: PositionId(1),
            group_id: GroupId(1),
            direction: Direction::Long,
            regime_at_entry: Regime::Trend,
            entry_time: entry,
            exit_time: entry + Duration::hours(6),
            entry_price: 1000.0,
            exit_price: 1030.0,
            stop_loss_at_exit: 1000.0,
            original_stop_loss: 990.0,
            tp1_hit: true,
            tp2_hit: true,
            tp3_hit: true,
            trailing_used: true,
            exit_reason: ExitReason::Tp3,
            fill_count: 4,
            size: 1.0,
            gross_points: 17.0,
            commission: 0.4,
            swap: 0.0,
            pnl_points: 16.6,
            pnl_pct: 1.66,
            duration: Duration::hours(6),
        }
    }

    #[test]
    fn winner_and_hours() {
        let trade = sample_trade();
        assert!(trade.is_winner());
        assert!((trade.hours_held() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn exit_reason_classes() {
        assert!(ExitReason::GroupSlCascade.is_stop());
        assert!(ExitReason::Tp2.is_take_profit());
        assert!(!ExitReason::Timeout.is_stop());
        assert!(!ExitReason::EndOfStream.is_take_profit());
    }

    #[test]
    fn exit_reason_wire_names() {
        let json = serde_json::to_string(&ExitReason::GroupSlCascade).unwrap();
        assert_eq!(json, "\"GROUP_SL_CASCADE\"");
        assert_eq!(ExitReason::TrailingSl.to_string(), "TRAILING_SL");
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        assert!(json.contains("\"duration\":21600"));
        let deser: TradeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deser);
    }
}

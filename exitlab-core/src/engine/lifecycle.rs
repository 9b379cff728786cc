//! Position lifecycle engine.
//!
//! Owns the open-position set and advances it one candle at a time. Per bar,
//! positions are evaluated in open order so that the first sibling of a group
//! to hit the shared stop decides the cascade price for the rest of that
//! group. When the stop takes out more than one sibling, every one of them is
//! recorded as GROUP_SL_CASCADE.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::config::EngineConfig;
use super::error::{EngineError, RejectReason, Rejection, RejectionTally, SequenceError};
use super::position::Position;
use crate::cost::CostModel;
use crate::domain::{
    Candle, Direction, ExitReason, GroupId, IdGen, PositionId, Signal, TradeRecord,
};
use crate::profile::ParameterProfile;

/// A shared group stop hit on the current bar.
#[derive(Debug, Clone, Copy)]
struct GroupTrip {
    price: f64,
    /// Index of the tripping sibling's record in this bar's output.
    first: usize,
    cascaded: bool,
}

/// Single-threaded, deterministic position lifecycle engine.
///
/// One instance per run. `reset` returns it to the freshly constructed
/// state, including id counters and cooldown trackers.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    costs: CostModel,
    positions: Vec<Position>,
    ids: IdGen,
    last_candle: Option<Candle>,
    /// Timestamp of the last accepted signal per direction, for cooldown.
    last_accepted: BTreeMap<Direction, DateTime<Utc>>,
    rejections: RejectionTally,
}

impl Engine {
    pub fn new(config: EngineConfig, costs: CostModel) -> Result<Self, EngineError> {
        config.validate()?;
        costs.validate()?;
        Ok(Self {
            config,
            costs,
            positions: Vec::new(),
            ids: IdGen::default(),
            last_candle: None,
            last_accepted: BTreeMap::new(),
            rejections: RejectionTally::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.costs
    }

    /// Read-only view of the open positions, in open order.
    pub fn snapshot(&self) -> &[Position] {
        &self.positions
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn rejections(&self) -> &RejectionTally {
        &self.rejections
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.last_candle.as_ref()
    }

    /// Clear all run state. Configuration is kept.
    pub fn reset(&mut self) {
        self.positions.clear();
        self.ids = IdGen::default();
        self.last_candle = None;
        self.last_accepted.clear();
        self.rejections.clear();
    }

    // ── Opening ──

    /// Open a single position against the most recently advanced candle.
    pub fn open(
        &mut self,
        signal: &Signal,
        profile: &ParameterProfile,
    ) -> Result<PositionId, Rejection> {
        self.spawn(signal, std::slice::from_ref(profile))
            .map(|(_, first)| first)
    }

    /// Open one sibling per profile, all sharing the signal's stop-loss and a
    /// fresh group id. Either every sibling opens or none does.
    pub fn open_group(
        &mut self,
        signal: &Signal,
        profiles: &[ParameterProfile],
    ) -> Result<GroupId, Rejection> {
        self.spawn(signal, profiles).map(|(group, _)| group)
    }

    /// Count and log a rejection decided outside the engine (for example a
    /// resolver miss), and return it.
    pub fn record_rejection(&mut self, signal: &Signal, reason: RejectReason) -> Rejection {
        self.rejections.record(reason);
        let rejection = Rejection {
            timestamp: signal.timestamp,
            direction: signal.direction,
            reason,
        };
        warn!(
            timestamp = %signal.timestamp,
            direction = %signal.direction,
            %reason,
            "signal rejected"
        );
        rejection
    }

    fn spawn(
        &mut self,
        signal: &Signal,
        profiles: &[ParameterProfile],
    ) -> Result<(GroupId, PositionId), Rejection> {
        let Some((head, rest)) = profiles.split_first() else {
            return Err(self.record_rejection(signal, RejectReason::ProfileDisabled));
        };
        let entry_price = match self.admit(signal, profiles.len()) {
            Ok(price) => price,
            Err(reason) => return Err(self.record_rejection(signal, reason)),
        };

        let group_id = self.ids.next_group_id();
        let first = self.push_position(group_id, signal, entry_price, head);
        for profile in rest {
            self.push_position(group_id, signal, entry_price, profile);
        }
        self.last_accepted.insert(signal.direction, signal.timestamp);

        debug!(
            group = %group_id,
            siblings = profiles.len(),
            direction = %signal.direction,
            entry_price,
            stop = signal.suggested_stop_loss,
            "group opened"
        );
        Ok((group_id, first))
    }

    /// Validate a signal for `count` new positions and return its entry price.
    fn admit(&self, signal: &Signal, count: usize) -> Result<f64, RejectReason> {
        let candle = match &self.last_candle {
            Some(c) if c.timestamp == signal.timestamp => c,
            _ => return Err(RejectReason::Unaligned),
        };
        if !self.config.trading_mode.allows(signal.direction) {
            return Err(RejectReason::DirectionDisabled);
        }

        let entry_price = signal
            .direction
            .entry_fill(candle.close, self.config.half_spread());
        if !signal.suggested_stop_loss.is_finite() || !entry_price.is_finite() {
            return Err(RejectReason::NonFinitePrice);
        }
        if signal.direction.points(signal.suggested_stop_loss, entry_price) <= 0.0 {
            return Err(RejectReason::InvalidStopDistance);
        }

        if let (Some(cooldown), Some(last)) = (
            self.config.signal_cooldown,
            self.last_accepted.get(&signal.direction),
        ) {
            if signal.timestamp - *last < cooldown {
                return Err(RejectReason::Cooldown);
            }
        }

        if self.positions.len() + count > self.config.max_positions {
            return Err(RejectReason::CapacityReached);
        }
        Ok(entry_price)
    }

    fn push_position(
        &mut self,
        group_id: GroupId,
        signal: &Signal,
        entry_price: f64,
        profile: &ParameterProfile,
    ) -> PositionId {
        let id = self.ids.next_position_id();
        self.positions.push(Position::open(
            id,
            group_id,
            signal.direction,
            signal.regime.unwrap_or(self.config.default_regime),
            signal.timestamp,
            entry_price,
            signal.suggested_stop_loss,
            self.config.position_size,
            *profile,
        ));
        id
    }

    // ── Advancing ──

    /// Advance every open position through one candle.
    ///
    /// Every position present was opened on a strictly earlier candle, so
    /// there is no same-bar exit. Returns the records of positions closed on
    /// this bar, in open order.
    ///
    /// # Errors
    /// - duplicate or out-of-order timestamp
    /// - a candle with inconsistent or non-finite OHLC
    /// - an invariant violation or a cost-model failure
    pub fn advance(&mut self, candle: &Candle) -> Result<Vec<TradeRecord>, EngineError> {
        if let Some(prev) = &self.last_candle {
            if candle.timestamp == prev.timestamp {
                return Err(SequenceError::DuplicateCandle(candle.timestamp).into());
            }
            if candle.timestamp < prev.timestamp {
                return Err(SequenceError::CandleOutOfOrder {
                    previous: prev.timestamp,
                    current: candle.timestamp,
                }
                .into());
            }
        }
        if !candle.is_sane() {
            return Err(EngineError::MalformedCandle(candle.timestamp));
        }

        let half_spread = self.config.half_spread();
        let mut group_trips: BTreeMap<GroupId, GroupTrip> = BTreeMap::new();
        let mut records: Vec<TradeRecord> = Vec::new();
        let mut still_open = Vec::with_capacity(self.positions.len());

        for mut pos in std::mem::take(&mut self.positions) {
            let before = pos.mark();
            let trip = group_trips.get(&pos.group_id()).map(|t| t.price);

            let Some(exit) = pos.advance(candle, &self.config, trip) else {
                pos.check_invariants(&before)?;
                still_open.push(pos);
                continue;
            };

            if exit.trips_group {
                group_trips.entry(pos.group_id()).or_insert(GroupTrip {
                    price: exit.price,
                    first: records.len(),
                    cascaded: false,
                });
            } else if exit.reason == ExitReason::GroupSlCascade {
                if let Some(t) = group_trips.get_mut(&pos.group_id()) {
                    t.cascaded = true;
                }
            }
            let closed = pos.close(exit, candle.timestamp, half_spread);
            pos.check_invariants(&before)?;
            records.push(pos.to_record(&closed, &self.costs)?);
        }

        // The sibling that tripped a shared stop is part of the cascade it set off.
        for trip in group_trips.values().filter(|t| t.cascaded) {
            if let Some(record) = records.get_mut(trip.first) {
                record.exit_reason = ExitReason::GroupSlCascade;
            }
        }
        for record in &records {
            debug!(
                position = %record.position_id,
                group = %record.group_id,
                reason = %record.exit_reason,
                exit_price = record.exit_price,
                pnl_points = record.pnl_points,
                "position closed"
            );
        }

        self.positions = still_open;
        self.last_candle = Some(*candle);
        Ok(records)
    }

    /// Force-close everything still open at the last advanced candle's close.
    pub fn finish(&mut self) -> Result<Vec<TradeRecord>, EngineError> {
        let Some(last) = self.last_candle else {
            return Ok(Vec::new());
        };
        let half_spread = self.config.half_spread();

        let mut records = Vec::with_capacity(self.positions.len());
        for mut pos in std::mem::take(&mut self.positions) {
            let closed = pos.close_end_of_stream(&last, half_spread);
            let record = pos.to_record(&closed, &self.costs)?;
            debug!(
                position = %record.position_id,
                pnl_points = record.pnl_points,
                "position closed at end of stream"
            );
            records.push(record);
        }
        Ok(records)
    }
}

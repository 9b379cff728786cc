//! Replay driver: candle stream + signal stream → trade ledger.
//!
//! Per candle:
//! 1. Advance every open position (records go to the ledger)
//! 2. Open every signal timestamped at this candle
//! 3. Notify the observer with the post-open snapshot
//!
//! After the last candle, anything still open is closed END_OF_STREAM.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::config::EngineConfig;
use super::error::{EngineError, RejectReason, Rejection, RejectionTally, SequenceError};
use super::ledger::TradeLedger;
use super::lifecycle::Engine;
use super::position::Position;
use crate::cost::CostModel;
use crate::domain::{Candle, GroupId, Signal, TradeRecord};
use crate::profile::ProfileResolver;
use crate::regime::RegimeClassifier;

/// Trailing candles handed to a regime classifier when none is configured.
pub const DEFAULT_CLASSIFIER_WINDOW: usize = 20;

/// Read-only listener for monitoring adapters.
///
/// Receives shared references only, so it cannot influence the simulation.
pub trait ReplayObserver {
    /// Called once per candle with the open positions after signals were opened.
    fn on_candle(&mut self, _candle: &Candle, _open: &[Position]) {}

    /// Called for each record before it is appended at `index`.
    fn on_record(&mut self, _index: usize, _record: &TradeRecord) {}

    fn on_rejection(&mut self, _rejection: &Rejection) {}
}

/// A completed replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub ledger: TradeLedger,
    pub rejections: RejectionTally,
    /// Candles processed.
    pub bars: usize,
}

/// An aborted replay. Records up to `last_valid_record` were correct when
/// emitted; the caller decides whether to keep or discard them.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("replay aborted at bar {bars} (last valid record {last_valid_record:?}): {error}")]
pub struct ReplayFailure {
    pub last_valid_record: Option<usize>,
    pub bars: usize,
    #[source]
    pub error: EngineError,
}

/// Replay configuration borrowed for the duration of one or many runs.
///
/// Every `run` builds a fresh engine, so one `Replay` can be reused across
/// candle sets without state leaking between runs.
pub struct Replay<'a> {
    resolver: &'a ProfileResolver,
    costs: CostModel,
    config: EngineConfig,
    classifier: Option<&'a dyn RegimeClassifier>,
    window: usize,
}

impl<'a> Replay<'a> {
    pub fn new(resolver: &'a ProfileResolver, costs: CostModel, config: EngineConfig) -> Self {
        Self {
            resolver,
            costs,
            config,
            classifier: None,
            window: DEFAULT_CLASSIFIER_WINDOW,
        }
    }

    /// Consult `classifier` over the last `window` candles for untagged signals.
    pub fn with_classifier(mut self, classifier: &'a dyn RegimeClassifier, window: usize) -> Self {
        self.classifier = Some(classifier);
        self.window = window.max(1);
        self
    }

    pub fn run(
        &self,
        candles: &[Candle],
        signals: &[Signal],
        mut observer: Option<&mut dyn ReplayObserver>,
    ) -> Result<ReplayOutcome, ReplayFailure> {
        let mut engine = Engine::new(self.config.clone(), self.costs)
            .map_err(|error| abort(&TradeLedger::new(), 0, error))?;
        let mut ledger = TradeLedger::new();
        let mut cursor = SignalCursor::default();

        info!(
            candles = candles.len(),
            signals = signals.len(),
            "replay started"
        );

        for (bar, candle) in candles.iter().enumerate() {
            let records = engine
                .advance(candle)
                .map_err(|error| abort(&ledger, bar, error))?;
            for record in records {
                if let Some(obs) = observer.as_deref_mut() {
                    obs.on_record(ledger.len(), &record);
                }
                ledger.push(record);
            }

            while let Some(signal) = cursor.next_at_or_before(signals, candle.timestamp) {
                cursor
                    .check_order(signal)
                    .map_err(|error| abort(&ledger, bar, error.into()))?;

                let result = if signal.timestamp < candle.timestamp {
                    Err(engine.record_rejection(signal, RejectReason::Unaligned))
                } else {
                    self.open_signal(&mut engine, signal, &candles[..=bar])
                };
                if let (Err(rejection), Some(obs)) = (result, observer.as_deref_mut()) {
                    obs.on_rejection(&rejection);
                }
            }

            if let Some(obs) = observer.as_deref_mut() {
                obs.on_candle(candle, engine.snapshot());
            }
        }

        // Signals after the last candle never find their candle.
        while let Some(signal) = signals.get(cursor.next) {
            cursor.next += 1;
            cursor
                .check_order(signal)
                .map_err(|error| abort(&ledger, candles.len(), error.into()))?;
            let rejection = engine.record_rejection(signal, RejectReason::Unaligned);
            if let Some(obs) = observer.as_deref_mut() {
                obs.on_rejection(&rejection);
            }
        }

        let records = engine
            .finish()
            .map_err(|error| abort(&ledger, candles.len(), error))?;
        for record in records {
            if let Some(obs) = observer.as_deref_mut() {
                obs.on_record(ledger.len(), &record);
            }
            ledger.push(record);
        }

        info!(
            bars = candles.len(),
            trades = ledger.len(),
            rejected = engine.rejections().total(),
            "replay finished"
        );
        Ok(ReplayOutcome {
            ledger,
            rejections: engine.rejections().clone(),
            bars: candles.len(),
        })
    }

    /// Resolve the signal's regime and ladder, then open the group.
    fn open_signal(
        &self,
        engine: &mut Engine,
        signal: &Signal,
        history: &[Candle],
    ) -> Result<GroupId, Rejection> {
        let regime = match (signal.regime, self.classifier) {
            (Some(tag), _) => tag,
            (None, Some(classifier)) => {
                let start = history.len().saturating_sub(self.window);
                classifier.classify(&history[start..])
            }
            (None, None) => self.resolver.default_regime(),
        };
        let tagged = signal.with_regime(regime);

        if !engine.config().trading_mode.allows(tagged.direction) {
            return Err(engine.record_rejection(&tagged, RejectReason::DirectionDisabled));
        }
        match self.resolver.resolve_group(tagged.direction, regime) {
            Ok(ladder) => engine.open_group(&tagged, ladder),
            Err(reason) => Err(engine.record_rejection(&tagged, reason)),
        }
    }
}

/// Replay `candles` and `signals` with a fresh engine.
pub fn replay(
    candles: &[Candle],
    signals: &[Signal],
    resolver: &ProfileResolver,
    cost_model: CostModel,
    config: EngineConfig,
    observer: Option<&mut dyn ReplayObserver>,
) -> Result<ReplayOutcome, ReplayFailure> {
    Replay::new(resolver, cost_model, config).run(candles, signals, observer)
}

fn abort(ledger: &TradeLedger, bars: usize, error: EngineError) -> ReplayFailure {
    warn!(bars, records = ledger.len(), %error, "replay aborted");
    ReplayFailure {
        last_valid_record: ledger.last_index(),
        bars,
        error,
    }
}

#[derive(Debug, Default)]
struct SignalCursor {
    next: usize,
    previous: Option<DateTime<Utc>>,
}

impl SignalCursor {
    /// Take the next signal if it is due at or before `now`.
    fn next_at_or_before<'s>(
        &mut self,
        signals: &'s [Signal],
        now: DateTime<Utc>,
    ) -> Option<&'s Signal> {
        let signal = signals.get(self.next)?;
        if signal.timestamp > now {
            return None;
        }
        self.next += 1;
        Some(signal)
    }

    fn check_order(&mut self, signal: &Signal) -> Result<(), SequenceError> {
        if let Some(previous) = self.previous {
            if signal.timestamp < previous {
                return Err(SequenceError::SignalOutOfOrder {
                    previous,
                    current: signal.timestamp,
                });
            }
        }
        self.previous = Some(signal.timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, ExitReason, Regime};
    use crate::engine::TradingMode;
    use crate::profile::{ParameterProfile, ProfileRow};
    use crate::regime::FixedRegime;
    use chrono::{Duration, TimeZone};

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn flat(hour: i64, price: f64) -> Candle {
        Candle::new(t(hour), price, price + 1.0, price - 1.0, price, 1.0)
    }

    fn profile() -> ParameterProfile {
        ParameterProfile::new([10.0, 20.0, 30.0], [0.5, 0.3, 0.2], 25.0, Duration::hours(24))
            .unwrap()
    }

    fn long_trend_only() -> ProfileResolver {
        ProfileResolver::from_rows(
            [ProfileRow {
                direction: Direction::Long,
                regime: Regime::Trend,
                profile: profile(),
            }],
            Regime::Trend,
        )
        .unwrap()
    }

    #[derive(Default)]
    struct Counter {
        candles: usize,
        records: Vec<usize>,
        rejections: usize,
        max_open: usize,
    }

    impl ReplayObserver for Counter {
        fn on_candle(&mut self, _candle: &Candle, open: &[Position]) {
            self.candles += 1;
            self.max_open = self.max_open.max(open.len());
        }
        fn on_record(&mut self, index: usize, _record: &TradeRecord) {
            self.records.push(index);
        }
        fn on_rejection(&mut self, _rejection: &Rejection) {
            self.rejections += 1;
        }
    }

    #[test]
    fn open_position_is_closed_at_end_of_stream() {
        let candles: Vec<_> = (0..5).map(|h| flat(h, 1000.0)).collect();
        let signals = [Signal::new(t(1), Direction::Long, 990.0)];
        let resolver = long_trend_only();
        let mut counter = Counter::default();

        let outcome = replay(
            &candles,
            &signals,
            &resolver,
            CostModel::frictionless(),
            EngineConfig::default(),
            Some(&mut counter),
        )
        .unwrap();

        assert_eq!(outcome.bars, 5);
        assert_eq!(outcome.ledger.len(), 1);
        let record = &outcome.ledger.records()[0];
        assert_eq!(record.exit_reason, ExitReason::EndOfStream);
        assert_eq!(record.exit_time, t(4));
        assert_eq!(counter.candles, 5);
        assert_eq!(counter.records, vec![0]);
        assert_eq!(counter.max_open, 1);
    }

    #[test]
    fn unaligned_and_disabled_signals_are_counted() {
        let candles = [flat(0, 1000.0), flat(2, 1000.0)];
        let signals = [
            Signal::new(t(1), Direction::Long, 990.0),
            Signal::new(t(2), Direction::Short, 1010.0),
            Signal::new(t(2), Direction::Long, 990.0).with_regime(Regime::Range),
            Signal::new(t(9), Direction::Long, 990.0),
        ];
        let resolver = long_trend_only();
        let mut counter = Counter::default();

        let outcome = replay(
            &candles,
            &signals,
            &resolver,
            CostModel::frictionless(),
            EngineConfig::default(),
            Some(&mut counter),
        )
        .unwrap();

        assert!(outcome.ledger.is_empty());
        assert_eq!(outcome.rejections.count(RejectReason::Unaligned), 2);
        assert_eq!(outcome.rejections.count(RejectReason::ProfileDisabled), 2);
        assert_eq!(counter.rejections, 4);
    }

    #[test]
    fn disabled_direction_is_reported_before_profile_lookup() {
        let candles = [flat(0, 1000.0), flat(1, 1000.0)];
        let signals = [
            Signal::new(t(0), Direction::Short, 1010.0),
            Signal::new(t(1), Direction::Long, 990.0),
        ];
        let resolver = long_trend_only();
        let config = EngineConfig::default().with_trading_mode(TradingMode::LongOnly);

        let outcome = replay(
            &candles,
            &signals,
            &resolver,
            CostModel::frictionless(),
            config,
            None,
        )
        .unwrap();

        assert_eq!(outcome.rejections.count(RejectReason::DirectionDisabled), 1);
        assert_eq!(outcome.rejections.count(RejectReason::ProfileDisabled), 0);
        assert_eq!(outcome.ledger.len(), 1);
    }

    #[test]
    fn classifier_supplies_missing_regime() {
        let candles = [flat(0, 1000.0), flat(1, 1000.0)];
        let signals = [Signal::new(t(0), Direction::Long, 990.0)];
        let resolver = long_trend_only().with_default_regime(Regime::Range);
        let classifier = FixedRegime(Regime::Trend);

        let outcome = Replay::new(&resolver, CostModel::frictionless(), EngineConfig::default())
            .with_classifier(&classifier, 10)
            .run(&candles, &signals, None)
            .unwrap();
        assert_eq!(outcome.ledger.len(), 1);
        assert_eq!(outcome.ledger.records()[0].regime_at_entry, Regime::Trend);

        // Without the classifier the resolver default (RANGE) has no row.
        let outcome = replay(
            &candles,
            &signals,
            &resolver,
            CostModel::frictionless(),
            EngineConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(outcome.rejections.count(RejectReason::ProfileDisabled), 1);
    }

    #[test]
    fn sequence_error_reports_last_valid_record() {
        let candles = [
            flat(0, 1000.0),
            Candle::new(t(1), 1000.0, 1001.0, 985.0, 986.0, 1.0),
            flat(3, 990.0),
            flat(2, 990.0),
        ];
        let signals = [Signal::new(t(0), Direction::Long, 990.0)];
        let resolver = long_trend_only();

        let failure = replay(
            &candles,
            &signals,
            &resolver,
            CostModel::frictionless(),
            EngineConfig::default(),
            None,
        )
        .unwrap_err();

        assert_eq!(failure.last_valid_record, Some(0));
        assert_eq!(failure.bars, 3);
        assert!(matches!(
            failure.error,
            EngineError::Sequence(SequenceError::CandleOutOfOrder { .. })
        ));
    }

    #[test]
    fn out_of_order_signals_abort() {
        let candles = [flat(0, 1000.0), flat(1, 1000.0), flat(2, 1000.0)];
        let signals = [
            Signal::new(t(1), Direction::Long, 990.0),
            Signal::new(t(0), Direction::Long, 990.0),
        ];
        let failure = replay(
            &candles,
            &signals,
            &long_trend_only(),
            CostModel::frictionless(),
            EngineConfig::default(),
            None,
        )
        .unwrap_err();
        assert_eq!(failure.last_valid_record, None);
        assert!(matches!(
            failure.error,
            EngineError::Sequence(SequenceError::SignalOutOfOrder { .. })
        ));
    }
}

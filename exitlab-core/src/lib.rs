//! ExitLab Core: multi-tier position lifecycle simulation.
//!
//! This crate contains the heart of the simulator:
//! - Domain types (candles, signals, trade records, ids)
//! - Parameter profiles and the (direction, regime) resolver
//! - Cost model (commission and swap)
//! - Position lifecycle engine with partial take-profits, ratcheting
//!   trailing stops, timeouts and shared-stop group cascades
//! - Replay driver, trade ledger and the regime-classifier capability
//!
//! The crate performs no file I/O and installs no logging subscriber.

pub mod cost;
pub mod domain;
pub mod engine;
pub mod profile;
pub mod regime;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core types are Send + Sync so parallel sweeps can
    /// share inputs and move results across threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();
        require_send::<domain::IdGen>();
        require_sync::<domain::IdGen>();

        // Profiles and costs
        require_send::<profile::ParameterProfile>();
        require_sync::<profile::ParameterProfile>();
        require_send::<profile::ProfileResolver>();
        require_sync::<profile::ProfileResolver>();
        require_send::<cost::CostModel>();
        require_sync::<cost::CostModel>();

        // Engine types
        require_send::<engine::Engine>();
        require_sync::<engine::Engine>();
        require_send::<engine::Position>();
        require_sync::<engine::Position>();
        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();
        require_send::<engine::TradeLedger>();
        require_sync::<engine::TradeLedger>();
        require_send::<engine::ReplayOutcome>();
        require_sync::<engine::ReplayOutcome>();
        require_send::<engine::ReplayFailure>();
        require_sync::<engine::ReplayFailure>();

        // Classifiers
        require_send::<regime::FixedRegime>();
        require_sync::<regime::FixedRegime>();
    }

    /// Architecture contract: observers only receive shared references.
    #[test]
    fn observer_cannot_mutate_engine_state() {
        fn _check_trait_object_builds(
            observer: &mut dyn engine::ReplayObserver,
            candle: &domain::Candle,
            open: &[engine::Position],
        ) {
            observer.on_candle(candle, open);
        }
    }
}

//! Regime classification capability.
//!
//! The engine never computes a regime. A signal either carries a tag, or the
//! replay driver asks a `RegimeClassifier` about the trailing candle window.

use crate::domain::{Candle, Regime};

/// Labels the market state from a trailing window of candles.
///
/// `window` ends with the candle the signal is aligned to. Implementations
/// must be pure: the same window always yields the same label.
pub trait RegimeClassifier: Send + Sync {
    fn classify(&self, window: &[Candle]) -> Regime;
}

/// Classifier that always returns one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRegime(pub Regime);

impl RegimeClassifier for FixedRegime {
    fn classify(&self, _window: &[Candle]) -> Regime {
        self.0
    }
}

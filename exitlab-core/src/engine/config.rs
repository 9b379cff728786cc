//! Engine configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::error::EngineError;
use crate::domain::{Direction, Regime};

/// Trading mode: which directions are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    LongOnly,
    ShortOnly,
    #[default]
    LongShort,
}

impl TradingMode {
    pub fn allows(self, direction: Direction) -> bool {
        match self {
            TradingMode::LongOnly => direction == Direction::Long,
            TradingMode::ShortOnly => direction == Direction::Short,
            TradingMode::LongShort => true,
        }
    }
}

/// Which side wins when one candle touches both the stop and a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    /// Stop-loss before take-profits (adverse path first).
    #[default]
    WorstCase,
    /// Take-profits before stop-loss (favorable path first).
    BestCase,
}

/// Fill price for a stop the candle opened beyond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Fill at the stop level regardless of the open.
    #[default]
    FillAtStop,
    /// Fill at the (worse) open price.
    FillAtOpen,
}

/// Configuration for a single engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Open-position ceiling; a group counts once per sibling.
    pub max_positions: usize,
    pub trading_mode: TradingMode,
    /// Full spread in price units; half is paid on every fill.
    pub spread: f64,
    /// Remaining fraction at or below which a position is closed outright.
    pub dust_threshold: f64,
    /// Units per position.
    pub position_size: f64,
    pub intrabar_policy: IntrabarPolicy,
    pub gap_policy: GapPolicy,
    /// Minimum spacing between accepted signals in the same direction.
    #[serde(default, with = "optional_minutes")]
    pub signal_cooldown: Option<Duration>,
    /// Regime recorded for signals opened without a tag.
    pub default_regime: Regime,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_positions: 10,
            trading_mode: TradingMode::LongShort,
            spread: 0.0,
            dust_threshold: 0.01,
            position_size: 1.0,
            intrabar_policy: IntrabarPolicy::WorstCase,
            gap_policy: GapPolicy::FillAtStop,
            signal_cooldown: None,
            default_regime: Regime::Trend,
        }
    }
}

impl EngineConfig {
    pub fn new(max_positions: usize) -> Self {
        Self {
            max_positions,
            ..Self::default()
        }
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    pub fn with_trading_mode(mut self, mode: TradingMode) -> Self {
        self.trading_mode = mode;
        self
    }

    pub fn with_intrabar_policy(mut self, policy: IntrabarPolicy) -> Self {
        self.intrabar_policy = policy;
        self
    }

    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.signal_cooldown = Some(cooldown);
        self
    }

    pub fn with_dust_threshold(mut self, threshold: f64) -> Self {
        self.dust_threshold = threshold;
        self
    }

    pub fn with_position_size(mut self, size: f64) -> Self {
        self.position_size = size;
        self
    }

    pub fn half_spread(&self) -> f64 {
        self.spread / 2.0
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_positions == 0 {
            return Err(EngineError::InvalidConfig(
                "max_positions must be at least 1".into(),
            ));
        }
        if !self.spread.is_finite() || self.spread < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "spread must be non-negative, got {}",
                self.spread
            )));
        }
        if !(self.dust_threshold >= 0.0 && self.dust_threshold < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "dust_threshold must be in [0, 1), got {}",
                self.dust_threshold
            )));
        }
        if !self.position_size.is_finite() || self.position_size <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "position_size must be positive, got {}",
                self.position_size
            )));
        }
        if let Some(cooldown) = self.signal_cooldown {
            if cooldown < Duration::zero() {
                return Err(EngineError::InvalidConfig(
                    "signal_cooldown must not be negative".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Cooldown serialized as whole minutes.
mod optional_minutes {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.num_minutes()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(d)?.map(Duration::minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trading_mode_gates_direction() {
        assert!(TradingMode::LongOnly.allows(Direction::Long));
        assert!(!TradingMode::LongOnly.allows(Direction::Short));
        assert!(TradingMode::ShortOnly.allows(Direction::Short));
        assert!(TradingMode::LongShort.allows(Direction::Short));
    }

    #[test]
    fn defaults_are_conservative() {
        let config = EngineConfig::default();
        assert_eq!(config.intrabar_policy, IntrabarPolicy::WorstCase);
        assert_eq!(config.gap_policy, GapPolicy::FillAtStop);
        assert_eq!(config.dust_threshold, 0.01);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_catches_bad_values() {
        assert!(EngineConfig::new(0).validate().is_err());
        assert!(EngineConfig::default().with_spread(-1.0).validate().is_err());
        assert!(EngineConfig::default()
            .with_position_size(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn cooldown_serializes_as_minutes() {
        let config = EngineConfig::default().with_cooldown(Duration::hours(2));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"signal_cooldown\":120"));
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

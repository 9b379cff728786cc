//! Serializable run configuration.
//!
//! A run is described by one TOML document:
//!
//! ```toml
//! [engine]
//! max_positions = 5
//! spread = 0.2
//! intrabar_policy = "worst_case"
//! signal_cooldown = 60            # minutes
//!
//! [costs]
//! commission_per_unit = 0.1
//! swap_long_per_day = 0.5
//! swap_short_per_day = 0.5
//!
//! [resolver]
//! default_regime = "trend"
//!
//! [[profiles]]
//! direction = "long"
//! regime = "trend"
//! tp_distances = [10.0, 20.0, 30.0]
//! tp_fractions = [0.5, 0.3, 0.2]
//! trailing_distance = 8.0
//! timeout_hours = 24
//! ```
//!
//! Several `[[profiles]]` rows with the same `(direction, regime)` form a
//! sibling ladder: one signal opens one position per row, sharing a stop.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use exitlab_core::cost::{CostModel, CostModelError};
use exitlab_core::domain::{Direction, Regime};
use exitlab_core::engine::{EngineConfig, EngineError, DEFAULT_CLASSIFIER_WINDOW};
use exitlab_core::profile::{ParameterProfile, ProfileError, ProfileResolver, ProfileRow, TrailAnchor};
use exitlab_core::regime::FixedRegime;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("profile row {row}: {source}")]
    Profile {
        row: usize,
        #[source]
        source: ProfileError,
    },
    #[error("profile row {row}: timeout_hours must be a positive finite number, got {hours}")]
    InvalidTimeout { row: usize, hours: f64 },
    #[error("resolver: {0}")]
    Resolver(#[source] ProfileError),
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("costs: {0}")]
    Costs(#[from] CostModelError),
    #[error("resolver.classifier_window must be at least 1")]
    EmptyWindow,
    #[error("failed to hash config: {0}")]
    Hash(#[from] serde_json::Error),
}

/// Serializable configuration for a single replay run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub costs: CostModel,

    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Profile table rows, in ladder order.
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

/// How untagged signals get a regime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Regime used when neither the signal nor a classifier supplies one.
    pub default_regime: Regime,

    /// Label every untagged signal with this regime instead of the default.
    pub fixed_regime: Option<Regime>,

    /// Trailing candle window handed to the classifier.
    pub classifier_window: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_regime: Regime::Trend,
            fixed_regime: None,
            classifier_window: DEFAULT_CLASSIFIER_WINDOW,
        }
    }
}

/// One `[[profiles]]` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    pub direction: Direction,
    pub regime: Regime,
    /// TP1..TP3 distances from entry, in price points.
    pub tp_distances: [f64; 3],
    /// Fraction of the original size closed at each TP.
    pub tp_fractions: [f64; 3],
    pub trailing_distance: f64,
    pub timeout_hours: f64,
    #[serde(default)]
    pub trail_anchor: TrailAnchor,
}

impl ProfileConfig {
    fn to_row(&self, row: usize) -> Result<ProfileRow, ConfigError> {
        if !self.timeout_hours.is_finite() || self.timeout_hours <= 0.0 {
            return Err(ConfigError::InvalidTimeout {
                row,
                hours: self.timeout_hours,
            });
        }
        let timeout = Duration::seconds((self.timeout_hours * 3600.0).round() as i64);
        let profile = ParameterProfile::new(
            self.tp_distances,
            self.tp_fractions,
            self.trailing_distance,
            timeout,
        )
        .map_err(|source| ConfigError::Profile { row, source })?
        .with_trail_anchor(self.trail_anchor);

        Ok(ProfileRow {
            direction: self.direction,
            regime: self.regime,
            profile,
        })
    }
}

/// Validated components ready to drive a replay.
#[derive(Debug, Clone)]
pub struct RunComponents {
    pub engine: EngineConfig,
    pub costs: CostModel,
    pub resolver: ProfileResolver,
    pub classifier: Option<FixedRegime>,
    pub classifier_window: usize,
}

impl RunConfig {
    /// Parse a TOML document. Parsing does not validate; see [`RunConfig::build`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate every table and assemble the engine inputs.
    ///
    /// Fails on the first invalid row, naming its index.
    pub fn build(&self) -> Result<RunComponents, ConfigError> {
        self.engine.validate()?;
        self.costs.validate()?;
        if self.resolver.classifier_window == 0 {
            return Err(ConfigError::EmptyWindow);
        }

        let rows = self
            .profiles
            .iter()
            .enumerate()
            .map(|(row, profile)| profile.to_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        let resolver = ProfileResolver::from_rows(rows, self.resolver.default_regime)
            .map_err(ConfigError::Resolver)?;

        let mut engine = self.engine.clone();
        engine.default_regime = self.resolver.default_regime;

        Ok(RunComponents {
            engine,
            costs: self.costs,
            resolver,
            classifier: self.resolver.fixed_regime.map(FixedRegime),
            classifier_window: self.resolver.classifier_window,
        })
    }

    /// BLAKE3 hex digest of this configuration serialized as JSON.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        let hash = blake3::hash(json.as_bytes());
        Ok(format!("{}", hash.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exitlab_core::engine::{IntrabarPolicy, TradingMode};

    const SAMPLE: &str = r#"
        [engine]
        max_positions = 4
        trading_mode = "long_only"
        spread = 0.5
        intrabar_policy = "best_case"
        signal_cooldown = 90

        [costs]
        commission_per_unit = 0.1
        swap_long_per_day = 0.5
        swap_short_per_day = -0.2

        [resolver]
        default_regime = "range"

        [[profiles]]
        direction = "long"
        regime = "trend"
        tp_distances = [10.0, 20.0, 30.0]
        tp_fractions = [0.5, 0.3, 0.2]
        trailing_distance = 8.0
        timeout_hours = 24

        [[profiles]]
        direction = "long"
        regime = "trend"
        tp_distances = [5.0, 15.0, 25.0]
        tp_fractions = [0.4, 0.4, 0.2]
        trailing_distance = 6.0
        timeout_hours = 12.5
        trail_anchor = "tp1_offset"
    "#;

    #[test]
    fn parses_all_tables() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.engine.max_positions, 4);
        assert_eq!(config.engine.trading_mode, TradingMode::LongOnly);
        assert_eq!(config.engine.intrabar_policy, IntrabarPolicy::BestCase);
        assert_eq!(config.engine.signal_cooldown, Some(Duration::minutes(90)));
        // Unlisted engine fields keep their defaults.
        assert!((config.engine.dust_threshold - 0.01).abs() < 1e-12);
        assert!((config.costs.swap_grace_hours - 24.0).abs() < 1e-12);
        assert_eq!(config.resolver.default_regime, Regime::Range);
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[1].trail_anchor, TrailAnchor::Tp1Offset);
    }

    #[test]
    fn build_produces_ladder() {
        let parts = RunConfig::from_toml_str(SAMPLE).unwrap().build().unwrap();
        let ladder = parts
            .resolver
            .resolve_group(Direction::Long, Regime::Trend)
            .unwrap();
        assert_eq!(ladder.len(), 2);
        assert_eq!(ladder[1].timeout(), Duration::minutes(750));
        assert!(!parts.resolver.is_enabled(Direction::Short, Regime::Trend));
        assert_eq!(parts.engine.default_regime, Regime::Range);
        assert!(parts.classifier.is_none());
    }

    #[test]
    fn bad_row_is_reported_with_index() {
        let mut config = RunConfig::from_toml_str(SAMPLE).unwrap();
        config.profiles[1].tp_fractions = [0.5, 0.5, 0.5];
        let err = config.build().unwrap_err();
        assert!(matches!(err, ConfigError::Profile { row: 1, .. }), "{err}");
    }

    #[test]
    fn non_positive_timeout_rejected() {
        let mut config = RunConfig::from_toml_str(SAMPLE).unwrap();
        config.profiles[0].timeout_hours = 0.0;
        assert!(matches!(
            config.build(),
            Err(ConfigError::InvalidTimeout { row: 0, .. })
        ));
    }

    #[test]
    fn empty_profile_table_rejected() {
        let config = RunConfig::from_toml_str("[engine]\nmax_positions = 3\n").unwrap();
        assert!(matches!(config.build(), Err(ConfigError::Resolver(_))));
    }

    #[test]
    fn invalid_engine_section_rejected() {
        let mut config = RunConfig::from_toml_str(SAMPLE).unwrap();
        config.engine.max_positions = 0;
        assert!(matches!(config.build(), Err(ConfigError::Engine(_))));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            RunConfig::from_toml_str("[engine\nmax_positions = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn fixed_regime_builds_classifier() {
        let mut config = RunConfig::from_toml_str(SAMPLE).unwrap();
        config.resolver.fixed_regime = Some(Regime::Trend);
        let parts = config.build().unwrap();
        assert_eq!(parts.classifier, Some(FixedRegime(Regime::Trend)));
    }

    #[test]
    fn test_run_id_deterministic() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        let id1 = config.run_id().unwrap();
        let id2 = config.run_id().unwrap();
        assert_eq!(id1, id2, "RunId should be deterministic");
        assert_eq!(id1.len(), 64);
    }

    #[test]
    fn test_run_id_changes_with_params() {
        let config1 = RunConfig::from_toml_str(SAMPLE).unwrap();
        let mut config2 = config1.clone();
        config2.profiles[0].trailing_distance = 9.0;
        assert_ne!(config1.run_id().unwrap(), config2.run_id().unwrap());
    }
}

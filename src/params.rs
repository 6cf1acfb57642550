//! Detection configuration and parameter metadata
//!
//! This module provides the [`PatternDetectionConfig`] record shared by all
//! detectors, plus metadata about every tunable, enabling:
//! - Overriding any subset of parameters by name
//! - Grid search optimization
//! - Parameter documentation
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use chartsig::params::{ParameterizedConfig, PatternDetectionConfig};
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("confidence_threshold", 70.0);
//! overrides.insert("lookback_period", 4.0);
//!
//! let config = PatternDetectionConfig::with_params(&overrides).unwrap();
//! assert_eq!(config.lookback_period.get(), 4);
//!
//! for param in PatternDetectionConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{PatternError, Period, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Non-negative integer count (may be zero)
  Count,
  /// Unbounded finite number (percentages, multipliers, points)
  Float,
}

/// Metadata for a single parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "min_pole_size")
  pub name: &'static str,
  /// Parameter type
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn new(
    name: &'static str,
    param_type: ParamType,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    if step <= 0.0 {
      return vec![min];
    }
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if !value.is_finite() {
      return Err(PatternError::InvalidValue("parameter must be finite"));
    }
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period | ParamType::Count if value.fract() != 0.0 => {
        Err(PatternError::InvalidValue("Period must be a positive integer"))
      },
      _ => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED CONFIG TRAIT
// ============================================================

/// Trait for configuration records that support parameterization
pub trait ParameterizedConfig: Sized + Default {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Overwrite one parameter by name
  fn set_param(&mut self, name: &str, value: f64) -> Result<()>;

  /// Check cross-field constraints
  fn validate(&self) -> Result<()>;

  /// Creates a config from a map of overrides.
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let mut config = Self::default();
    // sorted so the first reported error is deterministic
    let mut names: Vec<_> = params.keys().copied().collect();
    names.sort_unstable();
    for name in names {
      let value = params[name];
      let meta = Self::param_meta()
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| PatternError::InvalidConfig(format!("unknown parameter `{name}`")))?;
      meta.validate(value)?;
      config.set_param(name, value)?;
    }
    config.validate()?;
    Ok(config)
  }
}

#[doc(hidden)]
pub fn period_from(value: f64) -> Result<Period> {
  if value < 1.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

#[doc(hidden)]
pub fn count_from(value: f64) -> Result<usize> {
  if value < 0.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Count must be a non-negative integer"));
  }
  Ok(value as usize)
}

#[doc(hidden)]
pub fn float_from(value: f64) -> Result<f64> {
  if !value.is_finite() {
    return Err(PatternError::InvalidValue("parameter must be finite"));
  }
  Ok(value)
}

/// Generate a serde config record with defaults, parameter metadata and a
/// by-name setter from one field table.
macro_rules! define_config {
  (
    $(#[$attr:meta])*
    pub struct $name:ident {
      $(
        $field:ident : $kind:ident = $default:expr, $range:expr, $desc:literal;
      )*
    }
  ) => {
    $(#[$attr])*
    #[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
    #[serde(default)]
    pub struct $name {
      $(
        #[doc = $desc]
        pub $field: define_config!(@ty $kind),
      )*
    }

    impl Default for $name {
      fn default() -> Self {
        Self { $($field: define_config!(@default $kind, $default)),* }
      }
    }

    impl $name {
      const PARAMS: &'static [$crate::params::ParamMeta] = &[
        $(
          $crate::params::ParamMeta::new(
            stringify!($field),
            define_config!(@param_type $kind),
            $default as f64,
            $range,
            $desc,
          )
        ),*
      ];

      fn set_field(&mut self, name: &str, value: f64) -> $crate::Result<()> {
        match name {
          $(stringify!($field) => self.$field = define_config!(@parse $kind, value)?,)*
          _ => {
            return Err($crate::PatternError::InvalidConfig(format!(
              "unknown parameter `{name}`"
            )))
          },
        }
        Ok(())
      }
    }
  };

  (@ty period) => { $crate::Period };
  (@ty ratio) => { $crate::Ratio };
  (@ty count) => { usize };
  (@ty float) => { f64 };

  (@default period, $d:expr) => { $crate::Period::new_const($d) };
  (@default ratio, $d:expr) => { $crate::Ratio::new_const($d) };
  (@default count, $d:expr) => { $d };
  (@default float, $d:expr) => { $d };

  (@param_type period) => { $crate::params::ParamType::Period };
  (@param_type ratio) => { $crate::params::ParamType::Ratio };
  (@param_type count) => { $crate::params::ParamType::Count };
  (@param_type float) => { $crate::params::ParamType::Float };

  (@parse period, $v:expr) => { $crate::params::period_from($v) };
  (@parse ratio, $v:expr) => { $crate::Ratio::new($v) };
  (@parse count, $v:expr) => { $crate::params::count_from($v) };
  (@parse float, $v:expr) => { $crate::params::float_from($v) };
}

pub(crate) use define_config;

// ============================================================
// PATTERN DETECTION CONFIG
// ============================================================

define_config! {
  /// Thresholds for every detector. One record per detector instance;
  /// deserializing a partial record fills the rest with defaults.
  pub struct PatternDetectionConfig {
    min_candles: period = 20, (10.0, 200.0, 10.0),
      "Minimum candles before any detector runs";
    lookback_period: period = 5, (2.0, 10.0, 1.0),
      "Swing-point look-around window on each side";
    min_rejection_size: float = 2.0, (0.0, 10.0, 0.5),
      "Minimum pivot rejection size in percent";
    volume_threshold: float = 1.2, (1.0, 3.0, 0.1),
      "Volume multiple of the local average counted as confirmation";
    confidence_threshold: float = 65.0, (0.0, 100.0, 5.0),
      "Minimum confidence for a detection to be reported";

    hs_break_scan: period = 5, (1.0, 10.0, 1.0),
      "Candles after the right shoulder scanned for a neckline break";
    hs_optimal_span: period = 15, (5.0, 60.0, 5.0),
      "Shoulder-to-shoulder span receiving the full timespan bonus";
    hs_pre_move_window: period = 20, (5.0, 60.0, 5.0),
      "Candles before the left shoulder measured for the prior move";
    hs_momentum_period: period = 5, (2.0, 20.0, 1.0),
      "Momentum period into the head and the right shoulder";

    min_pole_size: float = 3.0, (0.5, 20.0, 0.5),
      "Minimum flag pole move in percent";
    max_pullback_ratio: ratio = 0.3, (0.05, 0.6, 0.05),
      "Maximum adverse move within the pole relative to the pole move";
    min_pole_duration: period = 8, (3.0, 20.0, 1.0),
      "Shortest flag pole in candles";
    max_pole_duration: period = 25, (8.0, 60.0, 1.0),
      "Longest flag pole in candles";
    min_consolidation_duration: period = 3, (2.0, 10.0, 1.0),
      "Shortest consolidation in candles";
    max_consolidation_duration: period = 12, (3.0, 40.0, 1.0),
      "Longest consolidation in candles";
    consolidation_volatility_threshold: float = 3.0, (0.5, 10.0, 0.5),
      "Maximum consolidation high-low range in percent";
    momentum_loss_ratio: ratio = 0.3, (0.05, 0.9, 0.05),
      "Late momentum must be below this share of early momentum";
    sr_tolerance: float = 0.5, (0.1, 2.0, 0.1),
      "Tolerance in percent for counting a support/resistance touch";
    flag_breakout_window: period = 5, (1.0, 15.0, 1.0),
      "Candles after the flag scanned for a breakout";

    tls_scan_window: period = 3, (1.0, 10.0, 1.0),
      "Most recent candles tried as the strike candle";
    min_preceding_candles: period = 3, (2.0, 6.0, 1.0),
      "Shortest run before the strike candle";
    max_preceding_candles: period = 5, (3.0, 10.0, 1.0),
      "Longest run before the strike candle";
    min_preceding_movement: float = 1.5, (0.25, 10.0, 0.25),
      "Minimum cumulative move of the preceding run in percent";
    min_negation_ratio: ratio = 0.6, (0.1, 1.0, 0.1),
      "Share of the preceding move the strike must retrace";
    min_reversal_ratio: float = 0.6, (0.1, 3.0, 0.1),
      "Strike percent move relative to the preceding percent move";

    chop_lookback: period = 15, (5.0, 50.0, 5.0),
      "Candles forming the chop range before a trap breakout";
    min_chop_break_size: float = 1.0, (0.1, 10.0, 0.1),
      "Minimum chop range in percent";
    min_breakout_duration: period = 1, (1.0, 5.0, 1.0),
      "Shortest trap breakout in candles";
    max_breakout_duration: period = 3, (1.0, 10.0, 1.0),
      "Longest trap breakout (and reversal) in candles";
    min_breakout_strength: float = 100.0, (10.0, 500.0, 10.0),
      "Percent by which the breakout must exceed the normal move";
    max_time_to_reversal: count = 3, (0.0, 10.0, 1.0),
      "Candles allowed between breakout end and reversal start";
    min_reversal_velocity_ratio: float = 0.8, (0.1, 3.0, 0.1),
      "Reversal velocity relative to breakout velocity";
    sr_proximity: float = 2.0, (0.1, 10.0, 0.1),
      "Distance in percent to a pivot that still earns the S/R bonus";

    candle_scan_window: period = 3, (1.0, 10.0, 1.0),
      "Most recent candles checked for candlestick reversals";
    trend_window: period = 10, (4.0, 50.0, 1.0),
      "Candles used to classify the trend before a candlestick pattern";
    trend_threshold: float = 1.0, (0.1, 10.0, 0.1),
      "Net move in percent separating a trend from sideways";
    doji_body_ratio: ratio = 0.1, (0.01, 0.3, 0.01),
      "Maximum body-to-range ratio of a doji";
    hammer_wick_ratio: float = 2.0, (1.0, 5.0, 0.25),
      "Minimum long-wick-to-body ratio of hammer family candles";
    engulfing_ratio: float = 1.0, (1.0, 3.0, 0.1),
      "Minimum engulfing-body to engulfed-body ratio";
    penetration_ratio: ratio = 0.5, (0.1, 0.9, 0.05),
      "Minimum penetration into the prior body for piercing/dark cloud";
    star_body_ratio: ratio = 0.3, (0.05, 0.6, 0.05),
      "Maximum star body relative to the first candle body";
  }
}

impl ParameterizedConfig for PatternDetectionConfig {
  fn param_meta() -> &'static [ParamMeta] {
    Self::PARAMS
  }

  fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
    self.set_field(name, value)
  }

  fn validate(&self) -> Result<()> {
    PatternDetectionConfig::validate(self)
  }
}

impl PatternDetectionConfig {
  /// Check cross-field constraints
  pub fn validate(&self) -> Result<()> {
    fn ordered(name: &str, min: usize, max: usize) -> Result<()> {
      if min > max {
        return Err(PatternError::InvalidConfig(format!(
          "{name}: minimum {min} exceeds maximum {max}"
        )));
      }
      Ok(())
    }

    if !(0.0..=100.0).contains(&self.confidence_threshold) {
      return Err(PatternError::OutOfRange {
        field: "confidence_threshold",
        value: self.confidence_threshold,
        min: 0.0,
        max: 100.0,
      });
    }
    ordered("pole duration", self.min_pole_duration.get(), self.max_pole_duration.get())?;
    ordered(
      "consolidation duration",
      self.min_consolidation_duration.get(),
      self.max_consolidation_duration.get(),
    )?;
    ordered(
      "preceding candles",
      self.min_preceding_candles.get(),
      self.max_preceding_candles.get(),
    )?;
    ordered(
      "breakout duration",
      self.min_breakout_duration.get(),
      self.max_breakout_duration.get(),
    )?;

    let positive = [
      ("min_rejection_size", self.min_rejection_size, true),
      ("volume_threshold", self.volume_threshold, false),
      ("min_pole_size", self.min_pole_size, false),
      ("consolidation_volatility_threshold", self.consolidation_volatility_threshold, false),
      ("sr_tolerance", self.sr_tolerance, false),
      ("min_preceding_movement", self.min_preceding_movement, false),
      ("min_chop_break_size", self.min_chop_break_size, true),
      ("min_breakout_strength", self.min_breakout_strength, true),
      ("min_reversal_velocity_ratio", self.min_reversal_velocity_ratio, true),
      ("sr_proximity", self.sr_proximity, false),
      ("hammer_wick_ratio", self.hammer_wick_ratio, false),
      ("engulfing_ratio", self.engulfing_ratio, false),
    ];
    for (name, value, zero_ok) in positive {
      let ok = value.is_finite() && if zero_ok { value >= 0.0 } else { value > 0.0 };
      if !ok {
        return Err(PatternError::InvalidConfig(format!("{name} must be positive, got {value}")));
      }
    }
    Ok(())
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = PatternDetectionConfig::default();
    assert_eq!(config.lookback_period.get(), 5);
    assert_eq!(config.min_rejection_size, 2.0);
    assert_eq!(config.confidence_threshold, 65.0);
    assert_eq!(config.max_pullback_ratio.get(), 0.3);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_param_meta_matches_defaults() {
    let config = PatternDetectionConfig::default();
    let meta = PatternDetectionConfig::param_meta();
    assert!(meta.len() > 25);
    for m in meta {
      assert!(m.validate(m.default).is_ok(), "default of {} out of range", m.name);
    }
    let lookback = meta.iter().find(|m| m.name == "lookback_period").unwrap();
    assert_eq!(lookback.param_type, ParamType::Period);
    assert_eq!(lookback.default, config.lookback_period.get() as f64);
  }

  #[test]
  fn test_with_params_overrides_subset() {
    let mut params = HashMap::new();
    params.insert("confidence_threshold", 70.0);
    params.insert("min_negation_ratio", 0.8);

    let config = PatternDetectionConfig::with_params(&params).unwrap();
    assert_eq!(config.confidence_threshold, 70.0);
    assert_eq!(config.min_negation_ratio.get(), 0.8);
    assert_eq!(config.min_pole_size, 3.0);
  }

  #[test]
  fn test_with_params_rejects_unknown_and_out_of_range() {
    let mut params = HashMap::new();
    params.insert("no_such_param", 1.0);
    assert!(matches!(
      PatternDetectionConfig::with_params(&params),
      Err(PatternError::InvalidConfig(_))
    ));

    let mut params = HashMap::new();
    params.insert("lookback_period", 2.5);
    assert!(PatternDetectionConfig::with_params(&params).is_err());

    let mut params = HashMap::new();
    params.insert("confidence_threshold", 150.0);
    assert!(matches!(
      PatternDetectionConfig::with_params(&params),
      Err(PatternError::OutOfRange { .. })
    ));
  }

  #[test]
  fn test_with_params_checks_min_max_pairs() {
    let mut params = HashMap::new();
    params.insert("min_consolidation_duration", 10.0);
    params.insert("max_consolidation_duration", 5.0);
    assert!(matches!(
      PatternDetectionConfig::with_params(&params),
      Err(PatternError::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_partial_deserialize_fills_defaults() {
    let config: PatternDetectionConfig =
      serde_json::from_str(r#"{"lookback_period": 7, "min_pole_size": 4.5}"#).unwrap();
    assert_eq!(config.lookback_period.get(), 7);
    assert_eq!(config.min_pole_size, 4.5);
    assert_eq!(config.chop_lookback.get(), 15);

    let bad = serde_json::from_str::<PatternDetectionConfig>(r#"{"lookback_period": 0}"#);
    assert!(bad.is_err());
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::new("test", ParamType::Ratio, 0.5, (0.3, 0.7, 0.2), "Test");
    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < f64::EPSILON);
    assert!((grid[2] - 0.7).abs() < 1e-12);
  }
}

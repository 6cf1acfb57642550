//! Supertrend-based stop and take-profit targets
//!
//! The close is smoothed with a WMA followed by an EMA and compared against
//! ATR bands around the candle midpoint. Bands only tighten while the
//! smoothed price stays inside them; the trend flips when the smoothed price
//! crosses the previous band. Targets are derived from the last candle.
//!
//! # Example
//!
//! ```rust
//! use chartsig::trend_targets::{TrendTargetCalculator, TrendTargetsConfig};
//! # use chartsig::Candle;
//! # use chrono::{DateTime, Duration};
//! # let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
//! # let bars: Vec<Candle> = (0..40)
//! #     .map(|i| {
//! #         let c = 100.0 + i as f64;
//! #         Candle::new(t0 + Duration::minutes(i), c - 1.0, c + 0.5, c - 1.5, c, 1000)
//! #     })
//! #     .collect();
//! let calc = TrendTargetCalculator::new(TrendTargetsConfig::aggressive()).unwrap();
//! let targets = calc.targets(&bars).unwrap();
//! assert!(targets.stop_loss < targets.entry && targets.entry < targets.tp1);
//! ```

use serde::Serialize;

use crate::indicators::{atr_series, ema_series, wma_series};
use crate::params::{define_config, ParamMeta, ParameterizedConfig};
use crate::{validate_series, Direction, PatternError, Period, Result, OHLCV};

define_config! {
    /// Supertrend and target settings
    pub struct TrendTargetsConfig {
        atr_period: period = 10, (5.0, 30.0, 1.0),
            "ATR period (Wilder smoothing)";
        factor: float = 3.0, (1.0, 6.0, 0.5),
            "Band distance from the candle midpoint in ATRs";
        wma_length: period = 5, (1.0, 20.0, 1.0),
            "WMA length applied to the close";
        ema_length: period = 3, (1.0, 20.0, 1.0),
            "EMA length applied to the WMA";
        sl_multiplier: float = 1.5, (0.5, 5.0, 0.5),
            "Stop distance from the entry in ATRs";
        tp1_ratio: float = 0.5, (0.1, 5.0, 0.1),
            "First target as a multiple of the risk";
        tp2_ratio: float = 1.0, (0.1, 5.0, 0.1),
            "Second target as a multiple of the risk";
        tp3_ratio: float = 1.5, (0.1, 5.0, 0.1),
            "Third target as a multiple of the risk";
    }
}

impl TrendTargetsConfig {
    /// Fast scalping preset
    pub fn aggressive() -> Self {
        Self {
            atr_period: Period::new_const(7),
            factor: 2.0,
            wma_length: Period::new_const(3),
            ema_length: Period::new_const(2),
            sl_multiplier: 1.0,
            ..Self::default()
        }
    }

    /// Slow scalping preset with wider stops and targets
    pub fn conservative() -> Self {
        Self {
            atr_period: Period::new_const(14),
            factor: 3.5,
            wma_length: Period::new_const(8),
            ema_length: Period::new_const(5),
            sl_multiplier: 2.0,
            tp1_ratio: 1.0,
            tp2_ratio: 2.0,
            tp3_ratio: 3.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.factor <= 0.0 || self.sl_multiplier <= 0.0 {
            return Err(PatternError::InvalidConfig(
                "factor and sl_multiplier must be positive".to_string(),
            ));
        }
        let ratios = [self.tp1_ratio, self.tp2_ratio, self.tp3_ratio];
        if ratios.iter().any(|r| *r <= 0.0) || !ratios.windows(2).all(|w| w[0] <= w[1]) {
            return Err(PatternError::InvalidConfig(format!(
                "take-profit ratios must be positive and ascending, got {ratios:?}"
            )));
        }
        Ok(())
    }

    /// Candles needed before the first target is produced
    pub fn min_bars(&self) -> usize {
        self.atr_period
            .get()
            .max(self.wma_length.get() + self.ema_length.get())
            + 1
    }
}

impl ParameterizedConfig for TrendTargetsConfig {
    fn param_meta() -> &'static [ParamMeta] {
        Self::PARAMS
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        self.set_field(name, value)
    }

    fn validate(&self) -> Result<()> {
        TrendTargetsConfig::validate(self)
    }
}

/// Supertrend state at one candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub index: usize,
    /// Lower band in an uptrend, upper band in a downtrend
    pub supertrend: f64,
    pub upper: f64,
    pub lower: f64,
    pub smoothed: f64,
    pub trend: Direction,
    /// Trend differs from the previous candle
    pub flipped: bool,
}

/// Entry, stop and targets from the last candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendTargets {
    pub trend: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub supertrend: f64,
    pub atr: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendTargetCalculator {
    config: TrendTargetsConfig,
}

impl TrendTargetCalculator {
    pub fn new(config: TrendTargetsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrendTargetsConfig {
        &self.config
    }

    /// Supertrend state for every candle
    pub fn series<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<TrendPoint>> {
        let cfg = &self.config;
        let need = cfg.min_bars();
        if bars.len() < need {
            return Err(PatternError::InsufficientData {
                need,
                got: bars.len(),
            });
        }
        validate_series(bars)?;

        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let smoothed = ema_series(&wma_series(&closes, cfg.wma_length.get()), cfg.ema_length.get());
        let atr = atr_series(bars, cfg.atr_period.get());

        let mut points: Vec<TrendPoint> = Vec::with_capacity(bars.len());
        for (i, bar) in bars.iter().enumerate() {
            let mid = (bar.high() + bar.low()) / 2.0;
            let basic_upper = mid + cfg.factor * atr[i];
            let basic_lower = mid - cfg.factor * atr[i];

            let point = match points.last() {
                None => TrendPoint {
                    index: i,
                    supertrend: basic_lower,
                    upper: basic_upper,
                    lower: basic_lower,
                    smoothed: smoothed[i],
                    trend: Direction::Bullish,
                    flipped: false,
                },
                Some(prev) => {
                    let upper = if basic_upper < prev.upper || prev.smoothed > prev.upper {
                        basic_upper
                    } else {
                        prev.upper
                    };
                    let lower = if basic_lower > prev.lower || prev.smoothed < prev.lower {
                        basic_lower
                    } else {
                        prev.lower
                    };
                    let trend = if smoothed[i] > prev.upper {
                        Direction::Bullish
                    } else if smoothed[i] < prev.lower {
                        Direction::Bearish
                    } else {
                        prev.trend
                    };
                    TrendPoint {
                        index: i,
                        supertrend: if trend.is_bullish() { lower } else { upper },
                        upper,
                        lower,
                        smoothed: smoothed[i],
                        trend,
                        flipped: trend != prev.trend,
                    }
                },
            };
            points.push(point);
        }
        Ok(points)
    }

    /// Targets for a position in the current trend direction
    pub fn targets<T: OHLCV>(&self, bars: &[T]) -> Result<TrendTargets> {
        let points = self.series(bars)?;
        let (Some(last), Some(bar)) = (points.last(), bars.last()) else {
            return Err(PatternError::InsufficientData { need: 1, got: 0 });
        };
        let atr = atr_series(bars, self.config.atr_period.get())
            .last()
            .copied()
            .unwrap_or(0.0);

        let cfg = &self.config;
        let entry = bar.close();
        let side = if last.trend.is_bullish() { 1.0 } else { -1.0 };
        let risk = atr * cfg.sl_multiplier;
        let target = |ratio: f64| entry + side * risk * ratio;

        tracing::debug!(trend = last.trend.as_str(), entry, atr, "trend targets computed");

        Ok(TrendTargets {
            trend: last.trend,
            entry,
            stop_loss: entry - side * risk,
            tp1: target(cfg.tp1_ratio),
            tp2: target(cfg.tp2_ratio),
            tp3: target(cfg.tp3_ratio),
            supertrend: last.supertrend,
            atr,
        })
    }
}

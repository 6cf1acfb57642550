//! # chartsig - chart pattern signal engine
//!
//! Scans a time-ordered OHLCV series for Head-and-Shoulders, reversal flags,
//! three-line strikes, bull/bear traps and reversal candlesticks, scores each
//! detection on a 0-100 confidence scale and emits de-duplicated signal
//! records.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartsig::prelude::*;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
//! let bars: Vec<Candle> = (0..40)
//!     .map(|i| {
//!         let close = 100.0 + (i as f64 * 0.7).sin();
//!         Candle::new(start + Duration::minutes(i), close, close + 0.5, close - 0.5, close, 1_000)
//!     })
//!     .collect();
//!
//! // Create engine with every builtin detector
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//!
//! // Raw detections, gated by the confidence threshold
//! let patterns = engine.scan(&bars).unwrap();
//!
//! // Signal records, de-duplicated per (symbol, pattern, timeframe)
//! let key = SeriesKey::new("demo", "BTCUSDT", "1m");
//! let signals = engine.scan_signals(&bars, &key, start + Duration::minutes(40));
//! assert!(signals.len() <= patterns.len());
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

pub mod cooldown;
pub mod detectors;
pub mod indicators;
pub mod params;
pub mod pattern;
pub mod scoring;
pub mod signal;
pub mod swing;
pub mod trend_targets;

pub mod prelude {
    pub use crate::{
        // Cooldown
        cooldown::{CooldownStore, DedupKey, InMemoryCooldown},
        // Detectors
        detectors::*,
        // Parameters
        params::{ParamMeta, ParamType, ParameterizedConfig, PatternDetectionConfig},
        // Results
        pattern::{AnchorPoint, AnchorSet, Metadata, PatternDetails, PatternFamily, PatternKind, PatternResult},
        // Parallel
        scan_parallel,
        // Signals
        signal::{SeriesKey, SignalRecord},
        // Trend targets
        trend_targets::{TrendPoint, TrendTargetCalculator, TrendTargets, TrendTargetsConfig},
        validate_series,
        // Engine
        BuiltinDetector,
        Candle,
        ContextProvider,
        DefaultContextProvider,
        Direction,
        // Core traits
        DynPatternDetector,
        EngineBuilder,
        EngineConfig,
        OHLCVExt,
        PatternDetector,
        PatternEngine,
        // Errors
        PatternError,
        Period,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        SeriesContext,
        Trend,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during pattern detection
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Detector {detector} failed: {reason}")]
    Detector { detector: String, reason: String },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        (*self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Body as percent of the open
    #[inline]
    fn body_pct(&self) -> f64 {
        detectors::helpers::pct_change(self.open(), self.close()).abs()
    }

    /// Validate OHLCV data consistency. The index is filled in by
    /// [`validate_series`].
    fn validate(&self) -> Result<()> {
        let invalid = |reason| Err(PatternError::InvalidOHLCV { index: 0, reason });
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return invalid("NaN in OHLCV");
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return invalid("Infinite value in OHLCV");
        }
        if prices.iter().any(|&p| p <= 0.0) {
            return invalid("non-positive price");
        }
        if self.high() < self.low() {
            return invalid("high < low");
        }
        if self.close() > self.high() || self.close() < self.low() {
            return invalid("close outside [low, high]");
        }
        let volume = self.volume();
        if !volume.is_finite() || volume < 0.0 {
            return invalid("volume negative or not finite");
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate every candle and the timestamp order of a series.
///
/// Returns the first failure with its index.
pub fn validate_series<T: OHLCV>(bars: &[T]) -> Result<()> {
    let mut prev_ts = None;
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            PatternError::InvalidOHLCV { reason, .. } => PatternError::InvalidOHLCV { index: i, reason },
            other => other,
        })?;
        let ts = bar.timestamp();
        if let (Some(prev), Some(cur)) = (prev_ts, ts) {
            if cur <= prev {
                return Err(PatternError::InvalidOHLCV {
                    index: i,
                    reason: "timestamps not strictly ascending",
                });
            }
        }
        prev_ts = ts.or(prev_ts);
    }
    Ok(())
}

// ============================================================
// CANDLE
// ============================================================

/// Owned candle with a UTC open time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume as f64
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.timestamp)
    }
}

// ============================================================
// DIRECTION / TREND
// ============================================================

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
        }
    }
}

/// Prevailing trend before a formation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    #[default]
    Sideways,
}

// ============================================================
// SERIES CONTEXT
// ============================================================

/// Series-wide measurements shared by all detectors of one scan
#[derive(Debug, Clone, Default)]
pub struct SeriesContext {
    pub swings: swing::SwingPoints,
    /// Wilder ATR per bar
    pub atr: Vec<f64>,
}

/// Provider of series context - computed once per scan
pub trait ContextProvider: Send + Sync {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> SeriesContext;
}

/// Default context provider: swing points plus ATR
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    pub swing: swing::SwingLocator,
    pub atr_period: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            swing: swing::SwingLocator::default(),
            atr_period: Period::new_const(14),
        }
    }
}

impl DefaultContextProvider {
    /// Provider using the swing settings of a detection config
    pub fn from_config(config: &params::PatternDetectionConfig) -> Self {
        Self {
            swing: swing::SwingLocator::new(config.lookback_period, config.min_rejection_size),
            ..Self::default()
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> SeriesContext {
        SeriesContext {
            swings: self.swing.locate(bars),
            atr: indicators::atr_series(bars, self.atr_period.get()),
        }
    }
}

// ============================================================
// PATTERN DETECTOR TRAITS
// ============================================================

use pattern::{PatternFamily, PatternKind, PatternResult};

/// Generic pattern detector trait - for concrete types
pub trait PatternDetector: Send + Sync {
    fn family(&self) -> PatternFamily;
    fn min_bars(&self) -> usize;

    /// Scan the whole series. Best-of-one families return at most one
    /// result; candlestick scans may return several.
    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Vec<PatternResult>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe pattern detector trait - for custom detectors
pub trait DynPatternDetector: Send + Sync {
    fn name(&self) -> &str;
    fn min_bars(&self) -> usize;
    fn detect(&self, bars: &[&dyn OHLCV], ctx: &SeriesContext) -> Result<Vec<PatternResult>>;
    fn validate_config(&self) -> Result<()>;
}

impl<D: PatternDetector> DynPatternDetector for D {
    fn name(&self) -> &str {
        PatternDetector::family(self).as_str()
    }

    fn min_bars(&self) -> usize {
        PatternDetector::min_bars(self)
    }

    fn detect(&self, bars: &[&dyn OHLCV], ctx: &SeriesContext) -> Result<Vec<PatternResult>> {
        Ok(PatternDetector::detect(self, bars, ctx))
    }

    fn validate_config(&self) -> Result<()> {
        PatternDetector::validate_config(self)
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Vec<PatternResult> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, ctx)),*
                }
            }

            #[inline]
            pub fn family(&self) -> PatternFamily {
                match self {
                    $(Self::$variant(d) => PatternDetector::family(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }

        $(
            impl From<$detector> for BuiltinDetector {
                fn from(d: $detector) -> Self {
                    Self::$variant(d)
                }
            }
        )*
    };
}

define_builtin_detectors! {
    HeadShoulders(HeadShouldersDetector),
    ReversalFlag(ReversalFlagDetector),
    ThreeLineStrike(ThreeLineStrikeDetector),
    Trap(TrapDetector),
    Candlestick(CandlestickDetector),
}

impl BuiltinDetector {
    /// Detector of `family` configured from `config`
    pub fn for_family(family: PatternFamily, config: params::PatternDetectionConfig) -> Self {
        match family {
            PatternFamily::HeadShoulders => Self::HeadShoulders(config.into()),
            PatternFamily::ReversalFlag => Self::ReversalFlag(config.into()),
            PatternFamily::ThreeLineStrike => Self::ThreeLineStrike(config.into()),
            PatternFamily::Trap => Self::Trap(config.into()),
            PatternFamily::Candlestick => Self::Candlestick(config.into()),
        }
    }
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Detections below this confidence are dropped
    pub confidence_threshold: f64,
    /// Series shorter than this produce no detections
    pub min_candles: usize,
    pub pattern_filter: Option<Vec<PatternKind>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let detection = params::PatternDetectionConfig::default();
        Self {
            confidence_threshold: detection.confidence_threshold,
            min_candles: detection.min_candles.get(),
            pattern_filter: None,
        }
    }
}

/// Main pattern detection engine
pub struct PatternEngine<C: ContextProvider = DefaultContextProvider> {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    context_provider: C,
    config: EngineConfig,
    cooldown: Arc<dyn cooldown::CooldownStore>,
}

impl<C: ContextProvider> PatternEngine<C> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared cooldown store
    pub fn cooldown(&self) -> &Arc<dyn cooldown::CooldownStore> {
        &self.cooldown
    }

    /// Precompute the series context.
    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T]) -> SeriesContext {
        self.context_provider.compute(bars)
    }

    /// Run every detector over the series.
    ///
    /// Returns detections that pass the confidence threshold and pattern
    /// filter, builtin detectors first, in registration order. Fails only
    /// on invalid candles.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<PatternResult>> {
        validate_series(bars)?;
        if bars.len() < self.config.min_candles {
            debug!(
                candles = bars.len(),
                min_candles = self.config.min_candles,
                "not enough candles to scan"
            );
            return Ok(Vec::new());
        }

        let ctx = self.compute_context(bars);
        let mut results = Vec::new();

        // Fast path: builtin detectors (enum dispatch, no vtable)
        for detector in &self.builtin {
            if bars.len() < detector.min_bars() {
                continue;
            }
            let found = detector.detect(bars, &ctx);
            trace!(detector = detector.family().as_str(), found = found.len(), "detector finished");
            results.extend(found.into_iter().filter(|r| self.should_include(r)));
        }

        // Slow path: custom detectors (vtable)
        if !self.custom.is_empty() {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            for detector in &self.custom {
                if bars.len() < detector.min_bars() {
                    continue;
                }
                match detector.detect(&bar_refs, &ctx) {
                    Ok(found) => {
                        trace!(detector = detector.name(), found = found.len(), "detector finished");
                        results.extend(found.into_iter().filter(|r| self.should_include(r)));
                    },
                    Err(error) => {
                        warn!(detector = detector.name(), %error, "custom detector failed, skipping");
                    },
                }
            }
        }

        Ok(results)
    }

    /// Scan and turn fresh detections into signal records.
    ///
    /// Detections still inside the cooldown window for their
    /// (symbol, pattern, timeframe) are dropped without being recorded.
    pub fn try_scan_signals<T: OHLCV>(
        &self,
        bars: &[T],
        key: &signal::SeriesKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<signal::SignalRecord>> {
        let results = self.scan(bars)?;
        let mut signals = Vec::with_capacity(results.len());
        for result in &results {
            let dedup = cooldown::DedupKey::new(&key.symbol, result.kind, &key.timeframe);
            if self.cooldown.try_acquire(&dedup, now) {
                signals.push(signal::SignalRecord::from_result(key, result, now));
            } else {
                debug!(
                    symbol = %key.symbol,
                    pattern = %result.kind,
                    timeframe = %key.timeframe,
                    "signal suppressed by cooldown"
                );
            }
        }
        Ok(signals)
    }

    /// Like [`try_scan_signals`](Self::try_scan_signals) but an invalid
    /// series is logged and yields no signals.
    pub fn scan_signals<T: OHLCV>(
        &self,
        bars: &[T],
        key: &signal::SeriesKey,
        now: DateTime<Utc>,
    ) -> Vec<signal::SignalRecord> {
        match self.try_scan_signals(bars, key, now) {
            Ok(signals) => signals,
            Err(PatternError::InvalidOHLCV { index, reason }) => {
                warn!(symbol = %key.symbol, index, reason, "invalid candle, skipping series");
                Vec::new()
            },
            Err(error) => {
                warn!(symbol = %key.symbol, %error, "scan failed");
                Vec::new()
            },
        }
    }

    /// [`scan_signals`](Self::scan_signals) at the current wall-clock time
    pub fn scan_signals_now<T: OHLCV>(
        &self,
        bars: &[T],
        key: &signal::SeriesKey,
    ) -> Vec<signal::SignalRecord> {
        self.scan_signals(bars, key, Utc::now())
    }

    fn should_include(&self, r: &PatternResult) -> bool {
        if !r.is_detected(self.config.confidence_threshold) {
            return false;
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&r.kind) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.config.confidence_threshold) {
            return Err(PatternError::OutOfRange {
                field: "confidence_threshold",
                value: self.config.confidence_threshold,
                min: 0.0,
                max: 100.0,
            });
        }
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
pub struct EngineBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    detection: params::PatternDetectionConfig,
    families: Vec<PatternFamily>,
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    pattern_filter: Option<Vec<PatternKind>>,
    cooldown: Option<Arc<dyn cooldown::CooldownStore>>,
}

impl Default for EngineBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self {
            context_provider: DefaultContextProvider::default(),
            detection: params::PatternDetectionConfig::default(),
            families: Vec::new(),
            builtin: Vec::new(),
            custom: Vec::new(),
            pattern_filter: None,
            cooldown: None,
        }
    }

    /// Use `config` for the swing locator, the engine gate and every
    /// requested builtin family, whenever the family was requested.
    pub fn with_config(mut self, config: params::PatternDetectionConfig) -> Self {
        self.context_provider = DefaultContextProvider::from_config(&config);
        self.detection = config;
        self
    }
}

impl<C: ContextProvider> EngineBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> EngineBuilder<C2> {
        EngineBuilder {
            context_provider: provider,
            detection: self.detection,
            families: self.families,
            builtin: self.builtin,
            custom: self.custom,
            pattern_filter: self.pattern_filter,
            cooldown: self.cooldown,
        }
    }

    /// Add every builtin detector family
    pub fn with_all_defaults(self) -> Self {
        [
            PatternFamily::HeadShoulders,
            PatternFamily::ReversalFlag,
            PatternFamily::ThreeLineStrike,
            PatternFamily::Trap,
            PatternFamily::Candlestick,
        ]
        .into_iter()
        .fold(self, Self::with_family)
    }

    pub fn with_head_shoulders(self) -> Self {
        self.with_family(PatternFamily::HeadShoulders)
    }

    pub fn with_reversal_flag(self) -> Self {
        self.with_family(PatternFamily::ReversalFlag)
    }

    pub fn with_three_line_strike(self) -> Self {
        self.with_family(PatternFamily::ThreeLineStrike)
    }

    pub fn with_trap(self) -> Self {
        self.with_family(PatternFamily::Trap)
    }

    pub fn with_candlesticks(self) -> Self {
        self.with_family(PatternFamily::Candlestick)
    }

    /// Request a builtin family. Its detector is built from the final
    /// detection config in [`build`](Self::build); repeats are ignored.
    pub fn with_family(mut self, family: PatternFamily) -> Self {
        if !self.families.contains(&family) {
            self.families.push(family);
        }
        self
    }

    /// Add a preconfigured builtin detector, kept as is
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add a custom detector (slow path)
    pub fn add_custom<D: DynPatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Confidence gate for the engine and every requested family
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.detection.confidence_threshold = threshold;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.pattern_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Share a cooldown store between engines (default: a private
    /// [`InMemoryCooldown`](cooldown::InMemoryCooldown))
    pub fn cooldown(mut self, store: Arc<dyn cooldown::CooldownStore>) -> Self {
        self.cooldown = Some(store);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine<C>> {
        self.detection.validate()?;
        let detection = self.detection;
        let mut builtin: Vec<BuiltinDetector> = self
            .families
            .iter()
            .map(|&family| BuiltinDetector::for_family(family, detection))
            .collect();
        builtin.extend(self.builtin);
        let engine = PatternEngine {
            builtin,
            custom: self.custom,
            context_provider: self.context_provider,
            config: EngineConfig {
                confidence_threshold: detection.confidence_threshold,
                min_candles: detection.min_candles.get(),
                pattern_filter: self.pattern_filter,
            },
            cooldown: self
                .cooldown
                .unwrap_or_else(|| Arc::new(cooldown::InMemoryCooldown::default())),
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single series
#[derive(Debug)]
pub struct ScanResult {
    pub key: signal::SeriesKey,
    pub signals: Vec<signal::SignalRecord>,
}

/// Error from scanning a single series
#[derive(Debug)]
pub struct ScanError {
    pub key: signal::SeriesKey,
    pub error: PatternError,
}

/// Parallel scanning of multiple series against one engine (and its
/// shared cooldown store)
pub fn scan_parallel<'a, T, I, C>(
    engine: &PatternEngine<C>,
    series: I,
    now: DateTime<Utc>,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (signal::SeriesKey, &'a [T])>,
    C: ContextProvider,
{
    let results: Vec<_> = series
        .into_par_iter()
        .map(|(key, bars)| match engine.try_scan_signals(bars, &key, now) {
            Ok(signals) => Ok(ScanResult { key, signals }),
            Err(error) => Err(ScanError { key, error }),
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Default engine with DefaultContextProvider
pub type DefaultEngine = PatternEngine<DefaultContextProvider>;

// ============================================================
// TEST FIXTURES
// ============================================================


// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bar, from_closes};

    fn choppy(n: usize) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.9).sin() * 0.4).collect();
        from_closes(&closes, 0.002, 1000)
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let b = bar(0, 100.0, 110.0, 90.0, 105.0, 1000);
        assert_eq!(b.body(), 5.0);
        assert_eq!(b.range(), 20.0);
        assert!(b.is_bullish());
        assert!(!b.is_bearish());
        assert!((b.body_ratio().unwrap() - 0.25).abs() < 0.001);
        assert!((b.body_pct() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_candle_validation() {
        assert!(bar(0, 100.0, 110.0, 90.0, 105.0, 0).validate().is_ok());
        // open may gap outside the range
        assert!(bar(0, 120.0, 110.0, 90.0, 105.0, 0).validate().is_ok());
        assert!(bar(0, 100.0, 90.0, 110.0, 100.0, 0).validate().is_err());
        assert!(bar(0, 100.0, 110.0, 90.0, 111.0, 0).validate().is_err());
        assert!(bar(0, f64::NAN, 110.0, 90.0, 100.0, 0).validate().is_err());
    }

    #[test]
    fn test_validate_series_reports_index() {
        let mut bars = choppy(30);
        bars[10].close = bars[10].high + 1.0;
        match validate_series(&bars) {
            Err(PatternError::InvalidOHLCV { index, .. }) => assert_eq!(index, 10),
            other => panic!("expected InvalidOHLCV, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_series_timestamp_order() {
        let mut bars = choppy(10);
        bars[4].timestamp = bars[3].timestamp;
        assert!(matches!(
            validate_series(&bars),
            Err(PatternError::InvalidOHLCV { index: 4, .. })
        ));
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        assert_eq!(engine.builtin.len(), 5);
        assert_eq!(engine.config().confidence_threshold, 65.0);
    }

    #[test]
    fn test_builder_rejects_bad_threshold() {
        let engine = EngineBuilder::new().with_all_defaults().confidence_threshold(120.0).build();
        assert!(matches!(engine, Err(PatternError::OutOfRange { .. })));
    }

    #[test]
    fn test_empty_and_short_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars: Vec<Candle> = vec![];
        assert!(engine.scan(&bars).unwrap().is_empty());
        assert!(engine.scan(&choppy(10)).unwrap().is_empty());
    }

    #[test]
    fn test_scan_rejects_invalid_series() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let mut bars = choppy(30);
        bars[10].high = bars[10].low - 1.0;
        assert!(engine.scan(&bars).is_err());

        let key = signal::SeriesKey::new("s", "BTCUSDT", "5m");
        assert!(engine.scan_signals(&bars, &key, test_support::ts(100)).is_empty());
    }

    /// 20 candles falling 1.2% each, then a hammer on average volume
    fn hammer_after_decline() -> Vec<Candle> {
        let closes: Vec<f64> = (0..20).map(|i| 110.0 * 0.988f64.powi(i)).collect();
        let mut bars = from_closes(&closes, 0.001, 1000);
        let last = bars[19].close;
        bars.push(bar(20, last, last + 0.4, last - 1.6, last + 0.3, 1000));
        bars
    }

    fn hammers(engine: &DefaultEngine, bars: &[Candle]) -> usize {
        engine
            .scan(bars)
            .unwrap()
            .iter()
            .filter(|r| r.kind == PatternKind::Hammer)
            .count()
    }

    #[test]
    fn test_threshold_reaches_detectors() {
        let bars = hammer_after_decline();
        let default = EngineBuilder::new().with_candlesticks().build().unwrap();
        assert_eq!(hammers(&default, &bars), 0);

        let lowered = EngineBuilder::new()
            .with_candlesticks()
            .confidence_threshold(40.0)
            .build()
            .unwrap();
        assert_eq!(lowered.config().confidence_threshold, 40.0);
        let found = lowered.scan(&bars).unwrap();
        let hammer = found.iter().find(|r| r.kind == PatternKind::Hammer).unwrap();
        assert!((hammer.confidence - 53.37).abs() < 0.05, "confidence {}", hammer.confidence);
    }

    #[test]
    fn test_with_config_order_does_not_matter() {
        let bars = hammer_after_decline();
        let mut config = params::PatternDetectionConfig::default();
        config.confidence_threshold = 0.0;

        let before = EngineBuilder::new().with_config(config).with_candlesticks().build().unwrap();
        let after = EngineBuilder::new().with_candlesticks().with_config(config).build().unwrap();
        assert_eq!(hammers(&before, &bars), 1);
        assert_eq!(before.scan(&bars).unwrap(), after.scan(&bars).unwrap());
    }

    #[test]
    fn test_permissive_engine_scores_within_bounds() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .confidence_threshold(0.0)
            .build()
            .unwrap();
        for bars in [choppy(80), hammer_after_decline()] {
            for r in engine.scan(&bars).unwrap() {
                assert!((0.0..=100.0).contains(&r.confidence));
            }
        }
        assert!(!engine.scan(&hammer_after_decline()).unwrap().is_empty());
    }

    #[test]
    fn test_repeated_family_is_built_once() {
        let engine = EngineBuilder::new().with_trap().with_all_defaults().with_trap().build().unwrap();
        assert_eq!(engine.builtin.len(), 5);
    }

    #[test]
    fn test_added_detector_keeps_its_config() {
        let mut strict = params::PatternDetectionConfig::default();
        strict.confidence_threshold = 99.0;
        let engine = EngineBuilder::new()
            .add(BuiltinDetector::for_family(PatternFamily::Candlestick, strict))
            .confidence_threshold(0.0)
            .build()
            .unwrap();
        assert_eq!(hammers(&engine, &hammer_after_decline()), 0);
    }

    struct Failing;

    impl DynPatternDetector for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn min_bars(&self) -> usize {
            1
        }

        fn detect(&self, _: &[&dyn OHLCV], _: &SeriesContext) -> Result<Vec<PatternResult>> {
            Err(PatternError::Detector {
                detector: "failing".into(),
                reason: "boom".into(),
            })
        }

        fn validate_config(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_custom_detector_error_is_skipped() {
        let engine = EngineBuilder::new().add_custom(Failing).build().unwrap();
        assert!(engine.scan(&choppy(30)).unwrap().is_empty());
    }

    #[test]
    fn test_builtin_as_dyn_detector() {
        let d = TrapDetector::default();
        assert_eq!(DynPatternDetector::name(&d), "trap");
        let bars = choppy(30);
        let refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
        let ctx = DefaultContextProvider::default().compute(&bars);
        assert!(DynPatternDetector::detect(&d, &refs, &ctx).is_ok());
    }

    #[test]
    fn test_parallel_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

        let good = choppy(40);
        let mut bad = choppy(40);
        bad[5].close = -1.0;

        let series: Vec<(signal::SeriesKey, &[Candle])> = vec![
            (signal::SeriesKey::new("s", "AAPL", "1h"), &good),
            (signal::SeriesKey::new("s", "MSFT", "1h"), &bad),
        ];

        let (results, errors) = scan_parallel(&engine, series, test_support::ts(100));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.symbol, "AAPL");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].error, PatternError::InvalidOHLCV { index: 5, .. }));
    }
}

//! Reversal candlestick formations
//!
//! Single candles (hammer family, doji family), pairs (engulfing, piercing
//! line, dark cloud cover) and triples (morning/evening star) at the end of
//! the series. Every formation is only meaningful against the trend that
//! precedes it, so each check is gated by the trend classification of the
//! candles just before the formation.

use std::borrow::Cow;

use serde::Serialize;

use super::helpers::{avg_body, avg_volume, classify_trend, close_anchor, nearest_pivot_distance, safe_div};
use crate::indicators::atr_series;
use crate::pattern::{AnchorSet, Metadata, PatternDetails, PatternFamily, PatternKind, PatternResult};
use crate::scoring::Scorecard;
use crate::{OHLCVExt, PatternDetector, SeriesContext, Trend, OHLCV};

/// Percent distance to a pivot that still counts as support/resistance
const SR_PROXIMITY: f64 = 1.0;
/// Largest opposite shadow, as a share of the range, for hammer-family and
/// dragonfly/gravestone candles
const SMALL_SHADOW_RATIO: f64 = 0.1;
/// Smallest dominant shadow of a dragonfly/gravestone doji, share of range
const LONG_SHADOW_RATIO: f64 = 0.6;
/// First star candle body must be at least this multiple of ATR
const LONG_BODY_ATR: f64 = 0.5;
const ATR_PERIOD: usize = 14;

config_detectors! {
    /// Reversal candlestick detector
    CandlestickDetector,
}

/// Measurements behind a candlestick detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandlestickDetails {
    pub candles: usize,
    pub trend: Trend,
    /// Net percent change over the trend window
    pub trend_change: f64,
    /// Shape quality 0..=1
    pub shape_quality: f64,
    /// Last candle volume over the trend window average
    pub volume_ratio: f64,
    pub pivot_distance: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Formation {
    kind: PatternKind,
    start: usize,
    end: usize,
    trend: Trend,
    trend_change: f64,
    quality: f64,
}

impl Formation {
    fn shape_points(&self) -> f64 {
        match self.kind {
            PatternKind::BullishEngulfing
            | PatternKind::BearishEngulfing
            | PatternKind::MorningStar
            | PatternKind::EveningStar => 40.0,
            PatternKind::Doji | PatternKind::DragonflyDoji | PatternKind::GravestoneDoji => 30.0,
            _ => 35.0,
        }
    }
}

impl PatternDetector for CandlestickDetector {
    fn family(&self) -> PatternFamily {
        PatternFamily::Candlestick
    }

    fn min_bars(&self) -> usize {
        self.config.trend_window.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Vec<PatternResult> {
        let n = bars.len();
        if n < PatternDetector::min_bars(self) {
            return Vec::new();
        }
        let atr: Cow<'_, [f64]> = if ctx.atr.len() == n {
            Cow::Borrowed(ctx.atr.as_slice())
        } else {
            Cow::Owned(atr_series(bars, ATR_PERIOD))
        };

        let first = n.saturating_sub(self.config.candle_scan_window.get());
        let mut results: Vec<PatternResult> = (first..n)
            .flat_map(|i| self.formations_at(bars, &atr, i))
            .map(|f| self.score(bars, ctx, f))
            .filter(|r| r.confidence >= self.config.confidence_threshold)
            .collect();
        results.sort_by_key(|r| (r.anchors.end().index, r.kind));
        results
    }
}

impl CandlestickDetector {
    /// Trend over the window ending just before `start`
    fn trend_before<T: OHLCV>(&self, bars: &[T], start: usize) -> (Trend, f64) {
        classify_trend(bars, start, self.config.trend_window.get(), self.config.trend_threshold)
    }

    fn formations_at<T: OHLCV>(&self, bars: &[T], atr: &[f64], i: usize) -> Vec<Formation> {
        let mut found = Vec::new();
        let mut push = |kind, start, (trend, trend_change): (Trend, f64), quality: f64| {
            found.push(Formation {
                kind,
                start,
                end: i,
                trend,
                trend_change,
                quality: quality.clamp(0.0, 1.0),
            })
        };

        // single candle
        let bar = &bars[i];
        let range = bar.range();
        if range > f64::EPSILON && i >= 1 {
            let trend = self.trend_before(bars, i);
            let body = bar.body();
            let upper = bar.upper_shadow();
            let lower = bar.lower_shadow();
            let body_ratio = body / range;
            let wick = self.config.hammer_wick_ratio;
            let small = |shadow: f64| shadow <= body.max(SMALL_SHADOW_RATIO * range);

            if body_ratio <= self.config.doji_body_ratio.get() {
                let doji_quality = 1.0 - safe_div(body_ratio, self.config.doji_body_ratio.get());
                if upper <= SMALL_SHADOW_RATIO * range && lower >= LONG_SHADOW_RATIO * range && trend.0 == Trend::Down {
                    push(PatternKind::DragonflyDoji, i, trend, lower / range);
                } else if lower <= SMALL_SHADOW_RATIO * range
                    && upper >= LONG_SHADOW_RATIO * range
                    && trend.0 == Trend::Up
                {
                    push(PatternKind::GravestoneDoji, i, trend, upper / range);
                } else if trend.0 != Trend::Sideways {
                    push(PatternKind::Doji, i, trend, doji_quality);
                }
            } else {
                if lower >= wick * body && small(upper) {
                    match trend.0 {
                        Trend::Down => push(PatternKind::Hammer, i, trend, lower / range),
                        Trend::Up => push(PatternKind::HangingMan, i, trend, lower / range),
                        Trend::Sideways => {},
                    }
                }
                if upper >= wick * body && small(lower) {
                    match trend.0 {
                        Trend::Down => push(PatternKind::InvertedHammer, i, trend, upper / range),
                        Trend::Up => push(PatternKind::ShootingStar, i, trend, upper / range),
                        Trend::Sideways => {},
                    }
                }
            }
        }

        // two candles
        if i >= 1 {
            let prev = &bars[i - 1];
            let trend = self.trend_before(bars, i - 1);
            let prev_body = prev.body();
            if prev_body > f64::EPSILON {
                let ratio = bar.body() / prev_body;
                let engulfs_up = prev.is_bearish()
                    && bar.is_bullish()
                    && bar.open() <= prev.close()
                    && bar.close() >= prev.open();
                let engulfs_down = prev.is_bullish()
                    && bar.is_bearish()
                    && bar.open() >= prev.close()
                    && bar.close() <= prev.open();
                if ratio >= self.config.engulfing_ratio {
                    if engulfs_up && trend.0 == Trend::Down {
                        push(PatternKind::BullishEngulfing, i - 1, trend, ratio - 1.0);
                    }
                    if engulfs_down && trend.0 == Trend::Up {
                        push(PatternKind::BearishEngulfing, i - 1, trend, ratio - 1.0);
                    }
                }

                let min_pen = self.config.penetration_ratio.get();
                let pen_quality = |pen: f64| safe_div(pen - min_pen, 1.0 - min_pen);
                if prev.is_bearish() && bar.is_bullish() && bar.open() < prev.close() && bar.close() < prev.open() {
                    let pen = (bar.close() - prev.close()) / prev_body;
                    if pen >= min_pen && trend.0 == Trend::Down {
                        push(PatternKind::PiercingLine, i - 1, trend, pen_quality(pen));
                    }
                }
                if prev.is_bullish() && bar.is_bearish() && bar.open() > prev.close() && bar.close() > prev.open() {
                    let pen = (prev.close() - bar.close()) / prev_body;
                    if pen >= min_pen && trend.0 == Trend::Up {
                        push(PatternKind::DarkCloudCover, i - 1, trend, pen_quality(pen));
                    }
                }
            }
        }

        // three candles
        if i >= 2 {
            let (a, star) = (&bars[i - 2], &bars[i - 1]);
            let trend = self.trend_before(bars, i - 2);
            let long_first = a.body() >= LONG_BODY_ATR * atr.get(i - 2).copied().unwrap_or(0.0);
            let small_star = star.body() <= self.config.star_body_ratio.get() * a.body();
            if long_first && small_star && a.body() > f64::EPSILON {
                let mid = (a.open() + a.close()) / 2.0;
                let half = a.body() / 2.0;
                if a.is_bearish() && bar.is_bullish() && bar.close() > mid && trend.0 == Trend::Down {
                    push(PatternKind::MorningStar, i - 2, trend, (bar.close() - mid) / half);
                }
                if a.is_bullish() && bar.is_bearish() && bar.close() < mid && trend.0 == Trend::Up {
                    push(PatternKind::EveningStar, i - 2, trend, (mid - bar.close()) / half);
                }
            }
        }

        found
    }

    fn score<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext, f: Formation) -> PatternResult {
        let cfg = &self.config;
        let window = f.start.saturating_sub(cfg.trend_window.get())..f.start;

        let direction = match f.kind.typical_direction() {
            Some(d) => d,
            // plain doji reverses the prior trend
            None if f.trend == Trend::Down => crate::Direction::Bullish,
            None => crate::Direction::Bearish,
        };

        let pivot_distance = if direction.is_bullish() {
            let low = bars[f.start..=f.end].iter().map(|b| b.low()).fold(f64::MAX, f64::min);
            nearest_pivot_distance(&ctx.swings.lows, low, f.start)
        } else {
            let high = bars[f.start..=f.end].iter().map(|b| b.high()).fold(f64::MIN, f64::max);
            nearest_pivot_distance(&ctx.swings.highs, high, f.start)
        };

        let volume_ratio = safe_div(bars[f.end].volume(), avg_volume(bars, window.clone()));

        // bodies shrinking into the formation
        let mid = window.start + (window.end - window.start) / 2;
        let early_body = avg_body(bars, window.start..mid);
        let late_body = avg_body(bars, mid..window.end);
        let exhaustion = if late_body < early_body {
            20.0 * (1.0 - safe_div(late_body, early_body))
        } else {
            0.0
        };

        let mut card = Scorecard::new();
        card.capped("shape", f.shape_points() * (0.6 + 0.4 * f.quality), f.shape_points())
            .capped("trend_strength", 2.0 * f.trend_change.abs(), 20.0)
            .capped(
                "support_resistance",
                pivot_distance.map_or(0.0, |d| 20.0 * (1.0 - d / SR_PROXIMITY)),
                20.0,
            )
            .capped("volume", 15.0 * (volume_ratio - 1.0), 15.0)
            .capped("momentum_exhaustion", exhaustion, 10.0);

        PatternResult {
            kind: f.kind,
            direction,
            confidence: card.total(),
            anchors: AnchorSet::Candles {
                first: close_anchor(bars, f.start),
                last: close_anchor(bars, f.end),
            },
            metadata: Metadata {
                factors: card.into_terms(),
                details: PatternDetails::Candlestick(CandlestickDetails {
                    candles: f.end - f.start + 1,
                    trend: f.trend,
                    trend_change: f.trend_change,
                    shape_quality: f.quality,
                    volume_ratio,
                    pivot_distance,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bar, from_closes};
    use crate::{Candle, ContextProvider, DefaultContextProvider, Direction};

    /// `n` closes falling `step` percent per candle from 110
    fn downtrend(n: usize, step: f64) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n).map(|i| 110.0 * (1.0 - step / 100.0).powi(i as i32)).collect();
        from_closes(&closes, 0.001, 1000)
    }

    fn uptrend(n: usize, step: f64) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 * (1.0 + step / 100.0).powi(i as i32)).collect();
        from_closes(&closes, 0.001, 1000)
    }

    fn run(bars: &[Candle]) -> Vec<PatternResult> {
        let ctx = DefaultContextProvider::default().compute(bars);
        CandlestickDetector::default().detect(bars, &ctx)
    }

    #[test]
    fn test_hammer_after_downtrend() {
        let mut bars = downtrend(15, 1.2);
        let last = bars[14].close;
        // range 2.0: lower shadow 1.6, body 0.3, upper 0.1
        bars.push(bar(15, last, last + 0.4, last - 1.6, last + 0.3, 2000));
        let results = run(&bars);
        let hammer = results
            .iter()
            .find(|r| r.kind == PatternKind::Hammer)
            .expect("hammer detected");
        assert_eq!(hammer.direction, Direction::Bullish);
        assert!((hammer.confidence - 68.37).abs() < 0.05, "confidence {}", hammer.confidence);
        assert!(results.iter().all(|r| r.kind != PatternKind::HangingMan));
    }

    #[test]
    fn test_same_shape_in_uptrend_is_hanging_man() {
        let mut bars = uptrend(15, 1.2);
        let last = bars[14].close;
        bars.push(bar(15, last, last + 0.4, last - 1.6, last + 0.3, 2000));
        let ctx = DefaultContextProvider::default().compute(&bars);
        let mut config = crate::params::PatternDetectionConfig::default();
        config.confidence_threshold = 0.0;
        let results = CandlestickDetector::new(config).detect(&bars, &ctx);
        assert!(results.iter().any(|r| r.kind == PatternKind::HangingMan && r.direction == Direction::Bearish));
        assert!(results.iter().all(|r| r.kind != PatternKind::Hammer));
    }

    #[test]
    fn test_bullish_engulfing() {
        let mut bars = downtrend(15, 1.2);
        let c = bars[14].close;
        bars.push(bar(15, c, c + 0.1, c - 1.1, c - 1.0, 1000));
        bars.push(bar(16, c - 1.1, c + 1.3, c - 1.2, c + 1.2, 2500));
        let results = run(&bars);
        let engulfing = results
            .iter()
            .find(|r| r.kind == PatternKind::BullishEngulfing)
            .expect("engulfing detected");
        match engulfing.anchors {
            AnchorSet::Candles { first, last } => assert_eq!((first.index, last.index), (15, 16)),
            other => panic!("unexpected anchors {other:?}"),
        }
        assert!((engulfing.confidence - 76.17).abs() < 0.05, "confidence {}", engulfing.confidence);
    }

    #[test]
    fn test_sideways_market_has_no_reversal() {
        let closes: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 100.0 } else { 100.3 }).collect();
        let mut bars = from_closes(&closes, 0.001, 1000);
        let last = bars[19].close;
        bars.push(bar(20, last, last + 0.4, last - 1.6, last + 0.3, 2000));
        let ctx = DefaultContextProvider::default().compute(&bars);
        let mut config = crate::params::PatternDetectionConfig::default();
        config.confidence_threshold = 0.0;
        assert!(CandlestickDetector::new(config).detect(&bars, &ctx).is_empty());
    }

    #[test]
    fn test_results_ordered_by_candle() {
        let mut bars = downtrend(15, 1.2);
        let c = bars[14].close;
        bars.push(bar(15, c, c + 0.1, c - 1.1, c - 1.0, 1000));
        bars.push(bar(16, c - 1.1, c + 1.3, c - 1.2, c + 1.2, 2500));
        let ctx = DefaultContextProvider::default().compute(&bars);
        let mut config = crate::params::PatternDetectionConfig::default();
        config.confidence_threshold = 0.0;
        let results = CandlestickDetector::new(config).detect(&bars, &ctx);
        let order: Vec<_> = results.iter().map(|r| (r.anchors.end().index, r.kind)).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }
}

//! Common helper functions for pattern detection
//!
//! Guarded arithmetic and window measurements shared across all detector
//! modules. Every ratio here returns `0.0` instead of NaN/Infinity when its
//! denominator vanishes.

use std::ops::Range;

use crate::pattern::AnchorPoint;
use crate::swing::SwingPoint;
use crate::{OHLCVExt, Trend, OHLCV};

/// Smallest price treated as non-zero
pub const PRICE_EPSILON: f64 = 1e-9;

// ============================================================
// GUARDED ARITHMETIC
// ============================================================

/// Percentage change from `from` to `to`; 0 when `from` is ~0 or non-finite
#[inline]
pub fn pct_change(from: f64, to: f64) -> f64 {
    if !from.is_finite() || !to.is_finite() || from.abs() <= PRICE_EPSILON {
        return 0.0;
    }
    (to - from) / from * 100.0
}

/// `num / den`, or 0 when the quotient would not be finite
#[inline]
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den.abs() <= f64::EPSILON {
        return 0.0;
    }
    let q = num / den;
    if q.is_finite() {
        q
    } else {
        0.0
    }
}

// ============================================================
// WINDOW MEASUREMENTS
// ============================================================

/// Mean volume over `range` (clipped to the series)
pub fn avg_volume<T: OHLCV>(bars: &[T], range: Range<usize>) -> f64 {
    let slice = clip(bars, range);
    if slice.is_empty() {
        return 0.0;
    }
    slice.iter().map(|b| b.volume()).sum::<f64>() / slice.len() as f64
}

/// Mean real body over `range` (clipped to the series)
pub fn avg_body<T: OHLCV>(bars: &[T], range: Range<usize>) -> f64 {
    let slice = clip(bars, range);
    if slice.is_empty() {
        return 0.0;
    }
    slice.iter().map(|b| b.body()).sum::<f64>() / slice.len() as f64
}

/// Close-to-close percentage move from `from` to `to`
#[inline]
pub fn momentum<T: OHLCV>(bars: &[T], from: usize, to: usize) -> f64 {
    match (bars.get(from), bars.get(to)) {
        (Some(a), Some(b)) => pct_change(a.close(), b.close()),
        _ => 0.0,
    }
}

/// Index and value of the highest high in `range`
pub fn highest_high<T: OHLCV>(bars: &[T], range: Range<usize>) -> Option<(usize, f64)> {
    let start = range.start;
    clip(bars, range)
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, b)| match best {
            Some((_, h)) if h >= b.high() => best,
            _ => Some((start + i, b.high())),
        })
}

/// Index and value of the lowest low in `range`
pub fn lowest_low<T: OHLCV>(bars: &[T], range: Range<usize>) -> Option<(usize, f64)> {
    let start = range.start;
    clip(bars, range)
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, b)| match best {
            Some((_, l)) if l <= b.low() => best,
            _ => Some((start + i, b.low())),
        })
}

/// Mean absolute close-to-close percentage change within `range`
pub fn mean_abs_change<T: OHLCV>(bars: &[T], range: Range<usize>) -> f64 {
    let slice = clip(bars, range);
    if slice.len() < 2 {
        return 0.0;
    }
    let total: f64 = slice
        .windows(2)
        .map(|w| pct_change(w[0].close(), w[1].close()).abs())
        .sum();
    total / (slice.len() - 1) as f64
}

#[inline]
fn clip<T>(bars: &[T], range: Range<usize>) -> &[T] {
    let end = range.end.min(bars.len());
    let start = range.start.min(end);
    &bars[start..end]
}

// ============================================================
// TREND CONTEXT
// ============================================================

/// Classify the trend over the `window` candles ending just before `end`.
///
/// Returns the trend and the net close-to-close change in percent. A trend
/// needs both a net move beyond `threshold_pct` and a majority of candles
/// moving in that direction.
pub fn classify_trend<T: OHLCV>(
    bars: &[T],
    end: usize,
    window: usize,
    threshold_pct: f64,
) -> (Trend, f64) {
    let end = end.min(bars.len());
    if window < 2 || end < window {
        return (Trend::Sideways, 0.0);
    }
    let slice = &bars[end - window..end];
    let net = pct_change(slice[0].close(), slice[window - 1].close());
    let (ups, downs) = slice.windows(2).fold((0usize, 0usize), |(u, d), w| {
        if w[1].close() > w[0].close() {
            (u + 1, d)
        } else if w[1].close() < w[0].close() {
            (u, d + 1)
        } else {
            (u, d)
        }
    });
    let moves = window - 1;
    let trend = if net > threshold_pct && ups * 2 > moves {
        Trend::Up
    } else if net < -threshold_pct && downs * 2 > moves {
        Trend::Down
    } else {
        Trend::Sideways
    };
    (trend, net)
}

// ============================================================
// SUPPORT / RESISTANCE
// ============================================================

/// Side of price a level sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSide {
    /// Level above price, tested by highs
    Resistance,
    /// Level below price, tested by lows
    Support,
}

/// Count candles in `range` whose extreme lies within `tolerance_pct` of
/// `level`, and how many of those closed back away from it.
pub fn level_touches<T: OHLCV>(
    bars: &[T],
    range: Range<usize>,
    level: f64,
    tolerance_pct: f64,
    side: LevelSide,
) -> (usize, usize) {
    if level <= PRICE_EPSILON {
        return (0, 0);
    }
    let tol = level * tolerance_pct / 100.0;
    clip(bars, range).iter().fold((0, 0), |(touches, rejections), b| {
        let (extreme, rejected) = match side {
            LevelSide::Resistance => (b.high(), b.close() < level - tol),
            LevelSide::Support => (b.low(), b.close() > level + tol),
        };
        if (extreme - level).abs() <= tol {
            (touches + 1, rejections + usize::from(rejected))
        } else {
            (touches, rejections)
        }
    })
}

/// Distance in percent from `price` to the closest pivot price, considering
/// only pivots strictly before `before`.
pub fn nearest_pivot_distance(pivots: &[SwingPoint], price: f64, before: usize) -> Option<f64> {
    pivots
        .iter()
        .filter(|p| p.index < before)
        .map(|p| pct_change(p.price, price).abs())
        .fold(None, |best: Option<f64>, d| match best {
            Some(b) if b <= d => Some(b),
            _ => Some(d),
        })
}

// ============================================================
// ANCHORS
// ============================================================

/// Anchor point at `index` with an explicit price
#[inline]
pub fn anchor<T: OHLCV>(bars: &[T], index: usize, price: f64) -> AnchorPoint {
    AnchorPoint {
        index,
        price,
        timestamp: bars.get(index).and_then(|b| b.timestamp()),
    }
}

/// Anchor point at `index` priced at the close
#[inline]
pub fn close_anchor<T: OHLCV>(bars: &[T], index: usize) -> AnchorPoint {
    let price = bars.get(index).map(|b| b.close()).unwrap_or(0.0);
    anchor(bars, index, price)
}

//! Swing-point (pivot) extraction
//!
//! A peak is a candle whose high is not exceeded by any candle within
//! `lookback` positions on either side; troughs are defined the same way on
//! lows. Pivots whose rejection (distance from extreme back to the close) is
//! below `min_rejection_size` percent are discarded.

use serde::Serialize;

use crate::detectors::helpers::pct_change;
use crate::{Period, OHLCV};

/// Maximum volume multiplier applied to pivot strength
pub const MAX_VOLUME_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwingKind {
    High,
    Low,
}

/// Local extreme of the series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwingPoint {
    pub index: usize,
    pub kind: SwingKind,
    /// High for peaks, low for troughs
    pub price: f64,
    pub close: f64,
    pub volume: f64,
    /// Prominence: price deviation times capped volume ratio
    pub strength: f64,
    /// Percent pullback from the extreme to the close
    pub rejection_size: f64,
}

/// Peaks and troughs, each sorted by descending strength
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwingPoints {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

impl SwingPoints {
    /// Peaks in chronological order
    pub fn highs_by_index(&self) -> Vec<SwingPoint> {
        let mut v = self.highs.clone();
        v.sort_by_key(|p| p.index);
        v
    }

    /// Troughs in chronological order
    pub fn lows_by_index(&self) -> Vec<SwingPoint> {
        let mut v = self.lows.clone();
        v.sort_by_key(|p| p.index);
        v
    }
}

/// Stateless pivot locator
#[derive(Debug, Clone, Copy)]
pub struct SwingLocator {
    pub lookback: Period,
    /// Minimum rejection size in percent
    pub min_rejection_size: f64,
}

impl Default for SwingLocator {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(5),
            min_rejection_size: 2.0,
        }
    }
}

impl SwingLocator {
    pub fn new(lookback: Period, min_rejection_size: f64) -> Self {
        Self {
            lookback,
            min_rejection_size,
        }
    }

    /// Locate all peaks and troughs
    pub fn locate<T: OHLCV>(&self, bars: &[T]) -> SwingPoints {
        let lb = self.lookback.get();
        let n = bars.len();
        let mut points = SwingPoints::default();
        if n < 2 * lb + 1 {
            return points;
        }

        for i in lb..n - lb {
            let window = i - lb..=i + lb;
            let bar = &bars[i];

            let is_peak = window.clone().all(|j| bars[j].high() <= bar.high());
            if is_peak {
                let rejection = pct_change(bar.high(), bar.close()).abs();
                if rejection >= self.min_rejection_size {
                    let left = max_by(bars, i - lb..i, |b| b.high());
                    let right = max_by(bars, i + 1..i + lb + 1, |b| b.high());
                    let deviation =
                        (pct_change(left, bar.high()) + pct_change(right, bar.high())).max(0.0);
                    points.highs.push(SwingPoint {
                        index: i,
                        kind: SwingKind::High,
                        price: bar.high(),
                        close: bar.close(),
                        volume: bar.volume(),
                        strength: deviation * volume_ratio(bars, i, lb),
                        rejection_size: rejection,
                    });
                }
            }

            let is_trough = window.clone().all(|j| bars[j].low() >= bar.low());
            if is_trough {
                let rejection = pct_change(bar.low(), bar.close()).abs();
                if rejection >= self.min_rejection_size {
                    let left = min_by(bars, i - lb..i, |b| b.low());
                    let right = min_by(bars, i + 1..i + lb + 1, |b| b.low());
                    let deviation =
                        (pct_change(bar.low(), left) + pct_change(bar.low(), right)).max(0.0);
                    points.lows.push(SwingPoint {
                        index: i,
                        kind: SwingKind::Low,
                        price: bar.low(),
                        close: bar.close(),
                        volume: bar.volume(),
                        strength: deviation * volume_ratio(bars, i, lb),
                        rejection_size: rejection,
                    });
                }
            }
        }

        sort_by_strength(&mut points.highs);
        sort_by_strength(&mut points.lows);
        points
    }
}

fn max_by<T, F: Fn(&T) -> f64>(bars: &[T], range: std::ops::Range<usize>, f: F) -> f64 {
    bars[range].iter().map(f).fold(f64::MIN, f64::max)
}

fn min_by<T, F: Fn(&T) -> f64>(bars: &[T], range: std::ops::Range<usize>, f: F) -> f64 {
    bars[range].iter().map(f).fold(f64::MAX, f64::min)
}

/// Pivot volume relative to its window average, capped at [`MAX_VOLUME_RATIO`]
fn volume_ratio<T: OHLCV>(bars: &[T], index: usize, lookback: usize) -> f64 {
    let window = &bars[index - lookback..=index + lookback];
    let avg = window.iter().map(|b| b.volume()).sum::<f64>() / window.len() as f64;
    if avg <= f64::EPSILON {
        return 1.0;
    }
    (bars[index].volume() / avg).min(MAX_VOLUME_RATIO)
}

fn sort_by_strength(points: &mut [SwingPoint]) {
    points.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| a.index.cmp(&b.index))
    });
}

//! Head-and-Shoulders tops and inverse Head-and-Shoulders bottoms
//!
//! Triples of swing pivots (left shoulder, head, right shoulder) ordered by
//! index are tried oldest first; the head must be strictly more extreme than
//! both shoulders. The neckline joins the deepest retracements between each
//! shoulder and the head and is projected forward to look for a break.

use serde::Serialize;

use super::helpers::{anchor, highest_high, lowest_low, momentum, pct_change};
use crate::pattern::{AnchorSet, Metadata, PatternDetails, PatternFamily, PatternKind, PatternResult};
use crate::scoring::{proximity_bonus, Scorecard};
use crate::swing::SwingPoint;
use crate::{Direction, PatternDetector, SeriesContext, OHLCV};

config_detectors! {
    /// Head-and-Shoulders detector (bearish tops on peaks, bullish bottoms
    /// on troughs)
    HeadShouldersDetector,
}

/// Measurements behind a Head-and-Shoulders detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadShouldersDetails {
    /// Mean of the two neckline anchors
    pub neckline: f64,
    /// Neckline change per candle
    pub neckline_slope: f64,
    pub neckline_break_confirmed: bool,
    pub break_index: Option<usize>,
    /// Percent beyond the projected neckline at the break close
    pub break_strength: f64,
    /// Percent move into the left shoulder
    pub pre_move: f64,
    /// Momentum weakening from head to right shoulder, in percent
    pub momentum_change: f64,
    pub avg_rejection: f64,
    pub head_prominence: f64,
    pub shoulder_imbalance: f64,
    pub span: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// Peaks, neckline below
    Top,
    /// Troughs, neckline above
    Bottom,
}

impl Side {
    #[inline]
    fn more_extreme(self, a: f64, b: f64) -> bool {
        match self {
            Side::Top => a > b,
            Side::Bottom => a < b,
        }
    }
}

struct Neckline {
    start: usize,
    start_price: f64,
    slope: f64,
    mean: f64,
}

impl Neckline {
    #[inline]
    fn at(&self, index: usize) -> f64 {
        self.start_price + self.slope * (index as f64 - self.start as f64)
    }
}

impl PatternDetector for HeadShouldersDetector {
    fn family(&self) -> PatternFamily {
        PatternFamily::HeadShoulders
    }

    fn min_bars(&self) -> usize {
        2 * self.config.lookback_period.get() + 3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Vec<PatternResult> {
        if bars.len() < PatternDetector::min_bars(self) {
            return Vec::new();
        }
        let peaks = ctx.swings.highs_by_index();
        let troughs = ctx.swings.lows_by_index();
        self.find_first(bars, &peaks, Side::Top)
            .into_iter()
            .chain(self.find_first(bars, &troughs, Side::Bottom))
            .collect()
    }
}

impl HeadShouldersDetector {
    fn find_first<T: OHLCV>(&self, bars: &[T], pivots: &[SwingPoint], side: Side) -> Option<PatternResult> {
        let threshold = self.config.confidence_threshold;
        for (a, left) in pivots.iter().enumerate() {
            for (b, head) in pivots.iter().enumerate().skip(a + 1) {
                if !side.more_extreme(head.price, left.price) {
                    continue;
                }
                for right in pivots.iter().skip(b + 1) {
                    if !side.more_extreme(head.price, right.price) {
                        continue;
                    }
                    let result = self.evaluate(bars, left, head, right, side);
                    if result.confidence >= threshold {
                        return Some(result);
                    }
                }
            }
        }
        None
    }

    fn neckline<T: OHLCV>(&self, bars: &[T], left: usize, head: usize, right: usize, side: Side) -> Neckline {
        let extreme = |range| match side {
            Side::Top => lowest_low(bars, range),
            Side::Bottom => highest_high(bars, range),
        };
        let (i1, p1) = extreme(left..head + 1).unwrap_or((left, bars[left].close()));
        let (i2, p2) = extreme(head..right + 1).unwrap_or((right, bars[right].close()));
        let slope = if i2 > i1 { (p2 - p1) / (i2 - i1) as f64 } else { 0.0 };
        Neckline {
            start: i1,
            start_price: p1,
            slope,
            mean: (p1 + p2) / 2.0,
        }
    }

    fn evaluate<T: OHLCV>(
        &self,
        bars: &[T],
        left: &SwingPoint,
        head: &SwingPoint,
        right: &SwingPoint,
        side: Side,
    ) -> PatternResult {
        let cfg = &self.config;
        let neck = self.neckline(bars, left.index, head.index, right.index, side);

        // move into the left shoulder
        let pre_start = left.index.saturating_sub(cfg.hs_pre_move_window.get());
        let pre_move = match side {
            Side::Top => lowest_low(bars, pre_start..left.index)
                .map(|(_, low)| pct_change(low, left.price))
                .unwrap_or(0.0),
            Side::Bottom => highest_high(bars, pre_start..left.index)
                .map(|(_, high)| -pct_change(high, left.price))
                .unwrap_or(0.0),
        };

        let period = cfg.hs_momentum_period.get();
        let head_momentum = momentum(bars, head.index.saturating_sub(period), head.index);
        let right_momentum = momentum(bars, right.index.saturating_sub(period), right.index);
        let momentum_change = match side {
            Side::Top => head_momentum - right_momentum,
            Side::Bottom => right_momentum - head_momentum,
        };

        let avg_rejection = (left.rejection_size + head.rejection_size + right.rejection_size) / 3.0;
        let shoulder_avg = (left.price + right.price) / 2.0;
        let head_prominence = pct_change(shoulder_avg, head.price).abs();
        let shoulder_imbalance = pct_change(left.price, right.price).abs();
        let span = right.index - left.index;

        // neckline break after the right shoulder
        let scan_end = (right.index + cfg.hs_break_scan.get()).min(bars.len() - 1);
        let mut break_index = None;
        let mut break_strength = 0.0;
        for j in right.index + 1..=scan_end {
            let line = neck.at(j);
            let bar = &bars[j];
            let (crossed, beyond) = match side {
                Side::Top => (bar.close() < line || bar.low() < line, -pct_change(line, bar.close())),
                Side::Bottom => (bar.close() > line || bar.high() > line, pct_change(line, bar.close())),
            };
            if crossed {
                break_index = Some(j);
                break_strength = beyond.max(0.0);
                break;
            }
        }
        let has_break = break_index.is_some();

        let mut card = Scorecard::new();
        card.capped("pre_move", 2.5 * pre_move, 25.0)
            .capped(
                "momentum_change",
                if momentum_change > 0.0 { 10.0 + 1.5 * momentum_change } else { 0.0 },
                25.0,
            )
            .capped("rejection", 4.0 * avg_rejection, 20.0)
            .bonus("volume_confirmation", right.volume < head.volume, 15.0)
            .capped("head_prominence", 2.0 * head_prominence, 10.0)
            .capped(
                "timespan",
                proximity_bonus(
                    span as f64,
                    cfg.hs_optimal_span.get() as f64,
                    cfg.hs_optimal_span.get() as f64,
                    5.0,
                ),
                5.0,
            )
            .penalty("shoulder_imbalance", 2.0 * shoulder_imbalance, 10.0);
        if has_break {
            card.capped("neckline_break", 15.0 + 2.0 * break_strength, 25.0);
        } else {
            card.penalty("no_neckline_break", 5.0, 5.0);
        }

        let (kind, direction) = match side {
            Side::Top => (PatternKind::HeadShouldersBearish, Direction::Bearish),
            Side::Bottom => (PatternKind::HeadShouldersBullish, Direction::Bullish),
        };

        PatternResult {
            kind,
            direction,
            confidence: card.total(),
            anchors: AnchorSet::HeadShoulders {
                left_shoulder: anchor(bars, left.index, left.price),
                head: anchor(bars, head.index, head.price),
                right_shoulder: anchor(bars, right.index, right.price),
            },
            metadata: Metadata {
                factors: card.into_terms(),
                details: PatternDetails::HeadShoulders(HeadShouldersDetails {
                    neckline: neck.mean,
                    neckline_slope: neck.slope,
                    neckline_break_confirmed: has_break,
                    break_index,
                    break_strength,
                    pre_move,
                    momentum_change,
                    avg_rejection,
                    head_prominence,
                    shoulder_imbalance,
                    span,
                }),
            },
        }
    }
}

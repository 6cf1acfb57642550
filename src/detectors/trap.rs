//! Bull and bear traps
//!
//! Price breaks out of a chop range with an abnormally large move, then
//! reverses at least as fast and closes back inside the range. A failed
//! upside breakout (bull trap) is a bearish signal and vice versa.

use serde::Serialize;

use super::helpers::{
    close_anchor, highest_high, lowest_low, mean_abs_change, nearest_pivot_distance, pct_change,
};
use crate::pattern::{AnchorSet, Metadata, PatternDetails, PatternFamily, PatternKind, PatternResult};
use crate::scoring::Scorecard;
use crate::{Direction, PatternDetector, SeriesContext, OHLCV};

/// Floor for the expected per-candle move, in percent
const MIN_NORMAL_MOVE: f64 = 0.05;

config_detectors! {
    /// Bull/bear trap detector
    TrapDetector,
}

/// Measurements behind a trap detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrapDetails {
    /// True for a failed upside breakout
    pub bull_trap: bool,
    pub chop_high: f64,
    pub chop_low: f64,
    /// Chop high-low range in percent
    pub chop_range: f64,
    pub breakout_move: f64,
    /// Percent by which the breakout exceeded the normal move
    pub breakout_strength: f64,
    pub breakout_duration: usize,
    pub time_to_reversal: usize,
    pub reversal_move: f64,
    pub reversal_duration: usize,
    pub velocity_ratio: f64,
    /// Distance in percent from the breakout extreme to the nearest earlier pivot
    pub pivot_distance: Option<f64>,
}

struct Chop {
    high: f64,
    low: f64,
    range: f64,
    mean_change: f64,
}

impl PatternDetector for TrapDetector {
    fn family(&self) -> PatternFamily {
        PatternFamily::Trap
    }

    fn min_bars(&self) -> usize {
        self.config.chop_lookback.get() + 2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext) -> Vec<PatternResult> {
        if bars.len() < PatternDetector::min_bars(self) {
            return Vec::new();
        }
        let lookback = self.config.chop_lookback.get();
        (lookback..bars.len())
            .rev()
            .find_map(|p| {
                self.best_at(bars, ctx, p)
                    .filter(|r| r.confidence >= self.config.confidence_threshold)
            })
            .into_iter()
            .collect()
    }
}

impl TrapDetector {
    /// Chop range of the `chop_lookback` candles before `p`. None when the
    /// last of them already closed outside the range of the others, so a
    /// breakout is measured from its first candle.
    fn chop<T: OHLCV>(&self, bars: &[T], p: usize) -> Option<Chop> {
        let window = p - self.config.chop_lookback.get()..p;
        if let (Some((_, high)), Some((_, low))) = (
            highest_high(bars, window.start..p - 1),
            lowest_low(bars, window.start..p - 1),
        ) {
            let last = bars[p - 1].close();
            if last > high || last < low {
                return None;
            }
        }
        let (_, high) = highest_high(bars, window.clone())?;
        let (_, low) = lowest_low(bars, window.clone())?;
        let range = pct_change(low, high);
        (range >= self.config.min_chop_break_size).then(|| Chop {
            high,
            low,
            range,
            mean_change: mean_abs_change(bars, window),
        })
    }

    /// Best-scoring breakout/reversal combination starting at `p`
    fn best_at<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext, p: usize) -> Option<PatternResult> {
        let cfg = &self.config;
        let n = bars.len();
        let chop = self.chop(bars, p)?;
        let max_len = cfg.max_breakout_duration.get();

        let mut best: Option<PatternResult> = None;
        for duration in cfg.min_breakout_duration.get()..=max_len {
            let end = p + duration - 1;
            if end >= n {
                break;
            }
            let breakout_move = pct_change(bars[p - 1].close(), bars[end].close());
            if breakout_move == 0.0 {
                continue;
            }
            let up = breakout_move > 0.0;
            let normal = (chop.mean_change * duration as f64).max(MIN_NORMAL_MOVE);
            let strength = (breakout_move.abs() - normal) / normal * 100.0;
            if strength < cfg.min_breakout_strength {
                continue;
            }

            for delay in 0..=cfg.max_time_to_reversal {
                let start = end + delay;
                for len in 1..=max_len {
                    let stop = start + len;
                    if stop >= n {
                        break;
                    }
                    let reversal_move = pct_change(bars[start].close(), bars[stop].close());
                    let opposite = if up { reversal_move < 0.0 } else { reversal_move > 0.0 };
                    let close = bars[stop].close();
                    if !opposite || close < chop.low || close > chop.high {
                        continue;
                    }
                    let velocity_ratio =
                        (reversal_move.abs() / len as f64) / (breakout_move.abs() / duration as f64);
                    if velocity_ratio < cfg.min_reversal_velocity_ratio {
                        continue;
                    }

                    let result = self.score(
                        bars,
                        ctx,
                        &chop,
                        Attempt {
                            p,
                            duration,
                            delay,
                            len,
                            up,
                            breakout_move,
                            strength,
                            reversal_move,
                            velocity_ratio,
                        },
                    );
                    if best.as_ref().map_or(true, |b| result.confidence > b.confidence) {
                        best = Some(result);
                    }
                }
            }
        }
        best
    }

    fn score<T: OHLCV>(&self, bars: &[T], ctx: &SeriesContext, chop: &Chop, a: Attempt) -> PatternResult {
        let cfg = &self.config;
        let end = a.p + a.duration - 1;
        let start = end + a.delay;
        let stop = start + a.len;

        let pivot_distance = if a.up {
            highest_high(bars, a.p..end + 1)
                .and_then(|(_, extreme)| nearest_pivot_distance(&ctx.swings.highs, extreme, a.p))
        } else {
            lowest_low(bars, a.p..end + 1)
                .and_then(|(_, extreme)| nearest_pivot_distance(&ctx.swings.lows, extreme, a.p))
        };
        let broke_chop = if a.up {
            bars[end].close() > chop.high
        } else {
            bars[end].close() < chop.low
        };

        let mut card = Scorecard::new();
        card.capped("breakout_strength", a.strength / 10.0, 25.0)
            .capped("velocity_ratio", 12.5 * a.velocity_ratio, 25.0)
            .capped(
                "reversal_speed",
                20.0 * (1.0 - a.delay as f64 / (cfg.max_time_to_reversal + 1) as f64),
                20.0,
            )
            .bonus("abnormal_breakout", a.strength >= 2.0 * cfg.min_breakout_strength, 15.0)
            .capped(
                "support_resistance",
                pivot_distance.map_or(0.0, |d| 10.0 * (1.0 - d / cfg.sr_proximity)),
                10.0,
            )
            .bonus("chop_break", broke_chop, 5.0);

        let (kind, direction) = if a.up {
            (PatternKind::TrapBearish, Direction::Bearish)
        } else {
            (PatternKind::TrapBullish, Direction::Bullish)
        };

        PatternResult {
            kind,
            direction,
            confidence: card.total(),
            anchors: AnchorSet::Trap {
                breakout_start: close_anchor(bars, a.p),
                breakout_end: close_anchor(bars, end),
                reversal_start: close_anchor(bars, start),
                reversal_end: close_anchor(bars, stop),
            },
            metadata: Metadata {
                factors: card.into_terms(),
                details: PatternDetails::Trap(TrapDetails {
                    bull_trap: a.up,
                    chop_high: chop.high,
                    chop_low: chop.low,
                    chop_range: chop.range,
                    breakout_move: a.breakout_move,
                    breakout_strength: a.strength,
                    breakout_duration: a.duration,
                    time_to_reversal: a.delay,
                    reversal_move: a.reversal_move,
                    reversal_duration: a.len,
                    velocity_ratio: a.velocity_ratio,
                    pivot_distance,
                }),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    p: usize,
    duration: usize,
    delay: usize,
    len: usize,
    up: bool,
    breakout_move: f64,
    strength: f64,
    reversal_move: f64,
    velocity_ratio: f64,
}

//! Reversal flags
//!
//! A strong directional pole stalls in a tight consolidation pressed against
//! a support/resistance level, with the late momentum fading against the
//! early momentum. A bearish reversal flag follows a rising pole and breaks
//! down through the consolidation low; the bullish form is the mirror image.

use serde::Serialize;

use super::helpers::{
    avg_volume, close_anchor, highest_high, level_touches, lowest_low, pct_change, safe_div, LevelSide,
};
use crate::pattern::{AnchorSet, Metadata, PatternDetails, PatternFamily, PatternKind, PatternResult};
use crate::scoring::{proximity_bonus, Scorecard};
use crate::{Direction, PatternDetector, SeriesContext, OHLCV};

config_detectors! {
    /// Reversal flag detector
    ReversalFlagDetector,
}

/// Measurements behind a reversal flag detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagDetails {
    /// Pole move in percent, in the pole direction
    pub pole_move: f64,
    pub pole_duration: usize,
    pub pullback_ratio: f64,
    pub consolidation_duration: usize,
    /// Consolidation high-low range in percent
    pub consolidation_range: f64,
    pub early_momentum: f64,
    pub late_momentum: f64,
    /// Resistance (bearish) or support (bullish) level
    pub sr_level: f64,
    pub sr_touches: usize,
    pub sr_rejections: usize,
    pub sr_strength: f64,
    pub breakout_confirmed: bool,
    pub breakout_index: Option<usize>,
    pub breakout_strength: f64,
}

#[derive(Debug, Clone, Copy)]
struct Pole {
    start: usize,
    end: usize,
    /// Percent, positive in the pole direction
    size: f64,
    pullback_ratio: f64,
}

impl PatternDetector for ReversalFlagDetector {
    fn family(&self) -> PatternFamily {
        PatternFamily::ReversalFlag
    }

    fn min_bars(&self) -> usize {
        self.config.min_pole_duration.get() + 2 * self.config.min_consolidation_duration.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Vec<PatternResult> {
        if bars.len() < PatternDetector::min_bars(self) {
            return Vec::new();
        }
        // bearish flags sit on a rising pole
        [true, false]
            .into_iter()
            .filter_map(|pole_up| self.find_latest(bars, pole_up))
            .collect()
    }
}

impl ReversalFlagDetector {
    /// Walk flag ends from the newest candle back; at each end only the
    /// shortest qualifying consolidation is scored.
    fn find_latest<T: OHLCV>(&self, bars: &[T], pole_up: bool) -> Option<PatternResult> {
        let cfg = &self.config;
        for end in (0..bars.len()).rev() {
            let candidate = (cfg.min_consolidation_duration.get()..=cfg.max_consolidation_duration.get())
                .find_map(|duration| self.evaluate(bars, end, duration, pole_up));
            if let Some(result) = candidate {
                if result.confidence >= cfg.confidence_threshold {
                    return Some(result);
                }
            }
        }
        None
    }

    /// Pole ending at `end` with the largest move that passes the size and
    /// pullback limits
    fn find_pole<T: OHLCV>(&self, bars: &[T], end: usize, up: bool) -> Option<Pole> {
        let cfg = &self.config;
        let mut best: Option<Pole> = None;
        for len in cfg.min_pole_duration.get()..=cfg.max_pole_duration.get() {
            if len > end {
                break;
            }
            let start = end - len;
            let (from, to) = (bars[start].close(), bars[end].close());
            let size = if up { pct_change(from, to) } else { -pct_change(from, to) };
            if size < cfg.min_pole_size {
                continue;
            }

            let mut extreme = from;
            let mut pullback: f64 = 0.0;
            for bar in &bars[start..=end] {
                let c = bar.close();
                if up {
                    extreme = extreme.max(c);
                    pullback = pullback.max(extreme - c);
                } else {
                    extreme = extreme.min(c);
                    pullback = pullback.max(c - extreme);
                }
            }
            let pullback_ratio = safe_div(pullback, (to - from).abs());
            if pullback_ratio > cfg.max_pullback_ratio.get() {
                continue;
            }

            if best.map_or(true, |b| size > b.size) {
                best = Some(Pole {
                    start,
                    end,
                    size,
                    pullback_ratio,
                });
            }
        }
        best
    }

    fn evaluate<T: OHLCV>(&self, bars: &[T], end: usize, duration: usize, pole_up: bool) -> Option<PatternResult> {
        let cfg = &self.config;
        let start = (end + 1).checked_sub(duration)?;
        // need `duration` candles of early momentum before the flag
        if start < duration + 1 {
            return None;
        }

        let (_, high) = highest_high(bars, start..end + 1)?;
        let (_, low) = lowest_low(bars, start..end + 1)?;
        let range = pct_change(low, high);
        if range >= cfg.consolidation_volatility_threshold {
            return None;
        }

        let sign = if pole_up { 1.0 } else { -1.0 };
        let early = sign * pct_change(bars[start - 1 - duration].close(), bars[start - 1].close());
        let late = sign * pct_change(bars[start - 1].close(), bars[end].close());
        if early <= 0.0 || late >= cfg.momentum_loss_ratio.get() * early {
            return None;
        }

        let pole = self.find_pole(bars, start - 1, pole_up)?;

        let (level, side) = if pole_up {
            (high, LevelSide::Resistance)
        } else {
            (low, LevelSide::Support)
        };
        let (touches, rejections) = level_touches(bars, 0..end + 1, level, cfg.sr_tolerance, side);
        let sr_strength = 10.0 * touches as f64 + 5.0 * rejections as f64;
        if touches < 2 || sr_strength < 25.0 {
            return None;
        }

        let window_end = (end + cfg.flag_breakout_window.get()).min(bars.len() - 1);
        let breakout = (end + 1..=window_end).find_map(|j| {
            let close = bars[j].close();
            if pole_up && close < low {
                Some((j, -pct_change(low, close)))
            } else if !pole_up && close > high {
                Some((j, pct_change(high, close)))
            } else {
                None
            }
        });

        let pole_volume = avg_volume(bars, pole.start..pole.end + 1);
        let flag_volume = avg_volume(bars, start..end + 1);
        let mid_duration =
            (cfg.min_consolidation_duration.get() + cfg.max_consolidation_duration.get()) as f64 / 2.0;

        let mut card = Scorecard::new();
        card.capped("pole_size", pole.size, 25.0)
            .capped(
                "pullback_quality",
                20.0 * (1.0 - safe_div(pole.pullback_ratio, cfg.max_pullback_ratio.get())),
                20.0,
            )
            .bonus("momentum_loss", true, 15.0)
            .capped(
                "tight_consolidation",
                10.0 * (1.0 - range / cfg.consolidation_volatility_threshold),
                10.0,
            )
            .capped("support_resistance", 0.3 * sr_strength, 15.0)
            .bonus("volume_decline", flag_volume < pole_volume, 10.0)
            .capped(
                "duration",
                proximity_bonus(duration as f64, mid_duration, mid_duration, 5.0),
                5.0,
            );
        match breakout {
            Some((_, strength)) => card.capped("breakout", 10.0 + 2.0 * strength, 20.0),
            None => card.penalty("no_breakout", 2.0, 2.0),
        };

        let (kind, direction) = if pole_up {
            (PatternKind::ReversalFlagBearish, Direction::Bearish)
        } else {
            (PatternKind::ReversalFlagBullish, Direction::Bullish)
        };

        Some(PatternResult {
            kind,
            direction,
            confidence: card.total(),
            anchors: AnchorSet::Flag {
                pole_start: close_anchor(bars, pole.start),
                pole_end: close_anchor(bars, pole.end),
                flag_start: close_anchor(bars, start),
                flag_end: close_anchor(bars, end),
            },
            metadata: Metadata {
                factors: card.into_terms(),
                details: PatternDetails::Flag(FlagDetails {
                    pole_move: pole.size,
                    pole_duration: pole.end - pole.start,
                    pullback_ratio: pole.pullback_ratio,
                    consolidation_duration: duration,
                    consolidation_range: range,
                    early_momentum: early,
                    late_momentum: late,
                    sr_level: level,
                    sr_touches: touches,
                    sr_rejections: rejections,
                    sr_strength,
                    breakout_confirmed: breakout.is_some(),
                    breakout_index: breakout.map(|(j, _)| j),
                    breakout_strength: breakout.map_or(0.0, |(_, s)| s),
                }),
            },
        })
    }
}

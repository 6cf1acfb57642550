//! Three-line strike
//!
//! A run of 3-5 same-colored candles is wiped out by a single opposite
//! candle. An up run struck by a red candle is bearish; a down run struck by
//! a green candle is bullish. All candidate strikes among the most recent
//! candles and all run lengths are scored and the best one is kept.

use serde::Serialize;

use super::helpers::{anchor, avg_body, avg_volume, close_anchor, pct_change, safe_div};
use crate::{
  pattern::{AnchorSet, Metadata, PatternDetails, PatternFamily, PatternKind, PatternResult},
  scoring::{proximity_bonus, Scorecard},
  Direction, OHLCVExt, PatternDetector, SeriesContext, OHLCV,
};

/// Candles averaged for the strike strength and volume comparison
const AVERAGE_WINDOW: usize = 10;
/// Uniform scale applied to the raw score
const SCORE_SCALE: f64 = 0.85;
/// Scale of the raw momentum-exhaustion score
const EXHAUSTION_SCALE: f64 = 0.3;

config_detectors! {
  /// Three-line strike detector
  ThreeLineStrikeDetector,
}

/// Measurements behind a three-line strike detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeLineStrikeDetails {
  pub preceding_candles: usize,
  /// Percent move of the run, open of the first to close of the last
  pub preceding_move: f64,
  /// Share of the run's price move retraced by the strike
  pub negation_ratio: f64,
  /// Strike body percent over run percent
  pub reversal_ratio: f64,
  /// Strike body over the recent average body
  pub strike_strength: f64,
  /// Momentum exhaustion before scaling (0-50)
  pub exhaustion: f64,
  pub strike_close: f64,
}

impl PatternDetector for ThreeLineStrikeDetector {
  fn family(&self) -> PatternFamily {
    PatternFamily::ThreeLineStrike
  }

  fn min_bars(&self) -> usize {
    self.config.min_preceding_candles.get() + 1
  }

  fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &SeriesContext) -> Vec<PatternResult> {
    let n = bars.len();
    if n < PatternDetector::min_bars(self) {
      return Vec::new();
    }
    let cfg = &self.config;
    let first = n.saturating_sub(cfg.tls_scan_window.get()).max(1);

    let mut best: Option<PatternResult> = None;
    for strike in first..n {
      for len in cfg.min_preceding_candles.get()..=cfg.max_preceding_candles.get() {
        let Some(result) = self.evaluate(bars, strike, len) else {
          continue;
        };
        if best.as_ref().map_or(true, |b| result.confidence > b.confidence) {
          best = Some(result);
        }
      }
    }
    best
      .filter(|r| r.confidence >= cfg.confidence_threshold)
      .into_iter()
      .collect()
  }
}

impl ThreeLineStrikeDetector {
  fn evaluate<T: OHLCV>(&self, bars: &[T], strike: usize, len: usize) -> Option<PatternResult> {
    let cfg = &self.config;
    let start = strike.checked_sub(len)?;
    let s = &bars[strike];
    let run = &bars[start..strike];

    // a red strike ends an up run (bearish), a green one a down run
    let bearish = if s.is_bearish() {
      true
    } else if s.is_bullish() {
      false
    } else {
      return None;
    };
    let same_color = |b: &T| if bearish { b.is_bullish() } else { b.is_bearish() };
    if !run.iter().all(same_color) {
      return None;
    }

    let run_open = run[0].open();
    let run_close = run[len - 1].close();
    let preceding_move = pct_change(run_open, run_close).abs();
    if preceding_move < cfg.min_preceding_movement {
      return None;
    }

    let retrace = if bearish { run_close - s.close() } else { s.close() - run_close };
    let negation_ratio = safe_div(retrace, (run_close - run_open).abs());
    if negation_ratio < cfg.min_negation_ratio.get() {
      return None;
    }

    let reversal_ratio = safe_div(s.body_pct(), preceding_move);
    if reversal_ratio < cfg.min_reversal_ratio {
      return None;
    }

    // shrinking ranges and fading volume through the run
    let pairs = (len - 1) as f64;
    let shrinking = run.windows(2).filter(|w| w[1].range() < w[0].range()).count() as f64;
    let fading = run.windows(2).filter(|w| w[1].volume() < w[0].volume()).count() as f64;
    let exhaustion = 25.0 * safe_div(shrinking, pairs) + 25.0 * safe_div(fading, pairs);

    let window = strike.saturating_sub(AVERAGE_WINDOW)..strike;
    let strike_strength = safe_div(s.body(), avg_body(bars, window.clone()));
    let volume_confirmed = s.volume() >= cfg.volume_threshold * avg_volume(bars, window);

    let mut card = Scorecard::new();
    card
      .capped("movement", 5.0 * preceding_move, 25.0)
      .capped("negation", 20.0 * negation_ratio, 20.0)
      .capped("strike_strength", 5.0 * strike_strength, 15.0)
      .capped("momentum_exhaustion", exhaustion * EXHAUSTION_SCALE, 15.0)
      .bonus("volume", volume_confirmed, 10.0)
      .bonus("momentum_loss", run[len - 1].body() < run[0].body(), 10.0)
      .capped("duration", proximity_bonus(len as f64, 3.0, 3.0, 5.0), 5.0)
      .scale(SCORE_SCALE);

    let (kind, direction) = if bearish {
      (PatternKind::ThreeLineStrikeBearish, Direction::Bearish)
    } else {
      (PatternKind::ThreeLineStrikeBullish, Direction::Bullish)
    };

    Some(PatternResult {
      kind,
      direction,
      confidence: card.total(),
      anchors: AnchorSet::ThreeLineStrike {
        preceding_start: anchor(bars, start, run_open),
        preceding_end: close_anchor(bars, strike - 1),
        strike: close_anchor(bars, strike),
      },
      metadata: Metadata {
        factors: card.into_terms(),
        details: PatternDetails::ThreeLineStrike(ThreeLineStrikeDetails {
          preceding_candles: len,
          preceding_move,
          negation_ratio,
          reversal_ratio,
          strike_strength,
          exhaustion,
          strike_close: s.close(),
        }),
      },
    })
  }
}

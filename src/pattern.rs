//! Detection result model
//!
//! A single [`PatternResult`] type covers every pattern family. The anchor
//! points and measured details are sum types sized to the family, so the
//! signal emitter can dispatch exhaustively instead of probing optional
//! fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detectors::{
    CandlestickDetails, FlagDetails, HeadShouldersDetails, ThreeLineStrikeDetails, TrapDetails,
};
use crate::scoring::ScoreTerm;
use crate::Direction;

/// Detector family a pattern belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFamily {
    HeadShoulders,
    ReversalFlag,
    ThreeLineStrike,
    Trap,
    Candlestick,
}

impl PatternFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternFamily::HeadShoulders => "head_shoulders",
            PatternFamily::ReversalFlag => "reversal_flag",
            PatternFamily::ThreeLineStrike => "three_line_strike",
            PatternFamily::Trap => "trap",
            PatternFamily::Candlestick => "candlestick",
        }
    }
}

/// Concrete pattern type, used as the `patternType` of emitted signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    HeadShouldersBearish,
    HeadShouldersBullish,
    ReversalFlagBearish,
    ReversalFlagBullish,
    ThreeLineStrikeBearish,
    ThreeLineStrikeBullish,
    TrapBearish,
    TrapBullish,
    Hammer,
    InvertedHammer,
    HangingMan,
    ShootingStar,
    Doji,
    DragonflyDoji,
    GravestoneDoji,
    BullishEngulfing,
    BearishEngulfing,
    PiercingLine,
    DarkCloudCover,
    MorningStar,
    EveningStar,
}

impl PatternKind {
    /// Returns the string identifier
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::HeadShouldersBearish => "head_shoulders_bearish",
            PatternKind::HeadShouldersBullish => "head_shoulders_bullish",
            PatternKind::ReversalFlagBearish => "reversal_flag_bearish",
            PatternKind::ReversalFlagBullish => "reversal_flag_bullish",
            PatternKind::ThreeLineStrikeBearish => "three_line_strike_bearish",
            PatternKind::ThreeLineStrikeBullish => "three_line_strike_bullish",
            PatternKind::TrapBearish => "trap_bearish",
            PatternKind::TrapBullish => "trap_bullish",
            PatternKind::Hammer => "hammer",
            PatternKind::InvertedHammer => "inverted_hammer",
            PatternKind::HangingMan => "hanging_man",
            PatternKind::ShootingStar => "shooting_star",
            PatternKind::Doji => "doji",
            PatternKind::DragonflyDoji => "dragonfly_doji",
            PatternKind::GravestoneDoji => "gravestone_doji",
            PatternKind::BullishEngulfing => "bullish_engulfing",
            PatternKind::BearishEngulfing => "bearish_engulfing",
            PatternKind::PiercingLine => "piercing_line",
            PatternKind::DarkCloudCover => "dark_cloud_cover",
            PatternKind::MorningStar => "morning_star",
            PatternKind::EveningStar => "evening_star",
        }
    }

    pub fn family(self) -> PatternFamily {
        match self {
            PatternKind::HeadShouldersBearish | PatternKind::HeadShouldersBullish => {
                PatternFamily::HeadShoulders
            }
            PatternKind::ReversalFlagBearish | PatternKind::ReversalFlagBullish => {
                PatternFamily::ReversalFlag
            }
            PatternKind::ThreeLineStrikeBearish | PatternKind::ThreeLineStrikeBullish => {
                PatternFamily::ThreeLineStrike
            }
            PatternKind::TrapBearish | PatternKind::TrapBullish => PatternFamily::Trap,
            _ => PatternFamily::Candlestick,
        }
    }

    /// Returns the typical direction of this pattern.
    ///
    /// `None` means the direction depends on the trend context (plain doji).
    pub fn typical_direction(self) -> Option<Direction> {
        match self {
            PatternKind::HeadShouldersBullish
            | PatternKind::ReversalFlagBullish
            | PatternKind::ThreeLineStrikeBullish
            | PatternKind::TrapBullish
            | PatternKind::Hammer
            | PatternKind::InvertedHammer
            | PatternKind::DragonflyDoji
            | PatternKind::BullishEngulfing
            | PatternKind::PiercingLine
            | PatternKind::MorningStar => Some(Direction::Bullish),
            PatternKind::HeadShouldersBearish
            | PatternKind::ReversalFlagBearish
            | PatternKind::ThreeLineStrikeBearish
            | PatternKind::TrapBearish
            | PatternKind::HangingMan
            | PatternKind::ShootingStar
            | PatternKind::GravestoneDoji
            | PatternKind::BearishEngulfing
            | PatternKind::DarkCloudCover
            | PatternKind::EveningStar => Some(Direction::Bearish),
            PatternKind::Doji => None,
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candle referenced by a pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnchorPoint {
    pub index: usize,
    pub price: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Anchor points, one variant per family
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum AnchorSet {
    HeadShoulders {
        left_shoulder: AnchorPoint,
        head: AnchorPoint,
        right_shoulder: AnchorPoint,
    },
    Flag {
        pole_start: AnchorPoint,
        pole_end: AnchorPoint,
        flag_start: AnchorPoint,
        flag_end: AnchorPoint,
    },
    ThreeLineStrike {
        preceding_start: AnchorPoint,
        preceding_end: AnchorPoint,
        strike: AnchorPoint,
    },
    Trap {
        breakout_start: AnchorPoint,
        breakout_end: AnchorPoint,
        reversal_start: AnchorPoint,
        reversal_end: AnchorPoint,
    },
    Candles {
        first: AnchorPoint,
        last: AnchorPoint,
    },
}

impl AnchorSet {
    /// Earliest anchor
    pub fn start(&self) -> &AnchorPoint {
        match self {
            AnchorSet::HeadShoulders { left_shoulder, .. } => left_shoulder,
            AnchorSet::Flag { pole_start, .. } => pole_start,
            AnchorSet::ThreeLineStrike {
                preceding_start, ..
            } => preceding_start,
            AnchorSet::Trap { breakout_start, .. } => breakout_start,
            AnchorSet::Candles { first, .. } => first,
        }
    }

    /// Latest anchor
    pub fn end(&self) -> &AnchorPoint {
        match self {
            AnchorSet::HeadShoulders { right_shoulder, .. } => right_shoulder,
            AnchorSet::Flag { flag_end, .. } => flag_end,
            AnchorSet::ThreeLineStrike { strike, .. } => strike,
            AnchorSet::Trap { reversal_end, .. } => reversal_end,
            AnchorSet::Candles { last, .. } => last,
        }
    }
}

/// Family-specific measurements behind a detection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum PatternDetails {
    HeadShoulders(HeadShouldersDetails),
    Flag(FlagDetails),
    ThreeLineStrike(ThreeLineStrikeDetails),
    Trap(TrapDetails),
    Candlestick(CandlestickDetails),
}

/// Factors that produced the confidence score plus measured details
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub factors: Vec<ScoreTerm>,
    pub details: PatternDetails,
}

/// Output of a detector. Constructed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternResult {
    pub kind: PatternKind,
    pub direction: Direction,
    /// Confidence score 0.0..=100.0
    pub confidence: f64,
    pub anchors: AnchorSet,
    pub metadata: Metadata,
}

impl PatternResult {
    /// True if the confidence reaches `threshold`
    #[inline]
    pub fn is_detected(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    #[inline]
    pub fn family(&self) -> PatternFamily {
        self.kind.family()
    }
}

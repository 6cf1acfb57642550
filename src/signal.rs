//! Signal records handed to the persistence layer

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pattern::{Metadata, PatternDetails, PatternKind, PatternResult};
use crate::Direction;

/// Identifies the series being scanned
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub strategy_id: String,
    pub symbol: String,
    pub timeframe: String,
}

impl SeriesKey {
    pub fn new(strategy_id: impl Into<String>, symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        }
    }
}

/// An emitted signal. Serializes with camelCase field names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub strategy_id: String,
    pub symbol: String,
    pub pattern_type: PatternKind,
    pub direction: Direction,
    pub timeframe: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    /// Key level of the pattern (neckline, S/R level, strike close...)
    pub price_level: f64,
    pub metadata: Metadata,
    pub is_active: bool,
}

impl SignalRecord {
    /// Build an active record from a detection.
    ///
    /// `detected_at` is the timestamp of the pattern's last anchor, or `now`
    /// when the candles carry no timestamps.
    pub fn from_result(key: &SeriesKey, result: &PatternResult, now: DateTime<Utc>) -> Self {
        let end = result.anchors.end();
        let price_level = match &result.metadata.details {
            PatternDetails::HeadShoulders(d) => d.neckline,
            PatternDetails::Flag(d) => d.sr_level,
            PatternDetails::ThreeLineStrike(d) => d.strike_close,
            PatternDetails::Trap(_) | PatternDetails::Candlestick(_) => end.price,
        };

        Self {
            strategy_id: key.strategy_id.clone(),
            symbol: key.symbol.clone(),
            pattern_type: result.kind,
            direction: result.direction,
            timeframe: key.timeframe.clone(),
            confidence: result.confidence,
            detected_at: end.timestamp.unwrap_or(now),
            price_level,
            metadata: result.metadata.clone(),
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::CandlestickDetails;
    use crate::pattern::{AnchorPoint, AnchorSet};
    use crate::scoring::ScoreTerm;
    use crate::test_support::ts;
    use crate::Trend;

    fn hammer(timestamp: Option<DateTime<Utc>>) -> PatternResult {
        let point = AnchorPoint {
            index: 15,
            price: 95.5,
            timestamp,
        };
        PatternResult {
            kind: PatternKind::Hammer,
            direction: Direction::Bullish,
            confidence: 70.0,
            anchors: AnchorSet::Candles {
                first: point,
                last: point,
            },
            metadata: Metadata {
                factors: vec![ScoreTerm {
                    factor: "shape",
                    points: 70.0,
                }],
                details: PatternDetails::Candlestick(CandlestickDetails {
                    candles: 1,
                    trend: Trend::Down,
                    trend_change: -10.0,
                    shape_quality: 0.8,
                    volume_ratio: 2.0,
                    pivot_distance: None,
                }),
            },
        }
    }

    #[test]
    fn test_record_uses_anchor_time_and_price() {
        let key = SeriesKey::new("s1", "ETHUSDT", "15m");
        let record = SignalRecord::from_result(&key, &hammer(Some(ts(15))), ts(100));
        assert_eq!(record.detected_at, ts(15));
        assert_eq!(record.price_level, 95.5);
        assert!(record.is_active);

        let record = SignalRecord::from_result(&key, &hammer(None), ts(100));
        assert_eq!(record.detected_at, ts(100));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let key = SeriesKey::new("s1", "ETHUSDT", "15m");
        let record = SignalRecord::from_result(&key, &hammer(Some(ts(15))), ts(100));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["strategyId"], "s1");
        assert_eq!(json["patternType"], "hammer");
        assert_eq!(json["direction"], "bullish");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["priceLevel"], 95.5);
        assert_eq!(json["metadata"]["details"]["family"], "candlestick");
        assert!(json.get("detectedAt").is_some());
    }
}

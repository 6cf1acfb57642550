//! Integration tests for the chartsig signal engine.
//!
//! These tests drive the public API end to end: validation, detection,
//! scoring, de-duplication and signal records.

mod common;

use std::sync::Arc;

use chartsig::prelude::*;
use chartsig::DefaultEngine;
use chrono::Duration;
use common::*;

fn engine() -> DefaultEngine {
    EngineBuilder::new().with_all_defaults().build().unwrap()
}

fn key() -> SeriesKey {
    SeriesKey::new("reversal-v1", "BTCUSDT", "1h")
}

// ============================================================
// VALIDATION
// ============================================================

#[test]
fn test_corrupted_candle_is_reported_by_index() {
    let mut bars = quiet_series();
    assert_eq!(bars.len(), 30);
    bars[10].high = bars[10].low - 1.0;

    match engine().scan(&bars) {
        Err(PatternError::InvalidOHLCV { index, .. }) => assert_eq!(index, 10),
        other => panic!("expected InvalidOHLCV, got {other:?}"),
    }
    assert!(engine().scan_signals(&bars, &key(), ts(100)).is_empty());
}

#[test]
fn test_non_finite_and_negative_volume_rejected() {
    let mut bars = quiet_series();
    bars[3].close = f64::NAN;
    assert!(matches!(
        engine().scan(&bars),
        Err(PatternError::InvalidOHLCV { index: 3, .. })
    ));

    let mut bars = strip_timestamps(&quiet_series());
    bars[7].v = -5.0;
    assert!(matches!(
        engine().scan(&bars),
        Err(PatternError::InvalidOHLCV { index: 7, .. })
    ));
}

#[test]
fn test_short_series_yields_nothing() {
    let bars = quiet_series();
    assert!(engine().scan(&bars[..10]).unwrap().is_empty());
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

#[test]
fn test_head_shoulders_signal_end_to_end() {
    let bars = head_shoulders_top();
    let signals = engine().scan_signals(&bars, &key(), ts(100));

    let signal = signals
        .iter()
        .find(|s| s.pattern_type == PatternKind::HeadShouldersBearish)
        .expect("head and shoulders signal");
    assert_eq!(signal.direction, Direction::Bearish);
    assert!(signal.confidence >= 65.0);
    assert!(signal.is_active);
    assert_eq!(signal.symbol, "BTCUSDT");
    assert_eq!(signal.detected_at, ts(31));

    match &signal.metadata.details {
        PatternDetails::HeadShoulders(d) => {
            assert!(d.neckline_break_confirmed);
            assert_eq!(signal.price_level, d.neckline);
        },
        other => panic!("unexpected details {other:?}"),
    }
}

#[test]
fn test_signal_json_is_camel_case() {
    let bars = head_shoulders_top();
    let signals = engine().scan_signals(&bars, &key(), ts(100));
    let signal = signals
        .iter()
        .find(|s| s.pattern_type == PatternKind::HeadShouldersBearish)
        .unwrap();

    let json = serde_json::to_value(signal).unwrap();
    assert_eq!(json["patternType"], "head_shoulders_bearish");
    assert_eq!(json["strategyId"], "reversal-v1");
    assert_eq!(json["timeframe"], "1h");
    assert_eq!(json["direction"], "bearish");
    assert_eq!(json["metadata"]["details"]["neckline_break_confirmed"], true);
    assert!(json["metadata"]["factors"].as_array().unwrap().len() >= 8);
}

#[test]
fn test_bars_without_timestamps_use_now() {
    let bars = strip_timestamps(&head_shoulders_top());
    let now = ts(500);
    let signals = engine().scan_signals(&bars, &key(), now);
    let signal = signals
        .iter()
        .find(|s| s.pattern_type == PatternKind::HeadShouldersBearish)
        .unwrap();
    assert_eq!(signal.detected_at, now);
}

// ============================================================
// TRAPS
// ============================================================

#[test]
fn test_bull_trap_scenario() {
    let results = engine().scan(&bull_trap(true)).unwrap();
    let trap = results
        .iter()
        .find(|r| r.family() == PatternFamily::Trap)
        .expect("trap detected");
    assert_eq!(trap.kind, PatternKind::TrapBearish);
    assert_eq!(trap.direction, Direction::Bearish);
    assert!(trap.confidence >= 65.0);
}

#[test]
fn test_slow_drift_is_not_a_trap() {
    let results = engine().scan(&bull_trap(false)).unwrap();
    assert!(results.iter().all(|r| r.family() != PatternFamily::Trap));
}

// ============================================================
// DE-DUPLICATION
// ============================================================

#[test]
fn test_cooldown_suppresses_repeat_signals() {
    let engine = engine();
    let bars = head_shoulders_top();
    let t0 = ts(100);
    let is_hs = |s: &SignalRecord| s.pattern_type == PatternKind::HeadShouldersBearish;

    assert!(engine.scan_signals(&bars, &key(), t0).iter().any(is_hs));
    assert!(!engine
        .scan_signals(&bars, &key(), t0 + Duration::hours(1))
        .iter()
        .any(is_hs));
    assert!(engine
        .scan_signals(&bars, &key(), t0 + Duration::hours(5))
        .iter()
        .any(is_hs));
}

#[test]
fn test_cooldown_is_per_symbol_and_timeframe() {
    let engine = engine();
    let bars = head_shoulders_top();
    let t0 = ts(100);
    let is_hs = |s: &SignalRecord| s.pattern_type == PatternKind::HeadShouldersBearish;

    assert!(engine.scan_signals(&bars, &key(), t0).iter().any(is_hs));
    let other_symbol = SeriesKey::new("reversal-v1", "ETHUSDT", "1h");
    let other_timeframe = SeriesKey::new("reversal-v1", "BTCUSDT", "4h");
    assert!(engine.scan_signals(&bars, &other_symbol, t0).iter().any(is_hs));
    assert!(engine.scan_signals(&bars, &other_timeframe, t0).iter().any(is_hs));
}

#[test]
fn test_shared_cooldown_store_across_engines() {
    let store: Arc<dyn CooldownStore> = Arc::new(InMemoryCooldown::default());
    let a = EngineBuilder::new()
        .with_head_shoulders()
        .cooldown(Arc::clone(&store))
        .build()
        .unwrap();
    let b = EngineBuilder::new()
        .with_head_shoulders()
        .cooldown(store)
        .build()
        .unwrap();

    let bars = head_shoulders_top();
    assert!(!a.scan_signals(&bars, &key(), ts(100)).is_empty());
    assert!(b.scan_signals(&bars, &key(), ts(101)).is_empty());
}

// ============================================================
// ENGINE BEHAVIOUR
// ============================================================

#[test]
fn test_scan_is_deterministic() {
    for bars in [head_shoulders_top(), bull_trap(true), bull_trap(false), quiet_series()] {
        let first = engine().scan(&bars).unwrap();
        let second = engine().scan(&bars).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_pattern_filter() {
    let engine = EngineBuilder::new()
        .with_all_defaults()
        .only_patterns([PatternKind::TrapBearish])
        .build()
        .unwrap();
    let results = engine.scan(&head_shoulders_top()).unwrap();
    assert!(results.iter().all(|r| r.kind == PatternKind::TrapBearish));
    assert_eq!(engine.scan(&bull_trap(true)).unwrap().len(), 1);
}

#[test]
fn test_config_overrides_flow_to_detectors() {
    let mut config = PatternDetectionConfig::default();
    config.confidence_threshold = 99.0;
    let engine = EngineBuilder::new()
        .with_config(config)
        .with_all_defaults()
        .build()
        .unwrap();
    assert!(engine.scan(&bull_trap(true)).unwrap().is_empty());
}

#[test]
fn test_parallel_scan_collects_errors() {
    let engine = engine();
    let hs = head_shoulders_top();
    let trap = bull_trap(true);
    let mut broken = quiet_series();
    broken[4].low = broken[4].high + 1.0;

    let series = vec![
        (SeriesKey::new("s", "AAA", "1h"), hs.as_slice()),
        (SeriesKey::new("s", "BBB", "1h"), trap.as_slice()),
        (SeriesKey::new("s", "CCC", "1h"), broken.as_slice()),
    ];
    let (ok, errors) = scan_parallel(&engine, series, ts(100));

    assert_eq!(ok.len(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].key.symbol, "CCC");
    assert!(matches!(errors[0].error, PatternError::InvalidOHLCV { index: 4, .. }));
    let all: Vec<_> = ok.iter().flat_map(|r| &r.signals).collect();
    assert!(all.iter().any(|s| s.pattern_type == PatternKind::HeadShouldersBearish));
    assert!(all.iter().any(|s| s.pattern_type == PatternKind::TrapBearish));
}

#[test]
fn test_trend_targets_on_pattern_series() {
    let calc = TrendTargetCalculator::new(TrendTargetsConfig::default()).unwrap();
    let targets = calc.targets(&head_shoulders_top()).unwrap();
    assert_eq!(targets.trend, Direction::Bearish);
    assert!(targets.stop_loss > targets.entry);
    assert!(targets.tp3 < targets.tp2 && targets.tp2 < targets.tp1 && targets.tp1 < targets.entry);
}

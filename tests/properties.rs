//! Property tests over generated candle series

mod common;

use chartsig::pattern::{AnchorSet, PatternFamily, PatternKind};
use chartsig::prelude::{Candle, EngineBuilder, PatternDetectionConfig};
use proptest::prelude::*;

/// (close change, upper wick, lower wick, volume) per candle
fn steps() -> impl Strategy<Value = Vec<(f64, f64, f64, u64)>> {
    prop::collection::vec((-2.5f64..2.5, 0.0f64..1.5, 0.0f64..1.5, 200u64..5000), 25..120)
}

fn walk(steps: &[(f64, f64, f64, u64)]) -> Vec<Candle> {
    let mut prev = 100.0f64;
    steps
        .iter()
        .enumerate()
        .map(|(i, &(change, up, down, volume))| {
            let close = (prev + change).max(10.0);
            let open = prev;
            prev = close;
            common::bar(i, open, open.max(close) + up, open.min(close) - down, close, volume)
        })
        .collect()
}

fn permissive_engine() -> chartsig::DefaultEngine {
    let mut config = PatternDetectionConfig::default();
    config.confidence_threshold = 0.0;
    EngineBuilder::new()
        .with_config(config)
        .with_all_defaults()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn confidence_stays_in_bounds(steps in steps()) {
        let bars = walk(&steps);
        let results = permissive_engine().scan(&bars).unwrap();
        for r in &results {
            prop_assert!(r.confidence.is_finite());
            prop_assert!((0.0..=100.0).contains(&r.confidence), "{} scored {}", r.kind, r.confidence);
            for term in &r.metadata.factors {
                prop_assert!(term.points.is_finite());
            }
        }
    }

    #[test]
    fn head_is_beyond_both_shoulders(steps in steps()) {
        let bars = walk(&steps);
        let results = permissive_engine().scan(&bars).unwrap();
        for r in results.iter().filter(|r| r.family() == PatternFamily::HeadShoulders) {
            let AnchorSet::HeadShoulders { left_shoulder, head, right_shoulder } = r.anchors else {
                prop_assert!(false, "wrong anchors for {}", r.kind);
                continue;
            };
            prop_assert!(left_shoulder.index < head.index && head.index < right_shoulder.index);
            if r.kind == PatternKind::HeadShouldersBearish {
                prop_assert!(head.price > left_shoulder.price && head.price > right_shoulder.price);
            } else {
                prop_assert!(head.price < left_shoulder.price && head.price < right_shoulder.price);
            }
        }
    }

    #[test]
    fn scaled_head_shoulders_keeps_its_shape(scale in 0.5f64..20.0) {
        let bars: Vec<Candle> = common::head_shoulders_top()
            .into_iter()
            .map(|b| Candle {
                open: b.open * scale,
                high: b.high * scale,
                low: b.low * scale,
                close: b.close * scale,
                ..b
            })
            .collect();
        let results = EngineBuilder::new().with_head_shoulders().build().unwrap().scan(&bars).unwrap();
        let top = results.iter().find(|r| r.kind == PatternKind::HeadShouldersBearish);
        prop_assert!(top.is_some());
        if let Some(AnchorSet::HeadShoulders { left_shoulder, head, right_shoulder }) = top.map(|r| r.anchors) {
            prop_assert!(head.price > left_shoulder.price.max(right_shoulder.price));
        }
    }
}

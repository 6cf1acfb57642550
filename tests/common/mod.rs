//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chartsig::prelude::*;
use chrono::{DateTime, Duration, Utc};

/// Bar without a timestamp, exercising the generic `OHLCV` path
#[derive(Debug, Clone, Copy)]
pub struct TestBar {
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        self.v
    }
}

pub fn ts(i: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(i as i64)
}

pub fn bar(i: usize, o: f64, h: f64, l: f64, c: f64, v: u64) -> Candle {
    Candle::new(ts(i), o, h, l, c, v)
}

/// Candles opening at the previous close with `wick` beyond the body
pub fn from_closes(closes: &[f64], wick: f64, volume: u64) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let o = if i == 0 { c } else { closes[i - 1] };
            bar(i, o, o.max(c) * (1.0 + wick), o.min(c) * (1.0 - wick), c, volume)
        })
        .collect()
}

pub fn strip_timestamps(bars: &[Candle]) -> Vec<TestBar> {
    bars.iter()
        .map(|b| TestBar {
            o: b.open,
            h: b.high,
            l: b.low,
            c: b.close,
            v: b.volume as f64,
        })
        .collect()
}

/// 60 candles: left shoulder at 10, head at 20, right shoulder at 31 and a
/// neckline break a few candles later
pub fn head_shoulders_top() -> Vec<Candle> {
    let closes: Vec<f64> = (0..60)
        .map(|i| {
            let x = i as f64;
            match i {
                0..=10 => 100.0 + 1.2 * x,
                11..=14 => 112.0 - 1.5 * (x - 10.0),
                15..=20 => 106.0 + 2.0 * (x - 14.0),
                21..=26 => 118.0 - 2.0 * (x - 20.0),
                27..=31 => 106.0 + 1.2 * (x - 26.0),
                32..=45 => 112.0 - 1.5 * (x - 31.0),
                _ => 91.0 - 0.3 * (x - 45.0),
            }
        })
        .collect();
    let mut bars = from_closes(&closes, 0.002, 1000);
    for (i, volume) in [(10, 1200), (20, 1500), (31, 1200)] {
        bars[i].high = bars[i].close * 1.03;
        bars[i].volume = volume;
    }
    bars
}

/// Chop between 99 and 101, breakout to 103.3, then a fast reversal back
/// into the range (or a slow drift when `fast_reversal` is false)
pub fn bull_trap(fast_reversal: bool) -> Vec<Candle> {
    let mut bars: Vec<Candle> = (0..10)
        .map(|i| match i {
            5 => bar(i, 100.5, 103.5, 100.3, 101.0, 1500),
            _ => bar(i, 100.0, 100.6, 99.6, if i % 2 == 1 { 100.2 } else { 100.0 }, 1000),
        })
        .collect();
    let mut prev = bars[9].close;
    for i in 10..25 {
        let c = if i % 2 == 0 { 99.8 } else { 100.2 };
        let h = if i == 12 { 101.0 } else { prev.max(c) + 0.2 };
        let l = if i == 18 { 99.0 } else { prev.min(c) - 0.2 };
        bars.push(bar(i, prev, h, l, c, 1000));
        prev = c;
    }
    for (c, h) in [(101.7, 101.9), (103.3, 103.5)] {
        bars.push(bar(bars.len(), prev, h, prev - 0.1, c, 2500));
        prev = c;
    }
    if fast_reversal {
        for c in [101.5, 99.9] {
            bars.push(bar(bars.len(), prev, prev + 0.1, c - 0.1, c, 2500));
            prev = c;
        }
        for k in 0..5 {
            let c = if k % 2 == 0 { 99.9 } else { 100.0 };
            bars.push(bar(bars.len(), prev, prev.max(c) + 0.1, prev.min(c) - 0.1, c, 1000));
            prev = c;
        }
    } else {
        for _ in 0..10 {
            let c = prev * 0.997;
            bars.push(bar(bars.len(), prev, prev + 0.05, c - 0.05, c, 1200));
            prev = c;
        }
    }
    bars
}

/// 30 gently oscillating candles
pub fn quiet_series() -> Vec<Candle> {
    let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.9).sin() * 0.4).collect();
    from_closes(&closes, 0.002, 1000)
}

//! Trend and volatility primitives
//!
//! Streaming indicators (`update` one value at a time) plus series helpers
//! over OHLCV slices. None of them produce NaN: empty windows and zero
//! denominators yield `0.0`.

use std::collections::VecDeque;

use crate::OHLCV;

/// True range of `bar` given the previous close
#[inline]
pub fn true_range<T: OHLCV>(bar: &T, prev_close: Option<f64>) -> f64 {
    let hl = bar.high() - bar.low();
    match prev_close {
        Some(pc) => hl.max((bar.high() - pc).abs()).max((bar.low() - pc).abs()),
        None => hl,
    }
}

/// Exponential moving average, seeded with the first value
#[derive(Debug, Clone)]
pub struct Ema {
    multiplier: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            multiplier: 2.0 / (period.max(1) as f64 + 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.value {
            Some(prev) => (value - prev) * self.multiplier + prev,
            None => value,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Linearly weighted moving average (newest value has weight `period`).
/// While fewer than `period` values are available the available ones are
/// weighted 1..=len.
#[derive(Debug, Clone)]
pub struct Wma {
    period: usize,
    values: VecDeque<f64>,
}

impl Wma {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            values: VecDeque::new(),
        }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
        let (weighted, weights) = self
            .values
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(s, w), (i, v)| {
                let weight = (i + 1) as f64;
                (s + v * weight, w + weight)
            });
        weighted / weights
    }
}

/// Average true range with Wilder smoothing.
/// The first `period` updates return the running mean of true ranges.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    count: usize,
    value: f64,
    prev_close: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            count: 0,
            value: 0.0,
            prev_close: None,
        }
    }

    pub fn update<T: OHLCV>(&mut self, bar: &T) -> f64 {
        let tr = true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close());
        self.count += 1;
        if self.count <= self.period {
            self.value += (tr - self.value) / self.count as f64;
        } else {
            self.value = (self.value * (self.period - 1) as f64 + tr) / self.period as f64;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// ATR for every bar of the series
pub fn atr_series<T: OHLCV>(bars: &[T], period: usize) -> Vec<f64> {
    let mut atr = Atr::new(period);
    bars.iter().map(|b| atr.update(b)).collect()
}

/// Weighted moving average of a value series
pub fn wma_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut wma = Wma::new(period);
    values.iter().map(|&v| wma.update(v)).collect()
}

/// Exponential moving average of a value series
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema = Ema::new(period);
    values.iter().map(|&v| ema.update(v)).collect()
}

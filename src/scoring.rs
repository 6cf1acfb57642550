//! Additive confidence scoring
//!
//! Every detector builds its confidence from independently capped terms.
//! Each term is recorded with its factor name so the breakdown can travel
//! with the signal, and the total is clipped to `0.0..=100.0`.

use serde::Serialize;

/// Upper bound of a confidence score
pub const MAX_CONFIDENCE: f64 = 100.0;

/// One named contribution to a confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreTerm {
    pub factor: &'static str,
    pub points: f64,
}

/// Accumulator of capped score terms
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scorecard {
    terms: Vec<ScoreTerm>,
    scale: Option<f64>,
}

impl Scorecard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` clamped to `0.0..=cap`. Non-finite values contribute 0.
    pub fn capped(&mut self, factor: &'static str, value: f64, cap: f64) -> &mut Self {
        let points = if value.is_finite() {
            value.clamp(0.0, cap)
        } else {
            0.0
        };
        self.terms.push(ScoreTerm { factor, points });
        self
    }

    /// Add a fixed bonus when `condition` holds (recorded as 0 otherwise)
    pub fn bonus(&mut self, factor: &'static str, condition: bool, points: f64) -> &mut Self {
        self.terms.push(ScoreTerm {
            factor,
            points: if condition { points } else { 0.0 },
        });
        self
    }

    /// Subtract `value` clamped to `0.0..=cap`
    pub fn penalty(&mut self, factor: &'static str, value: f64, cap: f64) -> &mut Self {
        let points = if value.is_finite() {
            -value.clamp(0.0, cap)
        } else {
            0.0
        };
        self.terms.push(ScoreTerm { factor, points });
        self
    }

    /// Multiply the raw sum uniformly before clipping
    pub fn scale(&mut self, factor: f64) -> &mut Self {
        self.scale = Some(factor);
        self
    }

    /// Raw (unclipped, unscaled) sum of all terms
    pub fn raw(&self) -> f64 {
        self.terms.iter().map(|t| t.points).sum()
    }

    /// Final confidence in `0.0..=100.0`
    pub fn total(&self) -> f64 {
        let scaled = self.raw() * self.scale.unwrap_or(1.0);
        if scaled.is_finite() {
            scaled.clamp(0.0, MAX_CONFIDENCE)
        } else {
            0.0
        }
    }

    pub fn terms(&self) -> &[ScoreTerm] {
        &self.terms
    }

    /// Points recorded for a factor, if present
    pub fn points(&self, factor: &str) -> Option<f64> {
        self.terms
            .iter()
            .find(|t| t.factor == factor)
            .map(|t| t.points)
    }

    pub fn into_terms(self) -> Vec<ScoreTerm> {
        self.terms
    }
}

/// Linear proximity bonus: `max_points` at `actual == optimal`, falling to 0
/// at a distance of `tolerance`.
#[inline]
pub fn proximity_bonus(actual: f64, optimal: f64, tolerance: f64, max_points: f64) -> f64 {
    if tolerance <= 0.0 {
        return if (actual - optimal).abs() < f64::EPSILON {
            max_points
        } else {
            0.0
        };
    }
    max_points * (1.0 - (actual - optimal).abs() / tolerance).max(0.0)
}

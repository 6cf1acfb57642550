//! Chart pattern detectors
//!
//! Each detector scans the whole series and scores what it finds on the
//! additive 0-100 scale from [`crate::scoring`].
//!
//! # Pattern Families
//!
//! - **Head-and-Shoulders**: three swing pivots with a neckline, bearish
//!   tops and bullish (inverse) bottoms
//! - **Reversal flag**: strong pole, tight consolidation at a
//!   support/resistance level, momentum loss
//! - **Three-line strike**: a 3-5 candle run erased by one opposite candle
//! - **Trap**: abnormal breakout out of a chop range that reverses fast
//! - **Candlestick**: hammer family, doji family, engulfing, piercing/dark
//!   cloud and morning/evening star at the end of a trend

pub mod helpers;

/// Generate the config-carrying detector struct plus `new`, `with_defaults`,
/// `Default`, `From<PatternDetectionConfig>` and `config()`.
macro_rules! config_detectors {
  ($($(#[$attr:meta])* $detector:ident),* $(,)?) => {
    $(
      $(#[$attr])*
      #[derive(Debug, Clone, Copy, Default, PartialEq)]
      pub struct $detector {
        config: $crate::params::PatternDetectionConfig,
      }

      impl $detector {
        pub fn new(config: $crate::params::PatternDetectionConfig) -> Self {
          Self { config }
        }

        pub fn with_defaults() -> Self {
          Self::default()
        }

        pub fn config(&self) -> &$crate::params::PatternDetectionConfig {
          &self.config
        }
      }

      impl From<$crate::params::PatternDetectionConfig> for $detector {
        fn from(config: $crate::params::PatternDetectionConfig) -> Self {
          Self::new(config)
        }
      }
    )*
  };
}

pub mod candlestick;
pub mod head_shoulders;
pub mod reversal_flag;
pub mod three_line_strike;
pub mod trap;

// Re-export all detectors for convenience
pub use candlestick::*;
pub use head_shoulders::*;
pub use reversal_flag::*;
pub use three_line_strike::*;
pub use trap::*;

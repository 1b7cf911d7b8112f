// Trading strategy module
pub mod crossover;
pub mod decision;

pub use crossover::detect_crossover;
pub use decision::decide;

use crate::error::Error;
use crate::indicators::calculate_ema_pair;
use crate::models::{AlignedPoint, CrossoverEvent, PriceSeries};
use crate::Result;

/// EMA crossover strategy: short EMA crossing the long EMA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossoverStrategy {
    short_period: usize,
    long_period: usize,
}

/// Result of running the indicators over one price series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub latest: AlignedPoint,
    pub event: Option<CrossoverEvent>,
}

impl CrossoverStrategy {
    pub fn new(short_period: usize, long_period: usize) -> Result<Self> {
        if short_period == 0 || short_period >= long_period {
            return Err(Error::Configuration(format!(
                "EMA periods must satisfy 0 < short < long (got {} / {})",
                short_period, long_period
            )));
        }

        Ok(Self {
            short_period,
            long_period,
        })
    }

    pub fn short_period(&self) -> usize {
        self.short_period
    }

    pub fn long_period(&self) -> usize {
        self.long_period
    }

    /// Minimum candles for two aligned samples of the long EMA
    pub fn min_candles_required(&self) -> usize {
        self.long_period + 1
    }

    /// Compute both EMAs and look for a crossover at the newest candle
    pub fn analyze(&self, series: &PriceSeries) -> Result<Analysis> {
        let required = self.min_candles_required();
        if series.len() < required {
            return Err(Error::InsufficientData {
                required,
                available: series.len(),
            });
        }

        let pair = calculate_ema_pair(series, self.short_period, self.long_period)?;
        let latest = pair.latest_aligned().ok_or(Error::InsufficientData {
            required,
            available: series.len(),
        })?;

        Ok(Analysis {
            latest,
            event: detect_crossover(&pair),
        })
    }
}

impl Default for CrossoverStrategy {
    fn default() -> Self {
        Self {
            short_period: 12,
            long_period: 26,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candle, Direction};
    use rust_decimal::Decimal;

    fn series_from(prices: &[i64]) -> PriceSeries {
        let candles = prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: i as i64 * 300,
                close: Decimal::from(close),
            })
            .collect();
        PriceSeries::new(300, candles).unwrap()
    }

    #[test]
    fn test_min_candles_required() {
        let strategy = CrossoverStrategy::default();
        assert_eq!(strategy.min_candles_required(), 27);
    }

    #[test]
    fn test_rejects_bad_periods() {
        assert!(CrossoverStrategy::new(26, 12).is_err());
        assert!(CrossoverStrategy::new(12, 12).is_err());
        assert!(CrossoverStrategy::new(0, 26).is_err());
        assert!(CrossoverStrategy::new(5, 20).is_ok());
    }

    #[test]
    fn test_insufficient_data() {
        let strategy = CrossoverStrategy::default();
        let series = series_from(&[100; 26]);

        let result = strategy.analyze(&series);
        assert!(matches!(
            result,
            Err(Error::InsufficientData {
                required: 27,
                available: 26
            })
        ));
    }

    #[test]
    fn test_jump_after_downtrend_is_bullish() {
        // Short EMA trails a falling price by less than the long EMA,
        // so it sits below until the spike at the newest candle
        let mut prices: Vec<i64> = (0..29).map(|i| 200 - i).collect();
        prices.push(400);
        let series = series_from(&prices);

        let analysis = CrossoverStrategy::default().analyze(&series).unwrap();
        let event = analysis.event.unwrap();
        assert_eq!(event.direction, Direction::Bullish);
        assert_eq!(event.timestamp, 29 * 300);
        assert!(analysis.latest.short > analysis.latest.long);
    }

    #[test]
    fn test_drop_after_uptrend_is_bearish() {
        let mut prices: Vec<i64> = (0..29).map(|i| 100 + i).collect();
        prices.push(10);
        let series = series_from(&prices);

        let analysis = CrossoverStrategy::default().analyze(&series).unwrap();
        let event = analysis.event.unwrap();
        assert_eq!(event.direction, Direction::Bearish);
        assert_eq!(event.timestamp, 29 * 300);
    }

    #[test]
    fn test_steady_trend_has_no_event() {
        let prices: Vec<i64> = (0..40).map(|i| 100 + i).collect();
        let series = series_from(&prices);

        let analysis = CrossoverStrategy::default().analyze(&series).unwrap();
        assert!(analysis.event.is_none());
        assert!(analysis.latest.short > analysis.latest.long);
    }
}

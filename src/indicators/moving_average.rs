use crate::error::Error;
use crate::models::{EmaPair, EmaPoint, PriceSeries};
use crate::Result;
use rust_decimal::Decimal;

/// Calculate Simple Moving Average (SMA) of the last `period` prices
pub fn calculate_sma(prices: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: Decimal = prices.iter().rev().take(period).sum();
    Some(sum / Decimal::from(period))
}

/// Calculate the Exponential Moving Average (EMA) at every candle from the
/// `period`-th onward
///
/// Seeded with the SMA of the first `period` closes, then
/// `ema = close * k + prev * (1 - k)` with `k = 2 / (period + 1)`.
/// Returns `len - period + 1` points.
pub fn calculate_ema_series(series: &PriceSeries, period: usize) -> Result<Vec<EmaPoint>> {
    if period == 0 {
        return Err(Error::InvalidPeriod(period));
    }

    let candles = series.candles();
    if candles.len() < period {
        return Err(Error::InsufficientData {
            required: period,
            available: candles.len(),
        });
    }

    let multiplier = Decimal::TWO / Decimal::from(period + 1);
    let seed_closes: Vec<Decimal> = candles[..period].iter().map(|c| c.close).collect();

    // Start with SMA
    let mut ema = calculate_sma(&seed_closes, period).ok_or(Error::InsufficientData {
        required: period,
        available: candles.len(),
    })?;

    let mut points = Vec::with_capacity(candles.len() - period + 1);
    points.push(EmaPoint {
        timestamp: candles[period - 1].timestamp,
        value: ema,
    });

    for candle in &candles[period..] {
        ema = candle.close * multiplier + ema * (Decimal::ONE - multiplier);
        points.push(EmaPoint {
            timestamp: candle.timestamp,
            value: ema,
        });
    }

    Ok(points)
}

/// Short and long EMA over the same series
pub fn calculate_ema_pair(
    series: &PriceSeries,
    short_period: usize,
    long_period: usize,
) -> Result<EmaPair> {
    Ok(EmaPair {
        short: calculate_ema_series(series, short_period)?,
        long: calculate_ema_series(series, long_period)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use rust_decimal_macros::dec;

    fn series_from(prices: &[Decimal]) -> PriceSeries {
        let candles = prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: i as i64 * 300,
                close,
            })
            .collect();
        PriceSeries::new(300, candles).unwrap()
    }

    #[test]
    fn test_sma() {
        let prices = vec![dec!(100), dec!(102), dec!(104), dec!(106), dec!(108)];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(dec!(104)));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![dec!(100), dec!(102)];
        assert!(calculate_sma(&prices, 5).is_none());
        assert!(calculate_sma(&prices, 0).is_none());
    }

    #[test]
    fn test_ema_seed_is_mean_of_first_period() {
        let prices = vec![dec!(100), dec!(102), dec!(104), dec!(106), dec!(108), dec!(110)];
        let series = series_from(&prices);

        let ema = calculate_ema_series(&series, 5).unwrap();
        assert_eq!(ema.len(), 2);
        assert_eq!(ema[0].value, dec!(104));
        assert_eq!(ema[0].timestamp, 4 * 300);
        assert_eq!(ema[1].timestamp, 5 * 300);
        assert!(ema[1].value > dec!(104)); // EMA should be above initial SMA
    }

    #[test]
    fn test_ema_recursive_step() {
        // k = 2 / (3 + 1) = 0.5, seed = 2, next = 8 * 0.5 + 2 * 0.5 = 5
        let series = series_from(&[dec!(1), dec!(2), dec!(3), dec!(8)]);

        let ema = calculate_ema_series(&series, 3).unwrap();
        assert_eq!(ema.len(), 2);
        assert_eq!(ema[0].value, dec!(2));
        assert_eq!(ema[1].value, dec!(5));
    }

    #[test]
    fn test_ema_output_length_for_every_period() {
        let prices: Vec<Decimal> = (0..40).map(|i| Decimal::from(100 + i % 7)).collect();
        let series = series_from(&prices);

        for period in 1..=40 {
            let ema = calculate_ema_series(&series, period).unwrap();
            assert_eq!(ema.len(), prices.len() - period + 1);

            let mean = prices[..period].iter().sum::<Decimal>() / Decimal::from(period);
            assert_eq!(ema[0].value, mean);
        }
    }

    #[test]
    fn test_ema_insufficient_data() {
        let series = series_from(&[dec!(1), dec!(2), dec!(3)]);

        let result = calculate_ema_series(&series, 12);
        assert!(matches!(
            result,
            Err(Error::InsufficientData {
                required: 12,
                available: 3
            })
        ));
    }

    #[test]
    fn test_ema_zero_period_rejected() {
        let series = series_from(&[dec!(1)]);
        assert!(matches!(
            calculate_ema_series(&series, 0),
            Err(Error::InvalidPeriod(0))
        ));
    }

    #[test]
    fn test_ema_is_deterministic() {
        let prices: Vec<Decimal> = (0..30).map(|i| Decimal::from(50 + (i * 13) % 11)).collect();
        let series = series_from(&prices);

        assert_eq!(
            calculate_ema_series(&series, 12).unwrap(),
            calculate_ema_series(&series, 12).unwrap()
        );
    }

    #[test]
    fn test_ema_pair_requires_long_period_history() {
        let prices: Vec<Decimal> = (0..20).map(Decimal::from).collect();
        let series = series_from(&prices);

        let result = calculate_ema_pair(&series, 12, 26);
        assert!(matches!(
            result,
            Err(Error::InsufficientData { required: 26, .. })
        ));
    }
}

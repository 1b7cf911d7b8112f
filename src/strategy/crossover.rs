use crate::models::{CrossoverEvent, Direction, EmaPair};
use rust_decimal::Decimal;

/// Detect a crossover at the newest aligned sample
///
/// Only the transition between the two most recent aligned timestamps is
/// inspected; older history is never rescanned. A spread of exactly zero at
/// t-1 counts as either side, so curves sitting on top of each other fire
/// once, on the sample where they separate.
pub fn detect_crossover(pair: &EmaPair) -> Option<CrossoverEvent> {
    let aligned = pair.aligned();
    if aligned.len() < 2 {
        return None;
    }
    let previous = &aligned[aligned.len() - 2];
    let current = &aligned[aligned.len() - 1];

    let before = previous.spread();
    let after = current.spread();

    let direction = if before <= Decimal::ZERO && after > Decimal::ZERO {
        Direction::Bullish
    } else if before >= Decimal::ZERO && after < Decimal::ZERO {
        Direction::Bearish
    } else {
        return None;
    };

    tracing::debug!(
        "Crossover {:?} at {}: spread {} -> {}",
        direction,
        current.timestamp,
        before,
        after
    );

    Some(CrossoverEvent {
        timestamp: current.timestamp,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmaPoint;
    use rust_decimal_macros::dec;

    fn points(values: &[Decimal]) -> Vec<EmaPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| EmaPoint {
                timestamp: i as i64 * 300,
                value,
            })
            .collect()
    }

    fn pair(short: &[Decimal], long: &[Decimal]) -> EmaPair {
        EmaPair {
            short: points(short),
            long: points(long),
        }
    }

    #[test]
    fn test_bullish_crossover() {
        let pair = pair(&[dec!(99), dec!(101)], &[dec!(100), dec!(100)]);

        let event = detect_crossover(&pair).unwrap();
        assert_eq!(event.direction, Direction::Bullish);
        assert_eq!(event.timestamp, 300);
    }

    #[test]
    fn test_bearish_crossover() {
        let pair = pair(&[dec!(101), dec!(99)], &[dec!(100), dec!(100)]);

        let event = detect_crossover(&pair).unwrap();
        assert_eq!(event.direction, Direction::Bearish);
        assert_eq!(event.timestamp, 300);
    }

    #[test]
    fn test_flat_equal_curves_never_trigger() {
        let flat = [dec!(100); 10];
        assert!(detect_crossover(&pair(&flat, &flat)).is_none());
    }

    #[test]
    fn test_no_event_while_staying_on_one_side() {
        let above = pair(&[dec!(101), dec!(105)], &[dec!(100), dec!(100)]);
        let below = pair(&[dec!(95), dec!(99)], &[dec!(100), dec!(100)]);

        assert!(detect_crossover(&above).is_none());
        assert!(detect_crossover(&below).is_none());
    }

    #[test]
    fn test_touching_is_not_a_crossover() {
        // Moving onto the long EMA is not divergence yet
        let pair = pair(&[dec!(99), dec!(100)], &[dec!(100), dec!(100)]);
        assert!(detect_crossover(&pair).is_none());
    }

    #[test]
    fn test_fires_when_divergence_begins_after_equality() {
        let up = pair(&[dec!(99), dec!(100), dec!(101)], &[dec!(100); 3]);
        let down = pair(&[dec!(101), dec!(100), dec!(99)], &[dec!(100); 3]);

        assert_eq!(
            detect_crossover(&up).map(|e| (e.timestamp, e.direction)),
            Some((600, Direction::Bullish))
        );
        assert_eq!(
            detect_crossover(&down).map(|e| (e.timestamp, e.direction)),
            Some((600, Direction::Bearish))
        );
    }

    #[test]
    fn test_only_latest_transition_is_considered() {
        // Crossed at index 1, then stayed above
        let pair = pair(
            &[dec!(99), dec!(101), dec!(102), dec!(103)],
            &[dec!(100); 4],
        );
        assert!(detect_crossover(&pair).is_none());
    }

    #[test]
    fn test_insufficient_overlap() {
        let single = pair(&[dec!(99)], &[dec!(100)]);
        let empty = pair(&[], &[]);

        assert!(detect_crossover(&single).is_none());
        assert!(detect_crossover(&empty).is_none());
    }

    #[test]
    fn test_uses_aligned_timestamps() {
        // Short has extra leading history; only the overlap is compared
        let pair = EmaPair {
            short: points(&[dec!(500), dec!(500), dec!(99), dec!(101)]),
            long: vec![
                EmaPoint { timestamp: 600, value: dec!(100) },
                EmaPoint { timestamp: 900, value: dec!(100) },
            ],
        };

        let event = detect_crossover(&pair).unwrap();
        assert_eq!(event.timestamp, 900);
        assert_eq!(event.direction, Direction::Bullish);
    }
}

use crate::models::{CrossoverEvent, Direction, RunState, TradeAction, TradeIntent};

/// Turn the latest crossover into a trade intent
///
/// A crossover whose timestamp matches `state.last_acted_crossover` has
/// already been traded and maps to HOLD, so repeated cycles over the same
/// candles never re-issue the order.
pub fn decide(event: Option<&CrossoverEvent>, state: &RunState) -> TradeIntent {
    let Some(event) = event else {
        return TradeIntent::hold();
    };

    if state.has_acted_on(event.timestamp) {
        tracing::debug!(
            "Crossover at {} already acted upon, holding",
            event.timestamp
        );
        return TradeIntent::hold();
    }

    let action = match event.direction {
        Direction::Bullish => TradeAction::BuyAll,
        Direction::Bearish => TradeAction::SellAll,
    };

    TradeIntent {
        action,
        reason: Some(*event),
    }
}

// Polling loop and order dispatch
pub mod trading_loop;

pub use trading_loop::{
    closed_candles, delay_until_next_poll, last_closed_boundary, CycleOutcome, LoopSettings,
    TradingLoop,
};

use crate::error::Error;
use crate::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Candle granularity used by the bot (5 minutes)
pub const DEFAULT_GRANULARITY_SECS: u32 = 300;

/// A closed price sample from the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candle {
    pub timestamp: i64, // Unix seconds, aligned to granularity
    pub close: Decimal,
}

/// Ordered candle history at a fixed granularity
///
/// Timestamps are strictly increasing. Gaps are tolerated and kept as-is,
/// nothing is interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    granularity_secs: u32,
    candles: Vec<Candle>,
}

impl PriceSeries {
    /// Build a series from candles in any order
    ///
    /// Candles are sorted ascending. Duplicate timestamps are rejected.
    pub fn new(granularity_secs: u32, mut candles: Vec<Candle>) -> Result<Self> {
        if granularity_secs == 0 {
            return Err(Error::InvalidSeries("granularity must be positive".into()));
        }

        candles.sort_by_key(|c| c.timestamp);

        if let Some(pair) = candles
            .windows(2)
            .find(|w| w[0].timestamp == w[1].timestamp)
        {
            return Err(Error::InvalidSeries(format!(
                "duplicate candle timestamp {}",
                pair[0].timestamp
            )));
        }

        Ok(Self {
            granularity_secs,
            candles,
        })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Number of places where consecutive candles are more than one interval apart
    pub fn gap_count(&self) -> usize {
        let step = i64::from(self.granularity_secs);
        self.candles
            .windows(2)
            .filter(|w| w[1].timestamp - w[0].timestamp > step)
            .count()
    }
}

/// One EMA value, stamped with the candle it was computed at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmaPoint {
    pub timestamp: i64,
    pub value: Decimal,
}

/// Short and long EMA sequences over the same series
#[derive(Debug, Clone, PartialEq)]
pub struct EmaPair {
    pub short: Vec<EmaPoint>,
    pub long: Vec<EmaPoint>,
}

/// Short and long EMA at a timestamp where both are defined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedPoint {
    pub timestamp: i64,
    pub short: Decimal,
    pub long: Decimal,
}

impl AlignedPoint {
    /// short - long
    pub fn spread(&self) -> Decimal {
        self.short - self.long
    }
}

impl EmaPair {
    /// Points where both sequences have a value, oldest first
    pub fn aligned(&self) -> Vec<AlignedPoint> {
        let mut points = Vec::with_capacity(self.short.len().min(self.long.len()));
        let (mut i, mut j) = (0, 0);

        while i < self.short.len() && j < self.long.len() {
            let (s, l) = (&self.short[i], &self.long[j]);
            match s.timestamp.cmp(&l.timestamp) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    points.push(AlignedPoint {
                        timestamp: s.timestamp,
                        short: s.value,
                        long: l.value,
                    });
                    i += 1;
                    j += 1;
                }
            }
        }

        points
    }

    /// Most recent point where both sequences have a value
    pub fn latest_aligned(&self) -> Option<AlignedPoint> {
        self.aligned().last().copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Bullish,
    Bearish,
}

/// The short EMA moved to the other side of the long EMA at `timestamp`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrossoverEvent {
    pub timestamp: i64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeAction {
    BuyAll,
    SellAll,
    Hold,
}

/// What the bot wants to do this cycle, and the crossover that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeIntent {
    pub action: TradeAction,
    pub reason: Option<CrossoverEvent>,
}

impl TradeIntent {
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            reason: None,
        }
    }
}

/// In-memory state carried from one polling cycle to the next
///
/// Lives for the process only. Advanced only after an order was accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub last_acted_crossover: Option<i64>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_acted_on(&self, timestamp: i64) -> bool {
        self.last_acted_crossover == Some(timestamp)
    }

    /// State after an order for the crossover at `timestamp` went through
    pub fn acted_on(self, timestamp: i64) -> Self {
        Self {
            last_acted_crossover: Some(timestamp),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Market order spending (BUY) or selling (SELL) `amount` of `currency`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrder {
    pub product_id: String,
    pub side: OrderSide,
    pub currency: String,
    pub amount: Decimal,
}

/// Exchange acknowledgement of a placed order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderResult {
    pub order_id: String,
    pub status: String,
}

/// Trading pair such as BTC-USD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub base: String,
    pub quote: String,
}

impl Product {
    pub fn parse(id: &str) -> Result<Self> {
        match id.split_once('-') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('-') =>
            {
                Ok(Self {
                    id: id.to_uppercase(),
                    base: base.to_uppercase(),
                    quote: quote.to_uppercase(),
                })
            }
            _ => Err(Error::Configuration(format!(
                "product id '{}' must look like BASE-QUOTE",
                id
            ))),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

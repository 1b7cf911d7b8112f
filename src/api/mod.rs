pub mod auth;
pub mod coinbase;
pub mod paper;

pub use coinbase::CoinbaseClient;
pub use paper::PaperExchange;

use crate::error::ExchangeError;
use crate::models::{Candle, MarketOrder, OrderResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Capabilities the trading loop needs from an exchange
///
/// Every call may fail with a transport, auth or rate-limit error. Callers
/// treat all of them the same way: skip the cycle and try again later.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Historical candles for `product_id`, oldest first
    async fn fetch_candles(
        &self,
        product_id: &str,
        granularity_secs: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Available (not on hold) balance of `currency`
    async fn get_balance(&self, currency: &str) -> Result<Decimal, ExchangeError>;

    /// Submit a market order
    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderResult, ExchangeError>;

    /// Gateway name for logs
    fn name(&self) -> &str;
}

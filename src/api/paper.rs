use super::ExchangeGateway;
use crate::error::ExchangeError;
use crate::models::{Candle, MarketOrder, OrderResult, OrderSide, Product};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Paper trading gateway
///
/// Candles come from the wrapped gateway. Balances live in memory and
/// market orders fill instantly at the last fetched close, without fees.
pub struct PaperExchange<G> {
    inner: G,
    product: Product,
    balances: Mutex<HashMap<String, Decimal>>,
    last_price: Mutex<Option<Decimal>>,
}

impl<G: ExchangeGateway> PaperExchange<G> {
    pub fn new(inner: G, product: &Product, starting_quote: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert(product.quote.clone(), starting_quote);
        balances.insert(product.base.clone(), Decimal::ZERO);

        Self {
            inner,
            product: product.clone(),
            balances: Mutex::new(balances),
            last_price: Mutex::new(None),
        }
    }

    /// Snapshot of simulated balances
    pub async fn balances(&self) -> HashMap<String, Decimal> {
        self.balances.lock().await.clone()
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExchangeGateway for PaperExchange<G> {
    async fn fetch_candles(
        &self,
        product_id: &str,
        granularity_secs: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let candles = self
            .inner
            .fetch_candles(product_id, granularity_secs, start, end)
            .await?;

        if let Some(latest) = candles.iter().max_by_key(|c| c.timestamp) {
            *self.last_price.lock().await = Some(latest.close);
        }

        Ok(candles)
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, ExchangeError> {
        Ok(self
            .balances
            .lock()
            .await
            .get(&currency.to_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderResult, ExchangeError> {
        if order.product_id != self.product.id {
            return Err(ExchangeError::Rejected(format!(
                "unknown product {}",
                order.product_id
            )));
        }

        let price = (*self.last_price.lock().await)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ExchangeError::Rejected("no market price yet".to_string()))?;

        let mut balances = self.balances.lock().await;
        let quote = balances.get(&self.product.quote).copied().unwrap_or_default();
        let base = balances.get(&self.product.base).copied().unwrap_or_default();

        let (new_quote, new_base) = match order.side {
            OrderSide::Buy => {
                if order.amount > quote {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient funds: {} > {}",
                        order.amount, quote
                    )));
                }
                (quote - order.amount, base + order.amount / price)
            }
            OrderSide::Sell => {
                if order.amount > base {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient size: {} > {}",
                        order.amount, base
                    )));
                }
                (quote + order.amount * price, base - order.amount)
            }
        };

        balances.insert(self.product.quote.clone(), new_quote);
        balances.insert(self.product.base.clone(), new_base);

        tracing::info!(
            "📝 Paper {} {} {} @ {} -> {} {}, {} {}",
            order.side,
            order.amount,
            order.currency,
            price,
            new_base,
            self.product.base,
            new_quote,
            self.product.quote
        );

        Ok(OrderResult {
            order_id: Uuid::new_v4().to_string(),
            status: "done".to_string(),
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

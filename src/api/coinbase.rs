use super::auth::Credentials;
use super::ExchangeGateway;
use crate::error::ExchangeError;
use crate::models::{Candle, MarketOrder, OrderResult, OrderSide};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method, Response};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub const COINBASE_API_BASE: &str = "https://api.pro.coinbase.com";
const USER_AGENT: &str = concat!("crossbot/", env!("CARGO_PKG_VERSION"));

// Type alias for the rate limiter to simplify signatures
type CoinbaseRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Coinbase Exchange REST client
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct CoinbaseClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    rate_limiter: Arc<CoinbaseRateLimiter>,
}

/// Row from /products/{id}/candles: [time, low, high, open, close, volume]
type CandleRow = [f64; 6];

/// Response entry from /accounts
#[derive(Debug, Deserialize)]
struct Account {
    currency: String,
    available: Decimal,
}

/// Response from POST /orders
#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
}

/// Error body returned by the exchange
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl CoinbaseClient {
    /// Create a client against `base_url`
    ///
    /// # Arguments
    /// * `credentials` - Needed for balances and orders; candles are public
    /// * `timeout` - Per-request timeout, keeps a stuck call from stalling the loop
    /// * `requests_per_second` - Client-side pacing
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter,
        })
    }

    /// Send a rate-limited request, signing it when credentials are set
    async fn send(
        &self,
        method: Method,
        request_path: &str,
        body: Option<String>,
    ) -> Result<Response, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, request_path);
        let body = body.unwrap_or_default();
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");

        if let Some(credentials) = &self.credentials {
            let timestamp = Utc::now().timestamp().to_string();
            let signed = credentials.sign(&timestamp, method.as_str(), request_path, &body)?;
            request = request
                .header("CB-ACCESS-KEY", signed.key)
                .header("CB-ACCESS-SIGN", signed.signature)
                .header("CB-ACCESS-TIMESTAMP", signed.timestamp)
                .header("CB-ACCESS-PASSPHRASE", signed.passphrase);
        }

        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            tracing::warn!("Rate limited by Coinbase on {} {}", method, request_path);
            return Err(ExchangeError::RateLimited);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.message)
            .unwrap_or(text);

        Err(ExchangeError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn require_credentials(&self) -> Result<(), ExchangeError> {
        if self.credentials.is_none() {
            return Err(ExchangeError::MissingCredentials);
        }
        Ok(())
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn row_to_candle(row: &CandleRow) -> Result<Candle, ExchangeError> {
    let close = Decimal::from_f64(row[4])
        .ok_or_else(|| ExchangeError::Decode(format!("invalid close price {}", row[4])))?;

    Ok(Candle {
        timestamp: row[0] as i64,
        close,
    })
}

#[async_trait]
impl ExchangeGateway for CoinbaseClient {
    async fn fetch_candles(
        &self,
        product_id: &str,
        granularity_secs: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut path = format!(
            "/products/{}/candles?granularity={}",
            product_id, granularity_secs
        );
        if let Some(start) = start {
            path.push_str(&format!("&start={}", format_time(start)));
        }
        if let Some(end) = end {
            path.push_str(&format!("&end={}", format_time(end)));
        }

        let rows: Vec<CandleRow> = self
            .send(Method::GET, &path, None)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;

        // Exchange returns newest first
        let mut candles = rows.iter().map(row_to_candle).collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|c| c.timestamp);

        tracing::debug!("Fetched {} candles for {}", candles.len(), product_id);
        Ok(candles)
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, ExchangeError> {
        self.require_credentials()?;

        let accounts: Vec<Account> = self
            .send(Method::GET, "/accounts", None)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;

        Ok(accounts
            .iter()
            .find(|a| a.currency.eq_ignore_ascii_case(currency))
            .map(|a| a.available)
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderResult, ExchangeError> {
        self.require_credentials()?;

        let amount = order.amount.normalize().to_string();
        let mut body = serde_json::json!({
            "type": "market",
            "side": order.side,
            "product_id": order.product_id,
            "client_oid": uuid::Uuid::new_v4().to_string(),
        });
        // BUY spends quote funds, SELL sells base size
        match order.side {
            OrderSide::Buy => body["funds"] = serde_json::Value::String(amount),
            OrderSide::Sell => body["size"] = serde_json::Value::String(amount),
        }

        let response: OrderResponse = self
            .send(Method::POST, "/orders", Some(body.to_string()))
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;

        tracing::info!(
            order_id = %response.id,
            status = %response.status,
            "Order accepted"
        );

        Ok(OrderResult {
            order_id: response.id,
            status: response.status,
        })
    }

    fn name(&self) -> &str {
        "coinbase"
    }
}

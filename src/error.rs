use crate::models::OrderSide;
use thiserror::Error;

/// Failure reported by an exchange gateway call
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by exchange")]
    RateLimited,

    #[error("failed to decode exchange response: {0}")]
    Decode(String),

    #[error("invalid API secret: {0}")]
    InvalidSecret(String),

    #[error("endpoint requires API credentials")]
    MissingCredentials,

    #[error("order rejected: {0}")]
    Rejected(String),
}

/// Errors raised by the trading core
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to fetch candles: {0}")]
    DataFetch(#[source] ExchangeError),

    #[error("insufficient data: need {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("invalid EMA period: {0}")]
    InvalidPeriod(usize),

    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    #[error("failed to query {currency} balance: {source}")]
    BalanceQuery {
        currency: String,
        #[source]
        source: ExchangeError,
    },

    #[error("failed to place {side} order: {source}")]
    OrderPlacement {
        side: OrderSide,
        #[source]
        source: ExchangeError,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Error::Configuration(e.to_string())
    }
}

//! Runtime settings: defaults, optional TOML file, then `CROSSBOT__*` env vars.

use crate::api::auth::Credentials;
use crate::api::coinbase::COINBASE_API_BASE;
use crate::error::Error;
use crate::models::{Product, DEFAULT_GRANULARITY_SECS};
use crate::strategy::CrossoverStrategy;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ::config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "crossbot";
const ENV_PREFIX: &str = "CROSSBOT";
/// Most candles the exchange returns for one request
const MAX_CANDLES_PER_REQUEST: usize = 300;

pub const API_KEY_ENV: &str = "API_KEY";
pub const API_SECRET_ENV: &str = "API_SECRET";
pub const API_PASS_ENV: &str = "API_PASS";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub product_id: String,
    pub granularity_secs: u32,
    /// Candles requested per cycle
    pub lookback_candles: usize,
    pub short_period: usize,
    pub long_period: usize,
    /// Smallest quote balance worth a BUY
    pub min_quote_order: Decimal,
    /// Smallest base balance worth a SELL
    pub min_base_order: Decimal,
    /// Wait after each boundary so the exchange has closed the candle
    pub poll_offset_secs: u64,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
    pub paper: bool,
    pub paper_quote_balance: Decimal,
}

impl Settings {
    /// Load settings from defaults, `path` (or `crossbot.toml` if present) and env
    pub fn load(path: Option<&Path>, product: Option<String>, paper: bool) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("product_id", "BTC-USD")?
            .set_default("granularity_secs", i64::from(DEFAULT_GRANULARITY_SECS))?
            .set_default("lookback_candles", 60)?
            .set_default("short_period", 12)?
            .set_default("long_period", 26)?
            .set_default("min_quote_order", "1.00")?
            .set_default("min_base_order", "0.0001")?
            .set_default("poll_offset_secs", 5)?
            .set_default("api_url", COINBASE_API_BASE)?
            .set_default("request_timeout_secs", 10)?
            .set_default("requests_per_second", 3)?
            .set_default("paper", false)?
            .set_default("paper_quote_balance", "1000")?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("product_id", product)?
            .set_override_option("paper", paper.then_some(true))?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check every setting; a failure here is fatal at startup
    pub fn validate(&self) -> Result<()> {
        self.product()?;
        let strategy = self.strategy()?;

        if self.granularity_secs == 0 {
            return Err(Error::Configuration("granularity_secs must be positive".into()));
        }

        let required = strategy.min_candles_required();
        if self.lookback_candles < required {
            return Err(Error::Configuration(format!(
                "lookback_candles must be at least {} for EMA-{}",
                required,
                strategy.long_period()
            )));
        }
        if self.lookback_candles > MAX_CANDLES_PER_REQUEST {
            return Err(Error::Configuration(format!(
                "lookback_candles cannot exceed {}",
                MAX_CANDLES_PER_REQUEST
            )));
        }

        if self.min_quote_order < Decimal::ZERO || self.min_base_order < Decimal::ZERO {
            return Err(Error::Configuration(
                "minimum order thresholds cannot be negative".into(),
            ));
        }

        // A single call must never hold the loop past one polling interval
        if self.request_timeout_secs == 0
            || self.request_timeout_secs >= u64::from(self.granularity_secs)
        {
            return Err(Error::Configuration(format!(
                "request_timeout_secs must be between 1 and {}",
                self.granularity_secs - 1
            )));
        }
        if self.poll_offset_secs >= u64::from(self.granularity_secs) {
            return Err(Error::Configuration(
                "poll_offset_secs must be shorter than one interval".into(),
            ));
        }

        if self.requests_per_second == 0 {
            return Err(Error::Configuration("requests_per_second must be positive".into()));
        }

        if self.paper && self.paper_quote_balance < Decimal::ZERO {
            return Err(Error::Configuration(
                "paper_quote_balance cannot be negative".into(),
            ));
        }

        Ok(())
    }

    pub fn product(&self) -> Result<Product> {
        Product::parse(&self.product_id)
    }

    pub fn strategy(&self) -> Result<CrossoverStrategy> {
        CrossoverStrategy::new(self.short_period, self.long_period)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Read exchange credentials from the environment
pub fn load_credentials() -> Result<Credentials> {
    credentials_from(|name| std::env::var(name).ok())
}

/// Build credentials from a variable lookup, rejecting missing or empty values
pub fn credentials_from<F>(lookup: F) -> Result<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Configuration(format!("{} not found in environment", name)))
    };

    let api_key = read(API_KEY_ENV)?;
    let api_secret = read(API_SECRET_ENV)?;
    let passphrase = read(API_PASS_ENV)?;

    if STANDARD.decode(&api_secret).is_err() {
        return Err(Error::Configuration(format!(
            "{} must be base64 encoded",
            API_SECRET_ENV
        )));
    }

    Ok(Credentials::new(api_key, api_secret, passphrase))
}

use crate::api::ExchangeGateway;
use crate::config::Settings;
use crate::error::Error;
use crate::models::{
    Candle, CrossoverEvent, MarketOrder, OrderResult, OrderSide, PriceSeries, Product, RunState,
    TradeAction,
};
use crate::strategy::{decide, CrossoverStrategy};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// The parts of [`Settings`] the loop needs
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub product: Product,
    pub granularity_secs: u32,
    pub lookback_candles: usize,
    pub min_quote_order: Decimal,
    pub min_base_order: Decimal,
    pub poll_offset_secs: u64,
}

impl LoopSettings {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            product: settings.product()?,
            granularity_secs: settings.granularity_secs,
            lookback_candles: settings.lookback_candles,
            min_quote_order: settings.min_quote_order,
            min_base_order: settings.min_base_order,
            poll_offset_secs: settings.poll_offset_secs,
        })
    }
}

/// What happened in one polling cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No decision was made (fetch failed, not enough history, bad candles)
    Skipped { reason: String },
    /// No new crossover to act on
    Hold,
    /// Crossover pending but the balance is too small to trade
    BelowMinimum {
        action: TradeAction,
        balance: Decimal,
    },
    /// Order accepted; the crossover is now marked as acted upon
    Executed {
        crossover: CrossoverEvent,
        order: MarketOrder,
        result: OrderResult,
    },
    /// Balance query or order placement failed; retried next cycle
    Failed { reason: String },
}

/// Single-task polling loop wiring the strategy to an exchange
///
/// Cycles run strictly one after another, and [`RunState`] is updated before
/// the next fetch starts.
pub struct TradingLoop<G> {
    gateway: G,
    strategy: CrossoverStrategy,
    settings: LoopSettings,
    state: RunState,
}

impl<G: ExchangeGateway> TradingLoop<G> {
    pub fn new(gateway: G, strategy: CrossoverStrategy, settings: LoopSettings) -> Self {
        Self {
            gateway,
            strategy,
            settings,
            state: RunState::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Poll forever, one cycle per candle interval
    ///
    /// Runs a cycle immediately, then on every interval boundary plus the
    /// configured offset. Only returns if the surrounding task is dropped.
    pub async fn run(&mut self) {
        tracing::info!(
            "💹 Trading loop starting: {} every {}s via {}",
            self.settings.product,
            self.settings.granularity_secs,
            self.gateway.name()
        );
        self.log_account_summary("ACCOUNT INFO").await;

        let interval = Duration::from_secs(u64::from(self.settings.granularity_secs));
        let delay = delay_until_next_poll(
            Utc::now(),
            self.settings.granularity_secs,
            self.settings.poll_offset_secs,
        );
        let first_tick = Instant::now() + delay;
        let mut ticker = interval_at(first_tick, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.run_cycle().await;
        tracing::info!(
            "Next cycle in {:?}",
            first_tick.saturating_duration_since(Instant::now())
        );

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Run one fetch -> analyze -> decide -> trade cycle
    ///
    /// Never fails: every error is logged and turned into an outcome so the
    /// loop keeps going.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        tracing::info!("💹 [TRADING] Tick at {}", Utc::now().format("%H:%M:%S"));

        match self.try_cycle().await {
            Ok(outcome) => outcome,
            Err(e @ (Error::DataFetch(_) | Error::InsufficientData { .. } | Error::InvalidSeries(_))) => {
                tracing::warn!("  ✗ Skipping cycle: {}", e);
                CycleOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!("  ✗ Cycle failed, crossover stays pending: {}", e);
                CycleOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_cycle(&mut self) -> Result<CycleOutcome> {
        let series = self.fetch_series().await?;
        let analysis = self.strategy.analyze(&series)?;

        tracing::info!(
            "  Current EMAs: EMA-{} {:.2}, EMA-{} {:.2}",
            self.strategy.short_period(),
            analysis.latest.short,
            self.strategy.long_period(),
            analysis.latest.long
        );

        match &analysis.event {
            Some(event) => tracing::info!(
                "  Crossover {:?} at {}",
                event.direction,
                format_timestamp(event.timestamp)
            ),
            None => tracing::info!("  No crossover"),
        }

        let intent = decide(analysis.event.as_ref(), &self.state);
        let (crossover, side, currency, minimum) = match (intent.action, intent.reason) {
            (TradeAction::BuyAll, Some(crossover)) => (
                crossover,
                OrderSide::Buy,
                self.settings.product.quote.clone(),
                self.settings.min_quote_order,
            ),
            (TradeAction::SellAll, Some(crossover)) => (
                crossover,
                OrderSide::Sell,
                self.settings.product.base.clone(),
                self.settings.min_base_order,
            ),
            _ => {
                tracing::info!("  → HOLD");
                return Ok(CycleOutcome::Hold);
            }
        };

        let balance = self
            .gateway
            .get_balance(&currency)
            .await
            .map_err(|source| Error::BalanceQuery {
                currency: currency.clone(),
                source,
            })?;

        if balance <= minimum {
            tracing::warn!(
                "  → {:?} skipped: {} balance {} not above minimum {}",
                intent.action,
                currency,
                balance,
                minimum
            );
            return Ok(CycleOutcome::BelowMinimum {
                action: intent.action,
                balance,
            });
        }

        let order = MarketOrder {
            product_id: self.settings.product.id.clone(),
            side,
            currency,
            amount: balance,
        };

        tracing::info!(
            "  → {:?}: market {} of {} {} (crossover at {})",
            intent.action,
            order.side,
            order.amount,
            order.currency,
            format_timestamp(crossover.timestamp)
        );

        let result = self
            .gateway
            .place_market_order(&order)
            .await
            .map_err(|source| Error::OrderPlacement { side, source })?;

        self.state = self.state.acted_on(crossover.timestamp);
        tracing::info!(
            "  ✓ Order {} ({}) placed, crossover at {} marked as acted upon",
            result.order_id,
            result.status,
            format_timestamp(crossover.timestamp)
        );

        let title = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        self.log_account_summary(title).await;

        Ok(CycleOutcome::Executed {
            crossover,
            order,
            result,
        })
    }

    /// Request enough history for the long EMA plus one comparison point
    async fn fetch_series(&self) -> Result<PriceSeries> {
        let granularity = self.settings.granularity_secs;
        let wanted = self
            .settings
            .lookback_candles
            .max(self.strategy.min_candles_required());

        let now = Utc::now();
        let end = last_closed_boundary(now, granularity);
        let span = i64::from(granularity) * wanted as i64;
        let start = end - chrono::Duration::seconds(span);

        let candles = self
            .gateway
            .fetch_candles(&self.settings.product.id, granularity, Some(start), Some(end))
            .await
            .map_err(Error::DataFetch)?;

        let fetched = candles.len();
        let candles = closed_candles(candles, granularity, now);
        if candles.len() < fetched {
            tracing::debug!("  Dropped {} candle(s) still open", fetched - candles.len());
        }

        let series = PriceSeries::new(granularity, candles)?;

        match series.latest() {
            Some(latest) => tracing::info!(
                "  {} @ {} ({} candles, newest {})",
                self.settings.product,
                latest.close,
                series.len(),
                format_timestamp(latest.timestamp)
            ),
            None => tracing::info!("  {}: no candles returned", self.settings.product),
        }

        let gaps = series.gap_count();
        if gaps > 0 {
            tracing::debug!("  {} gap(s) in candle history, using as-is", gaps);
        }

        Ok(series)
    }

    /// Log base and quote balances; failures here never affect trading
    pub async fn log_account_summary(&self, title: &str) {
        let product = &self.settings.product;
        let base = self.gateway.get_balance(&product.base).await;
        let quote = self.gateway.get_balance(&product.quote).await;

        match (base, quote) {
            (Ok(base), Ok(quote)) => {
                tracing::info!(
                    "\n  == [ {} ] {}\n  {}: {:.2}\n  {}: {:.8}\n  {}",
                    title,
                    "=".repeat(72usize.saturating_sub(title.len())),
                    product.quote,
                    quote,
                    product.base,
                    base,
                    "=".repeat(80)
                );
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to load account info: {}", e);
            }
        }
    }
}

/// Time from `now` until the next interval boundary plus `offset_secs`
///
/// Always positive; if `now` is exactly on a poll instant the next one is a
/// full interval away.
pub fn delay_until_next_poll(now: DateTime<Utc>, granularity_secs: u32, offset_secs: u64) -> Duration {
    let interval_ms = i64::from(granularity_secs.max(1)) * 1000;
    let offset_ms = offset_secs as i64 * 1000;

    let into_interval = (now.timestamp_millis() - offset_ms).rem_euclid(interval_ms);
    Duration::from_millis((interval_ms - into_interval) as u64)
}

/// Start of the bucket containing `now`, i.e. the end of the newest closed one
pub fn last_closed_boundary(now: DateTime<Utc>, granularity_secs: u32) -> DateTime<Utc> {
    let step = i64::from(granularity_secs.max(1));
    let boundary = now.timestamp() - now.timestamp().rem_euclid(step);
    DateTime::<Utc>::from_timestamp(boundary, 0).unwrap_or(now)
}

/// Keep only candles whose bucket ended at or before `now`
pub fn closed_candles(candles: Vec<Candle>, granularity_secs: u32, now: DateTime<Utc>) -> Vec<Candle> {
    let step = i64::from(granularity_secs);
    let now = now.timestamp();
    candles
        .into_iter()
        .filter(|c| c.timestamp + step <= now)
        .collect()
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_delay_to_next_boundary() {
        let delay = delay_until_next_poll(at("2024-01-01T10:02:30Z"), 300, 0);
        assert_eq!(delay, Duration::from_secs(150));
    }

    #[test]
    fn test_delay_includes_offset() {
        let delay = delay_until_next_poll(at("2024-01-01T10:02:30Z"), 300, 5);
        assert_eq!(delay, Duration::from_secs(155));
    }

    #[test]
    fn test_delay_inside_offset_window() {
        // 10:05:02 with a 5s offset polls at 10:05:05
        let delay = delay_until_next_poll(at("2024-01-01T10:05:02Z"), 300, 5);
        assert_eq!(delay, Duration::from_secs(3));
    }

    #[test]
    fn test_delay_on_poll_instant_is_full_interval() {
        let delay = delay_until_next_poll(at("2024-01-01T10:05:00Z"), 300, 0);
        assert_eq!(delay, Duration::from_secs(300));
    }

    #[test]
    fn test_delay_never_exceeds_interval() {
        let start = at("2024-01-01T00:00:00Z");
        for secs in 0..900 {
            let now = start + chrono::Duration::seconds(secs);
            let delay = delay_until_next_poll(now, 300, 5);
            assert!(delay > Duration::ZERO);
            assert!(delay <= Duration::from_secs(300));
        }
    }

    #[test]
    fn test_last_closed_boundary() {
        assert_eq!(
            last_closed_boundary(at("2024-01-01T10:07:42Z"), 300),
            at("2024-01-01T10:05:00Z")
        );
        assert_eq!(
            last_closed_boundary(at("2024-01-01T10:05:00Z"), 300),
            at("2024-01-01T10:05:00Z")
        );
    }

    #[test]
    fn test_open_bucket_is_dropped() {
        // Polled 5s after the 10:05 boundary: the 10:05 bucket is still open
        let now = at("2024-01-01T10:05:05Z");
        let open = at("2024-01-01T10:05:00Z").timestamp();
        let candles = vec![
            Candle { timestamp: open - 600, close: Decimal::ONE },
            Candle { timestamp: open - 300, close: Decimal::ONE },
            Candle { timestamp: open, close: Decimal::TEN },
        ];

        let closed = closed_candles(candles, 300, now);
        assert_eq!(closed.len(), 2);
        assert_eq!(closed.last().unwrap().timestamp, open - 300);
    }

    #[test]
    fn test_candle_closing_exactly_now_is_kept() {
        let now = at("2024-01-01T10:05:00Z");
        let candles = vec![Candle {
            timestamp: now.timestamp() - 300,
            close: Decimal::ONE,
        }];

        assert_eq!(closed_candles(candles, 300, now).len(), 1);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
    }
}

use crate::api::Exchange;
use crate::config::Settings;
use crate::error::ExchangeError;
use crate::execution::{ExecutionAction, Executor};
use crate::indicators::calculate_rsi;
use crate::models::{OrderAck, OrderRequest, PositionState, Side, Signal};
use crate::notify::Notifier;
use crate::strategy::{RsiThresholdStrategy, Strategy};
use crate::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Market data or an exchange call failed, or the RSI was unavailable
    Skipped { reason: String },
    /// No threshold crossed for the current position
    Held { rsi: f64 },
    /// A signal fired but balance or sizing ruled the order out
    Declined { side: Side, reason: String },
    /// An order was sent and answered; `accepted` mirrors retCode == 0
    Submitted {
        side: Side,
        quantity: f64,
        price: f64,
        accepted: bool,
    },
}

/// Price and RSI at the start of a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSnapshot {
    pub rsi: Option<f64>,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub price: f64,
    pub rsi: Option<f64>,
    pub base_balance: f64,
    pub quote_balance: f64,
}

/// The RSI decision loop
///
/// The position state is not stored here: every tick takes the current state
/// and hands back the next one, and `run` threads it from tick to tick.
pub struct Trader<E, N> {
    exchange: E,
    notifier: N,
    strategy: RsiThresholdStrategy,
    executor: Executor,
    symbol: String,
    base_coin: String,
    quote_coin: String,
    poll_interval: Duration,
    smoke_test_pause: Duration,
}

impl<E: Exchange, N: Notifier> Trader<E, N> {
    pub fn new(exchange: E, notifier: N, settings: &Settings) -> Self {
        let symbol = settings.exchange.symbol.clone();
        Self {
            exchange,
            notifier,
            strategy: RsiThresholdStrategy::from_settings(&settings.strategy),
            executor: Executor::from_settings(symbol.clone(), &settings.strategy),
            symbol,
            base_coin: settings.exchange.base_coin.clone(),
            quote_coin: settings.exchange.quote_coin.clone(),
            poll_interval: settings.poll_interval(),
            smoke_test_pause: settings.smoke_test_pause(),
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Fetch candles, compute the RSI, then fetch the last price
    pub async fn snapshot(&self) -> Result<MarketSnapshot> {
        let candles = self.exchange.recent_candles().await?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = calculate_rsi(&closes);
        let price = self.exchange.last_price().await?;

        Ok(MarketSnapshot { rsi, price })
    }

    /// Run one decision cycle from `state`
    ///
    /// Errors never escape: they are logged, sent to the notifier, and the
    /// tick is skipped with the state unchanged.
    pub async fn tick(&self, state: PositionState) -> (PositionState, TickOutcome) {
        match self.try_tick(state).await {
            Ok(result) => result,
            Err(e) => {
                self.report_error("Tick", &e).await;
                (
                    state,
                    TickOutcome::Skipped {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    async fn try_tick(&self, state: PositionState) -> Result<(PositionState, TickOutcome)> {
        let snapshot = self.snapshot().await?;

        let Some(rsi) = snapshot.rsi else {
            tracing::warn!(symbol = %self.symbol, "Not enough candles for RSI, skipping tick");
            return Ok((
                state,
                TickOutcome::Skipped {
                    reason: "RSI unavailable".to_string(),
                },
            ));
        };

        tracing::info!(
            symbol = %self.symbol,
            rsi,
            price = snapshot.price,
            position = ?state,
            "Tick"
        );

        let signal = self.strategy.generate_signal(rsi, state);
        let (side, coin) = match signal {
            Signal::Buy => (Side::Buy, &self.quote_coin),
            Signal::Sell => (Side::Sell, &self.base_coin),
            Signal::Hold => return Ok((state, TickOutcome::Held { rsi })),
        };

        let balance = self.exchange.available_balance(coin).await?;
        let decision = self.executor.process_signal(signal, snapshot.price, balance);

        let order = match decision.action {
            ExecutionAction::Execute(order) => order,
            ExecutionAction::Skip => {
                tracing::info!(%side, rsi, reason = %decision.reason, "Signal declined");
                return Ok((
                    state,
                    TickOutcome::Declined {
                        side,
                        reason: decision.reason,
                    },
                ));
            }
        };

        let ack = self.submit(&order).await?;

        // An answered submission counts as executed, even when rejected
        let next = match side {
            Side::Buy => PositionState::PositionOpen,
            Side::Sell => PositionState::NoPosition,
        };

        self.notifier
            .send(&format!(
                "✅ {} triggered at RSI {:.2}: {} {} @ {}",
                side,
                rsi,
                order.qty_string(),
                self.base_coin,
                order.price_string()
            ))
            .await;

        Ok((
            next,
            TickOutcome::Submitted {
                side,
                quantity: order.quantity,
                price: order.price,
                accepted: ack.accepted(),
            },
        ))
    }

    /// Place the order and relay the raw exchange answer to the chat
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck> {
        let ack = self.exchange.place_order(order).await?;

        if ack.accepted() {
            tracing::info!(
                side = %order.side,
                order_id = ?ack.order_id,
                "Order accepted"
            );
        } else {
            tracing::warn!(
                side = %order.side,
                ret_code = ack.ret_code,
                ret_msg = %ack.ret_msg,
                "Order rejected by exchange"
            );
        }

        self.notifier
            .send(&format!(
                "📨 {}-Order ➜ {} @ {} {}\nResponse: {}",
                order.side,
                order.qty_string(),
                order.price_string(),
                self.quote_coin,
                ack.raw
            ))
            .await;

        Ok(ack)
    }

    async fn report_error(&self, context: &str, e: &ExchangeError) {
        let label = match e {
            ExchangeError::Authentication { .. } => {
                tracing::error!("{} failed, credentials rejected: {}", context, e);
                "authentication"
            }
            ExchangeError::MalformedResponse(_) => {
                tracing::error!("{} failed on malformed response: {}", context, e);
                "malformed response"
            }
            _ if e.is_timeout() => {
                tracing::warn!("{} timed out: {}", context, e);
                "timeout"
            }
            _ if e.is_transient() => {
                tracing::warn!("{} failed (transient): {}", context, e);
                "network"
            }
            _ => {
                tracing::error!("{} failed: {}", context, e);
                "exchange"
            }
        };

        self.notifier
            .send(&format!("⚠️ {} failed ({}): {}", context, label, e))
            .await;
    }

    /// Tick, then sleep for the poll interval, until `shutdown` resolves
    ///
    /// Shutdown is checked between ticks, so a tick in progress always
    /// finishes. Returns the last position state.
    pub async fn run<F>(&self, initial: PositionState, shutdown: F) -> PositionState
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            symbol = %self.symbol,
            strategy = self.strategy.name(),
            buy_below = self.strategy.buy_below(),
            sell_above = self.strategy.sell_above(),
            interval = ?self.poll_interval,
            "Trading loop starting"
        );
        self.notifier
            .send(&format!(
                "🤖 RSI bot started for {}: buy below {}, sell above {}, stake {} {}",
                self.symbol,
                self.strategy.buy_below(),
                self.strategy.sell_above(),
                self.executor.stake_amount(),
                self.quote_coin
            ))
            .await;

        let mut state = initial;
        loop {
            let (next, outcome) = self.tick(state).await;
            if next != state {
                tracing::info!(from = ?state, to = ?next, "Position state changed");
            }
            tracing::debug!(?outcome, "Tick complete");
            state = next;

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping trading loop");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        state
    }

    /// One forced buy, a pause, then one forced sell, ignoring the RSI
    ///
    /// Used to check credentials, signing and order placement end to end.
    /// Returns the position state afterwards.
    pub async fn smoke_test(&self) -> PositionState {
        self.notifier
            .send("🤖 Smoke test started: immediate buy and sell")
            .await;

        let mut state = PositionState::NoPosition;
        if let Err(e) = self.run_smoke_test(&mut state).await {
            self.report_error("Smoke test", &e).await;
        }
        state
    }

    async fn run_smoke_test(&self, state: &mut PositionState) -> Result<()> {
        let price = self.exchange.last_price().await?;
        let quote = self.exchange.available_balance(&self.quote_coin).await?;

        let decision = self.executor.process_signal(Signal::Buy, price, quote);
        match decision.action {
            ExecutionAction::Execute(order) => {
                self.submit(&order).await?;
                *state = PositionState::PositionOpen;
                self.notifier.send("✅ Smoke test buy submitted").await;
            }
            ExecutionAction::Skip => {
                self.notifier
                    .send(&format!("⚠️ Smoke test buy skipped: {}", decision.reason))
                    .await;
            }
        }

        tokio::time::sleep(self.smoke_test_pause).await;

        let base = self.exchange.available_balance(&self.base_coin).await?;
        let price = self.exchange.last_price().await?;

        if *state == PositionState::PositionOpen {
            let decision = self.executor.process_signal(Signal::Sell, price, base);
            if let ExecutionAction::Execute(order) = decision.action {
                self.submit(&order).await?;
                *state = PositionState::NoPosition;
                self.notifier.send("✅ Smoke test sell submitted").await;
                return Ok(());
            }
        }

        self.notifier
            .send(&format!(
                "⚠️ Not enough {} for smoke test sell",
                self.base_coin
            ))
            .await;
        Ok(())
    }

    /// Price, RSI and balances, without trading
    pub async fn status(&self) -> Result<StatusReport> {
        let snapshot = self.snapshot().await?;
        let base_balance = self.exchange.available_balance(&self.base_coin).await?;
        let quote_balance = self.exchange.available_balance(&self.quote_coin).await?;

        Ok(StatusReport {
            price: snapshot.price,
            rsi: snapshot.rsi,
            base_balance,
            quote_balance,
        })
    }
}

/// Start listening for `signal` now and return a future that resolves once it fires
///
/// The listener runs on its own task, so a signal that arrives while the
/// first tick is still running is caught instead of killing the process.
/// If listening fails, the returned future never resolves.
pub async fn install_shutdown<S>(signal: S) -> impl Future<Output = ()>
where
    S: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                tracing::info!("⚠️  Received Ctrl+C, shutting down...");
                let _ = tx.send(());
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });
    // Give the listener task its first poll before trading starts
    tokio::task::yield_now().await;

    async move {
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

use crate::config::StrategySettings;
use crate::models::{round_to, OrderRequest, Side, Signal};

const QTY_DECIMALS: u32 = 2;
const PRICE_DECIMALS: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Execute(OrderRequest),
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

impl ExecutionDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: ExecutionAction::Skip,
            reason: reason.into(),
        }
    }
}

/// Turns a signal plus the relevant balance into a concrete order
///
/// Buys spend a fixed stake of the quote asset; sells unload the whole base
/// balance once it reaches the minimum sell quantity.
#[derive(Debug, Clone)]
pub struct Executor {
    symbol: String,
    stake_amount: f64,
    min_sell_qty: f64,
}

impl Executor {
    pub fn new(symbol: impl Into<String>, stake_amount: f64, min_sell_qty: f64) -> Self {
        Self {
            symbol: symbol.into(),
            stake_amount,
            min_sell_qty,
        }
    }

    pub fn from_settings(symbol: impl Into<String>, settings: &StrategySettings) -> Self {
        Self::new(symbol, settings.stake_amount, settings.min_sell_qty)
    }

    /// Process a signal and decide what to do
    ///
    /// `balance` is the quote balance for `Buy` and the base balance for `Sell`.
    pub fn process_signal(&self, signal: Signal, price: f64, balance: f64) -> ExecutionDecision {
        if !(price.is_finite() && price > 0.0) {
            return ExecutionDecision::skip(format!("Unusable price {}", price));
        }

        match signal {
            Signal::Buy => {
                if balance < self.stake_amount {
                    return ExecutionDecision::skip(format!(
                        "Insufficient quote balance: {:.4} < stake {:.4}",
                        balance, self.stake_amount
                    ));
                }

                let quantity = self.buy_quantity(price);
                if quantity <= 0.0 {
                    return ExecutionDecision::skip(format!(
                        "Stake {:.4} buys nothing at {:.4}",
                        self.stake_amount, price
                    ));
                }

                ExecutionDecision {
                    action: ExecutionAction::Execute(OrderRequest::limit(
                        self.symbol.clone(),
                        Side::Buy,
                        quantity,
                        round_to(price, PRICE_DECIMALS),
                    )),
                    reason: "Buy signal with available stake".to_string(),
                }
            }

            Signal::Sell => {
                if balance < self.min_sell_qty {
                    return ExecutionDecision::skip(format!(
                        "Base balance {:.4} below minimum sell quantity {:.4}",
                        balance, self.min_sell_qty
                    ));
                }

                let quantity = round_to(balance, QTY_DECIMALS);
                if quantity <= 0.0 {
                    return ExecutionDecision::skip("Nothing to sell".to_string());
                }

                ExecutionDecision {
                    action: ExecutionAction::Execute(OrderRequest::limit(
                        self.symbol.clone(),
                        Side::Sell,
                        quantity,
                        round_to(price, PRICE_DECIMALS),
                    )),
                    reason: "Sell signal with available balance".to_string(),
                }
            }

            Signal::Hold => ExecutionDecision::skip("Hold signal"),
        }
    }

    /// Stake converted to base units, rounded to 2 decimals
    pub fn buy_quantity(&self, price: f64) -> f64 {
        round_to(self.stake_amount / price, QTY_DECIMALS)
    }

    pub fn stake_amount(&self) -> f64 {
        self.stake_amount
    }

    pub fn min_sell_qty(&self) -> f64 {
        self.min_sell_qty
    }
}

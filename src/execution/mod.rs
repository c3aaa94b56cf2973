// Order sizing and the trading loop
pub mod executor;
pub mod trader;

pub use executor::{ExecutionAction, ExecutionDecision, Executor};
pub use trader::{install_shutdown, MarketSnapshot, StatusReport, TickOutcome, Trader};

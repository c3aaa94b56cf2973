// Trading strategy module
pub mod rsi_threshold;

pub use rsi_threshold::RsiThresholdStrategy;

use crate::models::{PositionState, Signal};

/// Base trait for trading strategies
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from the current RSI and position
    fn generate_signal(&self, rsi: f64, position: PositionState) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;
}

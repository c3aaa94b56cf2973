use super::Strategy;
use crate::config::StrategySettings;
use crate::models::{PositionState, Signal};

/// Mean-reversion on RSI threshold crossings
///
/// Flat: buy when RSI drops below `buy_below`.
/// Holding: sell when RSI rises above `sell_above`.
/// Only the branch for the current position is ever considered.
#[derive(Debug, Clone, PartialEq)]
pub struct RsiThresholdStrategy {
    buy_below: f64,
    sell_above: f64,
}

impl RsiThresholdStrategy {
    pub fn new(buy_below: f64, sell_above: f64) -> Self {
        Self {
            buy_below,
            sell_above,
        }
    }

    pub fn from_settings(settings: &StrategySettings) -> Self {
        Self::new(settings.buy_below, settings.sell_above)
    }

    pub fn buy_below(&self) -> f64 {
        self.buy_below
    }

    pub fn sell_above(&self) -> f64 {
        self.sell_above
    }
}

impl Default for RsiThresholdStrategy {
    fn default() -> Self {
        Self::from_settings(&StrategySettings::default())
    }
}

impl Strategy for RsiThresholdStrategy {
    fn generate_signal(&self, rsi: f64, position: PositionState) -> Signal {
        match position {
            PositionState::NoPosition if rsi < self.buy_below => Signal::Buy,
            PositionState::PositionOpen if rsi > self.sell_above => Signal::Sell,
            _ => Signal::Hold,
        }
    }

    fn name(&self) -> &str {
        "RSI Threshold"
    }
}

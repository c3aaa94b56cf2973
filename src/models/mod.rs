use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A kline reduced to what the RSI needs; the newest one may still be forming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub close_time: DateTime<Utc>,
    pub close: f64,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Whether the bot currently holds its single position
///
/// Lives only in the running loop; a restart always begins at `NoPosition`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PositionState {
    #[default]
    NoPosition,
    PositionOpen,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeInForce {
    #[default]
    #[serde(rename = "GTC")]
    Gtc,
}

/// A limit order to submit, built fresh for every decision
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price,
            time_in_force: TimeInForce::Gtc,
        }
    }

    /// Quantity as sent on the wire (2 decimals)
    pub fn qty_string(&self) -> String {
        format!("{:.2}", self.quantity)
    }

    /// Price as sent on the wire (4 decimals)
    pub fn price_string(&self) -> String {
        format!("{:.4}", self.price)
    }
}

/// The exchange's answer to an order submission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub ret_code: i64,
    pub ret_msg: String,
    pub order_id: Option<String>,
    /// Response body exactly as received
    pub raw: String,
}

impl OrderAck {
    pub fn accepted(&self) -> bool {
        self.ret_code == 0
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

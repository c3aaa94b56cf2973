pub mod bybit;
pub mod signer;

pub use bybit::BybitClient;

use crate::models::{Candle, OrderAck, OrderRequest};
use crate::Result;

/// Exchange operations the trading loop depends on
///
/// `BybitClient` is the only live implementation; the trait is the seam the
/// loop is tested through.
#[allow(async_fn_in_trait)]
pub trait Exchange {
    /// Last traded price of the configured symbol
    async fn last_price(&self) -> Result<f64>;

    /// Recent closed candles, oldest first
    async fn recent_candles(&self) -> Result<Vec<Candle>>;

    /// Available balance of `coin`; zero when the wallet does not list it
    async fn available_balance(&self, coin: &str) -> Result<f64>;

    /// Submit a single limit order
    ///
    /// An exchange-side rejection is still `Ok`, carried in the ack's retCode.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;
}

use crate::api::{signer, Exchange};
use crate::config::{Credentials, ExchangeSettings};
use crate::error::ExchangeError;
use crate::models::{Candle, OrderAck, OrderRequest, Side, TimeInForce};
use crate::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Bybit Unified V5
// Docs: https://bybit-exchange.github.io/docs/v5/intro
const TICKERS_PATH: &str = "/v5/market/tickers";
const KLINE_PATH: &str = "/v5/market/kline";
const WALLET_BALANCE_PATH: &str = "/v5/account/wallet-balance";
const ORDER_CREATE_PATH: &str = "/v5/order/create";

const KLINE_START_INDEX: usize = 0;
const KLINE_CLOSE_INDEX: usize = 4;

/// Stands in for a retCode when the order answer has none
const UNREADABLE_ORDER_RET_CODE: i64 = -1;

const HEADER_API_KEY: &str = "X-BAPI-API-KEY";
const HEADER_TIMESTAMP: &str = "X-BAPI-TIMESTAMP";
const HEADER_SIGN: &str = "X-BAPI-SIGN";
const HEADER_RECV_WINDOW: &str = "X-BAPI-RECV-WINDOW";

/// Client for the Bybit V5 REST API, bound to one symbol
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    settings: ExchangeSettings,
    credentials: Credentials,
}

// ============== Response Types ==============

/// Every V5 response: `{retCode, retMsg, result}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    #[allow(dead_code)]
    symbol: String,
    last_price: String,
}

/// Rows are `[startTime, open, high, low, close, volume, turnover]`, all strings
#[derive(Debug, Deserialize)]
struct KlineResult {
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<CoinBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinBalance {
    coin: String,
    #[serde(default)]
    available_balance: String,
    #[serde(default)]
    wallet_balance: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResult {
    #[serde(default)]
    order_id: Option<String>,
}

// ============== Request Types ==============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody<'a> {
    category: &'a str,
    symbol: &'a str,
    side: Side,
    order_type: &'static str,
    qty: String,
    price: String,
    time_in_force: TimeInForce,
}

// ============== Implementation ==============

impl BybitClient {
    pub fn new(settings: ExchangeSettings, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            settings,
            credentials,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.settings.symbol
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Read the V5 envelope, rejecting non-2xx statuses
    async fn read_envelope(response: Response) -> Result<Envelope> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Decode `result` of a successful envelope, mapping non-zero retCodes to errors
    fn decode_result<T: DeserializeOwned>(envelope: Envelope) -> Result<T> {
        if envelope.ret_code != 0 {
            return Err(ExchangeError::from_ret_code(
                envelope.ret_code,
                envelope.ret_msg,
            ));
        }
        Ok(serde_json::from_value(envelope.result)?)
    }

    /// Turn any HTTP answer to an order into an ack
    ///
    /// Non-2xx statuses and bodies that are not a V5 envelope keep their raw
    /// text and carry `UNREADABLE_ORDER_RET_CODE`.
    fn order_ack(status: StatusCode, raw: String) -> OrderAck {
        if !status.is_success() {
            return OrderAck {
                ret_code: UNREADABLE_ORDER_RET_CODE,
                ret_msg: format!("HTTP {}", status.as_u16()),
                order_id: None,
                raw,
            };
        }

        match serde_json::from_str::<Envelope>(&raw) {
            Ok(envelope) => {
                let order_id = serde_json::from_value::<OrderResult>(envelope.result)
                    .ok()
                    .and_then(|r| r.order_id)
                    .filter(|id| !id.is_empty());
                OrderAck {
                    ret_code: envelope.ret_code,
                    ret_msg: envelope.ret_msg,
                    order_id,
                    raw,
                }
            }
            Err(e) => OrderAck {
                ret_code: UNREADABLE_ORDER_RET_CODE,
                ret_msg: format!("unreadable order response: {}", e),
                order_id: None,
                raw,
            },
        }
    }

    /// Serialize the order body exactly as it will be signed and sent
    fn order_body(&self, order: &OrderRequest) -> Result<String> {
        let body = CreateOrderBody {
            category: &self.settings.category,
            symbol: &order.symbol,
            side: order.side,
            order_type: "Limit",
            qty: order.qty_string(),
            price: order.price_string(),
            time_in_force: order.time_in_force,
        };
        Ok(serde_json::to_string(&body)?)
    }

    fn parse_kline_row(&self, row: &[String]) -> Result<Candle> {
        let field = |index: usize| {
            row.get(index).ok_or_else(|| {
                ExchangeError::MalformedResponse(format!(
                    "kline row has {} fields, expected at least {}",
                    row.len(),
                    KLINE_CLOSE_INDEX + 1
                ))
            })
        };

        let start_ms: i64 = field(KLINE_START_INDEX)?.parse().map_err(|_| {
            ExchangeError::MalformedResponse(format!("invalid kline start time: {:?}", row))
        })?;
        let close: f64 = field(KLINE_CLOSE_INDEX)?.parse()?;

        let start = DateTime::<Utc>::from_timestamp_millis(start_ms).ok_or_else(|| {
            ExchangeError::MalformedResponse(format!("kline start time out of range: {}", start_ms))
        })?;
        let close_time =
            start + ChronoDuration::minutes(i64::from(self.settings.kline_interval_minutes));

        Ok(Candle { close_time, close })
    }
}

impl Exchange for BybitClient {
    /// Endpoint: GET /v5/market/tickers?category={category}&symbol={symbol}
    async fn last_price(&self) -> Result<f64> {
        let response = self
            .client
            .get(self.url(TICKERS_PATH))
            .query(&[
                ("category", self.settings.category.as_str()),
                ("symbol", self.settings.symbol.as_str()),
            ])
            .send()
            .await?;

        let envelope = Self::read_envelope(response).await?;
        let result: TickerResult = Self::decode_result(envelope)?;

        let ticker = result.list.into_iter().next().ok_or_else(|| {
            ExchangeError::MalformedResponse(format!(
                "no ticker returned for {}",
                self.settings.symbol
            ))
        })?;

        let price: f64 = ticker.last_price.parse()?;
        tracing::debug!(symbol = %self.settings.symbol, price, "Fetched last price");
        Ok(price)
    }

    /// Endpoint: GET /v5/market/kline?category=..&symbol=..&interval=..&limit=..
    ///
    /// Bybit lists klines newest first; the result is sorted oldest first.
    async fn recent_candles(&self) -> Result<Vec<Candle>> {
        let interval = self.settings.kline_interval_minutes.to_string();
        let limit = self.settings.kline_limit.to_string();

        let response = self
            .client
            .get(self.url(KLINE_PATH))
            .query(&[
                ("category", self.settings.category.as_str()),
                ("symbol", self.settings.symbol.as_str()),
                ("interval", interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let envelope = Self::read_envelope(response).await?;
        let result: KlineResult = Self::decode_result(envelope)?;

        let mut candles = result
            .list
            .iter()
            .map(|row| self.parse_kline_row(row))
            .collect::<Result<Vec<_>>>()?;
        candles.sort_by_key(|c| c.close_time);

        tracing::debug!(
            symbol = %self.settings.symbol,
            count = candles.len(),
            "Fetched candles"
        );
        Ok(candles)
    }

    /// Endpoint: GET /v5/account/wallet-balance?accountType=UNIFIED&coin={coin}&timestamp={ts}
    async fn available_balance(&self, coin: &str) -> Result<f64> {
        let timestamp = Utc::now().timestamp_millis();
        let query = signer::wallet_query(coin, timestamp);
        let signature = signer::sign(&self.credentials.api_secret, &query)?;

        let response = self
            .client
            .get(format!("{}?{}", self.url(WALLET_BALANCE_PATH), query))
            .header(HEADER_API_KEY, &self.credentials.api_key)
            .header(HEADER_TIMESTAMP, timestamp.to_string())
            .header(HEADER_SIGN, signature)
            .send()
            .await?;

        let envelope = Self::read_envelope(response).await?;
        let result: WalletResult = Self::decode_result(envelope)?;

        let entry = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::MalformedResponse("empty wallet list".to_string()))?
            .coin
            .into_iter()
            .find(|c| c.coin == coin);

        let balance = match entry {
            Some(c) => {
                let raw = if c.available_balance.is_empty() {
                    c.wallet_balance
                } else {
                    c.available_balance
                };
                if raw.is_empty() {
                    0.0
                } else {
                    raw.parse()?
                }
            }
            None => 0.0,
        };

        tracing::debug!(coin, balance, "Fetched available balance");
        Ok(balance)
    }

    /// Endpoint: POST /v5/order/create
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let body = self.order_body(order)?;
        let timestamp = Utc::now().timestamp_millis();
        let payload = signer::order_payload(
            timestamp,
            &self.credentials.api_key,
            self.settings.recv_window_ms,
            &body,
        );
        let signature = signer::sign(&self.credentials.api_secret, &payload)?;

        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.qty_string(),
            price = %order.price_string(),
            "Submitting limit order"
        );

        let response = self
            .client
            .post(self.url(ORDER_CREATE_PATH))
            .header(HEADER_API_KEY, &self.credentials.api_key)
            .header(HEADER_TIMESTAMP, timestamp.to_string())
            .header(HEADER_SIGN, signature)
            .header(HEADER_RECV_WINDOW, self.settings.recv_window_ms.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        Ok(Self::order_ack(status, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_client(base_url: &str) -> BybitClient {
        let settings = ExchangeSettings {
            base_url: base_url.to_string(),
            ..ExchangeSettings::default()
        };
        let credentials = Credentials {
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
        };
        BybitClient::new(settings, credentials).unwrap()
    }

    #[tokio::test]
    async fn test_last_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", TICKERS_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("category".into(), "spot".into()),
                Matcher::UrlEncoded("symbol".into(), "DOGEUSDT".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"retCode":0,"retMsg":"OK","result":{"category":"spot","list":[{"symbol":"DOGEUSDT","lastPrice":"0.24015"}]}}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let price = client.last_price().await.unwrap();

        assert_eq!(price, 0.24015);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_last_price_empty_list_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", TICKERS_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"list":[]}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.last_price().await.unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_recent_candles_sorted_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", KLINE_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("category".into(), "spot".into()),
                Matcher::UrlEncoded("symbol".into(), "DOGEUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "1".into()),
                Matcher::UrlEncoded("limit".into(), "100".into()),
            ]))
            .with_body(
                r#"{"retCode":0,"retMsg":"OK","result":{"symbol":"DOGEUSDT","category":"spot","list":[
                    ["1700000120000","0.30","0.31","0.29","0.303","1000","300"],
                    ["1700000060000","0.30","0.31","0.29","0.302","1000","300"],
                    ["1700000000000","0.30","0.31","0.29","0.301","1000","300"]
                ]}}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let candles = client.recent_candles().await.unwrap();

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![0.301, 0.302, 0.303]);
        assert_eq!(candles[0].close_time.timestamp_millis(), 1_700_000_060_000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_short_kline_row_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", KLINE_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"list":[["1700000000000","0.30"]]}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.recent_candles().await.unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_available_balance_signed_and_filtered() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", WALLET_BALANCE_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("accountType".into(), "UNIFIED".into()),
                Matcher::UrlEncoded("coin".into(), "USDT".into()),
                Matcher::Regex(r"timestamp=\d{13}".into()),
            ]))
            .match_header("x-bapi-api-key", "test-key")
            .match_header("x-bapi-timestamp", Matcher::Regex(r"^\d{13}$".into()))
            .match_header("x-bapi-sign", Matcher::Regex(r"^[0-9a-f]{64}$".into()))
            .with_body(
                r#"{"retCode":0,"retMsg":"OK","result":{"list":[{"accountType":"UNIFIED","coin":[
                    {"coin":"DOGE","availableBalance":"12.5","walletBalance":"12.5"},
                    {"coin":"USDT","availableBalance":"57.31","walletBalance":"60"}
                ]}]}}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let balance = client.available_balance("USDT").await.unwrap();

        assert_eq!(balance, 57.31);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_available_balance_falls_back_to_wallet_balance() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", WALLET_BALANCE_PATH)
            .match_query(Matcher::Any)
            .with_body(
                r#"{"retCode":0,"retMsg":"OK","result":{"list":[{"coin":[
                    {"coin":"DOGE","availableBalance":"","walletBalance":"42.1"}
                ]}]}}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert_eq!(client.available_balance("DOGE").await.unwrap(), 42.1);
    }

    #[tokio::test]
    async fn test_available_balance_missing_coin_is_zero() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", WALLET_BALANCE_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"list":[{"coin":[]}]}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert_eq!(client.available_balance("DOGE").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_invalid_key_is_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", WALLET_BALANCE_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"retCode":10003,"retMsg":"API key is invalid.","result":{}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.available_balance("USDT").await.unwrap_err();
        assert!(matches!(err, ExchangeError::Authentication { code: 10003, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_transient_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", TICKERS_PATH)
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.last_price().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Http { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_place_order_body_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ORDER_CREATE_PATH)
            .match_header("x-bapi-api-key", "test-key")
            .match_header("x-bapi-recv-window", "5000")
            .match_header("x-bapi-sign", Matcher::Regex(r"^[0-9a-f]{64}$".into()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "category": "spot",
                "symbol": "DOGEUSDT",
                "side": "Buy",
                "orderType": "Limit",
                "qty": "41.67",
                "price": "0.2400",
                "timeInForce": "GTC"
            })))
            .with_body(
                r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"1321003749386327552","orderLinkId":""}}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let order = OrderRequest::limit("DOGEUSDT", Side::Buy, 41.67, 0.24);
        let ack = client.place_order(&order).await.unwrap();

        assert!(ack.accepted());
        assert_eq!(ack.order_id.as_deref(), Some("1321003749386327552"));
        assert!(ack.raw.contains("1321003749386327552"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_place_order_rejection_is_returned_in_ack() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ORDER_CREATE_PATH)
            .with_body(r#"{"retCode":170131,"retMsg":"Insufficient balance.","result":{}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let order = OrderRequest::limit("DOGEUSDT", Side::Sell, 40.0, 0.25);
        let ack = client.place_order(&order).await.unwrap();

        assert!(!ack.accepted());
        assert_eq!(ack.ret_code, 170131);
        assert_eq!(ack.order_id, None);
        assert!(ack.raw.contains("Insufficient balance."));
    }

    #[tokio::test]
    async fn test_place_order_http_rejection_is_returned_in_ack() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ORDER_CREATE_PATH)
            .with_status(403)
            .with_body("access denied")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let order = OrderRequest::limit("DOGEUSDT", Side::Buy, 40.0, 0.25);
        let ack = client.place_order(&order).await.unwrap();

        assert!(!ack.accepted());
        assert_eq!(ack.ret_code, UNREADABLE_ORDER_RET_CODE);
        assert_eq!(ack.ret_msg, "HTTP 403");
        assert_eq!(ack.raw, "access denied");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_place_order_non_json_answer_is_returned_in_ack() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ORDER_CREATE_PATH)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let order = OrderRequest::limit("DOGEUSDT", Side::Sell, 40.0, 0.25);
        let ack = client.place_order(&order).await.unwrap();

        assert!(!ack.accepted());
        assert_eq!(ack.order_id, None);
        assert_eq!(ack.raw, "<html>maintenance</html>");
    }

    #[tokio::test]
    async fn test_place_order_transport_failure_is_error() {
        // Nothing listens on port 1
        let client = test_client("http://127.0.0.1:1");
        let order = OrderRequest::limit("DOGEUSDT", Side::Buy, 40.0, 0.25);

        let err = client.place_order(&order).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Network(_)));
    }

    #[test]
    fn test_order_body_field_order() {
        let client = test_client("http://localhost");
        let order = OrderRequest::limit("DOGEUSDT", Side::Sell, 12.0, 0.31);
        let body = client.order_body(&order).unwrap();
        assert_eq!(
            body,
            r#"{"category":"spot","symbol":"DOGEUSDT","side":"Sell","orderType":"Limit","qty":"12.00","price":"0.3100","timeInForce":"GTC"}"#
        );
    }
}

use crate::error::ExchangeError;
use crate::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`
pub fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Canonical query string for the wallet-balance request
///
/// The same string is both signed and sent as the URL query.
pub fn wallet_query(coin: &str, timestamp_ms: i64) -> String {
    format!("accountType=UNIFIED&coin={}&timestamp={}", coin, timestamp_ms)
}

/// Signature payload for a POST: timestamp, key, recv window, then the exact body
pub fn order_payload(timestamp_ms: i64, api_key: &str, recv_window_ms: u64, body: &str) -> String {
    format!("{}{}{}{}", timestamp_ms, api_key, recv_window_ms, body)
}

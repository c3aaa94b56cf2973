use thiserror::Error;

/// Bybit retCodes that mean the key, signature or permissions were rejected
const AUTH_RET_CODES: &[i64] = &[10003, 10004, 10005, 33004];

/// Errors returned by exchange client operations
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Transport failure, including timeouts
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("authentication rejected (retCode {code}): {message}")]
    Authentication { code: i64, message: String },

    #[error("exchange error (retCode {code}): {message}")]
    Api { code: i64, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request signing failed: {0}")]
    Signing(String),
}

impl ExchangeError {
    /// Map a non-zero Bybit retCode to the matching error kind
    pub fn from_ret_code(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if AUTH_RET_CODES.contains(&code) {
            ExchangeError::Authentication { code, message }
        } else {
            ExchangeError::Api { code, message }
        }
    }

    /// Whether the failure is likely to clear up on a later attempt
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Network(_) => true,
            ExchangeError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExchangeError::Network(e) if e.is_timeout())
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        ExchangeError::MalformedResponse(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for ExchangeError {
    fn from(e: std::num::ParseFloatError) -> Self {
        ExchangeError::MalformedResponse(format!("invalid number: {}", e))
    }
}

/// Errors from delivering a chat notification
///
/// Only surfaced by `TelegramNotifier::try_send`; `Notifier::send` logs and drops them.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{0} not found in environment")]
    MissingSecret(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_codes_map_to_authentication() {
        for code in [10003, 10004, 10005, 33004] {
            let err = ExchangeError::from_ret_code(code, "denied");
            assert!(matches!(err, ExchangeError::Authentication { .. }), "code {}", code);
        }
    }

    #[test]
    fn test_other_codes_map_to_api() {
        let err = ExchangeError::from_ret_code(170131, "Insufficient balance.");
        assert!(matches!(err, ExchangeError::Api { code: 170131, .. }));
        assert!(err.to_string().contains("Insufficient balance"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Http { status: 502, body: String::new() }.is_transient());
        assert!(ExchangeError::Http { status: 429, body: String::new() }.is_transient());
        assert!(!ExchangeError::Http { status: 400, body: String::new() }.is_transient());
        assert!(!ExchangeError::MalformedResponse("x".into()).is_transient());
        assert!(!ExchangeError::from_ret_code(10004, "sign").is_transient());
    }

    #[test]
    fn test_parse_errors_are_malformed() {
        let err: ExchangeError = "abc".parse::<f64>().unwrap_err().into();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }
}

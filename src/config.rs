use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Kline intervals (in minutes) the Bybit V5 kline endpoint accepts
const KLINE_INTERVALS: &[u32] = &[1, 3, 5, 15, 30, 60, 120, 240, 360, 720];

const ENV_PREFIX: &str = "RSIBOT";

/// Runtime settings
///
/// Layered as: serde defaults, then an optional config file, then
/// `RSIBOT_*` environment variables (`__` separates nested keys, e.g.
/// `RSIBOT_STRATEGY__BUY_BELOW=25`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub strategy: StrategySettings,
    pub telegram: TelegramSettings,
    /// Pause between ticks of the trading loop
    pub poll_interval_secs: u64,
    /// Pause between the buy and sell legs of the smoke test
    pub smoke_test_pause_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub category: String,
    pub symbol: String,
    pub base_coin: String,
    pub quote_coin: String,
    pub kline_interval_minutes: u32,
    pub kline_limit: u32,
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategySettings {
    /// Buy when RSI drops below this while flat
    pub buy_below: f64,
    /// Sell when RSI rises above this while holding
    pub sell_above: f64,
    /// Quote amount spent per buy
    pub stake_amount: f64,
    /// Smallest base balance worth selling
    pub min_sell_qty: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramSettings {
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exchange: ExchangeSettings::default(),
            strategy: StrategySettings::default(),
            telegram: TelegramSettings::default(),
            poll_interval_secs: 60,
            smoke_test_pause_secs: 10,
        }
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.bybit.com".to_string(),
            category: "spot".to_string(),
            symbol: "DOGEUSDT".to_string(),
            base_coin: "DOGE".to_string(),
            quote_coin: "USDT".to_string(),
            kline_interval_minutes: 1,
            kline_limit: 100,
            recv_window_ms: 5000,
            request_timeout_secs: 10,
        }
    }
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            buy_below: 30.0,
            sell_above: 70.0,
            stake_amount: 10.0,
            min_sell_qty: 5.0,
        }
    }
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment, then validate
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strategy;
        if !(s.buy_below > 0.0 && s.buy_below < s.sell_above && s.sell_above < 100.0) {
            return Err(ConfigError::Invalid(format!(
                "thresholds must satisfy 0 < buy_below < sell_above < 100 (got {} / {})",
                s.buy_below, s.sell_above
            )));
        }
        if s.stake_amount <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "stake_amount must be positive (got {})",
                s.stake_amount
            )));
        }
        if s.min_sell_qty < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_sell_qty must not be negative (got {})",
                s.min_sell_qty
            )));
        }

        let e = &self.exchange;
        if !KLINE_INTERVALS.contains(&e.kline_interval_minutes) {
            return Err(ConfigError::Invalid(format!(
                "kline_interval_minutes {} is not one of {:?}",
                e.kline_interval_minutes, KLINE_INTERVALS
            )));
        }
        if !(2..=1000).contains(&e.kline_limit) {
            return Err(ConfigError::Invalid(format!(
                "kline_limit must be between 2 and 1000 (got {})",
                e.kline_limit
            )));
        }
        if e.symbol.is_empty() || e.base_coin.is_empty() || e.quote_coin.is_empty() {
            return Err(ConfigError::Invalid(
                "symbol, base_coin and quote_coin must be set".to_string(),
            ));
        }
        if e.request_timeout_secs == 0 || self.telegram.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request timeouts must be non-zero".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn smoke_test_pause(&self) -> Duration {
        Duration::from_secs(self.smoke_test_pause_secs)
    }
}

/// Exchange API credentials
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read `API_KEY` and `API_SECRET` from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: required_env("API_KEY")?,
            api_secret: required_env("API_SECRET")?,
        })
    }
}

/// Telegram bot token and target chat
#[derive(Debug, Clone)]
pub struct TelegramTarget {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramTarget {
    /// Read `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`; `None` unless both are set
    pub fn from_env() -> Option<Self> {
        let bot_token = optional_env("TELEGRAM_BOT_TOKEN")?;
        let chat_id = optional_env("TELEGRAM_CHAT_ID")?;
        Some(Self { bot_token, chat_id })
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    optional_env(name).ok_or(ConfigError::MissingSecret(name))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

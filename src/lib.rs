// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod strategy;

// Re-export commonly used types
pub use api::{BybitClient, Exchange};
pub use error::{ConfigError, ExchangeError, NotifyError};
pub use models::*;
pub use notify::{Notifier, TelegramNotifier};
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, ExchangeError>;

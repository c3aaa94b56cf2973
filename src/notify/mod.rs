pub mod telegram;

pub use telegram::TelegramNotifier;

/// Best-effort delivery of a status message to a chat
///
/// Implementations never fail outward: a message that cannot be delivered is
/// logged locally and dropped.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, text: &str);
}

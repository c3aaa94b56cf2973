use crate::models::round_to;

/// Fixed divisor applied to the summed gains and losses
pub const RSI_DIVISOR: f64 = 14.0;

/// Average used when there are no gains (or no losses) at all
pub const RSI_FLOOR: f64 = 0.01;

/// Calculate Relative Strength Index (RSI)
///
/// `closes` must be ordered oldest first. Every delta in the series is
/// summed and divided by a fixed 14, regardless of how many gains or losses
/// there were, so this is not Wilder's smoothed RSI. Missing gains or losses
/// fall back to a 0.01 average instead of producing a division by zero.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Returns `None` with fewer than two closes. The result is rounded to 2 decimals.
pub fn calculate_rsi(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    let mut has_gain = false;
    let mut has_loss = false;

    for window in closes.windows(2) {
        let change = window[1] - window[0];
        if change > 0.0 {
            gain_sum += change;
            has_gain = true;
        } else if change < 0.0 {
            loss_sum += change.abs();
            has_loss = true;
        }
    }

    let avg_gain = if has_gain { gain_sum / RSI_DIVISOR } else { RSI_FLOOR };
    let avg_loss = if has_loss { loss_sum / RSI_DIVISOR } else { RSI_FLOOR };

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - (100.0 / (1.0 + rs));

    Some(round_to(rsi, 2))
}

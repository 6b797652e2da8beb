/// Stand-in for a zero average loss so RS stays finite.
pub const RSI_LOSS_EPSILON: f64 = 0.001;

/// Trailing simple moving average. One value per window end, `prices.len() - period + 1` in total.
pub fn moving_average(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let mut values = Vec::with_capacity(prices.len() - period + 1);
    let mut window_sum: f64 = prices[..period].iter().sum();
    values.push(window_sum / period as f64);
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        values.push(window_sum / period as f64);
    }

    values
}

/// Population standard deviation over each trailing window, measured against that window's mean.
pub fn standard_deviation(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    prices
        .windows(period)
        .map(|window| {
            let mean = window.iter().sum::<f64>() / period as f64;
            let variance = window.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / period as f64;
            variance.sqrt()
        })
        .collect()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let avg_loss = if avg_loss == 0.0 {
        RSI_LOSS_EPSILON
    } else {
        avg_loss
    };
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Wilder RSI. The first value covers the first `period` price changes, so the output
/// holds `prices.len() - period` values aligned with `prices[period..]`.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period + 1 {
        return Vec::new();
    }

    let changes: Vec<f64> = prices.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let gain = |change: f64| if change > 0.0 { change } else { 0.0 };
    let loss = |change: f64| if change < 0.0 { -change } else { 0.0 };

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(changes.len() - period + 1);
    values.push(rsi_from_averages(avg_gain, avg_loss));

    let smoothing = period as f64;
    for &change in &changes[period..] {
        avg_gain = (avg_gain * (smoothing - 1.0) + gain(change)) / smoothing;
        avg_loss = (avg_loss * (smoothing - 1.0) + loss(change)) / smoothing;
        values.push(rsi_from_averages(avg_gain, avg_loss));
    }

    values
}

/// True only on the step where `fast` moves from at-or-below `slow` to above it.
pub fn crossed_above(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> bool {
    prev_fast <= prev_slow && fast > slow
}

/// True only on the step where `fast` moves from at-or-above `slow` to below it.
pub fn crossed_below(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> bool {
    prev_fast >= prev_slow && fast < slow
}

/// Distance of `price` from `mean` in standard deviations. `None` when the deviation is zero.
pub fn z_score(price: f64, mean: f64, std_dev: f64) -> Option<f64> {
    if std_dev == 0.0 || !std_dev.is_finite() {
        return None;
    }
    Some((price - mean) / std_dev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_windows() {
        let values = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert!(moving_average(&[1.0, 2.0], 3).is_empty());
        assert!(moving_average(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn standard_deviation_uses_window_mean() {
        let values = standard_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert_eq!(values.len(), 1);
        assert!((values[0] - 2.0).abs() < 1e-12);

        let rolling = standard_deviation(&[1.0, 1.0, 3.0, 3.0], 2);
        assert_eq!(rolling.len(), 3);
        assert!(rolling[0].abs() < 1e-12);
        assert!((rolling[1] - 1.0).abs() < 1e-12);
        assert!(rolling[2].abs() < 1e-12);
    }

    #[test]
    fn rsi_matches_hand_computed_wilder_values() {
        let prices = [10.0, 11.0, 10.0, 12.0];
        let values = rsi(&prices, 2);
        assert_eq!(values.len(), 2);

        // seed: gains [1, 0] -> 0.5, losses [0, 1] -> 0.5
        assert!((values[0] - 50.0).abs() < 1e-9);
        // next change +2: gain (0.5 + 2) / 2 = 1.25, loss 0.5 / 2 = 0.25
        let expected = 100.0 - 100.0 / (1.0 + 1.25 / 0.25);
        assert!((values[1] - expected).abs() < 1e-9);
    }

    #[test]
    fn rsi_substitutes_epsilon_for_zero_losses() {
        let values = rsi(&[1.0, 2.0, 3.0, 4.0], 3);
        let expected = 100.0 - 100.0 / (1.0 + 1.0 / RSI_LOSS_EPSILON);
        assert!((values[0] - expected).abs() < 1e-9);
        assert!(values[0] < 100.0);

        let flat = rsi(&[5.0; 6], 3);
        assert!(flat.iter().all(|&value| value == 0.0));
    }

    #[test]
    fn rsi_needs_more_prices_than_period() {
        assert!(rsi(&[1.0, 2.0, 3.0], 3).is_empty());
        assert!(rsi(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn crossing_requires_a_change_of_side() {
        assert!(crossed_above(9.0, 10.0, 11.0, 10.0));
        assert!(crossed_above(10.0, 10.0, 10.5, 10.0));
        assert!(!crossed_above(11.0, 10.0, 12.0, 10.0));
        assert!(crossed_below(11.0, 10.0, 9.0, 10.0));
        assert!(!crossed_below(9.0, 10.0, 8.0, 10.0));
    }

    #[test]
    fn z_score_is_none_for_flat_windows() {
        assert_eq!(z_score(10.0, 10.0, 0.0), None);
        assert_eq!(z_score(12.0, 10.0, 1.0), Some(2.0));
    }
}

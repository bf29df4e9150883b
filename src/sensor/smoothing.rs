//! Asymmetric exponential smoothing, shared by the sensor's pressure signal
//! and the node agent's allocation smoothing (different rates, same shape).

/// Applies an EMA with a faster rate when the new sample exceeds the
/// current smoothed value and a slower (or just different) rate otherwise.
pub fn ema_asymmetric(current: f64, sample: f64, alpha_up: f64, alpha_down: f64) -> f64 {
    let alpha = if sample > current { alpha_up } else { alpha_down };
    alpha * sample + (1.0 - alpha) * current
}

use std::collections::HashMap;

/// Extract a parameter as f64 with a default value
pub fn get_param_f64(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params.get(key).copied().unwrap_or(default)
}

/// Extract an optional parameter as f64
pub fn get_optional_param_f64(params: &HashMap<String, f64>, key: &str) -> Option<f64> {
    params.get(key).copied()
}

/// Extract a window length, rejecting fractional, non-finite or non-positive values
pub fn require_period(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
) -> Result<usize, String> {
    let Some(raw) = params.get(key).copied() else {
        return Ok(default);
    };
    if !raw.is_finite() || raw < 1.0 || raw.fract() != 0.0 {
        return Err(format!(
            "parameter {} must be a whole number >= 1 (value: {})",
            key, raw
        ));
    }
    Ok(raw as usize)
}

/// Extract a finite, strictly positive parameter
pub fn require_positive(
    params: &HashMap<String, f64>,
    key: &str,
    default: f64,
) -> Result<f64, String> {
    let value = get_param_f64(params, key, default);
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("parameter {} must be > 0 (value: {})", key, value));
    }
    Ok(value)
}

/// Extract a finite parameter bounded to `[min, max]`
pub fn require_in_range(
    params: &HashMap<String, f64>,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, String> {
    let value = get_param_f64(params, key, default);
    if !value.is_finite() || value < min || value > max {
        return Err(format!(
            "parameter {} must be within [{}, {}] (value: {})",
            key, min, max, value
        ));
    }
    Ok(value)
}

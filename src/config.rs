use crate::error::ConfigError;
use crate::models::DEFAULT_INITIAL_CAPITAL;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct OracleSettings {
    pub url: String,
    pub secret: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub base_url: String,
    pub secret: Option<String>,
}

/// Process-level settings for the CLI and the HTTP collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Capital for configs that do not specify `initialCapital`.
    pub default_initial_capital: f64,
    pub oracle: Option<OracleSettings>,
    pub api: Option<ApiSettings>,
    pub results_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_initial_capital: DEFAULT_INITIAL_CAPITAL,
            oracle: None,
            api: None,
            results_dir: None,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings: HashMap<String, String> = env::vars().collect();
        Self::from_settings_map(&settings)
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let default_initial_capital = match optional_setting(settings, "BACKTEST_INITIAL_CAPITAL")
        {
            Some(_) => require_setting_f64(settings, "BACKTEST_INITIAL_CAPITAL", Some(0.0), None)?,
            None => DEFAULT_INITIAL_CAPITAL,
        };
        if default_initial_capital <= 0.0 {
            return Err(invalid(
                "BACKTEST_INITIAL_CAPITAL",
                &default_initial_capital.to_string(),
                "must be > 0",
            ));
        }

        let oracle_secret = optional_setting(settings, "DECISION_ORACLE_SECRET").map(str::to_string);
        let oracle = match optional_setting(settings, "DECISION_ORACLE_URL") {
            Some(url) => {
                let timeout_secs = match optional_setting(settings, "DECISION_ORACLE_TIMEOUT_SECS") {
                    Some(_) => require_setting_u64(settings, "DECISION_ORACLE_TIMEOUT_SECS", 1)?,
                    None => DEFAULT_ORACLE_TIMEOUT_SECS,
                };
                Some(OracleSettings {
                    url: url.to_string(),
                    secret: oracle_secret,
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            None if oracle_secret.is_some() => {
                return Err(ConfigError::Incomplete {
                    first: "DECISION_ORACLE_URL".to_string(),
                    second: "DECISION_ORACLE_SECRET".to_string(),
                })
            }
            None => None,
        };

        let api_secret = optional_setting(settings, "BACKTEST_API_SECRET").map(str::to_string);
        let api = match optional_setting(settings, "BACKTEST_API_URL") {
            Some(url) => Some(ApiSettings {
                base_url: url.trim_end_matches('/').to_string(),
                secret: api_secret,
            }),
            None if api_secret.is_some() => {
                return Err(ConfigError::Incomplete {
                    first: "BACKTEST_API_URL".to_string(),
                    second: "BACKTEST_API_SECRET".to_string(),
                })
            }
            None => None,
        };

        let results_dir = optional_setting(settings, "BACKTEST_RESULTS_DIR").map(PathBuf::from);

        Ok(Self {
            default_initial_capital,
            oracle,
            api,
            results_dir,
        })
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn require_setting<'a>(
    settings: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, ConfigError> {
    optional_setting(settings, key).ok_or_else(|| invalid(key, "", "missing required setting"))
}

fn require_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64, ConfigError> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| invalid(key, raw, "must be a number"))?;
    if !value.is_finite() {
        return Err(invalid(key, raw, "must be finite"));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(invalid(key, raw, &format!("must be >= {}", min_value)));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(invalid(key, raw, &format!("must be <= {}", max_value)));
        }
    }
    Ok(value)
}

fn require_setting_u64(
    settings: &HashMap<String, String>,
    key: &str,
    min: u64,
) -> Result<u64, ConfigError> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<u64>()
        .map_err(|_| invalid(key, raw, "must be a whole number"))?;
    if value < min {
        return Err(invalid(key, raw, &format!("must be >= {}", min)));
    }
    Ok(value)
}

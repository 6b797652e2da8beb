use anyhow::{Context, Result};
use std::time::Duration;

pub const MAX_ERROR_BODY_CHARS: usize = 2048;
const USER_AGENT: &str = concat!("backtest-engine/", env!("CARGO_PKG_VERSION"));

pub fn build_async_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("failed to build HTTP client")
}

pub fn truncate_for_log(value: &str, max_chars: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::truncate_for_log;

    #[test]
    fn truncates_long_bodies() {
        assert_eq!(truncate_for_log("  short  ", 10), "short");
        assert_eq!(truncate_for_log("abcdefgh", 3), "abc…");
    }
}

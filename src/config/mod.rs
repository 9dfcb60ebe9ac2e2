pub mod schema;
pub mod watcher;

use crate::error::{LiveError, Result};
use reqwest::Url;
use schema::AppConfig;
use std::path::Path;

/// Load and parse configuration from a TOML file.
///
/// # Errors
/// Returns `LiveError::ConfigNotFound` if the file doesn't exist,
/// `LiveError::Io` on read errors, `LiveError::TomlParse` on syntax errors,
/// or `LiveError::Config` on validation failures.
pub fn load(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(LiveError::ConfigNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let content = expand_env_vars(&content);
    let config: AppConfig = toml::from_str(&content)?;

    validate(&config)?;
    Ok(config)
}

/// Parse the configured device URL.
///
/// # Errors
/// Returns `LiveError::InvalidUrl` unless the URL parses with an http(s) scheme.
pub fn device_url(config: &AppConfig) -> Result<Url> {
    let url = Url::parse(&config.device.url)
        .map_err(|e| LiveError::InvalidUrl(format!("{}: {e}", config.device.url)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LiveError::InvalidUrl(format!(
            "{}: unsupported scheme '{other}'",
            config.device.url
        ))),
    }
}

/// Expand `${VAR}` and `$VAR` patterns in the config string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                if let Ok(val) = std::env::var(&var_name) {
                    result.push_str(&val);
                } else {
                    // Keep original if env var not found
                    use std::fmt::Write;
                    let _ = write!(result, "${{{var_name}}}");
                }
            } else {
                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        var_name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else if let Ok(val) = std::env::var(&var_name) {
                    result.push_str(&val);
                } else {
                    result.push('$');
                    result.push_str(&var_name);
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Validate config constraints.
pub fn validate(config: &AppConfig) -> Result<()> {
    device_url(config)?;

    if config.device.request_timeout_ms == 0 {
        return Err(LiveError::Config(
            "device.request_timeout_ms must be > 0".to_string(),
        ));
    }

    if !config.device.events_path.starts_with('/') {
        return Err(LiveError::Config(format!(
            "device.events_path must start with '/', got '{}'",
            config.device.events_path
        )));
    }

    let live = &config.live;
    if live.initial_backoff_ms == 0 {
        return Err(LiveError::Config(
            "live.initial_backoff_ms must be > 0".to_string(),
        ));
    }
    if live.max_backoff_ms < live.initial_backoff_ms {
        return Err(LiveError::Config(format!(
            "live.max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
            live.max_backoff_ms, live.initial_backoff_ms
        )));
    }
    if let Some(interval) = live.polling_interval_ms {
        if interval < 1000 {
            return Err(LiveError::Config(format!(
                "live.polling_interval_ms must be at least 1000, got {interval}"
            )));
        }
    }

    Ok(())
}
